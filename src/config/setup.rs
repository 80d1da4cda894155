use std::{error::Error, fs::File, io::Read, path::Path};

use crate::{
    cascade::{Cascade, Phosphorylation, Stage},
    error::SimError,
    intervention::InterventionSet,
    state::ParameterSet,
};

use super::run::{IntegratorConfig, Regime, RunParams};

#[derive(serde::Serialize, serde::Deserialize, Debug)]
struct SignalYaml {
    name: String,
    level: f64,
}

#[derive(serde::Serialize, serde::Deserialize, Debug)]
struct StageYaml {
    name: String,
    kind: Phosphorylation,
    activation: Option<String>,
    deactivation: Option<String>,
    total: Option<String>,
}

#[derive(serde::Serialize, serde::Deserialize)]
struct ConfigYaml {
    signal: SignalYaml,
    stages: Vec<StageYaml>,
    parameters: ParameterSet,
    simulation: RunParams,
    #[serde(default)]
    scenarios: Vec<Scenario>,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub interventions: InterventionSet,
}

pub struct ExperimentConfig {
    pub cascade: Cascade,
    pub signal_level: f64,
    pub parameters: ParameterSet,
    pub simulation: RunParams,
    pub scenarios: Vec<Scenario>,
}

impl ExperimentConfig {
    pub fn parse<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn Error>> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        ExperimentConfig::from_yaml(&contents)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, Box<dyn Error>> {
        let config_raw: ConfigYaml = serde_yaml::from_str(contents)?;
        if !(config_raw.signal.level.is_finite() && config_raw.signal.level >= 0.0) {
            return Err(SimError::Definition(format!(
                "signal level must be non-negative, got {}",
                config_raw.signal.level
            ))
            .into());
        }
        let stages = config_raw
            .stages
            .into_iter()
            .map(|s| {
                let mut stage = Stage::new(s.name, s.kind);
                if let Some(activation) = s.activation {
                    stage.activation = activation;
                }
                if let Some(deactivation) = s.deactivation {
                    stage.deactivation = deactivation;
                }
                if let Some(total) = s.total {
                    stage.total = total;
                }
                stage
            })
            .collect();
        let cascade = Cascade::new(config_raw.signal.name, stages)?;

        let mut scenarios = config_raw.scenarios;
        if scenarios.is_empty() {
            scenarios.push(Scenario {
                name: "baseline".into(),
                interventions: InterventionSet::new(),
            });
        }
        for (i, scenario) in scenarios.iter().enumerate() {
            // Names become output file names.
            let name = &scenario.name;
            if name.is_empty()
                || name.starts_with('.')
                || !name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            {
                return Err(
                    SimError::Definition(format!("scenario name `{name}` is not a file name")).into(),
                );
            }
            if scenarios[..i].iter().any(|s| s.name == scenario.name) {
                return Err(SimError::Definition(format!(
                    "scenario `{}` declared twice",
                    scenario.name
                ))
                .into());
            }
        }
        // Fail on a bad grid now rather than once per scenario.
        config_raw.simulation.grid()?;

        Ok(ExperimentConfig {
            cascade,
            signal_level: config_raw.signal.level,
            parameters: config_raw.parameters,
            simulation: config_raw.simulation,
            scenarios,
        })
    }

    pub fn print(&self) {
        let stages = self
            .cascade
            .stages()
            .iter()
            .map(|s| match s.kind {
                Phosphorylation::Single => format!("{} (single)", s.name),
                Phosphorylation::Double => format!("{} (double)", s.name),
            })
            .collect::<Vec<_>>()
            .join(" -> ");
        let sim = &self.simulation;
        let integrator = match (sim.regime, &sim.integrator) {
            (Regime::Stochastic, _) => format!("direct method, {} replicate(s)", sim.replicates),
            (Regime::Deterministic, IntegratorConfig::Rk4(rk4)) => {
                format!("RK4, max step {}", rk4.max_step)
            }
            (Regime::Deterministic, IntegratorConfig::DormandPrince(dp)) => {
                format!("Dormand-Prince, rtol {} atol {}", dp.rtol, dp.atol)
            }
        };
        println!(
            "\
Cascade:
  Signal: {signal} = {level}
  Stages: {stages}

Simulation:
  Regime: {regime:?}
  Time span: [{t_start}, {t_end}], sampled every {dt}
  Method: {integrator}
  Seed: {seed}",
            signal = self.cascade.signal(),
            level = self.signal_level,
            regime = sim.regime,
            t_start = sim.t_start,
            t_end = sim.t_end,
            dt = sim.dt,
            seed = sim.seed,
        );
        println!("\nParameters:");
        for (name, value) in self.parameters.iter() {
            println!("  {name}: {value}");
        }
        println!("\nScenarios:");
        for scenario in &self.scenarios {
            let targets = scenario
                .interventions
                .iter()
                .map(|(name, value)| format!("do({name} = {value})"))
                .collect::<Vec<_>>();
            if targets.is_empty() {
                println!("  {}: no intervention", scenario.name);
            } else {
                println!("  {}: {}", scenario.name, targets.join(", "));
            }
        }
    }
}
