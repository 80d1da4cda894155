use std::{collections::BTreeMap, error::Error, fs, fs::File, path::PathBuf};

use clap::Parser;
use docascade::{
    config::{run::Regime, setup::ExperimentConfig},
    dynamics,
    error::SimError,
    series::TimeSeries,
    state::State,
    steady_state,
};
use log::{info, warn};
use rayon::prelude::*;

#[derive(Debug, clap::Parser)]
#[command(
    name = "docascade_run",
    about = "Run intervention scenarios against a signaling cascade"
)]
pub struct RunCli {
    #[arg(short = 'c', long = "config")]
    pub config: PathBuf,

    #[arg(short = 'o', long = "out", default_value = "output")]
    pub out_dir: PathBuf,

    #[arg(short = 'r', long = "regime", value_enum)]
    pub regime: Option<Regime>,

    #[arg(long = "steady-state")]
    pub steady_state: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = RunCli::parse();

    let mut config = ExperimentConfig::parse(&args.config)?;
    if let Some(regime) = args.regime {
        info!("Overriding regime with {:?}", regime);
        config.simulation.regime = regime;
    }
    config.print();
    fs::create_dir_all(&args.out_dir)?;

    // Scenarios share nothing mutable, so they run side by side.
    let results = config
        .scenarios
        .par_iter()
        .map(|scenario| dynamics::run(&config, scenario).map(|s| (scenario.name.clone(), s)))
        .collect::<Result<Vec<(String, TimeSeries)>, SimError>>()?;

    for (name, series) in &results {
        let path = args.out_dir.join(format!("{name}.csv"));
        series.write_csv(File::create(&path)?)?;
        info!("Wrote {}", path.display());
    }

    if args.steady_state {
        let mut solved = BTreeMap::<String, State>::new();
        for scenario in &config.scenarios {
            match steady_state::solve(
                &config.cascade,
                &config.parameters,
                config.signal_level,
                &scenario.interventions,
            ) {
                Ok(state) => {
                    solved.insert(scenario.name.clone(), state);
                }
                // Discrete-only targets have no continuous equilibrium.
                Err(e) => warn!("No steady state for scenario {}: {}", scenario.name, e),
            }
        }
        if config.simulation.regime == Regime::Deterministic {
            for (name, series) in &results {
                if let Some(state) = solved.get(name) {
                    report_gap(name, &series.terminal(), state);
                }
            }
        }
        let path = args.out_dir.join("steady_state.json");
        serde_json::to_writer_pretty(File::create(&path)?, &solved)?;
        info!("Wrote {}", path.display());
    }
    info!("Done!");
    Ok(())
}

// Largest relative gap between the simulated end point and the closed form.
fn report_gap(scenario: &str, terminal: &State, solved: &State) {
    let gap = solved
        .iter()
        .filter_map(|(name, value)| {
            terminal
                .get(name)
                .map(|t| (t - value).abs() / value.abs().max(1e-12))
        })
        .fold(0.0, f64::max);
    if gap > 1e-3 {
        warn!(
            "Scenario {} has not settled: terminal state is {:.2e} away from steady state",
            scenario, gap
        );
    } else {
        info!("Scenario {} settled to within {:.2e}", scenario, gap);
    }
}
