// Stage `x` is active form `x`, plus `x_p` when doubly phosphorylated.
// Discrete runs also carry the inactive pool `x_u`.

use crate::{
    error::{Result, SimError},
    network::{NetworkBuilder, OdeSystem, ReactionNetwork},
    registry::Registry,
    state::{ParameterSet, State, VariableIndex},
};

#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Phosphorylation {
    Single,
    Double,
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct Stage {
    pub name: String,
    pub kind: Phosphorylation,
    pub activation: String,
    pub deactivation: String,
    pub total: String,
}

impl Stage {
    // Parameters default to `k_<name>_act`, `k_<name>_deact` and `<name>_total`.
    pub fn new(name: impl Into<String>, kind: Phosphorylation) -> Self {
        let name = name.into();
        Stage {
            activation: format!("k_{name}_act"),
            deactivation: format!("k_{name}_deact"),
            total: format!("{name}_total"),
            name,
            kind,
        }
    }

    pub fn intermediate(&self) -> Option<String> {
        match self.kind {
            Phosphorylation::Single => None,
            Phosphorylation::Double => Some(format!("{}_p", self.name)),
        }
    }

    pub fn inactive(&self) -> String {
        format!("{}_u", self.name)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cascade {
    signal: String,
    stages: Vec<Stage>,
}

impl Cascade {
    pub fn new(signal: impl Into<String>, stages: Vec<Stage>) -> Result<Self> {
        let cascade = Cascade {
            signal: signal.into(),
            stages,
        };
        if cascade.stages.is_empty() {
            return Err(SimError::Definition("cascade has no stages".into()));
        }
        // Rejects clashes such as a stage `a_p` next to a double stage `a`.
        VariableIndex::new(cascade.species())?;
        Ok(cascade)
    }

    pub fn chain(signal: &str, stages: &[(&str, Phosphorylation)]) -> Result<Self> {
        Cascade::new(
            signal,
            stages
                .iter()
                .map(|(name, kind)| Stage::new(*name, *kind))
                .collect(),
        )
    }

    pub fn signal(&self) -> &str {
        &self.signal
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    // Active form of the stage feeding stage `i`.
    pub fn upstream(&self, i: usize) -> &str {
        if i == 0 {
            &self.signal
        } else {
            &self.stages[i - 1].name
        }
    }

    pub fn variables(&self) -> Vec<String> {
        let mut names = vec![self.signal.clone()];
        for stage in &self.stages {
            names.extend(stage.intermediate());
            names.push(stage.name.clone());
        }
        names
    }

    pub fn species(&self) -> Vec<String> {
        let mut names = vec![self.signal.clone()];
        for stage in &self.stages {
            names.push(stage.inactive());
            names.extend(stage.intermediate());
            names.push(stage.name.clone());
        }
        names
    }

    pub fn ode_system(&self) -> Result<OdeSystem> {
        let mut registry = Registry::new();
        registry.register(self.signal.clone(), |_| Ok(0.0))?;
        for (i, stage) in self.stages.iter().enumerate() {
            let up = self.upstream(i).to_string();
            let Stage {
                name,
                activation,
                deactivation,
                total,
                ..
            } = stage.clone();
            match stage.intermediate() {
                None => {
                    let var = name.clone();
                    registry.register(name, move |ctx| {
                        let a = ctx.param(&activation)? * ctx.var(&up)?;
                        let d = ctx.param(&deactivation)?;
                        let x = ctx.var(&var)?;
                        Ok(a * (ctx.param(&total)? - x) - d * x)
                    })?;
                }
                Some(mid) => {
                    // Both equations read the same four names.
                    let (up2, act2, deact2) =
                        (up.clone(), activation.clone(), deactivation.clone());
                    let (mid2, var2) = (mid.clone(), name.clone());
                    registry.register(mid.clone(), move |ctx| {
                        let a = ctx.param(&act2)? * ctx.var(&up2)?;
                        let d = ctx.param(&deact2)?;
                        let (xp, x) = (ctx.var(&mid2)?, ctx.var(&var2)?);
                        let inactive = ctx.param(&total)? - xp - x;
                        Ok(a * inactive - d * xp - a * xp + d * x)
                    })?;
                    let var = name.clone();
                    registry.register(name, move |ctx| {
                        let a = ctx.param(&activation)? * ctx.var(&up)?;
                        let d = ctx.param(&deactivation)?;
                        Ok(a * ctx.var(&mid)? - d * ctx.var(&var)?)
                    })?;
                }
            }
        }
        OdeSystem::new(registry)
    }

    // The upstream active form catalyses each step from both sides.
    pub fn reaction_network(&self) -> Result<ReactionNetwork> {
        let mut builder = ReactionNetwork::builder(VariableIndex::new(self.species())?);
        for (i, stage) in self.stages.iter().enumerate() {
            let up = self.upstream(i);
            let inactive = stage.inactive();
            let active = &stage.name;
            builder = match stage.intermediate() {
                None => {
                    let b = activate(builder, active, up, &inactive, active, stage)?;
                    deactivate(b, active, active, &inactive, stage)?
                }
                Some(mid) => {
                    let b = activate(builder, &mid, up, &inactive, &mid, stage)?;
                    let b = activate(b, active, up, &mid, active, stage)?;
                    let b = deactivate(b, active, active, &mid, stage)?;
                    deactivate(b, &mid, &mid, &inactive, stage)?
                }
            };
        }
        builder.build()
    }

    pub fn initial_state(&self, level: f64) -> State {
        self.variables()
            .into_iter()
            .map(|name| {
                let value = if name == self.signal { level } else { 0.0 };
                (name, value)
            })
            .collect()
    }

    // Every stage starts entirely inactive.
    pub fn initial_counts(&self, parameters: &ParameterSet, level: f64) -> Result<State> {
        let mut state = State::new().with(self.signal.clone(), level);
        for stage in &self.stages {
            state.set(stage.inactive(), parameters.get(&stage.total)?);
            if let Some(mid) = stage.intermediate() {
                state.set(mid, 0.0);
            }
            state.set(stage.name.clone(), 0.0);
        }
        Ok(state)
    }
}

// Reactions are named `<label>_activation` and `<label>_deactivation`.
fn activate(
    builder: NetworkBuilder,
    label: &str,
    catalyst: &str,
    from: &str,
    to: &str,
    stage: &Stage,
) -> Result<NetworkBuilder> {
    let (k, cat, src) = (
        stage.activation.clone(),
        catalyst.to_string(),
        from.to_string(),
    );
    builder.reaction(
        &format!("{label}_activation"),
        &[(from, 1), (catalyst, 1)],
        &[(to, 1), (catalyst, 1)],
        move |ctx| Ok(ctx.param(&k)? * ctx.var(&cat)? * ctx.var(&src)?),
    )
}

fn deactivate(
    builder: NetworkBuilder,
    label: &str,
    from: &str,
    to: &str,
    stage: &Stage,
) -> Result<NetworkBuilder> {
    let (k, src) = (stage.deactivation.clone(), from.to_string());
    let name = format!("{label}_deactivation");
    builder.reaction(&name, &[(from, 1)], &[(to, 1)], move |ctx| {
        Ok(ctx.param(&k)? * ctx.var(&src)?)
    })
}
