use log::debug;

use crate::{
    cascade::{Cascade, Phosphorylation},
    error::{Result, SimError},
    intervention::InterventionSet,
    state::{ParameterSet, State},
};

/// Closed-form equilibrium of the continuous cascade, solved upstream first.
pub fn solve(
    cascade: &Cascade,
    parameters: &ParameterSet,
    signal: f64,
    interventions: &InterventionSet,
) -> Result<State> {
    let variables = cascade.variables();
    if let Some((name, _)) = interventions
        .iter()
        .find(|(name, _)| !variables.iter().any(|v| v == *name))
    {
        return Err(SimError::UnknownTarget(name.to_string()));
    }

    let mut state = State::new().with(
        cascade.signal(),
        interventions.get(cascade.signal()).unwrap_or(signal),
    );
    for (i, stage) in cascade.stages().iter().enumerate() {
        let upstream = state.get(cascade.upstream(i)).ok_or_else(|| {
            SimError::Consistency(format!("stage `{}` solved before its input", stage.name))
        })?;
        let a = parameters.get(&stage.activation)? * upstream;
        let d = parameters.get(&stage.deactivation)?;
        let total = parameters.get(&stage.total)?;
        let active = interventions.get(&stage.name);

        match stage.kind {
            Phosphorylation::Single => {
                let x = active.unwrap_or(total * a / (a + d));
                state.set(stage.name.clone(), x);
            }
            Phosphorylation::Double => {
                let mid = format!("{}_p", stage.name);
                let (xp, x) = match (interventions.get(&mid), active) {
                    (Some(p), Some(x)) => (p, x),
                    // dX/dt = a Xp - d X
                    (Some(p), None) => (p, a * p / d),
                    // dXp/dt = a (T - Xp - C) - d Xp - a Xp + d C
                    (None, Some(c)) => ((a * (total - c) + d * c) / (2.0 * a + d), c),
                    (None, None) => {
                        let denom = a * a + a * d + d * d;
                        (total * a * d / denom, total * a * a / denom)
                    }
                };
                state.set(mid, xp);
                state.set(stage.name.clone(), x);
            }
        }
        debug!(
            "steady state of {}: {}",
            stage.name,
            state.get(&stage.name).unwrap_or(f64::NAN)
        );
    }
    Ok(state)
}
