// The do-operator: a clamped variable is read at its value and never moves.

use std::borrow::Cow;

use log::debug;

use crate::{
    error::{Result, SimError},
    intervention::{Clamps, InterventionSet},
    network::{OdeSystem, ReactionNetwork},
    state::{Context, ParameterSet, State, VariableIndex},
};

// The part both drivers rely on: the variable layout and how to clamp a
// positional state before the first step.
pub trait Transition {
    fn variables(&self) -> &VariableIndex;

    fn interventions(&self) -> &InterventionSet;

    fn clamps(&self) -> &Clamps;

    fn clamp(&self, values: &mut [f64]) {
        self.clamps().apply(values);
    }
}

#[derive(Clone, Debug)]
pub struct OdeTransition {
    system: OdeSystem,
    parameters: ParameterSet,
    interventions: InterventionSet,
    clamps: Clamps,
}

pub fn compose(
    system: &OdeSystem,
    parameters: &ParameterSet,
    interventions: &InterventionSet,
) -> Result<OdeTransition> {
    let clamps = interventions.resolve(system.variables())?;
    debug!(
        "composed ODE transition over {} variables with {} intervention(s)",
        system.variables().len(),
        interventions.len()
    );
    Ok(OdeTransition {
        system: system.clone(),
        parameters: parameters.clone(),
        interventions: interventions.clone(),
        clamps,
    })
}

impl OdeTransition {
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    // Derivatives in variable order. Intervened entries are exactly 0 whatever
    // their registered function computes.
    pub fn derivatives(&self, values: &[f64], out: &mut [f64]) -> Result<()> {
        let variables = self.system.variables();
        if values.len() != variables.len() {
            return Err(SimError::Consistency(format!(
                "state has {} entries for {} variables",
                values.len(),
                variables.len()
            )));
        }
        let patched = patch(&self.clamps, values);
        let ctx = Context::new(variables, &patched, &self.parameters, &self.interventions);
        self.system.derivatives().evaluate(&ctx, out)?;
        self.clamps.zero(out);
        Ok(())
    }

    pub fn evaluate(&self, state: &State) -> Result<State> {
        let values = state.to_vector(self.variables())?;
        let mut out = vec![0.0; values.len()];
        self.derivatives(&values, &mut out)?;
        Ok(State::from_vector(self.variables(), &out))
    }
}

impl Transition for OdeTransition {
    fn variables(&self) -> &VariableIndex {
        self.system.variables()
    }

    fn interventions(&self) -> &InterventionSet {
        &self.interventions
    }

    fn clamps(&self) -> &Clamps {
        &self.clamps
    }
}

#[derive(Clone, Debug)]
pub struct ReactionTransition {
    network: ReactionNetwork,
    parameters: ParameterSet,
    interventions: InterventionSet,
    clamps: Clamps,
    silenced: Vec<bool>,
}

pub fn compose_reactions(
    network: &ReactionNetwork,
    parameters: &ParameterSet,
    interventions: &InterventionSet,
) -> Result<ReactionTransition> {
    let clamps = interventions.resolve(network.species())?;
    let silenced: Vec<bool> = (0..network.reactions().len())
        .map(|r| {
            network
                .net_change(r)
                .iter()
                .any(|(s, _)| clamps.is_clamped(*s))
        })
        .collect();
    for (name, _) in network
        .reactions()
        .iter()
        .zip(&silenced)
        .filter(|(_, off)| **off)
    {
        debug!("silencing reaction {} under intervention", name);
    }
    Ok(ReactionTransition {
        network: network.clone(),
        parameters: parameters.clone(),
        interventions: interventions.clone(),
        clamps,
        silenced,
    })
}

impl ReactionTransition {
    pub fn network(&self) -> &ReactionNetwork {
        &self.network
    }

    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    pub fn is_silenced(&self, reaction: usize) -> bool {
        self.silenced[reaction]
    }

    // Propensities in stoichiometry row order.
    pub fn propensities(&self, counts: &[f64], out: &mut [f64]) -> Result<()> {
        let species = self.network.species();
        if counts.len() != species.len() {
            return Err(SimError::Consistency(format!(
                "state has {} entries for {} species",
                counts.len(),
                species.len()
            )));
        }
        let patched = patch(&self.clamps, counts);
        let ctx = Context::new(species, &patched, &self.parameters, &self.interventions);
        self.network.propensities().evaluate(&ctx, out)?;
        for (a, off) in out.iter_mut().zip(&self.silenced) {
            if *off {
                *a = 0.0;
            }
        }
        if let Some(r) = out.iter().position(|a| !(a.is_finite() && *a >= 0.0)) {
            return Err(SimError::Definition(format!(
                "propensity of `{}` evaluated to {}",
                self.network.reactions()[r],
                out[r]
            )));
        }
        Ok(())
    }

    // Propensity-weighted net changes.
    pub fn drift(&self, counts: &[f64]) -> Result<Vec<f64>> {
        let mut propensities = vec![0.0; self.network.reactions().len()];
        self.propensities(counts, &mut propensities)?;
        let mut drift = vec![0.0; counts.len()];
        for (r, a) in propensities.iter().enumerate() {
            for &(s, change) in self.network.net_change(r) {
                drift[s] += a * change as f64;
            }
        }
        Ok(drift)
    }
}

impl Transition for ReactionTransition {
    fn variables(&self) -> &VariableIndex {
        self.network.species()
    }

    fn interventions(&self) -> &InterventionSet {
        &self.interventions
    }

    fn clamps(&self) -> &Clamps {
        &self.clamps
    }
}

fn patch<'a>(clamps: &Clamps, values: &'a [f64]) -> Cow<'a, [f64]> {
    if clamps.is_empty() {
        Cow::Borrowed(values)
    } else {
        let mut owned = values.to_vec();
        clamps.apply(&mut owned);
        Cow::Owned(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use approx::assert_relative_eq;

    // x -> y -> z chain where each stage relaxes towards its upstream value.
    fn chain() -> (OdeSystem, ParameterSet) {
        let mut registry = Registry::new();
        registry
            .register("x", |ctx| Ok(-ctx.param("k")? * ctx.var("x")?))
            .unwrap();
        registry
            .register("y", |ctx| Ok(ctx.param("k")? * (ctx.var("x")? - ctx.var("y")?)))
            .unwrap();
        registry
            .register("z", |ctx| Ok(ctx.param("k")? * (ctx.var("y")? - ctx.var("z")?)))
            .unwrap();
        (
            OdeSystem::new(registry).unwrap(),
            ParameterSet::new([("k", 0.5)]).unwrap(),
        )
    }

    #[test]
    fn empty_intervention_matches_direct_evaluation() {
        let (system, params) = chain();
        let none = InterventionSet::new();
        let transition = compose(&system, &params, &none).unwrap();

        let values = [4.0, 1.0, 3.0];
        let mut composed = [0.0; 3];
        transition.derivatives(&values, &mut composed).unwrap();

        let ctx = Context::new(system.variables(), &values, &params, &none);
        let mut direct = [0.0; 3];
        system.derivatives().evaluate(&ctx, &mut direct).unwrap();

        for (a, b) in composed.iter().zip(&direct) {
            assert_relative_eq!(*a, *b, epsilon = 1e-15);
        }
    }

    #[test]
    fn intervened_derivative_is_zero_and_read_at_clamped_value() {
        let (system, params) = chain();
        let set = InterventionSet::from_pairs([("y", 10.0)]).unwrap();
        let transition = compose(&system, &params, &set).unwrap();

        // The incoming y is stale; z must see the clamped 10.
        let mut out = [0.0; 3];
        transition.derivatives(&[4.0, 1.0, 3.0], &mut out).unwrap();
        assert_eq!(out[1], 0.0);
        assert_relative_eq!(out[0], -2.0);
        assert_relative_eq!(out[2], 0.5 * (10.0 - 3.0));
    }

    #[test]
    fn named_evaluation_round_trips_names() {
        let (system, params) = chain();
        let set = InterventionSet::from_pairs([("x", 2.0)]).unwrap();
        let transition = compose(&system, &params, &set).unwrap();
        let state = State::new().with("x", 0.0).with("y", 0.0).with("z", 0.0);
        let rates = transition.evaluate(&state).unwrap();
        assert_eq!(rates.get("x"), Some(0.0));
        assert_relative_eq!(rates.get("y").unwrap(), 1.0);
    }

    #[test]
    fn rates_can_see_which_inputs_are_clamped() {
        // An input-driven variable that switches to a fixed feed while its
        // source is held.
        let mut registry = Registry::new();
        registry.register("x", |_| Ok(0.0)).unwrap();
        registry
            .register("y", |ctx| match ctx.clamped("x") {
                Some(level) => Ok(level - ctx.var("y")?),
                None => Ok(-ctx.var("y")?),
            })
            .unwrap();
        let system = OdeSystem::new(registry).unwrap();
        let params = ParameterSet::new([("k", 1.0)]).unwrap();
        let state = State::new().with("x", 1.0).with("y", 2.0);

        let free = compose(&system, &params, &InterventionSet::new()).unwrap();
        assert_eq!(free.evaluate(&state).unwrap().get("y"), Some(-2.0));
        let set = InterventionSet::from_pairs([("x", 5.0)]).unwrap();
        let held = compose(&system, &params, &set).unwrap();
        assert_eq!(held.evaluate(&state).unwrap().get("y"), Some(3.0));
    }

    #[test]
    fn unknown_target_fails_composition() {
        let (system, params) = chain();
        let set = InterventionSet::from_pairs([("w", 1.0)]).unwrap();
        assert_eq!(
            compose(&system, &params, &set).unwrap_err(),
            SimError::UnknownTarget("w".into())
        );
    }

    // a -> b + c, where the propensity reads only a. Clamping c must still
    // silence the reaction because c is produced as a byproduct.
    fn byproduct_network() -> ReactionNetwork {
        let species = VariableIndex::new(["a", "b", "c", "e"]).unwrap();
        ReactionNetwork::builder(species)
            .reaction("split", &[("a", 1)], &[("b", 1), ("c", 1)], |ctx| {
                Ok(ctx.param("k")? * ctx.var("a")?)
            })
            .unwrap()
            .reaction("make_e", &[("b", 1)], &[("b", 1), ("e", 1)], |ctx| {
                Ok(ctx.param("k")? * ctx.var("c")?)
            })
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn byproduct_reactions_are_silenced() {
        let network = byproduct_network();
        let params = ParameterSet::new([("k", 2.0)]).unwrap();
        let set = InterventionSet::from_pairs([("c", 7.0)]).unwrap();
        let transition = compose_reactions(&network, &params, &set).unwrap();
        assert!(transition.is_silenced(0));
        assert!(!transition.is_silenced(1));

        let mut out = [0.0; 2];
        transition.propensities(&[5.0, 1.0, 0.0, 0.0], &mut out).unwrap();
        assert_eq!(out[0], 0.0);
        // make_e reads c at its clamped value.
        assert_relative_eq!(out[1], 14.0);

        let drift = transition.drift(&[5.0, 1.0, 0.0, 0.0]).unwrap();
        assert_eq!(drift[2], 0.0);
        assert_relative_eq!(drift[3], 14.0);
    }

    #[test]
    fn empty_set_leaves_propensities_untouched() {
        let network = byproduct_network();
        let params = ParameterSet::new([("k", 2.0)]).unwrap();
        let transition = compose_reactions(&network, &params, &InterventionSet::new()).unwrap();
        let mut out = [0.0; 2];
        transition.propensities(&[5.0, 1.0, 3.0, 0.0], &mut out).unwrap();
        assert_eq!(out, [10.0, 6.0]);
    }
}
