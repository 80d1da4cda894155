use log::info;

use crate::{
    compose::{ReactionTransition, Transition},
    error::{Result, SimError},
    numerics::gillespie::{StochasticEngine, StochasticProblem},
    series::TimeSeries,
    state::State,
};

use super::grid::TimeGrid;

pub fn simulate<E: StochasticEngine>(
    engine: &mut E,
    transition: &ReactionTransition,
    initial: &State,
    grid: &TimeGrid,
) -> Result<TimeSeries> {
    let step = grid.uniform_step().ok_or_else(|| {
        SimError::InvalidGrid("stochastic sampling needs uniformly spaced time points".into())
    })?;
    let species = transition.variables();
    let mut values = initial.to_vector(species)?;
    transition.clamp(&mut values);
    let counts = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            if v.is_finite() && *v >= 0.0 && v.fract() == 0.0 {
                Ok(*v as i64)
            } else {
                Err(SimError::Definition(format!(
                    "copy number of `{}` must be a non-negative whole number, got {v}",
                    species.name(i)
                )))
            }
        })
        .collect::<Result<Vec<i64>>>()?;

    info!(
        "stochastic run over [{}, {}] with step {}, {} intervention(s)",
        grid.start(),
        grid.end(),
        step,
        transition.interventions().len()
    );
    let network = transition.network();
    let problem = StochasticProblem {
        species: species.names(),
        pre: network.pre(),
        post: network.post(),
        initial: &counts,
        t_start: grid.start(),
        t_end: grid.end(),
        step,
    };
    let mut scratch = vec![0.0; counts.len()];
    let samples = engine.simulate(&problem, |x, a| {
        for (dst, n) in scratch.iter_mut().zip(x) {
            *dst = *n as f64;
        }
        transition.propensities(&scratch, a)
    })?;

    if samples.len() != grid.len() {
        return Err(SimError::Consistency(format!(
            "engine returned {} samples for a grid of {} points",
            samples.len(),
            grid.len()
        )));
    }
    // Report the grid's own timestamps rather than the engine's recomputed ones.
    let mut rows = Vec::with_capacity(samples.len());
    for ((_, x), t) in samples.into_iter().zip(grid.points()) {
        if let Some(s) = x.iter().position(|n| *n < 0) {
            return Err(SimError::NegativeState {
                species: species.name(s).to_string(),
                t: *t,
                value: x[s],
            });
        }
        rows.push(x.into_iter().map(|n| n as f64).collect());
    }
    Ok(TimeSeries::new(
        species.names().to_vec(),
        grid.points().to_vec(),
        rows,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compose::compose_reactions,
        intervention::InterventionSet,
        network::ReactionNetwork,
        numerics::gillespie::DirectMethod,
        state::{ParameterSet, VariableIndex},
    };

    // u <-> p, with the forward step catalysed by e.
    fn toggle() -> (ReactionNetwork, ParameterSet) {
        let species = VariableIndex::new(["e", "u", "p"]).unwrap();
        let network = ReactionNetwork::builder(species)
            .reaction("on", &[("u", 1), ("e", 1)], &[("p", 1), ("e", 1)], |ctx| {
                Ok(ctx.param("k_on")? * ctx.var("e")? * ctx.var("u")?)
            })
            .unwrap()
            .reaction("off", &[("p", 1)], &[("u", 1)], |ctx| {
                Ok(ctx.param("k_off")? * ctx.var("p")?)
            })
            .unwrap()
            .build()
            .unwrap();
        (
            network,
            ParameterSet::new([("k_on", 0.2), ("k_off", 1.0)]).unwrap(),
        )
    }

    fn initial() -> State {
        State::new().with("e", 3.0).with("u", 50.0).with("p", 0.0)
    }

    #[test]
    fn samples_on_grid_and_conserves_total() {
        let (network, params) = toggle();
        let transition = compose_reactions(&network, &params, &InterventionSet::new()).unwrap();
        let grid = TimeGrid::uniform(0.0, 20.0, 0.5).unwrap();
        let series =
            simulate(&mut DirectMethod::seeded(11), &transition, &initial(), &grid).unwrap();
        assert_eq!(series.times(), grid.points());
        for row in series.rows() {
            assert!(row.iter().all(|n| *n >= 0.0));
            assert_eq!(row[1] + row[2], 50.0);
            assert_eq!(row[0], 3.0);
        }
    }

    #[test]
    fn clamped_species_never_moves() {
        let (network, params) = toggle();
        let set = InterventionSet::from_pairs([("p", 10.0)]).unwrap();
        let transition = compose_reactions(&network, &params, &set).unwrap();
        let grid = TimeGrid::uniform(0.0, 20.0, 1.0).unwrap();
        let series =
            simulate(&mut DirectMethod::seeded(5), &transition, &initial(), &grid).unwrap();
        assert!(series.column("p").unwrap().iter().all(|p| *p == 10.0));
        // Both channels change p, so u is frozen as well.
        assert!(series.column("u").unwrap().iter().all(|u| *u == 50.0));
    }

    #[test]
    fn rejects_non_uniform_grid() {
        let (network, params) = toggle();
        let transition = compose_reactions(&network, &params, &InterventionSet::new()).unwrap();
        let grid = TimeGrid::new(vec![0.0, 1.0, 3.0]).unwrap();
        let err = simulate(&mut DirectMethod::seeded(1), &transition, &initial(), &grid)
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidGrid(_)));
    }

    #[test]
    fn rejects_fractional_copy_numbers() {
        let (network, params) = toggle();
        let transition = compose_reactions(&network, &params, &InterventionSet::new()).unwrap();
        let grid = TimeGrid::uniform(0.0, 1.0, 0.5).unwrap();
        let err = simulate(
            &mut DirectMethod::seeded(1),
            &transition,
            &initial().with("u", 2.5),
            &grid,
        )
        .unwrap_err();
        assert!(matches!(err, SimError::Definition(_)));
    }
}
