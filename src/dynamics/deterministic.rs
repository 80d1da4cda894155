use log::info;
use nalgebra::DVector;

use crate::{
    compose::{OdeTransition, Transition},
    error::Result,
    numerics::ode::OdeIntegrator,
    series::TimeSeries,
    state::State,
};

use super::grid::TimeGrid;

pub fn simulate<I: OdeIntegrator>(
    integrator: &I,
    transition: &OdeTransition,
    initial: &State,
    grid: &TimeGrid,
) -> Result<TimeSeries> {
    let variables = transition.variables();
    let mut y0 = initial.to_vector(variables)?;
    // An intervened variable starts at its clamped value; anything else would
    // contradict its zero derivative from the first step.
    transition.clamp(&mut y0);

    info!(
        "deterministic run over [{}, {}] with {} sample(s), {} intervention(s)",
        grid.start(),
        grid.end(),
        grid.len(),
        transition.interventions().len()
    );
    let trajectory = integrator.integrate(
        |_t, y: &DVector<f64>, dy: &mut DVector<f64>| {
            transition.derivatives(y.as_slice(), dy.as_mut_slice())
        },
        DVector::from_vec(y0),
        grid.points(),
    )?;

    Ok(TimeSeries::new(
        variables.names().to_vec(),
        grid.points().to_vec(),
        trajectory.into_iter().map(|y| y.as_slice().to_vec()).collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compose::compose,
        error::SimError,
        intervention::InterventionSet,
        network::OdeSystem,
        numerics::ode::{DormandPrince, Rk4},
        registry::Registry,
        state::ParameterSet,
    };
    use approx::assert_relative_eq;

    // Production of y driven by x, with first-order decay of y.
    fn driven_decay() -> (OdeSystem, ParameterSet) {
        let mut registry = Registry::new();
        registry.register("x", |_| Ok(0.0)).unwrap();
        registry
            .register("y", |ctx| {
                Ok(ctx.param("k_in")? * ctx.var("x")? - ctx.param("k_out")? * ctx.var("y")?)
            })
            .unwrap();
        (
            OdeSystem::new(registry).unwrap(),
            ParameterSet::new([("k_in", 2.0), ("k_out", 0.5)]).unwrap(),
        )
    }

    #[test]
    fn names_map_to_columns_and_first_sample_is_start() {
        let (system, params) = driven_decay();
        let transition = compose(&system, &params, &InterventionSet::new()).unwrap();
        let initial = State::new().with("y", 0.0).with("x", 1.0);
        let grid = TimeGrid::uniform(0.0, 40.0, 1.0).unwrap();
        let series = simulate(&Rk4::default(), &transition, &initial, &grid).unwrap();

        assert_eq!(series.variables(), &["x".to_string(), "y".to_string()]);
        assert_eq!(series.times()[0], 0.0);
        assert_eq!(series.len(), 41);
        // y* = k_in x / k_out
        assert_relative_eq!(series.terminal().get("y").unwrap(), 4.0, max_relative = 1e-6);
    }

    #[test]
    fn clamped_variable_holds_at_every_sample() {
        let (system, params) = driven_decay();
        let set = InterventionSet::from_pairs([("y", 1.5)]).unwrap();
        let transition = compose(&system, &params, &set).unwrap();
        let initial = State::new().with("x", 1.0).with("y", 0.0);
        let grid = TimeGrid::new(vec![0.0, 0.1, 2.0, 7.5]).unwrap();
        for series in [
            simulate(&Rk4::default(), &transition, &initial, &grid).unwrap(),
            simulate(&DormandPrince::default(), &transition, &initial, &grid).unwrap(),
        ] {
            assert!(series.column("y").unwrap().iter().all(|y| *y == 1.5));
        }
    }

    #[test]
    fn missing_initial_entry_is_rejected() {
        let (system, params) = driven_decay();
        let transition = compose(&system, &params, &InterventionSet::new()).unwrap();
        let grid = TimeGrid::uniform(0.0, 1.0, 0.5).unwrap();
        let err = simulate(&Rk4::default(), &transition, &State::new().with("x", 1.0), &grid)
            .unwrap_err();
        assert!(matches!(err, SimError::Definition(_)));
    }

    #[test]
    fn divergence_surfaces_as_instability() {
        let mut registry = Registry::new();
        registry
            .register("x", |ctx| Ok(ctx.param("k")? * ctx.var("x")?.powi(2)))
            .unwrap();
        let system = OdeSystem::new(registry).unwrap();
        let params = ParameterSet::new([("k", 1.0)]).unwrap();
        let transition = compose(&system, &params, &InterventionSet::new()).unwrap();
        let grid = TimeGrid::uniform(0.0, 5.0, 1.0).unwrap();
        let err = simulate(
            &Rk4::default(),
            &transition,
            &State::new().with("x", 1.0),
            &grid,
        )
        .unwrap_err();
        assert!(matches!(err, SimError::NumericalInstability { .. }));
    }
}
