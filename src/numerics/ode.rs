use std::cell::RefCell;

use log::debug;
use nalgebra::DVector;
use ode_solvers::{dopri5::Dopri5, System};

use crate::error::{Result, SimError};

// Deterministic integration of dy/dt = rhs(t, y). One state per grid point,
// the first being y0 itself; no partial trajectory on failure.
pub trait OdeIntegrator {
    fn integrate<F>(&self, rhs: F, y0: DVector<f64>, grid: &[f64]) -> Result<Vec<DVector<f64>>>
    where
        F: FnMut(f64, &DVector<f64>, &mut DVector<f64>) -> Result<()>;
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct Rk4 {
    // Upper bound on the internal step; each grid interval is split evenly.
    pub max_step: f64,
}

impl Default for Rk4 {
    fn default() -> Self {
        Rk4 { max_step: 0.01 }
    }
}

impl OdeIntegrator for Rk4 {
    fn integrate<F>(&self, mut rhs: F, y0: DVector<f64>, grid: &[f64]) -> Result<Vec<DVector<f64>>>
    where
        F: FnMut(f64, &DVector<f64>, &mut DVector<f64>) -> Result<()>,
    {
        if !(self.max_step.is_finite() && self.max_step > 0.0) {
            return Err(SimError::Definition(format!(
                "RK4 max_step must be positive, got {}",
                self.max_step
            )));
        }
        check_grid(grid)?;
        let n = y0.len();
        let mut k1 = DVector::zeros(n);
        let mut k2 = DVector::zeros(n);
        let mut k3 = DVector::zeros(n);
        let mut k4 = DVector::zeros(n);

        let mut y = y0;
        check_finite(grid[0], &y)?;
        let mut out = Vec::with_capacity(grid.len());
        out.push(y.clone());

        for window in grid.windows(2) {
            let (t0, t1) = (window[0], window[1]);
            let substeps = ((t1 - t0) / self.max_step).ceil().max(1.0) as usize;
            let h = (t1 - t0) / substeps as f64;
            for i in 0..substeps {
                let t = t0 + i as f64 * h;
                rhs(t, &y, &mut k1)?;
                rhs(t + 0.5 * h, &(&y + &k1 * (0.5 * h)), &mut k2)?;
                rhs(t + 0.5 * h, &(&y + &k2 * (0.5 * h)), &mut k3)?;
                rhs(t + h, &(&y + &k3 * h), &mut k4)?;
                y += (&k1 + &k2 * 2.0 + &k3 * 2.0 + &k4) * (h / 6.0);
                check_finite(t + h, &y)?;
            }
            out.push(y.clone());
        }
        Ok(out)
    }
}

// Adaptive Dormand-Prince 5(4) from `ode_solvers`, restarted on every grid
// interval so each sample is the dense output at its end point.
#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct DormandPrince {
    pub rtol: f64,
    pub atol: f64,
}

impl Default for DormandPrince {
    fn default() -> Self {
        DormandPrince {
            rtol: 1e-8,
            atol: 1e-10,
        }
    }
}

type SolverVector = ode_solvers::DVector<f64>;

// `System::system` cannot fail, so the first rhs error is parked here and
// reported once the stepper returns.
struct Rhs<'a, F> {
    rhs: &'a RefCell<F>,
    failure: &'a RefCell<Option<SimError>>,
}

impl<F> System<f64, SolverVector> for Rhs<'_, F>
where
    F: FnMut(f64, &DVector<f64>, &mut DVector<f64>) -> Result<()>,
{
    fn system(&self, t: f64, y: &SolverVector, dy: &mut SolverVector) {
        dy.fill(0.0);
        if self.failure.borrow().is_some() {
            return;
        }
        let y = DVector::from_column_slice(y.as_slice());
        let mut out = DVector::zeros(y.len());
        match (self.rhs.borrow_mut())(t, &y, &mut out) {
            Ok(()) => dy.as_mut_slice().copy_from_slice(out.as_slice()),
            Err(e) => *self.failure.borrow_mut() = Some(e),
        }
    }
}

impl OdeIntegrator for DormandPrince {
    fn integrate<F>(&self, rhs: F, y0: DVector<f64>, grid: &[f64]) -> Result<Vec<DVector<f64>>>
    where
        F: FnMut(f64, &DVector<f64>, &mut DVector<f64>) -> Result<()>,
    {
        for (name, value) in [("rtol", self.rtol), ("atol", self.atol)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::Definition(format!(
                    "Dormand-Prince {name} must be positive, got {value}"
                )));
            }
        }
        check_grid(grid)?;
        let rhs = RefCell::new(rhs);
        let failure = RefCell::new(None);

        let mut y = y0;
        check_finite(grid[0], &y)?;
        let mut out = Vec::with_capacity(grid.len());
        out.push(y.clone());

        for window in grid.windows(2) {
            let (t0, t1) = (window[0], window[1]);
            let system = Rhs {
                rhs: &rhs,
                failure: &failure,
            };
            let start = SolverVector::from_column_slice(y.as_slice());
            let mut stepper = Dopri5::new(system, t0, t1, t1 - t0, start, self.rtol, self.atol);
            let outcome = stepper.integrate();
            if let Some(e) = failure.borrow_mut().take() {
                return Err(e);
            }
            let stats = outcome.map_err(|e| SimError::NumericalInstability {
                t: t0,
                reason: e.to_string(),
            })?;
            debug!(
                "[{}, {}]: {} accepted, {} rejected step(s)",
                t0, t1, stats.accepted_steps, stats.rejected_steps
            );
            let reached = stepper
                .x_out()
                .last()
                .map_or(false, |t| (t - t1).abs() <= 1e-9 * t1.abs().max(1.0));
            let end = match stepper.y_out().last() {
                Some(end) if reached && stepper.y_out().len() > 1 => end,
                _ => {
                    return Err(SimError::NumericalInstability {
                        t: t0,
                        reason: format!("solver stopped short of t={t1}"),
                    })
                }
            };
            y = DVector::from_column_slice(end.as_slice());
            check_finite(t1, &y)?;
            out.push(y.clone());
        }
        Ok(out)
    }
}

fn check_grid(grid: &[f64]) -> Result<()> {
    if grid.len() < 2 {
        return Err(SimError::InvalidGrid(format!(
            "need at least 2 time points, got {}",
            grid.len()
        )));
    }
    Ok(())
}

fn check_finite(t: f64, y: &DVector<f64>) -> Result<()> {
    match y.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(SimError::NumericalInstability {
            t,
            reason: format!("state component {i} is {}", y[i]),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn decay(_t: f64, y: &DVector<f64>, dy: &mut DVector<f64>) -> Result<()> {
        dy[0] = -y[0];
        dy[1] = 0.0;
        Ok(())
    }

    #[test]
    fn rk4_matches_exponential_decay() {
        let grid = [0.0, 0.5, 1.0, 2.0];
        let out = Rk4 { max_step: 0.01 }
            .integrate(decay, DVector::from_vec(vec![1.0, 3.0]), &grid)
            .unwrap();
        assert_eq!(out.len(), grid.len());
        for (t, y) in grid.iter().zip(&out) {
            assert_relative_eq!(y[0], (-t).exp(), max_relative = 1e-8);
            assert_eq!(y[1], 3.0);
        }
    }

    #[test]
    fn dormand_prince_matches_exponential_decay() {
        let grid = [0.0, 0.3, 1.7, 5.0];
        let out = DormandPrince::default()
            .integrate(decay, DVector::from_vec(vec![2.0, 3.0]), &grid)
            .unwrap();
        assert_eq!(out.len(), grid.len());
        for (t, y) in grid.iter().zip(&out) {
            assert_relative_eq!(y[0], 2.0 * (-t).exp(), max_relative = 1e-6);
            // A zero derivative leaves the component bit-for-bit unchanged.
            assert_eq!(y[1], 3.0);
        }
    }

    #[test]
    fn blow_up_is_reported() {
        // dy/dt = y^2 from y=1 diverges at t=1.
        let blow_up = |_t: f64, y: &DVector<f64>, dy: &mut DVector<f64>| {
            dy[0] = y[0] * y[0];
            Ok(())
        };
        let err = Rk4 { max_step: 0.01 }
            .integrate(blow_up, DVector::from_vec(vec![1.0]), &[0.0, 2.0])
            .unwrap_err();
        assert!(matches!(err, SimError::NumericalInstability { .. }));

        let err = DormandPrince::default()
            .integrate(blow_up, DVector::from_vec(vec![1.0]), &[0.0, 2.0])
            .unwrap_err();
        assert!(matches!(err, SimError::NumericalInstability { .. }));
    }

    #[test]
    fn rhs_errors_propagate() {
        let failing = |_t: f64, _y: &DVector<f64>, _dy: &mut DVector<f64>| {
            Err(SimError::Definition("boom".into()))
        };
        let y0 = DVector::from_vec(vec![1.0]);
        let err = Rk4::default()
            .integrate(failing, y0.clone(), &[0.0, 1.0])
            .unwrap_err();
        assert_eq!(err, SimError::Definition("boom".into()));
        let err = DormandPrince::default()
            .integrate(failing, y0, &[0.0, 1.0])
            .unwrap_err();
        assert_eq!(err, SimError::Definition("boom".into()));
    }

    #[test]
    fn bad_tolerances_are_rejected_before_stepping() {
        let y0 = DVector::from_vec(vec![1.0, 0.0]);
        for settings in [
            DormandPrince { rtol: 0.0, ..DormandPrince::default() },
            DormandPrince { atol: -1e-6, ..DormandPrince::default() },
            DormandPrince { rtol: f64::NAN, ..DormandPrince::default() },
        ] {
            let mut calls = 0;
            let err = settings
                .integrate(
                    |t, y, dy| {
                        calls += 1;
                        decay(t, y, dy)
                    },
                    y0.clone(),
                    &[0.0, 1.0],
                )
                .unwrap_err();
            assert!(matches!(err, SimError::Definition(_)));
            assert_eq!(calls, 0);
        }
    }

    #[test]
    fn short_grids_are_rejected() {
        let y0 = DVector::from_vec(vec![1.0, 0.0]);
        for grid in [&[][..], &[0.0][..]] {
            assert!(matches!(
                Rk4::default().integrate(decay, y0.clone(), grid),
                Err(SimError::InvalidGrid(_))
            ));
            assert!(matches!(
                DormandPrince::default().integrate(decay, y0.clone(), grid),
                Err(SimError::InvalidGrid(_))
            ));
        }
    }
}
