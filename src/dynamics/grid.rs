use crate::error::{Result, SimError};

// Relative tolerance when deciding whether a grid is uniform.
const UNIFORM_RTOL: f64 = 1e-9;

#[derive(Clone, Debug, PartialEq)]
pub struct TimeGrid {
    points: Vec<f64>,
}

impl TimeGrid {
    pub fn new(points: Vec<f64>) -> Result<Self> {
        if points.len() < 2 {
            return Err(SimError::InvalidGrid(format!(
                "need at least 2 time points, got {}",
                points.len()
            )));
        }
        if let Some(t) = points.iter().find(|t| !t.is_finite()) {
            return Err(SimError::InvalidGrid(format!("non-finite time point {t}")));
        }
        if let Some(w) = points.windows(2).find(|w| w[1] <= w[0]) {
            return Err(SimError::InvalidGrid(format!(
                "time points must strictly increase, found {} then {}",
                w[0], w[1]
            )));
        }
        Ok(TimeGrid { points })
    }

    pub fn uniform(t_start: f64, t_end: f64, step: f64) -> Result<Self> {
        if !(step.is_finite() && step > 0.0) {
            return Err(SimError::InvalidGrid(format!(
                "step must be positive, got {step}"
            )));
        }
        let span = t_end - t_start;
        let n = (span / step).round();
        if n < 1.0 || (n * step - span).abs() > UNIFORM_RTOL * span.abs().max(step) {
            return Err(SimError::InvalidGrid(format!(
                "span [{t_start}, {t_end}] is not a whole number of steps of {step}"
            )));
        }
        let n = n as usize;
        let points = (0..=n)
            .map(|k| if k == n { t_end } else { t_start + k as f64 * step })
            .collect();
        TimeGrid::new(points)
    }

    pub fn points(&self) -> &[f64] {
        &self.points
    }

    pub fn start(&self) -> f64 {
        self.points[0]
    }

    pub fn end(&self) -> f64 {
        self.points[self.points.len() - 1]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn uniform_step(&self) -> Option<f64> {
        let step = (self.end() - self.start()) / (self.len() - 1) as f64;
        self.points
            .windows(2)
            .all(|w| ((w[1] - w[0]) - step).abs() <= UNIFORM_RTOL * step.max(1.0))
            .then_some(step)
    }
}
