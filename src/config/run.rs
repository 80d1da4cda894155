use nalgebra::DVector;

use crate::{
    dynamics::grid::TimeGrid,
    error::Result,
    numerics::ode::{DormandPrince, OdeIntegrator, Rk4},
};

#[derive(serde::Serialize, serde::Deserialize, clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Deterministic,
    Stochastic,
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "type")]
pub enum IntegratorConfig {
    Rk4(Rk4),
    DormandPrince(DormandPrince),
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        IntegratorConfig::DormandPrince(DormandPrince::default())
    }
}

impl OdeIntegrator for IntegratorConfig {
    fn integrate<F>(&self, rhs: F, y0: DVector<f64>, grid: &[f64]) -> Result<Vec<DVector<f64>>>
    where
        F: FnMut(f64, &DVector<f64>, &mut DVector<f64>) -> Result<()>,
    {
        match self {
            IntegratorConfig::Rk4(rk4) => rk4.integrate(rhs, y0, grid),
            IntegratorConfig::DormandPrince(dp) => dp.integrate(rhs, y0, grid),
        }
    }
}

fn default_replicates() -> usize {
    1
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone, PartialEq)]
pub struct RunParams {
    pub regime: Regime,
    #[serde(default)]
    pub t_start: f64,
    pub t_end: f64,
    // Sampling interval of the reported series, not the integrator step.
    pub dt: f64,
    #[serde(default)]
    pub seed: u64,
    // Stochastic only; more than one reports the ensemble mean.
    #[serde(default = "default_replicates")]
    pub replicates: usize,
    #[serde(default)]
    pub integrator: IntegratorConfig,
}

impl RunParams {
    pub fn grid(&self) -> Result<TimeGrid> {
        TimeGrid::uniform(self.t_start, self.t_end, self.dt)
    }
}
