use log::info;
use rayon::prelude::*;

use crate::{
    compose::ReactionTransition,
    error::{Result, SimError},
    numerics::gillespie::DirectMethod,
    series::TimeSeries,
    state::State,
};

use super::{grid::TimeGrid, stochastic};

// Replicate `i` is seeded from `(seed, i)` alone.
pub fn replicates(
    transition: &ReactionTransition,
    initial: &State,
    grid: &TimeGrid,
    n: usize,
    seed: u64,
) -> Result<Vec<TimeSeries>> {
    if n == 0 {
        return Err(SimError::Definition(
            "an ensemble needs at least one replicate".into(),
        ));
    }
    info!("running {} stochastic replicate(s) from seed {}", n, seed);
    (0..n)
        .into_par_iter()
        .map(|i| {
            let mut engine = DirectMethod::seeded(derive_seed(seed, i as u64));
            stochastic::simulate(&mut engine, transition, initial, grid)
        })
        .collect()
}

pub fn mean_trajectory(
    transition: &ReactionTransition,
    initial: &State,
    grid: &TimeGrid,
    n: usize,
    seed: u64,
) -> Result<TimeSeries> {
    let runs = replicates(transition, initial, grid, n, seed)?;
    TimeSeries::mean(&runs)
        .ok_or_else(|| SimError::Consistency("replicates disagree on layout".into()))
}

// SplitMix64 over the base seed and replicate number.
fn derive_seed(seed: u64, replicate: u64) -> u64 {
    const GOLDEN_GAMMA: u64 = 0x9E3779B97F4A7C15;
    let mut z = (seed ^ replicate.wrapping_mul(GOLDEN_GAMMA)).wrapping_add(GOLDEN_GAMMA);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
