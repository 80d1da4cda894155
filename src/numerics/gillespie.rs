use log::debug;
use nalgebra::DMatrix;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use rand_pcg::Pcg64Mcg;

use crate::error::{Result, SimError};

pub struct StochasticProblem<'a> {
    // Column labels, used to name the species in errors.
    pub species: &'a [String],
    pub pre: &'a DMatrix<i64>,
    pub post: &'a DMatrix<i64>,
    pub initial: &'a [i64],
    pub t_start: f64,
    pub t_end: f64,
    pub step: f64,
}

impl StochasticProblem<'_> {
    pub fn n_samples(&self) -> usize {
        ((self.t_end - self.t_start) / self.step).round() as usize + 1
    }

    // The last sample is pinned to `t_end` so rounding never drifts past it.
    pub fn sample_time(&self, k: usize) -> f64 {
        if k + 1 == self.n_samples() {
            self.t_end
        } else {
            self.t_start + k as f64 * self.step
        }
    }
}

pub trait StochasticEngine {
    fn simulate<F>(
        &mut self,
        problem: &StochasticProblem,
        propensities: F,
    ) -> Result<Vec<(f64, Vec<i64>)>>
    where
        F: FnMut(&[i64], &mut [f64]) -> Result<()>;
}

/// Gillespie's direct method.
pub struct DirectMethod {
    rng: Pcg64Mcg,
}

impl DirectMethod {
    pub fn new(rng: Pcg64Mcg) -> Self {
        DirectMethod { rng }
    }

    pub fn seeded(seed: u64) -> Self {
        DirectMethod::new(Pcg64Mcg::seed_from_u64(seed))
    }

    fn select(&mut self, propensities: &[f64], total: f64) -> usize {
        let target = self.rng.gen::<f64>() * total;
        let mut acc = 0.0;
        let mut last_active = 0;
        for (r, a) in propensities.iter().enumerate() {
            if *a <= 0.0 {
                continue;
            }
            acc += a;
            last_active = r;
            if target < acc {
                return r;
            }
        }
        last_active
    }
}

impl StochasticEngine for DirectMethod {
    fn simulate<F>(
        &mut self,
        problem: &StochasticProblem,
        mut propensities: F,
    ) -> Result<Vec<(f64, Vec<i64>)>>
    where
        F: FnMut(&[i64], &mut [f64]) -> Result<()>,
    {
        let n_reactions = problem.pre.nrows();
        let net = problem.post - problem.pre;
        let changes: Vec<Vec<(usize, i64)>> = (0..n_reactions)
            .map(|r| {
                (0..net.ncols())
                    .filter(|&s| net[(r, s)] != 0)
                    .map(|s| (s, net[(r, s)]))
                    .collect()
            })
            .collect();

        let n_samples = problem.n_samples();
        let mut samples = Vec::with_capacity(n_samples);
        let mut state = problem.initial.to_vec();
        let mut a = vec![0.0; n_reactions];
        let mut t = problem.t_start;
        let mut events = 0usize;

        loop {
            propensities(&state, &mut a)?;
            let total: f64 = a.iter().sum();
            if !total.is_finite() {
                return Err(SimError::NumericalInstability {
                    t,
                    reason: format!("total propensity is {total}"),
                });
            }
            let t_event = if total > 0.0 {
                let waiting = Exp::new(total).map_err(|e| SimError::NumericalInstability {
                    t,
                    reason: e.to_string(),
                })?;
                t + waiting.sample(&mut self.rng)
            } else {
                f64::INFINITY
            };

            // Record every grid point passed before the next event fires.
            while samples.len() < n_samples && problem.sample_time(samples.len()) < t_event {
                samples.push((problem.sample_time(samples.len()), state.clone()));
            }
            if samples.len() == n_samples {
                break;
            }

            let r = self.select(&a, total);
            for &(s, change) in &changes[r] {
                state[s] += change;
                if state[s] < 0 {
                    return Err(SimError::NegativeState {
                        species: problem.species[s].clone(),
                        t: t_event,
                        value: state[s],
                    });
                }
            }
            t = t_event;
            events += 1;
        }
        debug!("direct method fired {} events over {} samples", events, n_samples);
        Ok(samples)
    }
}
