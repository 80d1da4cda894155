use std::{collections::HashMap, fmt, sync::Arc};

use crate::{
    error::{Result, SimError},
    state::Context,
};

// Pure: no interior mutability, so one registry can back many concurrent runs.
pub type RateFn = Arc<dyn Fn(&Context) -> Result<f64> + Send + Sync>;

// Derivatives of a continuous model, or propensities of a reaction network.
#[derive(Clone, Default)]
pub struct Registry {
    names: Vec<String>,
    rates: Vec<RateFn>,
    positions: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, rate: F) -> Result<()>
    where
        F: Fn(&Context) -> Result<f64> + Send + Sync + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(SimError::Definition("empty registry entry name".into()));
        }
        if self.positions.contains_key(&name) {
            return Err(SimError::Definition(format!(
                "registry entry `{name}` registered twice"
            )));
        }
        self.positions.insert(name.clone(), self.names.len());
        self.names.push(name);
        self.rates.push(Arc::new(rate));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    // Writes one rate per entry, in registration order.
    pub fn evaluate(&self, ctx: &Context, out: &mut [f64]) -> Result<()> {
        if out.len() != self.len() {
            return Err(SimError::Consistency(format!(
                "output buffer has {} slots for {} registry entries",
                out.len(),
                self.len()
            )));
        }
        for (slot, rate) in out.iter_mut().zip(&self.rates) {
            *slot = rate(ctx)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("names", &self.names)
            .finish()
    }
}
