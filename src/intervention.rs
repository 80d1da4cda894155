use std::collections::BTreeMap;

use crate::{
    error::{Result, SimError},
    state::VariableIndex,
};

// Each variable is held for the whole run, not merely initialised.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct InterventionSet(BTreeMap<String, f64>);

impl InterventionSet {
    pub fn new() -> Self {
        InterventionSet(BTreeMap::new())
    }

    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        pairs
            .into_iter()
            .try_fold(InterventionSet::new(), |set, (name, value)| {
                set.with(name, value)
            })
    }

    // Returns a new set with one more target. Clamping the same target twice is
    // only allowed with an identical value.
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Result<Self> {
        let name = name.into();
        if !(value.is_finite() && value >= 0.0) {
            return Err(SimError::Definition(format!(
                "intervention on `{name}` must be non-negative and finite, got {value}"
            )));
        }
        match self.0.get(&name) {
            Some(existing) if *existing != value => Err(SimError::Definition(format!(
                "conflicting interventions on `{name}`: {existing} and {value}"
            ))),
            _ => {
                self.0.insert(name, value);
                Ok(self)
            }
        }
    }

    pub fn union(&self, other: &InterventionSet) -> Result<InterventionSet> {
        other
            .iter()
            .try_fold(self.clone(), |set, (name, value)| set.with(name, value))
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn resolve(&self, index: &VariableIndex) -> Result<Clamps> {
        let mut entries = self
            .iter()
            .map(|(name, value)| {
                index
                    .position(name)
                    .map(|i| (i, value))
                    .ok_or_else(|| SimError::UnknownTarget(name.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        entries.sort_by_key(|(i, _)| *i);
        let mut mask = vec![false; index.len()];
        for (i, _) in &entries {
            mask[*i] = true;
        }
        Ok(Clamps { entries, mask })
    }
}

impl TryFrom<BTreeMap<String, f64>> for InterventionSet {
    type Error = SimError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self> {
        InterventionSet::from_pairs(map)
    }
}

impl From<InterventionSet> for BTreeMap<String, f64> {
    fn from(set: InterventionSet) -> Self {
        set.0
    }
}

// An intervention set resolved against one variable layout.
#[derive(Clone, Debug, PartialEq)]
pub struct Clamps {
    entries: Vec<(usize, f64)>,
    mask: Vec<bool>,
}

impl Clamps {
    pub fn apply(&self, values: &mut [f64]) {
        for &(i, value) in &self.entries {
            values[i] = value;
        }
    }

    pub fn zero(&self, rates: &mut [f64]) {
        for &(i, _) in &self.entries {
            rates[i] = 0.0;
        }
    }

    pub fn is_clamped(&self, i: usize) -> bool {
        self.mask[i]
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
