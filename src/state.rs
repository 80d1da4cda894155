use std::collections::{BTreeMap, HashMap};

use log::debug;

use crate::{
    error::{Result, SimError},
    intervention::InterventionSet,
};

// Fixed ordering of named variables. Positional vectors handed to integrators
// and stochastic engines are always laid out in this order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableIndex {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl VariableIndex {
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = VariableIndex {
            names: Vec::new(),
            positions: HashMap::new(),
        };
        for name in names {
            let name = name.into();
            if name.is_empty() {
                return Err(SimError::Definition("empty variable name".into()));
            }
            if index.positions.contains_key(&name) {
                return Err(SimError::Definition(format!(
                    "variable `{name}` declared twice"
                )));
            }
            index.positions.insert(name.clone(), index.names.len());
            index.names.push(name);
        }
        Ok(index)
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

    pub fn name(&self, i: usize) -> &str {
        &self.names[i]
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct State(BTreeMap<String, f64>);

impl State {
    pub fn new() -> Self {
        State(BTreeMap::new())
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    // Lay the state out positionally. Every indexed variable needs an entry and
    // no entry may name an undeclared variable.
    pub fn to_vector(&self, index: &VariableIndex) -> Result<Vec<f64>> {
        if let Some(stray) = self.0.keys().find(|k| !index.contains(k)) {
            return Err(SimError::Definition(format!(
                "state entry `{stray}` is not a declared variable"
            )));
        }
        index
            .names()
            .iter()
            .map(|name| {
                self.get(name).ok_or_else(|| {
                    SimError::Definition(format!("state has no entry for variable `{name}`"))
                })
            })
            .collect()
    }

    pub fn from_vector(index: &VariableIndex, values: &[f64]) -> Self {
        debug_assert_eq!(index.len(), values.len());
        State(
            index
                .names()
                .iter()
                .cloned()
                .zip(values.iter().copied())
                .collect(),
        )
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for State {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        State(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

// Values are positive and finite.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct ParameterSet(BTreeMap<String, f64>);

impl ParameterSet {
    pub fn new<I, S>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut params = BTreeMap::new();
        for (name, value) in entries {
            let name = name.into();
            if !(value.is_finite() && value > 0.0) {
                return Err(SimError::Definition(format!(
                    "parameter `{name}` must be positive and finite, got {value}"
                )));
            }
            if params.insert(name.clone(), value).is_some() {
                return Err(SimError::Definition(format!(
                    "parameter `{name}` given twice"
                )));
            }
        }
        Ok(ParameterSet(params))
    }

    pub fn get(&self, name: &str) -> Result<f64> {
        self.0
            .get(name)
            .copied()
            .ok_or_else(|| SimError::Definition(format!("no parameter named `{name}`")))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl TryFrom<BTreeMap<String, f64>> for ParameterSet {
    type Error = SimError;

    fn try_from(map: BTreeMap<String, f64>) -> Result<Self> {
        ParameterSet::new(map)
    }
}

impl From<ParameterSet> for BTreeMap<String, f64> {
    fn from(params: ParameterSet) -> Self {
        params.0
    }
}

pub struct Context<'a> {
    index: &'a VariableIndex,
    values: &'a [f64],
    parameters: &'a ParameterSet,
    interventions: &'a InterventionSet,
}

impl<'a> Context<'a> {
    pub fn new(
        index: &'a VariableIndex,
        values: &'a [f64],
        parameters: &'a ParameterSet,
        interventions: &'a InterventionSet,
    ) -> Self {
        debug_assert_eq!(index.len(), values.len());
        Context {
            index,
            values,
            parameters,
            interventions,
        }
    }

    pub fn var(&self, name: &str) -> Result<f64> {
        match self.index.position(name) {
            Some(i) => Ok(self.values[i]),
            None => {
                debug!("rate function read undeclared variable {}", name);
                Err(SimError::Definition(format!(
                    "rate function reads undeclared variable `{name}`"
                )))
            }
        }
    }

    pub fn param(&self, name: &str) -> Result<f64> {
        self.parameters.get(name)
    }

    pub fn clamped(&self, name: &str) -> Option<f64> {
        self.interventions.get(name)
    }
}
