use nalgebra::DMatrix;

use crate::{
    error::{Result, SimError},
    registry::Registry,
    state::{Context, VariableIndex},
};

// A continuous model: one derivative per variable, variables laid out in
// registration order.
#[derive(Clone, Debug)]
pub struct OdeSystem {
    variables: VariableIndex,
    derivatives: Registry,
}

impl OdeSystem {
    pub fn new(derivatives: Registry) -> Result<Self> {
        if derivatives.is_empty() {
            return Err(SimError::Definition("ODE system has no variables".into()));
        }
        let variables = VariableIndex::new(derivatives.names().iter().cloned())?;
        Ok(OdeSystem {
            variables,
            derivatives,
        })
    }

    pub fn variables(&self) -> &VariableIndex {
        &self.variables
    }

    pub fn derivatives(&self) -> &Registry {
        &self.derivatives
    }
}

// One stoichiometry row per reaction, in propensity order.
#[derive(Clone, Debug)]
pub struct ReactionNetwork {
    species: VariableIndex,
    reactions: Vec<String>,
    pre: DMatrix<i64>,
    post: DMatrix<i64>,
    // Per reaction, the species whose count actually changes when it fires.
    net_changes: Vec<Vec<(usize, i64)>>,
    propensities: Registry,
}

impl ReactionNetwork {
    pub fn new(
        species: VariableIndex,
        reactions: Vec<String>,
        pre: DMatrix<i64>,
        post: DMatrix<i64>,
        propensities: Registry,
    ) -> Result<Self> {
        let shape = (reactions.len(), species.len());
        for (label, m) in [("reactant", &pre), ("product", &post)] {
            if m.shape() != shape {
                return Err(SimError::Consistency(format!(
                    "{label} matrix is {}x{}, expected {}x{} (reactions x species)",
                    m.nrows(),
                    m.ncols(),
                    shape.0,
                    shape.1
                )));
            }
            if m.iter().any(|&c| c < 0) {
                return Err(SimError::Definition(format!(
                    "{label} matrix has a negative coefficient"
                )));
            }
        }
        if propensities.len() != reactions.len() {
            return Err(SimError::Consistency(format!(
                "{} propensities for {} stoichiometry rows",
                propensities.len(),
                reactions.len()
            )));
        }
        if let Some((row, (label, name))) = reactions
            .iter()
            .zip(propensities.names())
            .enumerate()
            .find(|(_, (label, name))| label != name)
        {
            return Err(SimError::Consistency(format!(
                "stoichiometry row {row} is `{label}` but propensity {row} is `{name}`"
            )));
        }

        let net = &post - &pre;
        let net_changes = (0..reactions.len())
            .map(|r| {
                (0..species.len())
                    .filter_map(|s| {
                        let change = net[(r, s)];
                        (change != 0).then_some((s, change))
                    })
                    .collect()
            })
            .collect();

        Ok(ReactionNetwork {
            species,
            reactions,
            pre,
            post,
            net_changes,
            propensities,
        })
    }

    pub fn builder(species: VariableIndex) -> NetworkBuilder {
        NetworkBuilder {
            species,
            reactions: Vec::new(),
            pre: Vec::new(),
            post: Vec::new(),
            propensities: Registry::new(),
        }
    }

    pub fn species(&self) -> &VariableIndex {
        &self.species
    }

    pub fn reactions(&self) -> &[String] {
        &self.reactions
    }

    pub fn pre(&self) -> &DMatrix<i64> {
        &self.pre
    }

    pub fn post(&self) -> &DMatrix<i64> {
        &self.post
    }

    pub fn propensities(&self) -> &Registry {
        &self.propensities
    }

    pub fn net_change(&self, reaction: usize) -> &[(usize, i64)] {
        &self.net_changes[reaction]
    }

    pub fn changes_species(&self, reaction: usize, species: usize) -> bool {
        self.net_changes[reaction].iter().any(|(s, _)| *s == species)
    }
}

pub struct NetworkBuilder {
    species: VariableIndex,
    reactions: Vec<String>,
    pre: Vec<i64>,
    post: Vec<i64>,
    propensities: Registry,
}

impl NetworkBuilder {
    pub fn reaction<F>(
        mut self,
        name: &str,
        reactants: &[(&str, u32)],
        products: &[(&str, u32)],
        propensity: F,
    ) -> Result<Self>
    where
        F: Fn(&Context) -> Result<f64> + Send + Sync + 'static,
    {
        self.propensities.register(name, propensity)?;
        let pre = self.row(name, reactants)?;
        let post = self.row(name, products)?;
        self.pre.extend(pre);
        self.post.extend(post);
        self.reactions.push(name.to_string());
        Ok(self)
    }

    fn row(&self, reaction: &str, terms: &[(&str, u32)]) -> Result<Vec<i64>> {
        let mut row = vec![0; self.species.len()];
        for (species, count) in terms {
            let s = self.species.position(species).ok_or_else(|| {
                SimError::Definition(format!(
                    "reaction `{reaction}` names undeclared species `{species}`"
                ))
            })?;
            row[s] += i64::from(*count);
        }
        Ok(row)
    }

    pub fn build(self) -> Result<ReactionNetwork> {
        let n = self.reactions.len();
        let m = self.species.len();
        ReactionNetwork::new(
            self.species,
            self.reactions,
            DMatrix::from_row_slice(n, m, &self.pre),
            DMatrix::from_row_slice(n, m, &self.post),
            self.propensities,
        )
    }
}
