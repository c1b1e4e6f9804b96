use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;

use crate::function::DiscreteFunction;
use crate::{FactorId, ValIndex, VarId};

/// An incident (factor, variable) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
    pub factor: FactorId,
    pub var: VarId,
}

impl Edge {
    pub fn new(factor: FactorId, var: VarId) -> Self {
        Self { factor, var }
    }
}

/// Factors indexed by id, and the variable → factors adjacency derived from
/// their domains.
/// Only the factors are serialized, the adjacency is rebuilt on the way in.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(from = "GraphParts")]
pub struct FactorGraph {
    factors: IndexMap<FactorId, DiscreteFunction>,
    // always equal to the union of the factor domains
    #[serde(skip)]
    vars: BTreeMap<VarId, BTreeSet<FactorId>>,
}

#[derive(serde::Deserialize)]
struct GraphParts {
    factors: IndexMap<FactorId, DiscreteFunction>,
}

impl From<GraphParts> for FactorGraph {
    fn from(parts: GraphParts) -> Self {
        let mut graph = FactorGraph::new();
        for (id, fun) in parts.factors {
            graph.set_factor(id, fun);
        }
        graph
    }
}

impl FactorGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a factor, returning the previous one.
    pub fn set_factor(&mut self, id: FactorId, fun: DiscreteFunction) -> Option<DiscreteFunction> {
        for var in fun.vars() {
            self.vars.entry(*var).or_default().insert(id);
        }
        let old = self.factors.insert(id, fun);
        if let Some(old) = &old {
            let new_vars = self.factors[&id].domain().clone();
            for var in old.vars().iter().filter(|v| !new_vars.contains(**v)) {
                self.unlink(id, *var);
            }
        }
        old
    }

    pub fn remove_factor(&mut self, id: FactorId) -> Option<DiscreteFunction> {
        let old = self.factors.shift_remove(&id)?;
        for var in old.vars() {
            self.unlink(id, *var);
        }
        Some(old)
    }

    fn unlink(&mut self, id: FactorId, var: VarId) {
        if let Some(factors) = self.vars.get_mut(&var) {
            factors.remove(&id);
            if factors.is_empty() {
                self.vars.remove(&var);
            }
        }
    }

    pub fn clear(&mut self) {
        self.factors.clear();
        self.vars.clear();
    }

    pub fn num_factors(&self) -> usize {
        self.factors.len()
    }
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }
    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    pub fn factor(&self, id: FactorId) -> Option<&DiscreteFunction> {
        self.factors.get(&id)
    }

    /// Factors, in insertion order.
    pub fn factors(&self) -> impl Iterator<Item = (FactorId, &DiscreteFunction)> {
        self.factors.iter().map(|(id, f)| (*id, f))
    }

    /// Variables of the graph, in increasing order.
    pub fn vars(&self) -> impl Iterator<Item = VarId> + '_ {
        self.vars.keys().copied()
    }

    pub fn contains_var(&self, var: VarId) -> bool {
        self.vars.contains_key(&var)
    }

    /// Factors depending on `var`, in increasing order.
    pub fn factors_of(&self, var: VarId) -> impl Iterator<Item = FactorId> + '_ {
        self.vars.get(&var).into_iter().flatten().copied()
    }

    pub fn scope_of(&self, factor: FactorId) -> Option<&[VarId]> {
        self.factors.get(&factor).map(|f| f.vars())
    }

    /// Domain size of `var`, as seen by the factors depending on it.
    pub fn var_size(&self, var: VarId) -> Option<ValIndex> {
        let factor = self.factors_of(var).next()?;
        self.factors[&factor].domain().size_of(var)
    }

    pub fn edges(&self) -> Vec<Edge> {
        self.factors
            .iter()
            .flat_map(|(id, f)| f.vars().iter().map(move |v| Edge::new(*id, *v)))
            .collect()
    }

    /// True if the bipartite variable/factor graph contains a cycle.
    pub fn is_cyclic(&self) -> bool {
        let var_nodes: BTreeMap<VarId, usize> = self
            .vars
            .keys()
            .enumerate()
            .map(|(k, v)| (*v, self.factors.len() + k))
            .collect();
        let mut parents: Vec<usize> = (0..self.factors.len() + var_nodes.len()).collect();
        fn root(parents: &mut [usize], mut x: usize) -> usize {
            while parents[x] != x {
                parents[x] = parents[parents[x]];
                x = parents[x];
            }
            x
        }
        for (factor_node, f) in self.factors.values().enumerate() {
            for var in f.vars() {
                let a = root(&mut parents, factor_node);
                let b = root(&mut parents, var_nodes[var]);
                if a == b {
                    return true;
                }
                parents[a] = b;
            }
        }
        false
    }
}
