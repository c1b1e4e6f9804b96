use std::collections::BTreeMap;
use std::sync::Arc;

use rayon::prelude::*;

use super::factor_graph::{Edge, FactorGraph};
use crate::domain::{check_sorted, Domain};
use crate::function::marginal::max_marginal;
use crate::function::DiscreteFunction;
use crate::registry::VarRegistry;
use crate::{Config, FactorId, MaxSumError, Result, ValIndex, ValType, VarId};

type Messages = BTreeMap<Edge, DiscreteFunction>;

/// Outcome of the last call to [`MaxSumController::optimise`].
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RunStats {
    /// Number of sweeps performed.
    pub iterations: usize,
    /// False if the sweep budget ran out first.
    pub converged: bool,
    /// Largest belief change (maxnorm) during the last sweep.
    pub max_delta: ValType,
}

/// Max-sum message passing over a factor graph.
///
/// Every sweep first recomputes all variable → factor messages
///
/// `q_{i→j}(x) = Σ_{k≠j} r_{k→i}(x) - mean`
///
/// from the previous factor → variable messages, then all factor → variable
/// messages
///
/// `r_{j→i}(x) = max_{scope(j) \ i} [F_j + Σ_{k≠i} q_{k→j}]`
///
/// from the new `q`. Variable beliefs are `z_i = Σ_k r_{k→i}`, and sweeps stop
/// once no belief moves by more than the tolerance. Results are exact on
/// acyclic graphs only.
///
/// Messages survive changes to the factor set, except those on the edges of a
/// replaced or removed factor.
#[derive(Debug, Clone)]
pub struct MaxSumController {
    registry: Arc<VarRegistry>,
    config: Config,
    graph: FactorGraph,
    to_var: Messages,
    to_factor: Messages,
    beliefs: BTreeMap<VarId, DiscreteFunction>,
    last_run: Option<RunStats>,
}

impl MaxSumController {
    pub fn new(registry: Arc<VarRegistry>, config: Config) -> Self {
        Self {
            registry,
            config,
            graph: FactorGraph::new(),
            to_var: Messages::new(),
            to_factor: Messages::new(),
            beliefs: BTreeMap::new(),
            last_run: None,
        }
    }

    pub fn with_default_config(registry: Arc<VarRegistry>) -> Self {
        Self::new(registry, Config::default())
    }

    pub fn registry(&self) -> &Arc<VarRegistry> {
        &self.registry
    }
    pub fn config(&self) -> &Config {
        &self.config
    }
    pub fn set_config(&mut self, config: Config) {
        self.config = config;
    }
    pub fn graph(&self) -> &FactorGraph {
        &self.graph
    }
    pub fn factor(&self, id: FactorId) -> Option<&DiscreteFunction> {
        self.graph.factor(id)
    }

    /// Inserts or replaces factor `id`, with `values` given in column-major
    /// order over the strictly increasing variable list `vars`.
    pub fn set_factor(&mut self, id: FactorId, vars: &[VarId], values: &[ValType]) -> Result<()> {
        check_sorted(vars)?;
        let domain = Domain::new(&self.registry, vars)?;
        let fun = DiscreteFunction::from_values(domain, values.to_vec())?;
        self.insert_factor(id, fun);
        Ok(())
    }

    /// Inserts or replaces factor `id`. The domain sizes of `fun` must match
    /// the registry.
    pub fn set_factor_function(&mut self, id: FactorId, fun: DiscreteFunction) -> Result<()> {
        for (var, size) in fun.vars().iter().zip(fun.sizes()) {
            let registered = self.registry.domain_size(*var)?;
            if registered != *size {
                return Err(MaxSumError::DomainSizeConflict {
                    var: *var,
                    registered,
                    requested: *size,
                });
            }
        }
        self.insert_factor(id, fun);
        Ok(())
    }

    fn insert_factor(&mut self, id: FactorId, fun: DiscreteFunction) {
        tracing::debug!(factor = id, vars = ?fun.vars(), "set factor");
        self.graph.set_factor(id, fun);
        self.invalidate(id);
    }

    /// Removes factor `id`, if present.
    pub fn remove_factor(&mut self, id: FactorId) -> Option<DiscreteFunction> {
        let old = self.graph.remove_factor(id)?;
        tracing::debug!(factor = id, "remove factor");
        self.invalidate(id);
        Some(old)
    }

    pub fn clear_all(&mut self) {
        self.graph.clear();
        self.to_var.clear();
        self.to_factor.clear();
        self.beliefs.clear();
        self.last_run = None;
    }

    /// Drops the messages on the edges of `factor`, and the beliefs of
    /// variables no longer in the graph.
    fn invalidate(&mut self, factor: FactorId) {
        self.to_var.retain(|e, _| e.factor != factor);
        self.to_factor.retain(|e, _| e.factor != factor);
        let graph = &self.graph;
        self.beliefs.retain(|v, _| graph.contains_var(*v));
        self.last_run = None;
    }

    pub fn num_factors(&self) -> usize {
        self.graph.num_factors()
    }
    pub fn num_vars(&self) -> usize {
        self.graph.num_vars()
    }
    pub fn last_run(&self) -> Option<&RunStats> {
        self.last_run.as_ref()
    }

    /// Runs max-sum with the configured iteration bound and tolerance, and
    /// returns the number of sweeps performed.
    pub fn optimise(&mut self) -> Result<usize> {
        let Config {
            max_iterations,
            tolerance,
            ..
        } = self.config;
        self.optimise_with(max_iterations, tolerance)
    }

    /// Runs at most `max_iterations` sweeps, stopping after the first one in
    /// which no belief changes by more than `tolerance` (maxnorm `<=`), so a
    /// tolerance of `0.0` stops at an exact fixed point.
    pub fn optimise_with(&mut self, max_iterations: usize, tolerance: ValType) -> Result<usize> {
        let mut stats = RunStats {
            iterations: 0,
            converged: true,
            max_delta: 0.0,
        };
        if self.graph.is_empty() {
            self.last_run = Some(stats);
            tracing::info!("max-sum on an empty factor graph");
            return Ok(0);
        }
        if self.graph.is_cyclic() {
            tracing::debug!("factor graph is cyclic, max-sum may not find the optimum");
        }
        let edges = self.graph.edges();
        stats.converged = false;
        while stats.iterations < max_iterations {
            self.to_factor = self.var_phase(&edges)?;
            self.to_var = self.factor_phase()?;
            let beliefs = self.current_beliefs();
            stats.max_delta = beliefs
                .iter()
                .map(|(var, z)| match self.beliefs.get(var) {
                    Some(old) => (z - old).maxnorm(),
                    None => z.maxnorm(),
                })
                .fold(0.0, ValType::max);
            self.beliefs = beliefs;
            stats.iterations += 1;
            tracing::debug!(
                iteration = stats.iterations,
                max_delta = stats.max_delta,
                "max-sum sweep"
            );
            if stats.max_delta <= tolerance {
                stats.converged = true;
                break;
            }
        }
        if !stats.converged {
            tracing::warn!(
                max_iterations,
                max_delta = stats.max_delta,
                "max-sum did not converge"
            );
        }
        tracing::info!(
            iterations = stats.iterations,
            converged = stats.converged,
            factors = self.num_factors(),
            vars = self.num_vars(),
            "max-sum done"
        );
        self.last_run = Some(stats);
        Ok(stats.iterations)
    }

    /// Best value of every variable of the graph, by increasing variable id.
    pub fn values(&self) -> Vec<(VarId, ValIndex)> {
        self.graph
            .vars()
            .filter_map(|var| Some((var, self.belief(var)?.argmax())))
            .collect()
    }

    /// Sum of the messages currently received by `var`.
    pub fn belief(&self, var: VarId) -> Option<DiscreteFunction> {
        let size = self.graph.var_size(var)?;
        let mut z = zero_message(var, size);
        for factor in self.graph.factors_of(var) {
            if let Some(r) = self.to_var.get(&Edge::new(factor, var)) {
                z += r;
            }
        }
        Some(z)
    }

    pub fn message_to_var(&self, factor: FactorId, var: VarId) -> Option<&DiscreteFunction> {
        self.to_var.get(&Edge::new(factor, var))
    }

    pub fn message_to_factor(&self, var: VarId, factor: FactorId) -> Option<&DiscreteFunction> {
        self.to_factor.get(&Edge::new(factor, var))
    }

    fn current_beliefs(&self) -> BTreeMap<VarId, DiscreteFunction> {
        self.graph
            .vars()
            .filter_map(|var| Some((var, self.belief(var)?)))
            .collect()
    }

    fn var_phase(&self, edges: &[Edge]) -> Result<Messages> {
        let compute = |edge: &Edge| -> Result<(Edge, DiscreteFunction)> {
            Ok((*edge, self.var_to_factor(*edge)?))
        };
        if self.config.parallel {
            edges.par_iter().map(compute).collect()
        } else {
            edges.iter().map(compute).collect()
        }
    }

    fn var_to_factor(&self, edge: Edge) -> Result<DiscreteFunction> {
        let size = self
            .graph
            .var_size(edge.var)
            .ok_or(MaxSumError::UnknownVariable(edge.var))?;
        let mut q = zero_message(edge.var, size);
        for factor in self.graph.factors_of(edge.var).filter(|f| *f != edge.factor) {
            if let Some(r) = self.to_var.get(&Edge::new(factor, edge.var)) {
                q += r;
            }
        }
        let mean = q.mean();
        q -= mean;
        Ok(q)
    }

    fn factor_phase(&self) -> Result<Messages> {
        let factors: Vec<_> = self.graph.factors().collect();
        let compute = |&(id, fun): &(FactorId, &DiscreteFunction)| self.factor_to_vars(id, fun);
        let per_factor: Vec<Vec<(Edge, DiscreteFunction)>> = if self.config.parallel {
            factors.par_iter().map(compute).collect::<Result<_>>()?
        } else {
            factors.iter().map(compute).collect::<Result<_>>()?
        };
        Ok(per_factor.into_iter().flatten().collect())
    }

    /// Messages from factor `id` to each of its variables.
    fn factor_to_vars(&self, id: FactorId, fun: &DiscreteFunction) -> Result<Vec<(Edge, DiscreteFunction)>> {
        fun.vars()
            .iter()
            .map(|&var| -> Result<(Edge, DiscreteFunction)> {
                let mut total = fun.clone();
                for other in fun.vars().iter().filter(|v| **v != var) {
                    if let Some(q) = self.to_factor.get(&Edge::new(id, *other)) {
                        total += q;
                    }
                }
                let mut r = DiscreteFunction::with_domain(fun.domain().filter(|v| v == var), 0.0);
                max_marginal(&total, &mut r)?;
                Ok((Edge::new(id, var), r))
            })
            .collect()
    }
}

fn zero_message(var: VarId, size: ValIndex) -> DiscreteFunction {
    DiscreteFunction::with_domain(Domain::from_parts_unchecked(vec![var], vec![size]), 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<VarRegistry> {
        let mut reg = VarRegistry::new();
        reg.register_all([(1, 2), (2, 2), (3, 3)]).unwrap();
        Arc::new(reg)
    }

    #[test]
    fn single_factor_messages() {
        let mut ms = MaxSumController::with_default_config(registry());
        ms.set_factor(7, &[1, 2], &[0.0, 1.0, 2.0, 3.0]).unwrap();
        let iterations = ms.optimise().unwrap();
        assert_eq!(iterations, 2);
        assert!(ms.last_run().unwrap().converged);
        let r1 = ms.message_to_var(7, 1).unwrap();
        assert_eq!(r1.values().to_vec(), vec![2.0, 3.0]);
        let r2 = ms.message_to_var(7, 2).unwrap();
        assert_eq!(r2.values().to_vec(), vec![1.0, 3.0]);
        assert_eq!(ms.message_to_factor(1, 7).unwrap().maxnorm(), 0.0);
        assert_eq!(ms.values(), vec![(1, 1), (2, 1)]);
    }

    #[test]
    fn set_factor_validation() {
        let mut ms = MaxSumController::with_default_config(registry());
        assert_eq!(
            ms.set_factor(0, &[1, 9], &[0.0; 4]),
            Err(MaxSumError::UnknownVariable(9))
        );
        assert!(matches!(
            ms.set_factor(0, &[2, 1], &[0.0; 4]),
            Err(MaxSumError::BadDomain(_))
        ));
        assert_eq!(
            ms.set_factor(0, &[1, 3], &[0.0; 4]),
            Err(MaxSumError::ValueCount { expected: 6, got: 4 })
        );
        let mut other = VarRegistry::new();
        other.register(3, 5).unwrap();
        let f = DiscreteFunction::new(&other, &[3], 0.0).unwrap();
        assert_eq!(
            ms.set_factor_function(0, f),
            Err(MaxSumError::DomainSizeConflict { var: 3, registered: 3, requested: 5 })
        );
        assert_eq!(ms.num_factors(), 0);
    }

    #[test]
    fn replacing_a_factor_invalidates_its_messages() {
        let mut ms = MaxSumController::with_default_config(registry());
        ms.set_factor(0, &[1, 2], &[0.0, 1.0, 2.0, 3.0]).unwrap();
        ms.set_factor(1, &[2, 3], &[0.0; 6]).unwrap();
        ms.optimise().unwrap();
        assert!(ms.message_to_var(1, 3).is_some());
        ms.set_factor(0, &[1], &[5.0, 0.0]).unwrap();
        assert!(ms.message_to_var(0, 1).is_none());
        assert!(ms.message_to_var(1, 3).is_some());
        assert!(ms.last_run().is_none());
        ms.optimise().unwrap();
        assert_eq!(ms.values()[0], (1, 0));
        assert!(ms.remove_factor(3).is_none());
        assert!(ms.remove_factor(0).is_some());
        assert_eq!(ms.num_vars(), 2);
    }

    #[test]
    fn zero_tolerance_stops_at_fixed_point() {
        let mut ms = MaxSumController::with_default_config(registry());
        ms.set_factor(0, &[1, 2], &[0.0, 1.0, 2.0, 3.0]).unwrap();
        // the second sweep repeats the first exactly
        assert_eq!(ms.optimise_with(10, 0.0).unwrap(), 2);
        let stats = ms.last_run().unwrap();
        assert!(stats.converged);
        assert_eq!(stats.max_delta, 0.0);
    }

    #[test]
    fn iteration_budget_is_respected() {
        let mut ms = MaxSumController::new(registry(), Config::new(1, 0.0));
        ms.set_factor(0, &[1, 2], &[0.0, 1.0, 2.0, 3.0]).unwrap();
        assert_eq!(ms.optimise().unwrap(), 1);
        assert!(!ms.last_run().unwrap().converged);
        assert_eq!(ms.optimise_with(10, 0.0).unwrap(), 1);
    }
}
