//! Dense functions of discrete variables.

mod fmt;
pub mod marginal;
mod ops;

use std::collections::BTreeMap;
use std::ops::{Index, IndexMut};

use ndarray::{Array1, ArrayView1, ArrayViewMut1};

use crate::domain::Domain;
use crate::domain_iter::DomainIterator;
use crate::registry::VarRegistry;
use crate::{MaxSumError, Result, ValIndex, ValType, VarId};

/// A function of a set of discrete variables, stored as one value per joint
/// value of its domain.
///
/// Values are laid out column-major (first variable fastest), see
/// [`Domain`]. A function over no variable is a constant with one value.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "FunctionParts")]
pub struct DiscreteFunction {
    domain: Domain,
    values: Array1<ValType>,
}

#[derive(serde::Deserialize)]
struct FunctionParts {
    domain: Domain,
    values: Array1<ValType>,
}

impl TryFrom<FunctionParts> for DiscreteFunction {
    type Error = MaxSumError;
    fn try_from(parts: FunctionParts) -> Result<Self> {
        Self::from_array(parts.domain, parts.values)
    }
}

impl Default for DiscreteFunction {
    fn default() -> Self {
        Self::constant(0.0)
    }
}

impl DiscreteFunction {
    pub fn constant(val: ValType) -> Self {
        Self {
            domain: Domain::empty(),
            values: Array1::from_elem(1, val),
        }
    }

    /// Function over `vars` (sorted and deduplicated) with every value set to `val`.
    pub fn new(registry: &VarRegistry, vars: &[VarId], val: ValType) -> Result<Self> {
        Ok(Self::with_domain(Domain::new(registry, vars)?, val))
    }

    pub fn single(registry: &VarRegistry, var: VarId, val: ValType) -> Result<Self> {
        Ok(Self::with_domain(Domain::single(registry, var)?, val))
    }

    pub fn with_domain(domain: Domain, val: ValType) -> Self {
        let values = Array1::from_elem(domain.num_values(), val);
        Self { domain, values }
    }

    /// Function with explicit values, in column-major order over `domain`.
    pub fn from_values(domain: Domain, values: Vec<ValType>) -> Result<Self> {
        Self::from_array(domain, Array1::from_vec(values))
    }

    pub fn from_array(domain: Domain, values: Array1<ValType>) -> Result<Self> {
        let expected = domain.num_values();
        if values.len() != expected {
            return Err(MaxSumError::ValueCount {
                expected,
                got: values.len(),
            });
        }
        Ok(Self { domain, values })
    }

    /// Function whose value at each joint value is `f(sub_indices)`.
    pub fn from_fn(domain: Domain, mut f: impl FnMut(&[ValIndex]) -> ValType) -> Self {
        let mut values = Array1::zeros(domain.num_values());
        let mut it = DomainIterator::new(&domain);
        while it.has_next() {
            values[it.ind()] = f(it.sub_ind());
            it.advance();
        }
        Self { domain, values }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }
    pub fn vars(&self) -> &[VarId] {
        self.domain.vars()
    }
    pub fn sizes(&self) -> &[ValIndex] {
        self.domain.sizes()
    }
    pub fn num_vars(&self) -> usize {
        self.domain.len()
    }
    /// Number of values stored by this function.
    pub fn domain_size(&self) -> ValIndex {
        self.values.len()
    }
    pub fn depends_on(&self, var: VarId) -> bool {
        self.domain.contains(var)
    }
    pub fn values(&self) -> ArrayView1<ValType> {
        self.values.view()
    }
    pub fn values_mut(&mut self) -> ArrayViewMut1<ValType> {
        self.values.view_mut()
    }

    pub fn get(&self, ind: ValIndex) -> Option<ValType> {
        self.values.get(ind).copied()
    }
    pub fn get_mut(&mut self, ind: ValIndex) -> Option<&mut ValType> {
        self.values.get_mut(ind)
    }

    /// Value at one sub-index per variable of this function's own domain.
    pub fn at(&self, sub: &[ValIndex]) -> Result<ValType> {
        Ok(self.values[self.domain.sub2ind(sub)?])
    }
    pub fn at_mut(&mut self, sub: &[ValIndex]) -> Result<&mut ValType> {
        let ind = self.domain.sub2ind(sub)?;
        Ok(&mut self.values[ind])
    }

    /// Value at a combination given over a sorted superset of this function's variables.
    pub fn at_vars(&self, vars: &[VarId], sub: &[ValIndex]) -> Result<ValType> {
        Ok(self.values[self.domain.index_in(vars, sub)?])
    }
    pub fn at_vars_mut(&mut self, vars: &[VarId], sub: &[ValIndex]) -> Result<&mut ValType> {
        let ind = self.domain.index_in(vars, sub)?;
        Ok(&mut self.values[ind])
    }

    pub fn at_map(&self, vals: &BTreeMap<VarId, ValIndex>) -> Result<ValType> {
        Ok(self.values[self.domain.index_in_map(vals)?])
    }
    pub fn at_map_mut(&mut self, vals: &BTreeMap<VarId, ValIndex>) -> Result<&mut ValType> {
        let ind = self.domain.index_in_map(vals)?;
        Ok(&mut self.values[ind])
    }

    /// Value at the current position of `it`, whose variables must include this
    /// function's. If `it` iterates exactly this function's domain, indexing
    /// with `it.ind()` is cheaper.
    pub fn at_iter(&self, it: &DomainIterator) -> Result<ValType> {
        self.at_vars(it.vars(), it.sub_ind())
    }
    pub fn at_iter_mut(&mut self, it: &DomainIterator) -> Result<&mut ValType> {
        self.at_vars_mut(it.vars(), it.sub_ind())
    }

    /// `it` must iterate over a superset of this function's domain.
    #[inline]
    pub(crate) fn value_at_iter(&self, it: &DomainIterator) -> ValType {
        self.values[self.domain.index_in_unchecked(it.vars(), it.sub_ind())]
    }

    /// Makes this function the constant `val`, dropping its domain.
    pub fn set_constant(&mut self, val: ValType) {
        *self = Self::constant(val);
    }

    /// Sets every value to `val`, keeping the domain.
    pub fn fill(&mut self, val: ValType) {
        self.values.fill(val);
    }

    pub fn swap(&mut self, other: &mut DiscreteFunction) {
        std::mem::swap(self, other);
    }

    /// Grows the domain to include `vars`. Values are copied across the new
    /// variables.
    pub fn expand(&mut self, registry: &VarRegistry, vars: &[VarId]) -> Result<()> {
        self.expand_domain(&Domain::new(registry, vars)?)
    }

    pub fn expand_var(&mut self, registry: &VarRegistry, var: VarId) -> Result<()> {
        if self.depends_on(var) {
            return Ok(());
        }
        self.expand_domain(&Domain::single(registry, var)?)
    }

    /// Grows the domain to include the domain of `other`.
    pub fn expand_to(&mut self, other: &DiscreteFunction) -> Result<()> {
        self.expand_domain(&other.domain)
    }

    pub fn expand_domain(&mut self, domain: &Domain) -> Result<()> {
        let union = self.domain.union(domain)?;
        if union.len() == self.domain.len() {
            return Ok(());
        }
        let mut result = self.broadcast(union);
        self.swap(&mut result);
        Ok(())
    }

    /// Copy of this function over `target`, which must include its domain.
    pub(crate) fn broadcast(&self, target: Domain) -> DiscreteFunction {
        debug_assert!(target.includes(&self.domain));
        let mut values = Array1::zeros(target.num_values());
        let mut it = DomainIterator::new(&target);
        while it.has_next() {
            values[it.ind()] = self.value_at_iter(&it);
            it.advance();
        }
        Self {
            domain: target,
            values,
        }
    }

    /// Fixes the variables `vars` (sorted) to `vals`, removing them from the
    /// domain. Variables this function does not depend on are ignored.
    pub fn condition(&mut self, vars: &[VarId], vals: &[ValIndex]) -> Result<()> {
        let mut it = DomainIterator::of(self);
        it.condition(vars, vals)?;
        if let Some(mut result) = self.slice(it) {
            self.swap(&mut result);
        }
        Ok(())
    }

    pub fn condition_map(&mut self, vals: &BTreeMap<VarId, ValIndex>) -> Result<()> {
        let mut it = DomainIterator::of(self);
        it.condition_map(vals)?;
        if let Some(mut result) = self.slice(it) {
            self.swap(&mut result);
        }
        Ok(())
    }

    /// Conditioned copy of this function, see [`DiscreteFunction::condition`].
    pub fn conditioned(&self, vars: &[VarId], vals: &[ValIndex]) -> Result<Self> {
        let mut it = DomainIterator::of(self);
        it.condition(vars, vals)?;
        Ok(self.slice(it).unwrap_or_else(|| self.clone()))
    }

    /// Values visited by a conditioned iterator over this function's domain, as
    /// a function of the free variables. `None` if nothing is fixed.
    fn slice(&self, mut it: DomainIterator) -> Option<Self> {
        if it.fixed_count() == 0 {
            return None;
        }
        let free = self.domain.filter(|v| !it.is_fixed(v));
        let mut values = Array1::zeros(free.num_values());
        while it.has_next() {
            values[free.index_in_unchecked(it.vars(), it.sub_ind())] = self.values[it.ind()];
            it.advance();
        }
        Some(Self {
            domain: free,
            values,
        })
    }

    pub fn min(&self) -> ValType {
        self.values.fold(ValType::INFINITY, |a, b| a.min(*b))
    }
    pub fn max(&self) -> ValType {
        self.values.fold(ValType::NEG_INFINITY, |a, b| a.max(*b))
    }
    pub fn sum(&self) -> ValType {
        self.values.sum()
    }
    pub fn mean(&self) -> ValType {
        self.sum() / self.values.len() as ValType
    }
    /// Largest absolute value.
    pub fn maxnorm(&self) -> ValType {
        self.values.fold(0.0, |a, b| a.max(b.abs()))
    }

    /// Linear index of the largest value (the lowest such index on ties).
    /// NaN values are skipped, as in [`DiscreteFunction::max`].
    pub fn argmax(&self) -> ValIndex {
        self.argmax_excluding(None)
    }

    /// Linear index of the largest value other than the one at `mx_ind`,
    /// typically the result of [`DiscreteFunction::argmax`].
    /// Returns `mx_ind` if the function has a single value.
    pub fn argmax2(&self, mx_ind: ValIndex) -> ValIndex {
        if self.values.len() < 2 {
            return mx_ind;
        }
        self.argmax_excluding(Some(mx_ind))
    }

    fn argmax_excluding(&self, exclude: Option<ValIndex>) -> ValIndex {
        let candidates = || (0..self.values.len()).filter(move |k| Some(*k) != exclude);
        let mut best: Option<(ValIndex, ValType)> = None;
        for k in candidates() {
            let v = self.values[k];
            if v.is_nan() {
                continue;
            }
            match best {
                Some((_, b)) if !(v > b) => {}
                _ => best = Some((k, v)),
            }
        }
        // all NaN
        best.map(|(k, _)| k)
            .or_else(|| candidates().next())
            .unwrap_or(0)
    }

    /// Element-wise maximum with a scalar.
    pub fn max_with(&self, s: ValType) -> Self {
        self.map(|x| x.max(s))
    }

    /// True if every value is `< v`.
    pub fn all_lt(&self, v: ValType) -> bool {
        self.values.iter().all(|x| *x < v)
    }
    pub fn all_le(&self, v: ValType) -> bool {
        self.values.iter().all(|x| *x <= v)
    }
    pub fn all_gt(&self, v: ValType) -> bool {
        self.values.iter().all(|x| *x > v)
    }
    pub fn all_ge(&self, v: ValType) -> bool {
        self.values.iter().all(|x| *x >= v)
    }
}

impl Index<ValIndex> for DiscreteFunction {
    type Output = ValType;
    fn index(&self, ind: ValIndex) -> &ValType {
        &self.values[ind]
    }
}

impl IndexMut<ValIndex> for DiscreteFunction {
    fn index_mut(&mut self, ind: ValIndex) -> &mut ValType {
        &mut self.values[ind]
    }
}

/// Exact equality over the union of both domains.
impl PartialEq for DiscreteFunction {
    fn eq(&self, other: &Self) -> bool {
        equal_within_tolerance(self, other, 0.0)
    }
}

/// True if both functions depend on exactly the same variables.
pub fn same_domain(f1: &DiscreteFunction, f2: &DiscreteFunction) -> bool {
    f1.vars() == f2.vars()
}

/// True if, for every joint value `k` of the union of both domains,
/// `f1(k) == f2(k)` or `|1 - f1(k)/f2(k)| < tol`.
pub fn equal_within_tolerance(f1: &DiscreteFunction, f2: &DiscreteFunction, tol: ValType) -> bool {
    let close = |a: ValType, b: ValType| a == b || (1.0 - a / b).abs() < tol;
    if f1.domain == f2.domain {
        return f1.values.iter().zip(f2.values.iter()).all(|(a, b)| close(*a, *b));
    }
    let Ok(union) = f1.domain.union(&f2.domain) else {
        return false;
    };
    let mut it = DomainIterator::new(&union);
    while it.has_next() {
        if !close(f1.value_at_iter(&it), f2.value_at_iter(&it)) {
            return false;
        }
        it.advance();
    }
    true
}

/// [`equal_within_tolerance`] restricted to functions of the same domain.
pub fn strictly_equal_within_tolerance(
    f1: &DiscreteFunction,
    f2: &DiscreteFunction,
    tol: ValType,
) -> bool {
    same_domain(f1, f2) && equal_within_tolerance(f1, f2, tol)
}
