use std::collections::BTreeMap;

use crate::domain::{check_sorted, Domain};
use crate::function::DiscreteFunction;
use crate::{MaxSumError, Result, ValIndex, VarId};

/// Cursor over every joint value of a domain, in linear index order.
///
/// Some variables may be fixed with [`DomainIterator::condition`], restricting
/// the traversal to a slice of the domain. Usage:
///
/// ```
/// # use maxsum::{Domain, DomainIterator};
/// let domain = Domain::from_parts(vec![1, 2], vec![2, 3]).unwrap();
/// let mut it = DomainIterator::new(&domain);
/// let mut n = 0;
/// while it.has_next() {
///     assert_eq!(it.ind(), n);
///     n += 1;
///     it.advance();
/// }
/// assert_eq!(n, 6);
/// ```
#[derive(Debug, Clone)]
pub struct DomainIterator {
    domain: Domain,
    sub_ind: Vec<ValIndex>,
    strides: Vec<ValIndex>,
    fixed: Vec<bool>,
    ind: ValIndex,
    finished: bool,
}

impl DomainIterator {
    pub fn new(domain: &Domain) -> Self {
        let mut strides = Vec::with_capacity(domain.len());
        let mut skip = 1;
        for s in domain.sizes() {
            strides.push(skip);
            skip *= s;
        }
        Self {
            domain: domain.clone(),
            sub_ind: vec![0; domain.len()],
            strides,
            fixed: vec![false; domain.len()],
            ind: 0,
            finished: false,
        }
    }

    pub fn of(fun: &DiscreteFunction) -> Self {
        Self::new(fun.domain())
    }

    /// Iterator over an explicit, strictly increasing variable list.
    pub fn from_parts(vars: Vec<VarId>, sizes: Vec<ValIndex>) -> Result<Self> {
        Ok(Self::new(&Domain::from_parts(vars, sizes)?))
    }

    pub fn has_next(&self) -> bool {
        !self.finished
    }

    /// Moves to the next joint value of the free variables.
    pub fn advance(&mut self) {
        if self.finished {
            return;
        }
        let sizes = self.domain.sizes();
        for k in 0..self.sub_ind.len() {
            if self.fixed[k] {
                continue;
            }
            if self.sub_ind[k] + 1 < sizes[k] {
                self.sub_ind[k] += 1;
                self.ind += self.strides[k];
                return;
            }
            self.ind -= self.sub_ind[k] * self.strides[k];
            self.sub_ind[k] = 0;
        }
        self.finished = true;
    }

    /// Current linear index in the iterated domain.
    pub fn ind(&self) -> ValIndex {
        self.ind
    }
    pub fn sub_ind(&self) -> &[ValIndex] {
        &self.sub_ind
    }
    pub fn vars(&self) -> &[VarId] {
        self.domain.vars()
    }
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Number of this iterator's variables that are fixed.
    pub fn fixed_count(&self) -> usize {
        self.fixed.iter().filter(|f| **f).count()
    }

    pub fn is_fixed(&self, var: VarId) -> bool {
        self.domain.position(var).is_some_and(|k| self.fixed[k])
    }

    /// Fixes the variables in `vars` (sorted) to the aligned `vals`.
    ///
    /// Variables outside this iterator's domain are ignored. The traversal
    /// restarts at the first joint value of the remaining free variables.
    pub fn condition(&mut self, vars: &[VarId], vals: &[ValIndex]) -> Result<()> {
        if vars.len() != vals.len() {
            return Err(MaxSumError::BadDomain(format!(
                "{} variables but {} values to condition on",
                vars.len(),
                vals.len()
            )));
        }
        check_sorted(vars)?;
        self.condition_pairs(vars.iter().copied().zip(vals.iter().copied()))
    }

    pub fn condition_map(&mut self, vals: &BTreeMap<VarId, ValIndex>) -> Result<()> {
        self.condition_pairs(vals.iter().map(|(v, i)| (*v, *i)))
    }

    /// Fixes the variables shared with `other` to `other`'s current values.
    pub fn condition_on(&mut self, other: &DomainIterator) -> Result<()> {
        self.condition_pairs(
            other
                .vars()
                .iter()
                .copied()
                .zip(other.sub_ind.iter().copied()),
        )
    }

    /// Leaves the iterator untouched on failure.
    fn condition_pairs(&mut self, pairs: impl Iterator<Item = (VarId, ValIndex)>) -> Result<()> {
        let vars = self.domain.vars();
        let sizes = self.domain.sizes();
        let mut fixed = self.fixed.clone();
        let mut sub_ind = self.sub_ind.clone();
        let mut k = 0;
        for (var, val) in pairs {
            while k < vars.len() && vars[k] < var {
                k += 1;
            }
            if k == vars.len() {
                break;
            }
            if vars[k] == var {
                if val >= sizes[k] {
                    return Err(MaxSumError::IndexOutOfRange {
                        var,
                        index: val,
                        size: sizes[k],
                    });
                }
                fixed[k] = true;
                sub_ind[k] = val;
            }
        }
        for (sub, fixed) in sub_ind.iter_mut().zip(&fixed) {
            if !fixed {
                *sub = 0;
            }
        }
        self.ind = sub_ind.iter().zip(&self.strides).map(|(i, s)| i * s).sum();
        self.fixed = fixed;
        self.sub_ind = sub_ind;
        self.finished = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(mut it: DomainIterator) -> Vec<(ValIndex, Vec<ValIndex>)> {
        let mut res = Vec::new();
        while it.has_next() {
            res.push((it.ind(), it.sub_ind().to_vec()));
            it.advance();
        }
        res
    }

    #[test]
    fn full_traversal() {
        let it = DomainIterator::from_parts(vec![4, 9], vec![2, 3]).unwrap();
        let states = collect(it);
        assert_eq!(states.len(), 6);
        for (ind, sub) in &states {
            assert_eq!(*ind, sub[0] + 2 * sub[1]);
        }
        assert_eq!(states[1].1, vec![1, 0]);
        assert_eq!(states[5].1, vec![1, 2]);
    }

    #[test]
    fn constant_domain_has_one_state() {
        let mut it = DomainIterator::new(&Domain::empty());
        assert!(it.has_next());
        assert_eq!(it.ind(), 0);
        it.advance();
        assert!(!it.has_next());
        it.advance();
        assert!(!it.has_next());
    }

    #[test]
    fn conditioned_traversal() {
        let mut it = DomainIterator::from_parts(vec![1, 2, 3], vec![2, 3, 2]).unwrap();
        // variable 7 is not in the domain and must be ignored
        it.condition(&[2, 7], &[1, 0]).unwrap();
        assert_eq!(it.fixed_count(), 1);
        assert!(it.is_fixed(2));
        assert!(!it.is_fixed(1));
        assert!(!it.is_fixed(7));
        let states = collect(it);
        assert_eq!(
            states.iter().map(|(i, _)| *i).collect::<Vec<_>>(),
            vec![2, 3, 8, 9]
        );
        assert!(states.iter().all(|(_, s)| s[1] == 1));
    }

    #[test]
    fn fully_fixed_has_one_state() {
        let mut it = DomainIterator::from_parts(vec![1, 2], vec![2, 3]).unwrap();
        let map: BTreeMap<_, _> = [(1, 1), (2, 2)].into_iter().collect();
        it.condition_map(&map).unwrap();
        assert_eq!(collect(it), vec![(5, vec![1, 2])]);
    }

    #[test]
    fn condition_errors() {
        let mut it = DomainIterator::from_parts(vec![1, 2], vec![2, 3]).unwrap();
        assert!(it.condition(&[2, 1], &[0, 0]).is_err());
        assert!(it.condition(&[1], &[0, 0]).is_err());
        assert_eq!(
            it.condition(&[2], &[3]),
            Err(MaxSumError::IndexOutOfRange { var: 2, index: 3, size: 3 })
        );
    }

    #[test]
    fn failed_condition_keeps_state() {
        let mut it = DomainIterator::from_parts(vec![1, 2], vec![2, 3]).unwrap();
        it.advance();
        assert_eq!(
            it.condition(&[1, 2], &[1, 5]),
            Err(MaxSumError::IndexOutOfRange { var: 2, index: 5, size: 3 })
        );
        assert_eq!(it.fixed_count(), 0);
        assert_eq!(it.ind(), 1);
        assert_eq!(it.sub_ind(), &[1, 0]);
        let states = collect(it);
        assert_eq!(states.len(), 5);
        for (ind, sub) in &states {
            assert_eq!(*ind, sub[0] + 2 * sub[1]);
        }
    }

    #[test]
    fn condition_on_other_iterator() {
        let mut out = DomainIterator::from_parts(vec![2], vec![3]).unwrap();
        out.advance();
        let mut it = DomainIterator::from_parts(vec![1, 2], vec![2, 3]).unwrap();
        it.condition_on(&out).unwrap();
        assert_eq!(
            collect(it),
            vec![(2, vec![0, 1]), (3, vec![1, 1])]
        );
    }
}
