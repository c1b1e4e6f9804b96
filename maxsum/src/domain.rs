//! Sorted variable lists with their domain sizes, and the mixed-radix index
//! arithmetic defined on them.
//!
//! Linear indices are column-major: the first variable of a domain varies
//! fastest, `ind = sum_k sub[k] * prod_{j<k} sizes[j]`.

use std::collections::BTreeMap;

use itertools::{EitherOrBoth, Itertools};

use crate::registry::VarRegistry;
use crate::{MaxSumError, Result, ValIndex, VarId};

/// A strictly increasing list of variables, with the domain size of each.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "DomainParts")]
pub struct Domain {
    vars: Vec<VarId>,
    sizes: Vec<ValIndex>,
}

/// Unchecked serialized form of a [`Domain`].
#[derive(serde::Deserialize)]
struct DomainParts {
    vars: Vec<VarId>,
    sizes: Vec<ValIndex>,
}

impl TryFrom<DomainParts> for Domain {
    type Error = MaxSumError;
    fn try_from(parts: DomainParts) -> Result<Self> {
        Domain::from_parts(parts.vars, parts.sizes)
    }
}

impl Domain {
    /// The domain of a constant.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Domain over `vars` (sorted and deduplicated), sizes looked up in `registry`.
    pub fn new(registry: &VarRegistry, vars: &[VarId]) -> Result<Self> {
        let mut vars = vars.to_vec();
        vars.sort_unstable();
        vars.dedup();
        let sizes = registry.sizes_of(&vars)?;
        Ok(Self { vars, sizes })
    }

    pub fn single(registry: &VarRegistry, var: VarId) -> Result<Self> {
        Ok(Self {
            vars: vec![var],
            sizes: vec![registry.domain_size(var)?],
        })
    }

    /// Domain from an explicit variable list (which must be strictly increasing)
    /// and the aligned domain sizes.
    pub fn from_parts(vars: Vec<VarId>, sizes: Vec<ValIndex>) -> Result<Self> {
        if vars.len() != sizes.len() {
            return Err(MaxSumError::BadDomain(format!(
                "{} variables but {} domain sizes",
                vars.len(),
                sizes.len()
            )));
        }
        check_sorted(&vars)?;
        if let Some((v, _)) = vars.iter().zip(&sizes).find(|(_, s)| **s == 0) {
            return Err(MaxSumError::ZeroDomainSize(*v));
        }
        Ok(Self { vars, sizes })
    }

    pub(crate) fn from_parts_unchecked(vars: Vec<VarId>, sizes: Vec<ValIndex>) -> Self {
        debug_assert!(vars.len() == sizes.len());
        debug_assert!(vars.windows(2).all(|w| w[0] < w[1]));
        Self { vars, sizes }
    }

    pub fn vars(&self) -> &[VarId] {
        &self.vars
    }
    pub fn sizes(&self) -> &[ValIndex] {
        &self.sizes
    }
    /// Number of variables.
    pub fn len(&self) -> usize {
        self.vars.len()
    }
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
    /// Number of joint values, i.e. the product of the domain sizes.
    pub fn num_values(&self) -> ValIndex {
        self.sizes.iter().product()
    }
    pub fn position(&self, var: VarId) -> Option<usize> {
        self.vars.binary_search(&var).ok()
    }
    pub fn contains(&self, var: VarId) -> bool {
        self.position(var).is_some()
    }
    pub fn size_of(&self, var: VarId) -> Option<ValIndex> {
        self.position(var).map(|k| self.sizes[k])
    }

    /// True if every variable of `other` is in this domain, with the same size.
    pub fn includes(&self, other: &Domain) -> bool {
        let mut mine = self.vars.iter().zip(&self.sizes);
        other.vars.iter().zip(&other.sizes).all(|(v, s)| {
            mine.find(|(mv, _)| *mv >= v)
                .is_some_and(|(mv, ms)| mv == v && ms == s)
        })
    }

    /// Union of two domains. Fails if a shared variable has two different sizes.
    pub fn union(&self, other: &Domain) -> Result<Domain> {
        if self.includes(other) {
            return Ok(self.clone());
        }
        let mut vars = Vec::with_capacity(self.len() + other.len());
        let mut sizes = Vec::with_capacity(self.len() + other.len());
        for x in self
            .vars
            .iter()
            .zip(&self.sizes)
            .merge_join_by(other.vars.iter().zip(&other.sizes), |a, b| a.0.cmp(b.0))
        {
            let (v, s) = match x {
                EitherOrBoth::Both((v, s1), (_, s2)) => {
                    if s1 != s2 {
                        return Err(MaxSumError::BadDomain(format!(
                            "variable {v} has domain size {s1} in one function and {s2} in the other"
                        )));
                    }
                    (v, s1)
                }
                EitherOrBoth::Left(x) | EitherOrBoth::Right(x) => x,
            };
            vars.push(*v);
            sizes.push(*s);
        }
        Ok(Self { vars, sizes })
    }

    /// Domain restricted to the variables for which `keep` holds.
    pub(crate) fn filter(&self, mut keep: impl FnMut(VarId) -> bool) -> Domain {
        let (vars, sizes) = self
            .vars
            .iter()
            .zip(&self.sizes)
            .filter(|(v, _)| keep(**v))
            .map(|(v, s)| (*v, *s))
            .unzip();
        Self { vars, sizes }
    }

    /// Linear index for one sub-index per variable of this domain.
    pub fn sub2ind(&self, sub: &[ValIndex]) -> Result<ValIndex> {
        if sub.len() != self.len() {
            return Err(MaxSumError::BadDomain(format!(
                "{} sub-indices for a domain of {} variables",
                sub.len(),
                self.len()
            )));
        }
        let mut index = 0;
        let mut skip = 1;
        for ((v, s), i) in self.vars.iter().zip(&self.sizes).zip(sub) {
            if i >= s {
                return Err(MaxSumError::IndexOutOfRange {
                    var: *v,
                    index: *i,
                    size: *s,
                });
            }
            index += i * skip;
            skip *= s;
        }
        Ok(index)
    }

    pub fn ind2sub(&self, ind: ValIndex) -> Result<Vec<ValIndex>> {
        ind2sub(ind, &self.sizes)
    }

    /// Linear index in this domain of a combination given over a superset of
    /// its variables.
    ///
    /// `vars` must be sorted; entries for variables outside this domain are
    /// skipped. This is a single merge walk over both lists.
    pub fn index_in(&self, vars: &[VarId], sub: &[ValIndex]) -> Result<ValIndex> {
        if vars.len() != sub.len() {
            return Err(MaxSumError::BadDomain(format!(
                "{} variables but {} sub-indices",
                vars.len(),
                sub.len()
            )));
        }
        let mut index = 0;
        let mut skip = 1;
        let mut mine = self.vars.iter().zip(&self.sizes).peekable();
        for (v, i) in vars.iter().zip(sub) {
            let Some(&(mv, ms)) = mine.peek() else {
                break;
            };
            if mv < v {
                return Err(missing_var(*mv));
            }
            if mv == v {
                if i >= ms {
                    return Err(MaxSumError::IndexOutOfRange {
                        var: *v,
                        index: *i,
                        size: *ms,
                    });
                }
                index += i * skip;
                skip *= ms;
                mine.next();
            }
        }
        match mine.next() {
            Some((mv, _)) => Err(missing_var(*mv)),
            None => Ok(index),
        }
    }

    /// Same as [`Domain::index_in`], for callers that guarantee `vars` is a sorted
    /// superset of this domain and `sub` is in range.
    #[inline]
    pub(crate) fn index_in_unchecked(&self, vars: &[VarId], sub: &[ValIndex]) -> ValIndex {
        debug_assert_eq!(vars.len(), sub.len());
        let mut index = 0;
        let mut skip = 1;
        let mut k = 0;
        for (v, i) in vars.iter().zip(sub) {
            if k == self.vars.len() {
                break;
            }
            if self.vars[k] == *v {
                debug_assert!(*i < self.sizes[k]);
                index += i * skip;
                skip *= self.sizes[k];
                k += 1;
            }
        }
        debug_assert_eq!(k, self.vars.len());
        index
    }

    /// Linear index of the combination given by a sorted variable → value map,
    /// which must contain every variable of this domain.
    pub fn index_in_map(&self, vals: &BTreeMap<VarId, ValIndex>) -> Result<ValIndex> {
        let mut index = 0;
        let mut skip = 1;
        for (v, s) in self.vars.iter().zip(&self.sizes) {
            let i = *vals.get(v).ok_or_else(|| missing_var(*v))?;
            if i >= *s {
                return Err(MaxSumError::IndexOutOfRange {
                    var: *v,
                    index: i,
                    size: *s,
                });
            }
            index += i * skip;
            skip *= s;
        }
        Ok(index)
    }
}

fn missing_var(var: VarId) -> MaxSumError {
    MaxSumError::BadDomain(format!("no index given for variable {var}"))
}

pub(crate) fn check_sorted(vars: &[VarId]) -> Result<()> {
    if vars.windows(2).all(|w| w[0] < w[1]) {
        Ok(())
    } else {
        Err(MaxSumError::BadDomain(format!(
            "variable list {vars:?} is not strictly increasing"
        )))
    }
}

/// Linear index of `sub` in an array of dimensions `sizes` (first dimension
/// fastest).
pub fn sub2ind(sizes: &[ValIndex], sub: &[ValIndex]) -> Result<ValIndex> {
    if sizes.len() != sub.len() {
        return Err(MaxSumError::BadDomain(format!(
            "{} sub-indices for {} dimensions",
            sub.len(),
            sizes.len()
        )));
    }
    let mut index = 0;
    let mut skip = 1;
    for (dim, (s, i)) in sizes.iter().zip(sub).enumerate() {
        if i >= s {
            return Err(MaxSumError::DimIndexOutOfRange {
                dim,
                index: *i,
                size: *s,
            });
        }
        index += i * skip;
        skip *= s;
    }
    Ok(index)
}

/// Inverse of [`sub2ind`].
pub fn ind2sub(ind: ValIndex, sizes: &[ValIndex]) -> Result<Vec<ValIndex>> {
    let total: ValIndex = sizes.iter().product();
    if ind >= total {
        return Err(MaxSumError::LinearIndexOutOfRange { index: ind, size: total });
    }
    let mut rem = ind;
    Ok(sizes
        .iter()
        .map(|s| {
            let i = rem % s;
            rem /= s;
            i
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dom(vars: &[VarId], sizes: &[ValIndex]) -> Domain {
        Domain::from_parts(vars.to_vec(), sizes.to_vec()).unwrap()
    }

    #[test]
    fn index_roundtrip_is_column_major() {
        let sizes = [2, 3, 4];
        assert_eq!(sub2ind(&sizes, &[1, 0, 0]), Ok(1));
        assert_eq!(sub2ind(&sizes, &[0, 1, 0]), Ok(2));
        assert_eq!(sub2ind(&sizes, &[1, 2, 3]), Ok(23));
        assert_eq!(ind2sub(23, &sizes), Ok(vec![1, 2, 3]));
        assert_eq!(
            sub2ind(&sizes, &[0, 3, 0]),
            Err(MaxSumError::DimIndexOutOfRange { dim: 1, index: 3, size: 3 })
        );
        assert!(matches!(sub2ind(&sizes, &[0, 0]), Err(MaxSumError::BadDomain(_))));
        assert!(ind2sub(24, &sizes).is_err());
        assert_eq!(ind2sub(0, &[]), Ok(vec![]));
    }

    #[test]
    fn selective_index_skips_foreign_vars() {
        let d = dom(&[2, 5], &[3, 2]);
        // superset [1, 2, 4, 5]
        let vars = [1, 2, 4, 5];
        let sub = [7, 2, 9, 1];
        let ind = d.index_in(&vars, &sub).unwrap();
        assert_eq!(ind, 2 + 3);
        assert_eq!(d.index_in_unchecked(&vars, &[0, 2, 0, 1]), ind);
        assert!(matches!(
            d.index_in(&[1, 2], &[0, 0]),
            Err(MaxSumError::BadDomain(_))
        ));
        assert!(matches!(
            d.index_in(&[2, 5], &[3, 0]),
            Err(MaxSumError::IndexOutOfRange { var: 2, index: 3, size: 3 })
        ));
        let map: BTreeMap<_, _> = [(1, 0), (2, 2), (5, 1)].into_iter().collect();
        assert_eq!(d.index_in_map(&map), Ok(5));
    }

    #[test]
    fn union_and_inclusion() {
        let a = dom(&[1, 3], &[2, 4]);
        let b = dom(&[2, 3], &[5, 4]);
        let u = a.union(&b).unwrap();
        assert_eq!(u.vars(), &[1, 2, 3]);
        assert_eq!(u.sizes(), &[2, 5, 4]);
        assert!(u.includes(&a) && u.includes(&b));
        assert!(!a.includes(&b));
        assert!(a.includes(&Domain::empty()));
        let bad = dom(&[3], &[7]);
        assert!(a.union(&bad).is_err());
        assert!(!a.includes(&bad));
    }

    #[test]
    fn from_parts_checks_order() {
        assert!(Domain::from_parts(vec![2, 1], vec![2, 2]).is_err());
        assert!(Domain::from_parts(vec![1, 1], vec![2, 2]).is_err());
        assert!(Domain::from_parts(vec![1], vec![2, 2]).is_err());
        assert_eq!(
            Domain::from_parts(vec![1], vec![0]),
            Err(MaxSumError::ZeroDomainSize(1))
        );
    }
}
