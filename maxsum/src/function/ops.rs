//! Arithmetic on discrete functions.
//!
//! Binary operations between two functions are evaluated over the union of
//! their domains. The operator forms panic if the two functions disagree on
//! the domain size of a shared variable (as ndarray operators panic on
//! incompatible shapes); [`DiscreteFunction::zip_with`] reports it instead.

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use ndarray::{Array1, Zip};

use super::DiscreteFunction;
use crate::domain_iter::DomainIterator;
use crate::{Result, ValType};

impl DiscreteFunction {
    /// Applies `f` to every value.
    pub fn map(&self, f: impl Fn(ValType) -> ValType) -> Self {
        Self {
            domain: self.domain.clone(),
            values: self.values.mapv(f),
        }
    }

    pub fn map_inplace(&mut self, f: impl Fn(ValType) -> ValType) {
        self.values.mapv_inplace(f);
    }

    /// `f(self(k), other(k))` for every joint value `k` of the union of both domains.
    pub fn zip_with(
        &self,
        other: &DiscreteFunction,
        f: impl Fn(ValType, ValType) -> ValType,
    ) -> Result<Self> {
        if self.domain == other.domain {
            return Ok(Self {
                domain: self.domain.clone(),
                values: Zip::from(&self.values)
                    .and(&other.values)
                    .map_collect(|a, b| f(*a, *b)),
            });
        }
        let domain = self.domain.union(&other.domain)?;
        let mut values = Array1::zeros(domain.num_values());
        let mut it = DomainIterator::new(&domain);
        while it.has_next() {
            values[it.ind()] = f(self.value_at_iter(&it), other.value_at_iter(&it));
            it.advance();
        }
        Ok(Self { domain, values })
    }

    /// In-place form of [`DiscreteFunction::zip_with`]: the domain of `self`
    /// grows to the union of both domains.
    pub fn zip_with_assign(
        &mut self,
        other: &DiscreteFunction,
        f: impl Fn(ValType, ValType) -> ValType,
    ) -> Result<()> {
        if self.domain == other.domain {
            Zip::from(&mut self.values)
                .and(&other.values)
                .for_each(|a, b| *a = f(*a, *b));
        } else if self.domain.includes(&other.domain) {
            let mut it = DomainIterator::new(&self.domain);
            while it.has_next() {
                let ind = it.ind();
                self.values[ind] = f(self.values[ind], other.value_at_iter(&it));
                it.advance();
            }
        } else {
            let mut result = self.zip_with(other, f)?;
            self.swap(&mut result);
        }
        Ok(())
    }

    /// Adds every function of `funs` to this one, expanding the domain once to
    /// the union of all of them.
    pub fn add_all<'a>(&mut self, funs: impl IntoIterator<Item = &'a DiscreteFunction>) -> Result<()> {
        let funs: Vec<_> = funs.into_iter().collect();
        let mut domain = self.domain.clone();
        for f in funs.iter() {
            domain = domain.union(&f.domain)?;
        }
        self.expand_domain(&domain)?;
        for f in funs {
            self.zip_with_assign(f, |a, b| a + b)?;
        }
        Ok(())
    }

    pub fn ln(&self) -> Self {
        self.map(ValType::ln)
    }
    pub fn exp(&self) -> Self {
        self.map(ValType::exp)
    }
    pub fn sin(&self) -> Self {
        self.map(ValType::sin)
    }
    pub fn cos(&self) -> Self {
        self.map(ValType::cos)
    }
    pub fn tan(&self) -> Self {
        self.map(ValType::tan)
    }
    pub fn abs(&self) -> Self {
        self.map(ValType::abs)
    }
    pub fn sqrt(&self) -> Self {
        self.map(ValType::sqrt)
    }
    pub fn ceil(&self) -> Self {
        self.map(ValType::ceil)
    }
    pub fn floor(&self) -> Self {
        self.map(ValType::floor)
    }
    pub fn powf(&self, exp: ValType) -> Self {
        self.map(|x| x.powf(exp))
    }
    /// Element-wise `self(k)^exp(k)` over the union of both domains.
    pub fn pow(&self, exp: &DiscreteFunction) -> Result<Self> {
        self.zip_with(exp, ValType::powf)
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $assign_trait:ident, $assign_method:ident, $op:tt) => {
        impl $assign_trait<ValType> for DiscreteFunction {
            fn $assign_method(&mut self, rhs: ValType) {
                self.values.mapv_inplace(|x| x $op rhs);
            }
        }
        impl $assign_trait<&DiscreteFunction> for DiscreteFunction {
            fn $assign_method(&mut self, rhs: &DiscreteFunction) {
                if let Err(e) = self.zip_with_assign(rhs, |a, b| a $op b) {
                    panic!("Cannot combine functions: {e}");
                }
            }
        }
        impl $assign_trait<DiscreteFunction> for DiscreteFunction {
            fn $assign_method(&mut self, rhs: DiscreteFunction) {
                $assign_trait::$assign_method(self, &rhs);
            }
        }
        impl $trait<ValType> for DiscreteFunction {
            type Output = DiscreteFunction;
            fn $method(mut self, rhs: ValType) -> DiscreteFunction {
                $assign_trait::$assign_method(&mut self, rhs);
                self
            }
        }
        impl $trait<ValType> for &DiscreteFunction {
            type Output = DiscreteFunction;
            fn $method(self, rhs: ValType) -> DiscreteFunction {
                self.map(|x| x $op rhs)
            }
        }
        impl $trait<&DiscreteFunction> for ValType {
            type Output = DiscreteFunction;
            fn $method(self, rhs: &DiscreteFunction) -> DiscreteFunction {
                rhs.map(|x| self $op x)
            }
        }
        impl $trait<DiscreteFunction> for ValType {
            type Output = DiscreteFunction;
            fn $method(self, mut rhs: DiscreteFunction) -> DiscreteFunction {
                rhs.map_inplace(|x| self $op x);
                rhs
            }
        }
        impl $trait<&DiscreteFunction> for &DiscreteFunction {
            type Output = DiscreteFunction;
            fn $method(self, rhs: &DiscreteFunction) -> DiscreteFunction {
                match self.zip_with(rhs, |a, b| a $op b) {
                    Ok(res) => res,
                    Err(e) => panic!("Cannot combine functions: {e}"),
                }
            }
        }
        impl $trait<&DiscreteFunction> for DiscreteFunction {
            type Output = DiscreteFunction;
            fn $method(mut self, rhs: &DiscreteFunction) -> DiscreteFunction {
                $assign_trait::$assign_method(&mut self, rhs);
                self
            }
        }
        impl $trait<DiscreteFunction> for DiscreteFunction {
            type Output = DiscreteFunction;
            fn $method(mut self, rhs: DiscreteFunction) -> DiscreteFunction {
                $assign_trait::$assign_method(&mut self, &rhs);
                self
            }
        }
    };
}

impl_binary_op!(Add, add, AddAssign, add_assign, +);
impl_binary_op!(Sub, sub, SubAssign, sub_assign, -);
impl_binary_op!(Mul, mul, MulAssign, mul_assign, *);
impl_binary_op!(Div, div, DivAssign, div_assign, /);

impl Neg for DiscreteFunction {
    type Output = DiscreteFunction;
    fn neg(mut self) -> DiscreteFunction {
        self.map_inplace(|x| -x);
        self
    }
}

impl Neg for &DiscreteFunction {
    type Output = DiscreteFunction;
    fn neg(self) -> DiscreteFunction {
        self.map(|x| -x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{equal_within_tolerance, same_domain};
    use crate::registry::VarRegistry;
    use crate::{MaxSumError, DEFAULT_VALUE_TOLERANCE};
    use approx::assert_abs_diff_eq;

    fn registry() -> VarRegistry {
        let mut reg = VarRegistry::new();
        reg.register_all([(1, 2), (2, 3), (3, 4)]).unwrap();
        reg
    }

    fn linear(reg: &VarRegistry, vars: &[u32], scale: ValType) -> DiscreteFunction {
        let mut f = DiscreteFunction::new(reg, vars, 0.0).unwrap();
        f.values.iter_mut().enumerate().for_each(|(k, x)| *x = scale * (k as ValType + 1.0));
        f
    }

    #[test]
    fn scalar_ops() {
        let reg = registry();
        let f = linear(&reg, &[1, 2], 1.0);
        let g = (&f * 2.0 + 1.0 - 3.0) / 2.0;
        for k in 0..f.domain_size() {
            assert_abs_diff_eq!(g[k], f[k] - 1.0);
        }
        let h = 12.0 / &f;
        assert_abs_diff_eq!(h[2], 4.0);
        let n = -&f;
        assert_eq!(n.max(), -1.0);
        assert_eq!((10.0 - f.clone())[0], 9.0);
    }

    #[test]
    fn binary_ops_broadcast() {
        let reg = registry();
        let f = linear(&reg, &[1, 2], 1.0);
        let g = linear(&reg, &[2, 3], 0.5);
        let fg = &f + &g;
        let gf = &g + &f;
        assert!(same_domain(&fg, &gf));
        assert_eq!(fg.vars(), &[1, 2, 3]);
        assert!(equal_within_tolerance(&fg, &gf, DEFAULT_VALUE_TOLERANCE));
        let back = &fg - &g;
        assert!(equal_within_tolerance(&back, &f, DEFAULT_VALUE_TOLERANCE));
        let vars = fg.vars().to_vec();
        let mut it = DomainIterator::of(&fg);
        while it.has_next() {
            let expected = f.at_vars(&vars, it.sub_ind()).unwrap()
                + g.at_vars(&vars, it.sub_ind()).unwrap();
            assert_abs_diff_eq!(fg[it.ind()], expected);
            it.advance();
        }
    }

    #[test]
    fn assign_ops_grow_domain() {
        let reg = registry();
        let mut f = linear(&reg, &[1], 1.0);
        let g = linear(&reg, &[1, 2], 1.0);
        f *= &g;
        assert_eq!(f.vars(), &[1, 2]);
        assert_abs_diff_eq!(f.at(&[1, 2]).unwrap(), 2.0 * 6.0);
        // subset operand keeps the domain
        let mut h = g.clone();
        h -= &linear(&reg, &[2], 1.0);
        assert_eq!(h.vars(), &[1, 2]);
        assert_abs_diff_eq!(h.at(&[1, 2]).unwrap(), 6.0 - 3.0);
    }

    #[test]
    fn add_all_and_pow() {
        let reg = registry();
        let mut acc = DiscreteFunction::constant(1.0);
        let parts = [linear(&reg, &[1], 1.0), linear(&reg, &[3], 1.0)];
        acc.add_all(parts.iter()).unwrap();
        assert_eq!(acc.vars(), &[1, 3]);
        assert_abs_diff_eq!(acc.at(&[1, 3]).unwrap(), 1.0 + 2.0 + 4.0);
        let sq = parts[0].pow(&DiscreteFunction::constant(2.0)).unwrap();
        assert_abs_diff_eq!(sq[1], 4.0);
        assert_abs_diff_eq!(parts[1].sqrt().powf(2.0)[3], 4.0, epsilon = 1e-12);
        assert_abs_diff_eq!(parts[0].ln().exp()[1], 2.0, epsilon = 1e-12);
        assert_eq!(parts[0].map(|x| x - 1.5).abs().floor()[0], 0.0);
        assert_eq!((&parts[0] / 4.0).ceil()[1], 1.0);
    }

    #[test]
    fn conflicting_sizes() {
        let reg = registry();
        let mut other = VarRegistry::new();
        other.register(1, 5).unwrap();
        let f = linear(&reg, &[1], 1.0);
        let g = linear(&other, &[1], 1.0);
        assert!(matches!(f.zip_with(&g, |a, b| a + b), Err(MaxSumError::BadDomain(_))));
    }

    #[test]
    #[should_panic]
    fn conflicting_sizes_operator_panics() {
        let reg = registry();
        let mut other = VarRegistry::new();
        other.register(1, 5).unwrap();
        let _ = &linear(&reg, &[1], 1.0) + &linear(&other, &[1], 1.0);
    }
}
