//! Marginalisation and conditioning of discrete functions.

use super::DiscreteFunction;
use crate::domain_iter::DomainIterator;
use crate::{MaxSumError, Result, ValIndex, ValType, VarId};

/// Reduces the domain of `input` to that of `output` by folding `aggregate`
/// over every eliminated variable, and stores the result in `output`.
///
/// For each joint value of `output`, the fold is seeded with the first
/// matching value of `input` (in linear index order) and then called as
/// `aggregate(previous, next)` for the remaining ones. If both domains are
/// equal, `output` becomes a copy of `input`.
///
/// Fails with [`MaxSumError::BadDomain`] if the domain of `output` is not a
/// subset of the domain of `input`.
pub fn marginal<F>(input: &DiscreteFunction, mut aggregate: F, output: &mut DiscreteFunction) -> Result<()>
where
    F: FnMut(ValType, ValType) -> ValType,
{
    if !input.domain.includes(&output.domain) {
        return Err(MaxSumError::BadDomain(format!(
            "output domain {:?} is not a subset of input domain {:?}",
            output.vars(),
            input.vars()
        )));
    }
    if input.domain == output.domain {
        output.values.assign(&input.values);
        return Ok(());
    }
    let mut seeded = vec![false; output.domain_size()];
    let mut it = DomainIterator::of(input);
    while it.has_next() {
        let next = input.values[it.ind()];
        let k = output.domain.index_in_unchecked(it.vars(), it.sub_ind());
        let acc = &mut output.values[k];
        *acc = if seeded[k] {
            aggregate(*acc, next)
        } else {
            seeded[k] = true;
            next
        };
        it.advance();
    }
    Ok(())
}

pub fn max_marginal(input: &DiscreteFunction, output: &mut DiscreteFunction) -> Result<()> {
    marginal(input, ValType::max, output)
}

pub fn min_marginal(input: &DiscreteFunction, output: &mut DiscreteFunction) -> Result<()> {
    marginal(input, ValType::min, output)
}

/// Averages `input` over every variable not in the domain of `output`.
pub fn mean_marginal(input: &DiscreteFunction, output: &mut DiscreteFunction) -> Result<()> {
    marginal(input, |a, b| a + b, output)?;
    let slice_len = input.domain_size() / output.domain_size();
    *output /= slice_len as ValType;
    Ok(())
}

/// Copy of `input` with `vars` (sorted) fixed to `vals`.
pub fn condition(input: &DiscreteFunction, vars: &[VarId], vals: &[ValIndex]) -> Result<DiscreteFunction> {
    input.conditioned(vars, vals)
}
