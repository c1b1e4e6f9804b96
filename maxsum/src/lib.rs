//! Max-sum optimisation over factor graphs of discrete functions.
//!
//! The crate is built around [`DiscreteFunction`], a dense array whose axes are
//! named by variable ids rather than positions, and [`MaxSumController`], which
//! runs the max-sum (generalised distributive law) message passing algorithm on
//! a set of such functions to find a joint assignment maximising their sum.
//!
//! Variable domain sizes live in an explicit [`VarRegistry`] that is handed to
//! every constructor that needs to resolve a variable id.

pub mod domain;
pub mod domain_iter;
pub mod function;
pub mod registry;
pub mod solver;

pub use domain::{ind2sub, sub2ind, Domain};
pub use domain_iter::DomainIterator;
pub use function::marginal::{condition, marginal, max_marginal, mean_marginal, min_marginal};
pub use function::{equal_within_tolerance, same_domain, strictly_equal_within_tolerance};
pub use function::DiscreteFunction;
pub use registry::VarRegistry;
pub use solver::{Edge, FactorGraph, MaxSumController, RunStats};

use thiserror::Error;

/// Identifier of a variable.
pub type VarId = u32;
/// Identifier of a factor in a factor graph.
pub type FactorId = u32;
/// Index of a value in a domain (sub-index or linear index).
pub type ValIndex = usize;
/// Values taken by discrete functions.
pub type ValType = f64;

/// Relative tolerance used when comparing function values.
pub const DEFAULT_VALUE_TOLERANCE: ValType = 1e-6;
/// Default bound on the number of max-sum sweeps.
pub const DEFAULT_MAX_ITERATIONS: usize = 100;
/// Default maxnorm threshold on belief changes below which max-sum stops.
pub const DEFAULT_CONVERGENCE_TOLERANCE: ValType = 1e-7;

pub type Result<T> = std::result::Result<T, MaxSumError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MaxSumError {
    #[error("Variable {0} is not registered.")]
    UnknownVariable(VarId),
    #[error("Variable {var} is registered with domain size {registered}, cannot re-register it with size {requested}.")]
    DomainSizeConflict {
        var: VarId,
        registered: ValIndex,
        requested: ValIndex,
    },
    #[error("Variable {0} cannot have an empty domain.")]
    ZeroDomainSize(VarId),
    #[error("Bad domain: {0}")]
    BadDomain(String),
    #[error("Sub-index {index} out of range for variable {var} (domain size {size}).")]
    IndexOutOfRange {
        var: VarId,
        index: ValIndex,
        size: ValIndex,
    },
    #[error("Sub-index {index} out of range for dimension {dim} (size {size}).")]
    DimIndexOutOfRange {
        dim: usize,
        index: ValIndex,
        size: ValIndex,
    },
    #[error("Linear index {index} out of range (domain size {size}).")]
    LinearIndexOutOfRange { index: ValIndex, size: ValIndex },
    #[error("Wrong number of values: got {got}, expected {expected}.")]
    ValueCount { expected: usize, got: usize },
}

/// Parameters of the max-sum message passing loop.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Config {
    /// Maximum number of sweeps performed by a call to `optimise`.
    pub max_iterations: usize,
    /// Sweeps stop once no belief changes by more than this (maxnorm).
    pub tolerance: ValType,
    /// Compute the messages of a sweep with rayon.
    pub parallel: bool,
}

impl Config {
    pub fn new(max_iterations: usize, tolerance: ValType) -> Self {
        Self {
            max_iterations,
            tolerance,
            parallel: true,
        }
    }
    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ITERATIONS, DEFAULT_CONVERGENCE_TOLERANCE)
    }
}
