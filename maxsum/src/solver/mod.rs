//! Factor graphs and the max-sum solver running on them.

mod factor_graph;
mod max_sum;

pub use factor_graph::{Edge, FactorGraph};
pub use max_sum::{MaxSumController, RunStats};
