//! CPU reference backend: a named-parameter computation graph and a plain
//! SGD optimizer.

mod graph;
mod optimizer;

pub use graph::{CpuGraph, Parameter};
pub use optimizer::SgdOptimizer;
