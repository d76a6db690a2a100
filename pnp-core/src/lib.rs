//! Pnp core types, traits, and error definitions.

pub mod env;
pub mod error;
pub mod graph;
pub mod logger;
pub mod optimizer;
pub mod score;
pub mod types;

pub use env::{ChoiceLabel, Env};
pub use error::{PnpError, Result};
pub use graph::{ComputationGraph, Expr, ExprNode};
pub use logger::{NullLogger, SearchLogger, TracingLogger};
pub use optimizer::Optimizer;
pub use score::ExecutionScore;
pub use types::*;
