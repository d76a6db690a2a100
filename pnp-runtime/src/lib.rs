//! Search runtime for nondeterministic programs: program combinators,
//! continuations, search queues, and the beam, sum-product and sampling
//! drivers, plus a training harness built on beam search.

mod continuation;
pub mod marginals;
pub mod program;
pub mod queue;
pub mod search;
mod step;
pub mod train;

pub use continuation::Continuation;
pub use marginals::{log_sum_exp, Execution, Marginals};
pub use program::Program;
pub use queue::{BeamQueue, ContinueQueue, EnumerateQueue, SearchQueue, SearchState, SpliceQueue};
pub use search::{SumProduct, Terminal};
pub use train::{Example, Trainer, TrainingStats};

pub use pnp_core::{
    ChoiceLabel, ComputationGraph, Env, ExecutionScore, Expr, NullLogger, Objective, Optimizer,
    PnpError, Result, SamplingConfig, SearchConfig, SearchLogger, TracingLogger, TrainingConfig,
};
