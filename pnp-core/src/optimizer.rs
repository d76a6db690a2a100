use crate::graph::ComputationGraph;
use crate::Result;

/// Gradient-descent collaborator driven by the training harness.
pub trait Optimizer<G: ComputationGraph + ?Sized> {
    /// Apply one gradient step using the gradients accumulated in `graph`.
    fn update(&mut self, graph: &mut G) -> Result<()>;

    /// Epoch-boundary bookkeeping (e.g. learning-rate decay).
    fn update_epoch(&mut self);
}
