use tracing::debug;

use pnp_core::{Optimizer, Result};

use crate::graph::CpuGraph;

/// Stochastic gradient descent with `lr = initial / (1 + decay * epoch)`.
#[derive(Debug, Clone)]
pub struct SgdOptimizer {
    initial: f64,
    learning_rate: f64,
    decay: f64,
    epoch: usize,
}

impl SgdOptimizer {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            initial: learning_rate,
            learning_rate,
            decay: 0.0,
            epoch: 0,
        }
    }

    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

impl Optimizer<CpuGraph> for SgdOptimizer {
    fn update(&mut self, graph: &mut CpuGraph) -> Result<()> {
        for (_, param) in graph.parameters_mut() {
            for (v, g) in param.value.iter_mut().zip(param.grad.iter_mut()) {
                *v -= self.learning_rate * *g;
                *g = 0.0;
            }
        }
        Ok(())
    }

    fn update_epoch(&mut self) {
        self.epoch += 1;
        self.learning_rate = self.initial / (1.0 + self.decay * self.epoch as f64);
        debug!(
            epoch = self.epoch,
            learning_rate = self.learning_rate,
            "sgd epoch"
        );
    }
}
