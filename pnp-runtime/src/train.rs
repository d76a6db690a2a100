//! Training harness: fit graph parameters so that beam search prefers the
//! label-consistent executions of each example.

use tracing::{debug, info, warn};

use pnp_core::{
    ComputationGraph, Env, ExecutionScore, Expr, NullLogger, Objective, Optimizer, PnpError,
    Result, SearchLogger, TrainingConfig,
};

use crate::marginals::Marginals;
use crate::program::Program;

const TRAIN_TIMER: &str = "pnp_train";

/// A training example.
///
/// `conditional` is the same computation as `unconditional`, augmented so
/// that `oracle` keeps only the paths consistent with the gold label.
pub struct Example<A> {
    pub unconditional: Program<A>,
    pub conditional: Program<A>,
    pub env: Env,
    pub oracle: ExecutionScore,
}

impl<A> Example<A> {
    pub fn new(
        unconditional: Program<A>,
        conditional: Program<A>,
        env: Env,
        oracle: ExecutionScore,
    ) -> Self {
        Self {
            unconditional,
            conditional,
            env,
            oracle,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingStats {
    pub epochs: usize,
    /// Examples that produced a parameter update.
    pub examples: usize,
    /// Examples whose search found no label-consistent execution.
    pub search_errors: usize,
    /// Summed loss per epoch.
    pub losses: Vec<f64>,
}

pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn train<A, G, O>(
        &self,
        graph: &mut G,
        optimizer: &mut O,
        examples: &[Example<A>],
        logger: &mut dyn SearchLogger,
    ) -> Result<TrainingStats>
    where
        A: Clone + 'static,
        G: ComputationGraph,
        O: Optimizer<G>,
    {
        logger.start_timer(TRAIN_TIMER);
        let result = self.run_epochs(graph, optimizer, examples, logger);
        logger.stop_timer(TRAIN_TIMER);
        result
    }

    fn run_epochs<A, G, O>(
        &self,
        graph: &mut G,
        optimizer: &mut O,
        examples: &[Example<A>],
        logger: &mut dyn SearchLogger,
    ) -> Result<TrainingStats>
    where
        A: Clone + 'static,
        G: ComputationGraph,
        O: Optimizer<G>,
    {
        let mut stats = TrainingStats::default();

        for epoch in 0..self.config.epochs {
            logger.notify_iteration_start(epoch);
            let mut epoch_loss = 0.0;
            let mut epoch_errors = 0;

            for (index, example) in examples.iter().enumerate() {
                graph.renew();
                let Some(loss) = self.example_loss(index, example, graph, logger)? else {
                    epoch_errors += 1;
                    continue;
                };

                let value = graph.forward(&loss)?;
                let value = value.first().copied().ok_or_else(|| PnpError::ShapeMismatch {
                    expected: vec![1],
                    got: vec![0],
                })?;
                debug!(epoch, example = index, loss = value, "example loss");
                epoch_loss += value;

                graph.backward(&loss)?;
                optimizer.update(graph)?;
                stats.examples += 1;
            }

            optimizer.update_epoch();
            stats.search_errors += epoch_errors;
            stats.losses.push(epoch_loss);
            stats.epochs += 1;
            logger.log_statistic(epoch, "loss", epoch_loss);
            logger.log_statistic(epoch, "search_errors", epoch_errors as f64);
            info!(
                epoch,
                loss = epoch_loss,
                search_errors = epoch_errors,
                "training epoch done"
            );
            logger.notify_iteration_end(epoch);
        }

        Ok(stats)
    }

    /// The negative log-likelihood of one example, or `None` when the search
    /// found nothing to learn from.
    fn example_loss<A: Clone + 'static, G: ComputationGraph>(
        &self,
        index: usize,
        example: &Example<A>,
        graph: &G,
        logger: &mut dyn SearchLogger,
    ) -> Result<Option<Expr>> {
        let conditional = example.conditional.beam_search(
            &self.config.search,
            example.env.clone(),
            &example.oracle,
            graph,
            logger,
        )?;
        if conditional.is_empty() {
            warn!(example = index, "no label-consistent execution found");
            return Ok(None);
        }
        if conditional.len() > 1 && !self.config.allow_multiple_labels {
            return Err(PnpError::MultipleLabels {
                example: index,
                count: conditional.len(),
            });
        }
        let gold = log_mass(&conditional);

        match self.config.objective {
            Objective::Loglikelihood => Ok(Some(gold.neg())),
            Objective::GlobalLoglikelihood => {
                let unconditional = example.unconditional.beam_search(
                    &self.config.search,
                    example.env.clone(),
                    &ExecutionScore::zero(),
                    graph,
                    &mut NullLogger,
                )?;
                if unconditional.is_empty() {
                    warn!(example = index, "unconditional search found no execution");
                    return Ok(None);
                }
                Ok(Some(log_mass(&unconditional).sub(&gold)))
            }
        }
    }
}

/// Log of the summed differentiable scores of every execution.
fn log_mass<A>(marginals: &Marginals<A>) -> Expr {
    let mut scores: Vec<Expr> = marginals
        .executions()
        .iter()
        .map(|e| e.env.score().clone())
        .collect();
    if scores.len() == 1 {
        return scores.remove(0);
    }
    Expr::log_sum_exp(scores)
}
