//! Search drivers over the tree of nondeterministic choices.

mod beam;
mod sampling;
mod sum_product;

pub use sum_product::{SumProduct, Terminal};

use rand::Rng;

use pnp_core::{
    ComputationGraph, Env, ExecutionScore, Result, SamplingConfig, SearchConfig, SearchLogger,
};

use crate::marginals::{Execution, Marginals};
use crate::program::Program;

impl<A: Clone + 'static> Program<A> {
    /// Beam search: keep the `beam_size` most probable frontier states per
    /// round until the frontier empties or `max_iterations` rounds have run.
    pub fn beam_search(
        &self,
        config: &SearchConfig,
        env: Env,
        score: &ExecutionScore,
        graph: &dyn ComputationGraph,
        logger: &mut dyn SearchLogger,
    ) -> Result<Marginals<A>> {
        beam::run(self, config, env, score, graph, logger)
    }

    /// Exhaustive depth-first exploration of every reachable choice, summing
    /// path probabilities into each terminal. Diagnostic only: nothing is
    /// pruned except by the execution score.
    pub fn sum_product(
        &self,
        config: &SearchConfig,
        env: Env,
        score: &ExecutionScore,
        graph: &dyn ComputationGraph,
        logger: &mut dyn SearchLogger,
    ) -> Result<SumProduct<A>> {
        sum_product::run(self, config, env, score, graph, logger)
    }

    /// Follow one stochastic path through the program.
    pub fn sample<R: Rng + ?Sized>(
        &self,
        env: Env,
        score: &ExecutionScore,
        graph: &dyn ComputationGraph,
        logger: &mut dyn SearchLogger,
        rng: &mut R,
    ) -> Result<Execution<A>> {
        sampling::sample(self, env, score, graph, logger, rng)
    }

    /// Draw `config.num_samples` independent paths. Paths rejected by the
    /// score are left out of the result.
    pub fn sample_many(
        &self,
        config: &SamplingConfig,
        env: Env,
        score: &ExecutionScore,
        graph: &dyn ComputationGraph,
        logger: &mut dyn SearchLogger,
    ) -> Result<Marginals<A>> {
        sampling::sample_many(self, config, env, score, graph, logger)
    }
}
