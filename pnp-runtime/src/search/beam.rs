use tracing::debug;

use pnp_core::{ComputationGraph, Env, ExecutionScore, Result, SearchConfig, SearchLogger};

use crate::marginals::Marginals;
use crate::program::Program;
use crate::queue::{BeamQueue, SearchQueue, SearchState};
use crate::step::{search_step, StepContext};

const BEAM_TIMER: &str = "pnp_beam_search";

pub(crate) fn run<A: Clone + 'static>(
    program: &Program<A>,
    config: &SearchConfig,
    env: Env,
    score: &ExecutionScore,
    graph: &dyn ComputationGraph,
    logger: &mut dyn SearchLogger,
) -> Result<Marginals<A>> {
    let ctx = StepContext { graph, score };
    let mut queue = BeamQueue::new(config.beam_size, score);
    let mut finished = BeamQueue::new(config.beam_size, score);
    queue.offer(SearchState::root(program.node().clone(), env.clone(), 0.0), &env);

    logger.start_timer(BEAM_TIMER);
    let mut iterations = 0;
    while !queue.is_empty() && (config.max_iterations == 0 || iterations < config.max_iterations) {
        logger.notify_iteration_start(iterations);

        // Everything admitted while advancing this snapshot waits for the
        // next round.
        let frontier = queue.drain();
        let advanced = frontier.len();
        for state in frontier {
            if let Err(e) = search_step(state, &ctx, &mut queue, &mut finished) {
                logger.stop_timer(BEAM_TIMER);
                return Err(e);
            }
        }

        debug!(
            iteration = iterations,
            advanced,
            frontier = queue.len(),
            finished = finished.len(),
            "beam iteration"
        );
        logger.log_statistic(iterations, "frontier_size", queue.len() as f64);
        logger.notify_iteration_end(iterations);
        iterations += 1;
    }
    logger.stop_timer(BEAM_TIMER);

    if !queue.is_empty() {
        debug!(iterations, pending = queue.len(), "beam search truncated at iteration cap");
    }

    let executions = finished
        .into_sorted_vec()
        .into_iter()
        .map(SearchState::into_execution::<A>)
        .collect::<Result<Vec<_>>>()?;
    Ok(Marginals::new(executions, iterations))
}
