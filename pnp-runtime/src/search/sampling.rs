use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use pnp_core::{
    ComputationGraph, Env, ExecutionScore, PnpError, Result, SamplingConfig, SearchLogger,
};

use crate::continuation::{downcast, AnyValue, Chain};
use crate::marginals::{Execution, Marginals};
use crate::program::{Node, NodeRef, Program};
use crate::step::{advance, Transition};

const SAMPLE_TIMER: &str = "pnp_sample";

/// Draw a single path. Exactly one execution must come out of it; a path
/// whose every alternative was rejected is a sampling failure.
pub(crate) fn sample<A: Clone + 'static, R: Rng + ?Sized>(
    program: &Program<A>,
    env: Env,
    score: &ExecutionScore,
    graph: &dyn ComputationGraph,
    logger: &mut dyn SearchLogger,
    rng: &mut R,
) -> Result<Execution<A>> {
    logger.start_timer(SAMPLE_TIMER);
    let result = sample_path(program.node().clone(), env, score, graph, rng);
    logger.stop_timer(SAMPLE_TIMER);

    match result? {
        Some((value, env, log_prob)) => Ok(Execution {
            value: downcast(value)?,
            env,
            log_prob,
        }),
        None => Err(PnpError::SampleFailed { finished: 0 }),
    }
}

pub(crate) fn sample_many<A: Clone + 'static>(
    program: &Program<A>,
    config: &SamplingConfig,
    env: Env,
    score: &ExecutionScore,
    graph: &dyn ComputationGraph,
    logger: &mut dyn SearchLogger,
) -> Result<Marginals<A>> {
    let mut rng: Box<dyn rand::RngCore> = match config.seed {
        Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
        None => Box::new(rand::thread_rng()),
    };

    let mut executions = Vec::with_capacity(config.num_samples);
    let mut rejected = 0usize;
    for i in 0..config.num_samples {
        logger.notify_iteration_start(i);
        match sample(program, env.clone(), score, graph, logger, &mut *rng) {
            Ok(execution) => executions.push(execution),
            Err(PnpError::SampleFailed { .. }) => rejected += 1,
            Err(e) => return Err(e),
        }
        logger.notify_iteration_end(i);
    }
    logger.log_statistic(config.num_samples, "rejected_samples", rejected as f64);
    debug!(
        samples = config.num_samples,
        finished = executions.len(),
        rejected,
        "sampling done"
    );
    executions.sort_by(|a, b| b.log_prob.total_cmp(&a.log_prob));
    Ok(Marginals::new(executions, config.num_samples))
}

/// Walk one path by inverse-CDF sampling at every choice. Weights are
/// exponentiated as they are; the draw is uniform over their total mass.
fn sample_path<R: Rng + ?Sized>(
    program: NodeRef,
    env: Env,
    score: &ExecutionScore,
    graph: &dyn ComputationGraph,
    rng: &mut R,
) -> Result<Option<(AnyValue, Env, f64)>> {
    // The initial state is scored like any other offered state.
    let mut log_prob = score.evaluate(None, None, &env);
    if log_prob == f64::NEG_INFINITY || log_prob.is_nan() {
        return Ok(None);
    }
    let mut node = program;
    let mut cont = Chain::end();
    let mut env = env;

    loop {
        match advance(node, cont, env, log_prob, graph)? {
            Transition::Finished {
                value,
                env,
                log_prob,
            } => {
                let delta = score.evaluate(None, None, &env);
                if delta == f64::NEG_INFINITY || delta.is_nan() {
                    return Ok(None);
                }
                return Ok(Some((value, env, log_prob + delta)));
            }
            Transition::Choice {
                alternatives,
                tag,
                cont: rest,
                log_prob: current,
                ..
            } => {
                let weights: Vec<f64> = alternatives
                    .iter()
                    .map(|alt| {
                        alt.log_weight
                            + score.evaluate(tag.as_deref(), Some(&*alt.value), &alt.env)
                    })
                    .collect();
                let Some(index) = draw(&weights, rng) else {
                    trace!(alternatives = weights.len(), "every alternative rejected");
                    return Ok(None);
                };
                let chosen = alternatives
                    .into_iter()
                    .nth(index)
                    .ok_or_else(|| PnpError::Internal("sampled index out of range".into()))?;
                node = Node::bind_value(chosen.value, rest);
                cont = Chain::end();
                env = chosen.env;
                log_prob = current + weights[index];
            }
            Transition::Collapsed {
                inner,
                cont: rest,
                env: inner_env,
                log_prob: current,
            } => {
                node = inner;
                cont = rest;
                env = inner_env;
                log_prob = current;
            }
        }
    }
}

/// Index of the first alternative whose cumulative probability covers a
/// uniform draw in `[0, total)`, or `None` if every weight is zero.
///
/// Weights are shifted by their maximum before exponentiating, which leaves
/// the proportions unchanged and keeps large raw weights finite.
fn draw<R: Rng + ?Sized>(log_weights: &[f64], rng: &mut R) -> Option<usize> {
    let max = log_weights
        .iter()
        .copied()
        .filter(|w| !w.is_nan())
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return None;
    }
    let probs: Vec<f64> = log_weights.iter().map(|w| (w - max).exp()).collect();
    let total: f64 = probs.iter().filter(|p| p.is_finite()).sum();
    if !(total > 0.0) {
        return None;
    }
    let r = rng.gen::<f64>() * total;
    let mut cumulative = 0.0;
    let mut last = None;
    for (i, &p) in probs.iter().enumerate() {
        if !(p > 0.0) || !p.is_finite() {
            continue;
        }
        cumulative += p;
        last = Some(i);
        if cumulative > r {
            return Some(i);
        }
    }
    // Rounding can leave the draw just past the final boundary.
    last
}
