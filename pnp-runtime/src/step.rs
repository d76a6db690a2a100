//! Program transitions.
//!
//! [`advance`] runs a program's deterministic prefix until it reaches a
//! choice, a collapsed sub-computation, or a final value. The drivers decide
//! what to do at a choice: enqueue every alternative ([`search_step`]),
//! resolve all of them depth first ([`resolve`]), or draw one (sampling).

use std::rc::Rc;

use pnp_core::{ComputationGraph, Env, ExecutionScore, PnpError, Result};

use crate::continuation::{AnyValue, Chain};
use crate::program::{unit, Node, NodeRef, Tag};
use crate::queue::{ChoiceSite, ContinueQueue, SearchQueue, SearchState, SpliceQueue};

pub(crate) struct StepContext<'a> {
    pub(crate) graph: &'a dyn ComputationGraph,
    pub(crate) score: &'a ExecutionScore,
}

pub(crate) struct Alternative {
    pub(crate) value: AnyValue,
    pub(crate) log_weight: f64,
    pub(crate) env: Env,
}

pub(crate) enum Transition {
    Finished {
        value: AnyValue,
        env: Env,
        log_prob: f64,
    },
    Choice {
        site: NodeRef,
        alternatives: Vec<Alternative>,
        tag: Option<Tag>,
        cont: Chain,
        log_prob: f64,
    },
    Collapsed {
        inner: NodeRef,
        cont: Chain,
        env: Env,
        log_prob: f64,
    },
}

pub(crate) fn advance(
    mut node: NodeRef,
    mut cont: Chain,
    mut env: Env,
    mut log_prob: f64,
    graph: &dyn ComputationGraph,
) -> Result<Transition> {
    loop {
        let current = node.clone();
        let value: AnyValue = match &*current {
            Node::Value(v) => v.clone(),
            Node::Bind(inner, k) => {
                cont = k.append(&cont);
                node = inner.clone();
                continue;
            }
            Node::Categorical { dist, tag } => {
                let alternatives = dist
                    .iter()
                    .map(|(value, log_weight)| Alternative {
                        value: value.clone(),
                        log_weight: *log_weight,
                        env: env.clone(),
                    })
                    .collect();
                return Ok(Transition::Choice {
                    site: current.clone(),
                    alternatives,
                    tag: tag.clone(),
                    cont,
                    log_prob,
                });
            }
            Node::Neural {
                items,
                parameter,
                tag,
            } => {
                let alternatives = neural_alternatives(items, parameter, &env, graph)?;
                return Ok(Transition::Choice {
                    site: current.clone(),
                    alternatives,
                    tag: tag.clone(),
                    cont,
                    log_prob,
                });
            }
            Node::Score(weight) => {
                if weight.is_nan() || *weight < 0.0 {
                    return Err(PnpError::InvalidArgument(format!(
                        "score weight must be non-negative, got {weight}"
                    )));
                }
                log_prob += weight.ln();
                unit()
            }
            Node::GetEnv => Rc::new(env.clone()),
            Node::SetEnv(next) => {
                env = next.clone();
                unit()
            }
            Node::Graph(f) => {
                node = f(graph)?;
                continue;
            }
            Node::StartTimer(name) => {
                env = env.start_timer(name);
                unit()
            }
            Node::StopTimer(name) => {
                env = env.stop_timer(name);
                unit()
            }
            Node::Collapsed(inner) => {
                return Ok(Transition::Collapsed {
                    inner: inner.clone(),
                    cont,
                    env,
                    log_prob,
                });
            }
        };

        match cont.split() {
            None => {
                return Ok(Transition::Finished {
                    value,
                    env,
                    log_prob,
                })
            }
            Some((step, rest)) => {
                let next = step(value)?;
                let rest = rest.clone();
                node = next;
                cont = rest;
            }
        }
    }
}

fn neural_alternatives(
    items: &[AnyValue],
    parameter: &str,
    env: &Env,
    graph: &dyn ComputationGraph,
) -> Result<Vec<Alternative>> {
    let mut expr = graph.parameter(parameter)?;
    if graph.locally_normalized() {
        expr = expr.log_softmax();
    }
    let weights = graph.forward(&expr)?;
    if weights.len() != items.len() {
        return Err(PnpError::DimensionMismatch {
            parameter: parameter.to_string(),
            expected: items.len(),
            got: weights.len(),
        });
    }
    Ok(items
        .iter()
        .zip(weights)
        .enumerate()
        .map(|(index, (item, log_weight))| Alternative {
            value: item.clone(),
            log_weight,
            env: env.add_label(parameter, index).add_score(expr.pick(index)),
        })
        .collect())
}

/// Advance one state by one transition: choices become frontier entries,
/// a final value becomes a finished result, and a collapsed sub-program is
/// resolved in place with its results re-entering the frontier.
pub(crate) fn search_step(
    state: SearchState,
    ctx: &StepContext<'_>,
    queue: &mut dyn SearchQueue,
    finished: &mut dyn SearchQueue,
) -> Result<()> {
    let source_env = state.env.clone();
    match advance(state.program, Chain::end(), state.env, state.log_prob, ctx.graph)? {
        Transition::Finished {
            value,
            env,
            log_prob,
        } => finished.offer(SearchState::finished(value, env, log_prob), &source_env),
        Transition::Choice {
            site,
            alternatives,
            tag,
            cont,
            log_prob,
        } => {
            for (index, alternative) in alternatives.into_iter().enumerate() {
                let next = SearchState {
                    program: Node::bind_value(alternative.value.clone(), cont.clone()),
                    env: alternative.env,
                    log_prob: log_prob + alternative.log_weight,
                    tag: tag.clone(),
                    choice: Some(alternative.value),
                    site: Some(ChoiceSite {
                        node: site.clone(),
                        cont: cont.clone(),
                        index,
                    }),
                };
                queue.offer(next, &source_env);
            }
        }
        Transition::Collapsed {
            inner,
            cont,
            env,
            log_prob,
        } => {
            let mut splice = SpliceQueue::new(queue, cont);
            resolve(inner, env, log_prob, ctx, &mut splice)?;
        }
    }
    Ok(())
}

/// Resolve `program` completely, depth first, offering every finished
/// result to `finished`.
pub(crate) fn resolve(
    program: NodeRef,
    env: Env,
    log_prob: f64,
    ctx: &StepContext<'_>,
    finished: &mut dyn SearchQueue,
) -> Result<()> {
    let mut pending = ContinueQueue::new(ctx.score);
    pending.push(SearchState::root(program, env, log_prob));
    while let Some(state) = pending.pop() {
        search_step(state, ctx, &mut pending, finished)?;
    }
    Ok(())
}
