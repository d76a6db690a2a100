//! Search queues: where transitions deliver successor and finished states.
//!
//! Every queue applies the active [`ExecutionScore`] on `offer`; a state whose
//! score becomes `-inf` is dropped silently.

use std::rc::Rc;

use pnp_core::{Env, ExecutionScore, PnpError, Result};
use pnp_frontier::{KBest, Unbounded};

use crate::continuation::{downcast, AnyValue, Chain};
use crate::marginals::Execution;
use crate::program::{Node, NodeRef, Tag};

/// Identifies the choice that produced a state: the choice node, the
/// continuation it resumes, and the alternative taken. Holding the handles
/// keeps their addresses from being reused while the site is alive.
#[derive(Clone)]
pub(crate) struct ChoiceSite {
    pub(crate) node: NodeRef,
    pub(crate) cont: Chain,
    pub(crate) index: usize,
}

impl ChoiceSite {
    pub(crate) fn key(&self) -> (usize, usize, usize) {
        (Rc::as_ptr(&self.node) as usize, self.cont.id(), self.index)
    }
}

/// A frontier entry: a suspended computation together with its environment
/// and accumulated log-probability.
pub struct SearchState {
    pub(crate) program: NodeRef,
    pub(crate) env: Env,
    pub(crate) log_prob: f64,
    pub(crate) tag: Option<Tag>,
    pub(crate) choice: Option<AnyValue>,
    pub(crate) site: Option<ChoiceSite>,
}

impl SearchState {
    pub(crate) fn root(program: NodeRef, env: Env, log_prob: f64) -> Self {
        Self {
            program,
            env,
            log_prob,
            tag: None,
            choice: None,
            site: None,
        }
    }

    pub(crate) fn finished(value: AnyValue, env: Env, log_prob: f64) -> Self {
        Self::root(Rc::new(Node::Value(value)), env, log_prob)
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn log_prob(&self) -> f64 {
        self.log_prob
    }

    pub fn is_finished(&self) -> bool {
        matches!(&*self.program, Node::Value(_))
    }

    pub(crate) fn into_execution<A: Clone + 'static>(self) -> Result<Execution<A>> {
        match &*self.program {
            Node::Value(v) => Ok(Execution {
                value: downcast(v.clone())?,
                env: self.env,
                log_prob: self.log_prob,
            }),
            _ => Err(PnpError::Unsupported(
                "an unfinished search state has no execution".into(),
            )),
        }
    }

    /// Add the execution score to this state, or `None` if it rejects it.
    fn scored(mut self, score: &ExecutionScore) -> Option<Self> {
        let delta = score.evaluate(self.tag.as_deref(), self.choice.as_deref(), &self.env);
        let log_prob = self.log_prob + delta;
        if log_prob.is_nan() || log_prob == f64::NEG_INFINITY {
            return None;
        }
        self.log_prob = log_prob;
        Some(self)
    }
}

pub trait SearchQueue {
    /// Offer a successor state. `source_env` is the environment of the state
    /// whose transition produced it.
    fn offer(&mut self, state: SearchState, source_env: &Env);
}

// ── Beam ────────────────────────────────────────────────────────

/// Bounded best-first queue retaining the `beam_size` most probable states.
pub struct BeamQueue<'s> {
    frontier: KBest<SearchState>,
    score: &'s ExecutionScore,
}

impl<'s> BeamQueue<'s> {
    pub fn new(beam_size: usize, score: &'s ExecutionScore) -> Self {
        Self {
            frontier: KBest::new(beam_size),
            score,
        }
    }

    pub fn len(&self) -> usize {
        self.frontier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frontier.is_empty()
    }

    /// Remove every state, best first.
    pub fn drain(&mut self) -> Vec<SearchState> {
        self.frontier
            .drain_sorted()
            .into_iter()
            .map(|(_, state)| state)
            .collect()
    }

    pub fn into_sorted_vec(self) -> Vec<SearchState> {
        self.frontier
            .into_sorted_vec()
            .into_iter()
            .map(|(_, state)| state)
            .collect()
    }
}

impl SearchQueue for BeamQueue<'_> {
    fn offer(&mut self, state: SearchState, _source_env: &Env) {
        if let Some(state) = state.scored(self.score) {
            self.frontier.push(state.log_prob, state);
        }
    }
}

// ── Enumerate ───────────────────────────────────────────────────

/// Unbounded queue retaining every admitted state.
pub struct EnumerateQueue<'s> {
    frontier: Unbounded<SearchState>,
    score: &'s ExecutionScore,
}

impl<'s> EnumerateQueue<'s> {
    pub fn new(score: &'s ExecutionScore) -> Self {
        Self {
            frontier: Unbounded::new(),
            score,
        }
    }

    pub fn len(&self) -> usize {
        self.frontier.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frontier.is_empty()
    }

    pub fn clear(&mut self) {
        self.frontier.clear();
    }

    /// Remove every state in admission order.
    pub fn drain(&mut self) -> Vec<SearchState> {
        self.frontier
            .drain()
            .into_iter()
            .map(|(_, state)| state)
            .collect()
    }

    pub fn into_sorted_vec(self) -> Vec<SearchState> {
        self.frontier
            .into_sorted_vec()
            .into_iter()
            .map(|(_, state)| state)
            .collect()
    }
}

impl SearchQueue for EnumerateQueue<'_> {
    fn offer(&mut self, state: SearchState, _source_env: &Env) {
        if let Some(state) = state.scored(self.score) {
            self.frontier.push(state.log_prob, state);
        }
    }
}

// ── Continue ────────────────────────────────────────────────────

/// Depth-first stack of states that are resolved to completion before the
/// enclosing search continues.
///
/// Environment timers are paused while a state waits on the stack and
/// resumed when it is popped for advancement, so queue bookkeeping is not
/// charged to the program's own timers.
pub struct ContinueQueue<'s> {
    pending: Unbounded<SearchState>,
    score: &'s ExecutionScore,
}

impl<'s> ContinueQueue<'s> {
    pub fn new(score: &'s ExecutionScore) -> Self {
        Self {
            pending: Unbounded::new(),
            score,
        }
    }

    /// Push a state that has already been scored.
    pub(crate) fn push(&mut self, mut state: SearchState) {
        state.env = state.env.pause_timers();
        self.pending.push(state.log_prob, state);
    }

    pub(crate) fn pop(&mut self) -> Option<SearchState> {
        self.pending.pop().map(|(_, mut state)| {
            state.env = state.env.resume_timers();
            state
        })
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl SearchQueue for ContinueQueue<'_> {
    fn offer(&mut self, state: SearchState, _source_env: &Env) {
        if let Some(state) = state.scored(self.score) {
            self.push(state);
        }
    }
}

// ── Continuation splice ─────────────────────────────────────────

/// Grafts offered states onto a continuation before delegating to `target`.
pub struct SpliceQueue<'q> {
    target: &'q mut dyn SearchQueue,
    cont: Chain,
}

impl<'q> SpliceQueue<'q> {
    pub(crate) fn new(target: &'q mut dyn SearchQueue, cont: Chain) -> Self {
        Self { target, cont }
    }
}

impl SearchQueue for SpliceQueue<'_> {
    fn offer(&mut self, mut state: SearchState, source_env: &Env) {
        if !self.cont.is_end() {
            state.program = Rc::new(Node::Bind(state.program, self.cont.clone()));
        }
        state.site = None;
        self.target.offer(state, source_env);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuation::Continuation;

    fn state(value: u32, log_prob: f64, env: Env) -> SearchState {
        SearchState::finished(Rc::new(value), env, log_prob)
    }

    #[test]
    fn test_beam_queue_drops_rejected_states() {
        let score = ExecutionScore::filter(|env| !env.contains("reject"));
        let mut queue = BeamQueue::new(2, &score);
        let env = Env::init();
        queue.offer(state(1, -1.0, env.clone()), &env);
        queue.offer(state(2, -0.5, env.set("reject", ())), &env);
        queue.offer(state(3, -3.0, env.clone()), &env);
        queue.offer(state(4, -2.0, env.clone()), &env);
        let kept: Vec<f64> = queue.drain().iter().map(|s| s.log_prob()).collect();
        assert_eq!(kept, vec![-1.0, -2.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_continue_queue_pauses_timers_while_waiting() {
        let score = ExecutionScore::zero();
        let mut queue = ContinueQueue::new(&score);
        let env = Env::init().start_timer("parse");
        queue.offer(state(1, 0.0, env.clone()), &env);
        let waiting = queue.pending.iter().next().map(|(_, s)| s.env.clone()).unwrap();
        assert!(!waiting.is_timer_running("parse"));
        let popped = queue.pop().unwrap();
        assert!(popped.env.is_timer_running("parse"));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_splice_queue_wraps_in_continuation() {
        let score = ExecutionScore::zero();
        let mut target = EnumerateQueue::new(&score);
        let cont = Continuation::<u32, u32>::map(|n| n + 1).chain;
        {
            let mut splice = SpliceQueue::new(&mut target, cont);
            let env = Env::init();
            splice.offer(state(1, 0.0, env.clone()), &env);
        }
        let states = target.drain();
        assert_eq!(states.len(), 1);
        assert!(!states[0].is_finished());
        assert!(states[0].site.is_none());
    }

    #[test]
    fn test_enumerate_queue_clear_between_rounds() {
        let score = ExecutionScore::filter(|env| !env.contains("reject"));
        let mut queue = EnumerateQueue::new(&score);
        let env = Env::init();
        queue.offer(state(1, -1.0, env.clone()), &env);
        queue.offer(state(2, -0.5, env.set("reject", ())), &env);
        queue.offer(state(3, -2.0, env.clone()), &env);
        assert_eq!(queue.len(), 2);

        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.drain().is_empty());

        queue.offer(state(4, -0.25, env.clone()), &env);
        let kept: Vec<f64> = queue.into_sorted_vec().iter().map(|s| s.log_prob()).collect();
        assert_eq!(kept, vec![-0.25]);
    }
}
