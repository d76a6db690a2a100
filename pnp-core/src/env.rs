//! Environment threaded through every program transition.
//!
//! An [`Env`] has value semantics: every mutator returns a new environment
//! and leaves the receiver untouched. The maps are reference counted and
//! copied on write, so cloning an environment into many frontier states is
//! cheap and a mutation only copies the map it touches.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::graph::Expr;
use crate::{PnpError, Result};

/// A `(parameter, index)` pair recorded when a neural choice selects item
/// `index` of the parameter's vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChoiceLabel {
    pub parameter: String,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Timer {
    elapsed: Duration,
    started: Option<Instant>,
}

#[derive(Clone)]
pub struct Env {
    vars: Rc<HashMap<String, Rc<dyn Any>>>,
    score: Expr,
    labels: Rc<Vec<ChoiceLabel>>,
    timers: Rc<HashMap<String, Timer>>,
    /// Names of running timers, innermost last.
    active: Rc<Vec<String>>,
}

impl Env {
    pub fn init() -> Self {
        Self {
            vars: Rc::new(HashMap::new()),
            score: Expr::zero(),
            labels: Rc::new(Vec::new()),
            timers: Rc::new(HashMap::new()),
            active: Rc::new(Vec::new()),
        }
    }

    // ── Variables ───────────────────────────────────────────────

    pub fn get<T: 'static>(&self, name: &str) -> Result<&T> {
        self.get_any(name)?
            .downcast_ref::<T>()
            .ok_or_else(|| PnpError::VariableType {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    pub fn get_any(&self, name: &str) -> Result<&Rc<dyn Any>> {
        self.vars
            .get(name)
            .ok_or_else(|| PnpError::UnboundVariable(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    #[must_use]
    pub fn set<T: 'static>(&self, name: impl Into<String>, value: T) -> Self {
        self.set_any(name, Rc::new(value))
    }

    #[must_use]
    pub fn set_any(&self, name: impl Into<String>, value: Rc<dyn Any>) -> Self {
        let mut next = self.clone();
        Rc::make_mut(&mut next.vars).insert(name.into(), value);
        next
    }

    /// Pointer identity of the variable map. Two environments with the same
    /// id hold the same variable bindings.
    pub fn vars_id(&self) -> usize {
        Rc::as_ptr(&self.vars) as *const () as usize
    }

    // ── Differentiable score ────────────────────────────────────

    pub fn score(&self) -> &Expr {
        &self.score
    }

    #[must_use]
    pub fn set_score(&self, score: Expr) -> Self {
        Self {
            score,
            ..self.clone()
        }
    }

    #[must_use]
    pub fn add_score(&self, term: Expr) -> Self {
        let score = if self.score.is_zero() {
            term
        } else {
            self.score.add(&term)
        };
        self.set_score(score)
    }

    // ── Choice labels ───────────────────────────────────────────

    pub fn labels(&self) -> &[ChoiceLabel] {
        &self.labels
    }

    #[must_use]
    pub fn add_label(&self, parameter: impl Into<String>, index: usize) -> Self {
        let mut next = self.clone();
        Rc::make_mut(&mut next.labels).push(ChoiceLabel {
            parameter: parameter.into(),
            index,
        });
        next
    }

    // ── Timers ──────────────────────────────────────────────────

    #[must_use]
    pub fn start_timer(&self, name: &str) -> Self {
        let mut next = self.clone();
        let timer = Rc::make_mut(&mut next.timers)
            .entry(name.to_string())
            .or_default();
        if timer.started.is_none() {
            timer.started = Some(Instant::now());
        }
        let active = Rc::make_mut(&mut next.active);
        if !active.iter().any(|n| n == name) {
            active.push(name.to_string());
        }
        next
    }

    /// Stop a running timer, adding its running time to the total.
    /// Stopping a timer that is not running changes nothing.
    #[must_use]
    pub fn stop_timer(&self, name: &str) -> Self {
        if !self.active.iter().any(|n| n == name) {
            return self.clone();
        }
        let mut next = self.clone();
        if let Some(timer) = Rc::make_mut(&mut next.timers).get_mut(name) {
            if let Some(started) = timer.started.take() {
                timer.elapsed += started.elapsed();
            }
        }
        Rc::make_mut(&mut next.active).retain(|n| n != name);
        next
    }

    /// Suspend every running timer without removing it from the active set.
    #[must_use]
    pub fn pause_timers(&self) -> Self {
        if self.active.is_empty() {
            return self.clone();
        }
        let mut next = self.clone();
        let timers = Rc::make_mut(&mut next.timers);
        for name in self.active.iter() {
            if let Some(timer) = timers.get_mut(name) {
                if let Some(started) = timer.started.take() {
                    timer.elapsed += started.elapsed();
                }
            }
        }
        next
    }

    /// Restart every timer suspended by [`Env::pause_timers`].
    #[must_use]
    pub fn resume_timers(&self) -> Self {
        if self.active.is_empty() {
            return self.clone();
        }
        let mut next = self.clone();
        let now = Instant::now();
        let timers = Rc::make_mut(&mut next.timers);
        for name in self.active.iter() {
            if let Some(timer) = timers.get_mut(name) {
                timer.started.get_or_insert(now);
            }
        }
        next
    }

    /// Total time accumulated by a timer, including a running interval.
    pub fn timer_elapsed(&self, name: &str) -> Duration {
        self.timers
            .get(name)
            .map(|t| t.elapsed + t.started.map(|s| s.elapsed()).unwrap_or_default())
            .unwrap_or_default()
    }

    pub fn is_timer_running(&self, name: &str) -> bool {
        self.timers
            .get(name)
            .is_some_and(|t| t.started.is_some())
    }

    pub fn active_timers(&self) -> &[String] {
        &self.active
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::init()
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.vars.keys().collect();
        names.sort();
        f.debug_struct("Env")
            .field("vars", &names)
            .field("labels", &self.labels)
            .field("active_timers", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_returns_new_env() {
        let base = Env::init();
        let next = base.set("x", 3usize);
        assert!(!base.contains("x"));
        assert_eq!(*next.get::<usize>("x").unwrap(), 3);
    }

    #[test]
    fn test_get_wrong_type() {
        let env = Env::init().set("x", 3usize);
        assert!(matches!(
            env.get::<String>("x"),
            Err(PnpError::VariableType { .. })
        ));
        assert!(matches!(
            env.get::<usize>("y"),
            Err(PnpError::UnboundVariable(_))
        ));
    }

    #[test]
    fn test_labels_do_not_alias() {
        let base = Env::init().add_label("p", 0);
        let left = base.add_label("p", 1);
        let right = base.add_label("q", 2);
        assert_eq!(base.labels().len(), 1);
        assert_eq!(left.labels()[1].index, 1);
        assert_eq!(right.labels()[1].parameter, "q");
    }

    #[test]
    fn test_timer_lifecycle() {
        let env = Env::init().start_timer("parse");
        assert!(env.is_timer_running("parse"));
        let paused = env.pause_timers();
        assert!(!paused.is_timer_running("parse"));
        assert_eq!(paused.active_timers().to_vec(), vec!["parse".to_string()]);
        let resumed = paused.resume_timers();
        assert!(resumed.is_timer_running("parse"));
        let stopped = resumed.stop_timer("parse");
        assert!(!stopped.is_timer_running("parse"));
        assert!(stopped.active_timers().is_empty());
        // Stopping again is a no-op.
        let again = stopped.stop_timer("parse");
        assert_eq!(again.timer_elapsed("parse"), stopped.timer_elapsed("parse"));
    }

    #[test]
    fn test_add_score_starts_from_zero() {
        let env = Env::init();
        assert!(env.score().is_zero());
        let scored = env.add_score(Expr::scalar(1.5));
        assert!(!scored.score().is_zero());
        assert!(env.score().is_zero());
    }
}
