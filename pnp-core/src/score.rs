//! Execution scores: log-space weights applied to every offered search state.

use std::any::Any;
use std::fmt;
use std::ops::Add;
use std::rc::Rc;

use crate::env::Env;

type ScoreFn = dyn Fn(Option<&dyn Any>, Option<&dyn Any>, &Env) -> f64;

/// A pure function `(tag, chosen value, env) -> log weight`.
///
/// `tag` and `choice` are `None` for states that were not produced by a
/// choice (the initial state, finished results, collapsed re-entries).
/// Returning `f64::NEG_INFINITY` rejects the state.
#[derive(Clone)]
pub struct ExecutionScore(Rc<ScoreFn>);

impl ExecutionScore {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Option<&dyn Any>, Option<&dyn Any>, &Env) -> f64 + 'static,
    {
        Self(Rc::new(f))
    }

    /// The score that never changes a state's weight.
    pub fn zero() -> Self {
        Self::from_fn(|_, _, _| 0.0)
    }

    /// `0.0` when `predicate` holds for the state's environment, `-inf` otherwise.
    pub fn filter<F>(predicate: F) -> Self
    where
        F: Fn(&Env) -> bool + 'static,
    {
        Self::from_fn(move |_, _, env| {
            if predicate(env) {
                0.0
            } else {
                f64::NEG_INFINITY
            }
        })
    }

    /// Score choices whose tag is a `T` and whose value is a `V`; every other
    /// state scores `0.0`.
    pub fn tagged<T, V, F>(f: F) -> Self
    where
        T: 'static,
        V: 'static,
        F: Fn(&T, &V, &Env) -> f64 + 'static,
    {
        Self::from_fn(move |tag, choice, env| {
            match (
                tag.and_then(|t| t.downcast_ref::<T>()),
                choice.and_then(|c| c.downcast_ref::<V>()),
            ) {
                (Some(t), Some(v)) => f(t, v, env),
                _ => 0.0,
            }
        })
    }

    pub fn evaluate(&self, tag: Option<&dyn Any>, choice: Option<&dyn Any>, env: &Env) -> f64 {
        (self.0)(tag, choice, env)
    }
}

impl Default for ExecutionScore {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for ExecutionScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ExecutionScore(..)")
    }
}

/// Sum of two scores (a product of their probabilities).
impl Add for ExecutionScore {
    type Output = ExecutionScore;

    fn add(self, rhs: ExecutionScore) -> ExecutionScore {
        ExecutionScore::from_fn(move |tag, choice, env| {
            let left = self.evaluate(tag, choice, env);
            if left == f64::NEG_INFINITY {
                return left;
            }
            left + rhs.evaluate(tag, choice, env)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_score() {
        let score = ExecutionScore::zero();
        assert_eq!(score.evaluate(None, Some(&3usize), &Env::init()), 0.0);
    }

    #[test]
    fn test_filter_score() {
        let score = ExecutionScore::filter(|env| env.contains("ok"));
        assert_eq!(score.evaluate(None, None, &Env::init()), f64::NEG_INFINITY);
        assert_eq!(score.evaluate(None, None, &Env::init().set("ok", ())), 0.0);
    }

    #[test]
    fn test_tagged_score_ignores_other_types() {
        let score = ExecutionScore::tagged(|pos: &usize, v: &char, _| {
            if *pos == 0 && *v == 'a' {
                1.0
            } else {
                f64::NEG_INFINITY
            }
        });
        let env = Env::init();
        assert_eq!(score.evaluate(Some(&0usize), Some(&'a'), &env), 1.0);
        assert_eq!(score.evaluate(Some(&0usize), Some(&'b'), &env), f64::NEG_INFINITY);
        assert_eq!(score.evaluate(Some(&"other"), Some(&'b'), &env), 0.0);
        assert_eq!(score.evaluate(None, None, &env), 0.0);
    }

    #[test]
    fn test_add_scores() {
        let a = ExecutionScore::from_fn(|_, _, _| 1.5);
        let b = ExecutionScore::from_fn(|_, _, _| -0.5);
        assert_eq!((a.clone() + b).evaluate(None, None, &Env::init()), 1.0);
        let reject = ExecutionScore::filter(|_| false);
        assert_eq!(
            (reject + a).evaluate(None, None, &Env::init()),
            f64::NEG_INFINITY
        );
    }
}
