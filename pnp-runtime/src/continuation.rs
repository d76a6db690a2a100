//! Continuations: "the rest of the computation" after a value is produced.
//!
//! Internally a continuation is a persistent singly-linked list of frames.
//! Applying one replays the frames iteratively inside the transition loop,
//! so long bind chains never grow the native stack. Frames are shared
//! between every frontier state that has the same search prefix.

use std::any::{type_name, Any};
use std::marker::PhantomData;
use std::rc::Rc;

use pnp_core::{PnpError, Result};

use crate::program::{NodeRef, Program};

pub(crate) type AnyValue = Rc<dyn Any>;
pub(crate) type FrameFn = dyn Fn(AnyValue) -> Result<NodeRef>;

pub(crate) struct Frame {
    pub(crate) step: Rc<FrameFn>,
    pub(crate) next: Chain,
}

/// Type-erased continuation. `None` is the end continuation, which hands its
/// input back as the final value.
#[derive(Clone, Default)]
pub(crate) struct Chain(Option<Rc<Frame>>);

impl Chain {
    pub(crate) fn end() -> Self {
        Self(None)
    }

    pub(crate) fn single(step: Rc<FrameFn>) -> Self {
        Self(Some(Rc::new(Frame {
            step,
            next: Chain::end(),
        })))
    }

    pub(crate) fn is_end(&self) -> bool {
        self.0.is_none()
    }

    /// `self` followed by `rest`. Appending onto the end continuation returns
    /// `self` unchanged, and a single-frame chain costs one allocation.
    pub(crate) fn append(&self, rest: &Chain) -> Chain {
        if rest.is_end() {
            return self.clone();
        }
        if self.is_end() {
            return rest.clone();
        }
        let mut steps = Vec::new();
        let mut cursor = self;
        while let Some(frame) = &cursor.0 {
            steps.push(frame.step.clone());
            cursor = &frame.next;
        }
        steps.into_iter().rev().fold(rest.clone(), |next, step| {
            Chain(Some(Rc::new(Frame { step, next })))
        })
    }

    pub(crate) fn split(&self) -> Option<(&Rc<FrameFn>, &Chain)> {
        self.0.as_ref().map(|frame| (&frame.step, &frame.next))
    }

    /// Pointer identity of the first frame (0 for the end continuation).
    pub(crate) fn id(&self) -> usize {
        self.0
            .as_ref()
            .map(|frame| Rc::as_ptr(frame) as usize)
            .unwrap_or(0)
    }
}

pub(crate) fn downcast<A: Clone + 'static>(value: AnyValue) -> Result<A> {
    match value.downcast::<A>() {
        Ok(rc) => Ok(Rc::try_unwrap(rc).unwrap_or_else(|rc| (*rc).clone())),
        Err(_) => Err(PnpError::Internal(format!(
            "continuation expected a value of type {}",
            type_name::<A>()
        ))),
    }
}

/// A continuation from values of type `C` to a program producing `A`.
pub struct Continuation<C, A> {
    pub(crate) chain: Chain,
    _marker: PhantomData<fn(C) -> A>,
}

impl<C, A> Clone for Continuation<C, A> {
    fn clone(&self) -> Self {
        Self::from_chain(self.chain.clone())
    }
}

impl<C, A> Continuation<C, A> {
    pub(crate) fn from_chain(chain: Chain) -> Self {
        Self {
            chain,
            _marker: PhantomData,
        }
    }

    /// Run `self`, then feed its result into `next`.
    pub fn append<B>(&self, next: &Continuation<A, B>) -> Continuation<C, B> {
        Continuation::from_chain(self.chain.append(&next.chain))
    }
}

impl<C: Clone + 'static, A: 'static> Continuation<C, A> {
    /// Continue with the program returned by `f`.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(C) -> Program<A> + 'static,
    {
        Self::from_chain(Chain::single(Rc::new(move |value: AnyValue| {
            Ok(f(downcast::<C>(value)?).into_node())
        })))
    }

    /// Continue with a deterministic value.
    pub fn map<F>(f: F) -> Self
    where
        A: Clone,
        F: Fn(C) -> A + 'static,
    {
        Self::new(move |c| Program::value(f(c)))
    }
}

impl<A: 'static> Continuation<A, A> {
    /// The identity continuation: its input is the final value.
    pub fn end() -> Self {
        Self::from_chain(Chain::end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(tag: usize) -> Rc<FrameFn> {
        Rc::new(move |_| Ok(Program::value(tag).into_node()))
    }

    #[test]
    fn test_append_onto_end_is_identity() {
        let chain = Chain::single(frame(1));
        assert_eq!(chain.append(&Chain::end()).id(), chain.id());
        assert_eq!(Chain::end().append(&chain).id(), chain.id());
    }

    #[test]
    fn test_append_preserves_order() {
        let chain = Chain::single(frame(1))
            .append(&Chain::single(frame(2)))
            .append(&Chain::single(frame(3)));
        let mut seen = Vec::new();
        let mut cursor = &chain;
        while let Some((step, next)) = cursor.split() {
            let node = step(Rc::new(())).unwrap();
            let value = Program::<usize>::from_node(node).as_value().unwrap();
            seen.push(value);
            cursor = next;
        }
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_downcast_wrong_type() {
        let value: AnyValue = Rc::new(3u8);
        assert!(downcast::<String>(value).is_err());
    }
}
