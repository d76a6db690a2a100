//! Nondeterministic programs.
//!
//! A [`Program<A>`] is a typed handle over an immutable, reference-counted
//! node tree. Nodes are type-erased so that `Bind` can hide the type of its
//! inner program; the typed façade guarantees every continuation receives
//! the type it was built for.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use pnp_core::{ComputationGraph, Env, Expr, PnpError, Result};

use crate::continuation::{downcast, AnyValue, Chain, Continuation};

pub(crate) type NodeRef = Rc<Node>;
pub(crate) type Tag = Rc<dyn Any>;
pub(crate) type GraphFn = dyn Fn(&dyn ComputationGraph) -> Result<NodeRef>;

pub(crate) enum Node {
    Value(AnyValue),
    /// Finite choice with static log-weights.
    Categorical {
        dist: Rc<[(AnyValue, f64)]>,
        tag: Option<Tag>,
    },
    /// Choice whose log-weights are the entries of a named parameter.
    Neural {
        items: Rc<[AnyValue]>,
        parameter: Rc<str>,
        tag: Option<Tag>,
    },
    Bind(NodeRef, Chain),
    /// Multiplies the path probability by a non-negative weight.
    Score(f64),
    GetEnv,
    SetEnv(Env),
    Graph(Rc<GraphFn>),
    StartTimer(Rc<str>),
    StopTimer(Rc<str>),
    Collapsed(NodeRef),
}

impl Node {
    pub(crate) fn bind_value(value: AnyValue, cont: Chain) -> NodeRef {
        let value = Rc::new(Node::Value(value));
        if cont.is_end() {
            value
        } else {
            Rc::new(Node::Bind(value, cont))
        }
    }
}

pub(crate) fn unit() -> AnyValue {
    Rc::new(())
}

pub struct Program<A> {
    node: NodeRef,
    _marker: PhantomData<fn() -> A>,
}

impl<A> Clone for Program<A> {
    fn clone(&self) -> Self {
        Self::from_node(self.node.clone())
    }
}

impl<A> Program<A> {
    pub(crate) fn from_node(node: NodeRef) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    fn new(node: Node) -> Self {
        Self::from_node(Rc::new(node))
    }

    pub(crate) fn node(&self) -> &NodeRef {
        &self.node
    }

    pub(crate) fn into_node(self) -> NodeRef {
        self.node
    }

    /// A choice with no alternatives. It produces no executions.
    pub fn fail() -> Self {
        Self::new(Node::Categorical {
            dist: Rc::from(Vec::new()),
            tag: None,
        })
    }

    /// Sequence this program into `cont`.
    pub fn bind<B>(&self, cont: &Continuation<A, B>) -> Program<B> {
        Program::new(Node::Bind(self.node.clone(), cont.chain.clone()))
    }

    /// Resolve every choice inside this program before returning control
    /// to the enclosing search, so the whole sub-computation counts as a
    /// single search step.
    pub fn collapse(&self) -> Self {
        Self::new(Node::Collapsed(self.node.clone()))
    }

    pub fn is_value(&self) -> bool {
        matches!(&*self.node, Node::Value(_))
    }
}

impl<A: Clone + 'static> Program<A> {
    pub fn value(value: A) -> Self {
        Self::new(Node::Value(Rc::new(value)))
    }

    /// The result of a `Value` program. Any other variant must be driven by
    /// a search before it has a result.
    pub fn as_value(&self) -> Result<A> {
        match &*self.node {
            Node::Value(v) => downcast(v.clone()),
            _ => Err(PnpError::Unsupported(
                "only a value program can be converted to a result".into(),
            )),
        }
    }

    /// Uniform choice among `items`.
    pub fn choose(items: Vec<A>) -> Self {
        Self::choose_with(items.into_iter().map(|item| (item, 0.0)).collect(), None)
    }

    pub fn choose_tagged<T: 'static>(items: Vec<A>, tag: T) -> Self {
        Self::choose_with(
            items.into_iter().map(|item| (item, 0.0)).collect(),
            Some(Rc::new(tag)),
        )
    }

    /// Choice among `(item, probability)` pairs.
    pub fn choose_map(dist: Vec<(A, f64)>) -> Self {
        Self::choose_with(
            dist.into_iter().map(|(item, p)| (item, p.ln())).collect(),
            None,
        )
    }

    pub fn choose_map_tagged<T: 'static>(dist: Vec<(A, f64)>, tag: T) -> Self {
        Self::choose_with(
            dist.into_iter().map(|(item, p)| (item, p.ln())).collect(),
            Some(Rc::new(tag)),
        )
    }

    /// Choice among `(item, log-weight)` pairs.
    pub fn choose_log(dist: Vec<(A, f64)>) -> Self {
        Self::choose_with(dist, None)
    }

    fn choose_with(dist: Vec<(A, f64)>, tag: Option<Tag>) -> Self {
        let dist: Vec<(AnyValue, f64)> = dist
            .into_iter()
            .map(|(item, w)| (Rc::new(item) as AnyValue, w))
            .collect();
        Self::new(Node::Categorical {
            dist: Rc::from(dist),
            tag,
        })
    }

    /// Choice among `items` weighted by the entries of the named parameter.
    /// The parameter's vector must have exactly one entry per item.
    pub fn choose_param(items: Vec<A>, parameter: &str) -> Self {
        Self::choose_param_with(items, parameter, None)
    }

    pub fn choose_param_tagged<T: 'static>(items: Vec<A>, parameter: &str, tag: T) -> Self {
        Self::choose_param_with(items, parameter, Some(Rc::new(tag)))
    }

    fn choose_param_with(items: Vec<A>, parameter: &str, tag: Option<Tag>) -> Self {
        let items: Vec<AnyValue> = items
            .into_iter()
            .map(|item| Rc::new(item) as AnyValue)
            .collect();
        Self::new(Node::Neural {
            items: Rc::from(items),
            parameter: Rc::from(parameter),
            tag,
        })
    }

    /// Build the next program from the active computation graph.
    pub fn with_graph<F>(f: F) -> Self
    where
        F: Fn(&dyn ComputationGraph) -> Result<Program<A>> + 'static,
    {
        Self::new(Node::Graph(Rc::new(move |graph: &dyn ComputationGraph| {
            Ok(f(graph)?.node)
        })))
    }

    /// Read a typed variable from the environment. Fails the search call if
    /// the variable is unbound or holds another type.
    pub fn get_var(name: &str) -> Self {
        let name = name.to_string();
        let read = Chain::single(Rc::new(move |value: AnyValue| {
            let env = downcast::<Env>(value)?;
            let var = env.get::<A>(&name)?.clone();
            Ok(Program::value(var).into_node())
        }));
        Self::new(Node::Bind(Rc::new(Node::GetEnv), read))
    }

    pub fn flat_map<B, F>(&self, f: F) -> Program<B>
    where
        B: 'static,
        F: Fn(A) -> Program<B> + 'static,
    {
        self.bind(&Continuation::new(f))
    }

    pub fn map<B, F>(&self, f: F) -> Program<B>
    where
        B: Clone + 'static,
        F: Fn(A) -> B + 'static,
    {
        self.bind(&Continuation::map(f))
    }
}

impl Program<()> {
    /// Multiply the path probability by `weight`.
    pub fn score(weight: f64) -> Self {
        Self::new(Node::Score(weight))
    }

    pub fn set_env(env: Env) -> Self {
        Self::new(Node::SetEnv(env))
    }

    pub fn set_var<T: 'static>(name: &str, value: T) -> Self {
        let name = name.to_string();
        let value: AnyValue = Rc::new(value);
        Program::get_env()
            .flat_map(move |env| Program::set_env(env.set_any(name.clone(), value.clone())))
    }

    /// Add an expression to the environment's differentiable score.
    pub fn add_score(term: Expr) -> Self {
        Program::get_env().flat_map(move |env| Program::set_env(env.add_score(term.clone())))
    }

    pub fn start_timer(name: &str) -> Self {
        Self::new(Node::StartTimer(Rc::from(name)))
    }

    pub fn stop_timer(name: &str) -> Self {
        Self::new(Node::StopTimer(Rc::from(name)))
    }
}

impl Program<Env> {
    pub fn get_env() -> Self {
        Self::new(Node::GetEnv)
    }
}

impl Program<Expr> {
    /// The named parameter as an expression of the active graph.
    pub fn param(name: &str) -> Self {
        let name = name.to_string();
        Program::with_graph(move |graph| Ok(Program::value(graph.parameter(&name)?)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_value() {
        assert_eq!(Program::value(7u32).as_value().unwrap(), 7);
        assert!(matches!(
            Program::choose(vec![1, 2]).as_value(),
            Err(PnpError::Unsupported(_))
        ));
    }

    #[test]
    fn test_fail_has_empty_distribution() {
        let program = Program::<u8>::fail();
        match &**program.node() {
            Node::Categorical { dist, tag } => {
                assert!(dist.is_empty());
                assert!(tag.is_none());
            }
            _ => panic!("fail should be categorical"),
        }
    }

    #[test]
    fn test_choose_map_uses_log_weights() {
        let program = Program::choose_map(vec![('a', 0.5), ('b', 0.25)]);
        match &**program.node() {
            Node::Categorical { dist, .. } => {
                assert!((dist[0].1 - 0.5f64.ln()).abs() < 1e-12);
                assert!((dist[1].1 - 0.25f64.ln()).abs() < 1e-12);
            }
            _ => panic!("choose_map should be categorical"),
        }
    }

    #[test]
    fn test_bind_value_skips_end() {
        let node = Node::bind_value(Rc::new(1u8), Chain::end());
        assert!(matches!(&*node, Node::Value(_)));
    }
}
