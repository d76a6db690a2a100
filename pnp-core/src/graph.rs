//! Computation-graph contract consumed by the search engine.
//!
//! The engine never touches tensors directly. It builds symbolic [`Expr`]
//! values (parameter lookups, picks, log-softmax, sums) and asks a
//! [`ComputationGraph`] implementation to evaluate or differentiate them.

use std::fmt;
use std::rc::Rc;

use crate::Result;

/// A node of a symbolic expression. Every expression evaluates to a dense
/// vector; scalars are vectors of length one.
#[derive(Debug)]
pub enum ExprNode {
    /// A named parameter vector owned by the graph.
    Parameter(String),
    Constant(Vec<f64>),
    /// Entry `index` of a vector expression, as a scalar.
    Pick(Expr, usize),
    LogSoftmax(Expr),
    /// Element-wise sum of two expressions of equal length.
    Add(Expr, Expr),
    Neg(Expr),
    /// Log-sum-exp over scalar expressions.
    LogSumExp(Vec<Expr>),
}

/// Cheaply clonable handle to an expression tree.
#[derive(Clone)]
pub struct Expr(Rc<ExprNode>);

impl Expr {
    pub fn new(node: ExprNode) -> Self {
        Self(Rc::new(node))
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Self::new(ExprNode::Parameter(name.into()))
    }

    pub fn constant(values: Vec<f64>) -> Self {
        Self::new(ExprNode::Constant(values))
    }

    pub fn scalar(value: f64) -> Self {
        Self::constant(vec![value])
    }

    pub fn zero() -> Self {
        Self::scalar(0.0)
    }

    pub fn pick(&self, index: usize) -> Self {
        Self::new(ExprNode::Pick(self.clone(), index))
    }

    pub fn log_softmax(&self) -> Self {
        Self::new(ExprNode::LogSoftmax(self.clone()))
    }

    pub fn add(&self, other: &Expr) -> Self {
        Self::new(ExprNode::Add(self.clone(), other.clone()))
    }

    pub fn neg(&self) -> Self {
        Self::new(ExprNode::Neg(self.clone()))
    }

    pub fn sub(&self, other: &Expr) -> Self {
        self.add(&other.neg())
    }

    pub fn log_sum_exp(terms: Vec<Expr>) -> Self {
        Self::new(ExprNode::LogSumExp(terms))
    }

    pub fn node(&self) -> &ExprNode {
        &self.0
    }

    /// True for a constant zero scalar, i.e. an expression that contributes
    /// nothing to a loss.
    pub fn is_zero(&self) -> bool {
        matches!(&*self.0, ExprNode::Constant(v) if v.len() == 1 && v[0] == 0.0)
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The external neural computation graph.
///
/// Search only needs shared access (`parameter`, `forward`,
/// `locally_normalized`). Training additionally drives `backward` and
/// `renew` between examples.
pub trait ComputationGraph {
    /// Look up a named parameter as an expression.
    fn parameter(&self, name: &str) -> Result<Expr>;

    /// Evaluate an expression to a dense vector.
    fn forward(&self, expr: &Expr) -> Result<Vec<f64>>;

    /// When true, parameter vectors are passed through a softmax before their
    /// entries are used as log-probabilities.
    fn locally_normalized(&self) -> bool;

    /// Accumulate gradients of a scalar loss into the parameters.
    fn backward(&mut self, loss: &Expr) -> Result<()>;

    /// Start a new graph generation. Called once per training example.
    fn renew(&mut self);

    /// Number of `renew` calls so far.
    fn generation(&self) -> u64;
}
