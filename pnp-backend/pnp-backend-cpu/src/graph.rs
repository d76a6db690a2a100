use std::collections::HashMap;

use tracing::trace;

use pnp_core::{ComputationGraph, Expr, ExprNode, PnpError, Result};

/// A named parameter vector and its accumulated gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub value: Vec<f64>,
    pub grad: Vec<f64>,
}

impl Parameter {
    pub fn new(value: Vec<f64>) -> Self {
        let grad = vec![0.0; value.len()];
        Self { value, grad }
    }
}

/// Computation graph over `f64` vectors held in host memory.
///
/// Expressions are evaluated eagerly on every `forward` call; nothing is
/// cached between calls, so parameter updates are visible immediately.
#[derive(Debug, Clone)]
pub struct CpuGraph {
    params: HashMap<String, Parameter>,
    locally_normalized: bool,
    generation: u64,
}

impl CpuGraph {
    /// An empty, locally normalized graph.
    pub fn new() -> Self {
        Self {
            params: HashMap::new(),
            locally_normalized: true,
            generation: 0,
        }
    }

    pub fn with_locally_normalized(mut self, locally_normalized: bool) -> Self {
        self.locally_normalized = locally_normalized;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: Vec<f64>) -> Self {
        self.add_parameter(name, value);
        self
    }

    /// Insert or replace a parameter. Its gradient starts at zero.
    pub fn add_parameter(&mut self, name: impl Into<String>, value: Vec<f64>) {
        self.params.insert(name.into(), Parameter::new(value));
    }

    pub fn parameter_value(&self, name: &str) -> Option<&[f64]> {
        self.params.get(name).map(|p| p.value.as_slice())
    }

    pub fn gradient(&self, name: &str) -> Option<&[f64]> {
        self.params.get(name).map(|p| p.grad.as_slice())
    }

    pub fn parameters_mut(&mut self) -> impl Iterator<Item = (&String, &mut Parameter)> {
        self.params.iter_mut()
    }

    pub fn zero_grad(&mut self) {
        for param in self.params.values_mut() {
            param.grad.iter_mut().for_each(|g| *g = 0.0);
        }
    }

    // ── Forward ─────────────────────────────────────────────────

    fn evaluate(&self, expr: &Expr) -> Result<Vec<f64>> {
        match expr.node() {
            ExprNode::Parameter(name) => self
                .params
                .get(name)
                .map(|p| p.value.clone())
                .ok_or_else(|| PnpError::UnknownParameter(name.clone())),
            ExprNode::Constant(values) => Ok(values.clone()),
            ExprNode::Pick(inner, index) => {
                let values = self.evaluate(inner)?;
                values
                    .get(*index)
                    .map(|v| vec![*v])
                    .ok_or_else(|| PnpError::ShapeMismatch {
                        expected: vec![index + 1],
                        got: vec![values.len()],
                    })
            }
            ExprNode::LogSoftmax(inner) => Ok(log_softmax(&self.evaluate(inner)?)),
            ExprNode::Add(a, b) => {
                let a = self.evaluate(a)?;
                let b = self.evaluate(b)?;
                if a.len() != b.len() {
                    return Err(PnpError::ShapeMismatch {
                        expected: vec![a.len()],
                        got: vec![b.len()],
                    });
                }
                Ok(a.iter().zip(&b).map(|(x, y)| x + y).collect())
            }
            ExprNode::Neg(inner) => Ok(self.evaluate(inner)?.iter().map(|v| -v).collect()),
            ExprNode::LogSumExp(terms) => {
                let values = self.scalars(terms)?;
                Ok(vec![log_sum_exp(&values)])
            }
        }
    }

    fn scalars(&self, terms: &[Expr]) -> Result<Vec<f64>> {
        terms
            .iter()
            .map(|term| {
                let value = self.evaluate(term)?;
                match value.as_slice() {
                    [v] => Ok(*v),
                    _ => Err(PnpError::ShapeMismatch {
                        expected: vec![1],
                        got: vec![value.len()],
                    }),
                }
            })
            .collect()
    }

    // ── Backward ────────────────────────────────────────────────

    /// Push `upstream` (d loss / d expr) down to the parameters.
    fn accumulate(
        &self,
        expr: &Expr,
        upstream: &[f64],
        grads: &mut HashMap<String, Vec<f64>>,
    ) -> Result<()> {
        match expr.node() {
            ExprNode::Parameter(name) => {
                let grad = grads
                    .entry(name.clone())
                    .or_insert_with(|| vec![0.0; upstream.len()]);
                for (g, u) in grad.iter_mut().zip(upstream) {
                    *g += u;
                }
                Ok(())
            }
            ExprNode::Constant(_) => Ok(()),
            ExprNode::Pick(inner, index) => {
                let len = self.evaluate(inner)?.len();
                let mut up = vec![0.0; len];
                up[*index] = upstream[0];
                self.accumulate(inner, &up, grads)
            }
            ExprNode::LogSoftmax(inner) => {
                let log_probs = self.evaluate(expr)?;
                let total: f64 = upstream.iter().sum();
                let up: Vec<f64> = log_probs
                    .iter()
                    .zip(upstream)
                    .map(|(lp, u)| u - lp.exp() * total)
                    .collect();
                self.accumulate(inner, &up, grads)
            }
            ExprNode::Add(a, b) => {
                self.accumulate(a, upstream, grads)?;
                self.accumulate(b, upstream, grads)
            }
            ExprNode::Neg(inner) => {
                let up: Vec<f64> = upstream.iter().map(|u| -u).collect();
                self.accumulate(inner, &up, grads)
            }
            ExprNode::LogSumExp(terms) => {
                let values = self.scalars(terms)?;
                let lse = log_sum_exp(&values);
                for (term, value) in terms.iter().zip(values) {
                    let weight = if lse == f64::NEG_INFINITY {
                        0.0
                    } else {
                        (value - lse).exp()
                    };
                    self.accumulate(term, &[upstream[0] * weight], grads)?;
                }
                Ok(())
            }
        }
    }
}

impl Default for CpuGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputationGraph for CpuGraph {
    fn parameter(&self, name: &str) -> Result<Expr> {
        if !self.params.contains_key(name) {
            return Err(PnpError::UnknownParameter(name.to_string()));
        }
        Ok(Expr::parameter(name))
    }

    fn forward(&self, expr: &Expr) -> Result<Vec<f64>> {
        self.evaluate(expr)
    }

    fn locally_normalized(&self) -> bool {
        self.locally_normalized
    }

    fn backward(&mut self, loss: &Expr) -> Result<()> {
        let value = self.evaluate(loss)?;
        if value.len() != 1 {
            return Err(PnpError::ShapeMismatch {
                expected: vec![1],
                got: vec![value.len()],
            });
        }
        let mut grads = HashMap::new();
        self.accumulate(loss, &[1.0], &mut grads)?;
        for (name, grad) in grads {
            if let Some(param) = self.params.get_mut(&name) {
                for (g, d) in param.grad.iter_mut().zip(grad) {
                    *g += d;
                }
            }
        }
        trace!(loss = value[0], generation = self.generation, "backward");
        Ok(())
    }

    fn renew(&mut self) {
        self.generation += 1;
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

fn log_softmax(values: &[f64]) -> Vec<f64> {
    let lse = log_sum_exp(values);
    values.iter().map(|v| v - lse).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_softmax_normalizes() {
        let out = log_softmax(&[1.0, 2.0, 3.0]);
        let total: f64 = out.iter().map(|v| v.exp()).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(out[2] > out[1] && out[1] > out[0]);
    }

    #[test]
    fn test_log_sum_exp_empty() {
        assert_eq!(log_sum_exp(&[]), f64::NEG_INFINITY);
    }
}
