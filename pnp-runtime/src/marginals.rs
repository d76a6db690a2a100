//! Finished executions and the distribution they induce.

use pnp_core::Env;

/// A finished search path.
#[derive(Debug, Clone)]
pub struct Execution<A> {
    pub value: A,
    pub env: Env,
    pub log_prob: f64,
}

impl<A> Execution<A> {
    pub fn prob(&self) -> f64 {
        self.log_prob.exp()
    }
}

/// Numerically stable `log(sum(exp(x)))`; `-inf` for an empty input.
pub fn log_sum_exp(values: impl IntoIterator<Item = f64>) -> f64 {
    let values: Vec<f64> = values.into_iter().collect();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return f64::NEG_INFINITY;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

/// Executions of a search, best first.
#[derive(Debug, Clone)]
pub struct Marginals<A> {
    executions: Vec<Execution<A>>,
    iterations: usize,
}

impl<A> Marginals<A> {
    pub fn new(executions: Vec<Execution<A>>, iterations: usize) -> Self {
        Self {
            executions,
            iterations,
        }
    }

    pub fn executions(&self) -> &[Execution<A>] {
        &self.executions
    }

    pub fn into_executions(self) -> Vec<Execution<A>> {
        self.executions
    }

    pub fn best(&self) -> Option<&Execution<A>> {
        self.executions.first()
    }

    pub fn len(&self) -> usize {
        self.executions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// Advancement rounds the driver performed.
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn log_partition_function(&self) -> f64 {
        log_sum_exp(self.executions.iter().map(|e| e.log_prob))
    }

    pub fn partition_function(&self) -> f64 {
        self.executions.iter().map(Execution::prob).sum()
    }
}

impl<A: Clone + PartialEq> Marginals<A> {
    /// Normalized probability of each distinct value, in order of first
    /// appearance.
    pub fn marginals(&self) -> Vec<(A, f64)> {
        let log_z = self.log_partition_function();
        let mut out: Vec<(A, f64)> = Vec::new();
        for execution in &self.executions {
            let p = (execution.log_prob - log_z).exp();
            match out.iter_mut().find(|(value, _)| *value == execution.value) {
                Some((_, total)) => *total += p,
                None => out.push((execution.value.clone(), p)),
            }
        }
        out
    }

    pub fn marginal(&self, value: &A) -> f64 {
        self.marginals()
            .into_iter()
            .find(|(v, _)| v == value)
            .map(|(_, p)| p)
            .unwrap_or(0.0)
    }
}

impl<A: Clone> Marginals<A> {
    /// The executions satisfying `predicate`.
    pub fn filter<F>(&self, predicate: F) -> Marginals<A>
    where
        F: Fn(&Execution<A>) -> bool,
    {
        Marginals {
            executions: self
                .executions
                .iter()
                .filter(|e| predicate(e))
                .cloned()
                .collect(),
            iterations: self.iterations,
        }
    }
}
