//! Observational hooks for search and training loops.
//!
//! Nothing in the engine depends on what a logger does with these calls.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, trace};

pub trait SearchLogger {
    fn start_timer(&mut self, name: &str);
    fn stop_timer(&mut self, name: &str);
    fn log_statistic(&mut self, iteration: usize, name: &str, value: f64);
    fn notify_iteration_start(&mut self, iteration: usize);
    fn notify_iteration_end(&mut self, iteration: usize);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl SearchLogger for NullLogger {
    fn start_timer(&mut self, _name: &str) {}
    fn stop_timer(&mut self, _name: &str) {}
    fn log_statistic(&mut self, _iteration: usize, _name: &str, _value: f64) {}
    fn notify_iteration_start(&mut self, _iteration: usize) {}
    fn notify_iteration_end(&mut self, _iteration: usize) {}
}

/// Forwards events to `tracing` and keeps wall-clock totals per timer and
/// every recorded statistic.
#[derive(Debug, Default)]
pub struct TracingLogger {
    running: HashMap<String, Instant>,
    totals: HashMap<String, Duration>,
    statistics: Vec<(usize, String, f64)>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timer_total(&self, name: &str) -> Duration {
        self.totals.get(name).copied().unwrap_or_default()
    }

    pub fn statistics(&self) -> &[(usize, String, f64)] {
        &self.statistics
    }

    /// Values recorded under `name`, in recording order.
    pub fn statistic(&self, name: &str) -> Vec<f64> {
        self.statistics
            .iter()
            .filter(|(_, n, _)| n == name)
            .map(|(_, _, v)| *v)
            .collect()
    }
}

impl SearchLogger for TracingLogger {
    fn start_timer(&mut self, name: &str) {
        self.running.insert(name.to_string(), Instant::now());
    }

    fn stop_timer(&mut self, name: &str) {
        if let Some(started) = self.running.remove(name) {
            let elapsed = started.elapsed();
            let total = self.totals.entry(name.to_string()).or_default();
            *total += elapsed;
            trace!(timer = name, elapsed_us = elapsed.as_micros() as u64, "timer stopped");
        }
    }

    fn log_statistic(&mut self, iteration: usize, name: &str, value: f64) {
        debug!(iteration, statistic = name, value, "search statistic");
        self.statistics.push((iteration, name.to_string(), value));
    }

    fn notify_iteration_start(&mut self, iteration: usize) {
        trace!(iteration, "iteration start");
    }

    fn notify_iteration_end(&mut self, iteration: usize) {
        trace!(iteration, "iteration end");
    }
}
