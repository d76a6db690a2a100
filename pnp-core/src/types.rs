use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum number of frontier (and finished) states kept per round.
    #[serde(default = "default_beam_size")]
    pub beam_size: usize,
    /// Advancement rounds before the search is truncated. `0` disables the cap.
    #[serde(default)]
    pub max_iterations: usize,
}

fn default_beam_size() -> usize {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            beam_size: default_beam_size(),
            max_iterations: 0,
        }
    }
}

impl SearchConfig {
    pub fn with_beam_size(beam_size: usize) -> Self {
        Self {
            beam_size,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    /// Seed for a deterministic generator. `None` uses the thread RNG.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_num_samples() -> usize {
    1
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            num_samples: default_num_samples(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Maximize the probability of the label-consistent executions. Assumes a
    /// locally normalized graph.
    #[default]
    Loglikelihood,
    /// Maximize the label-consistent mass relative to the unconditioned beam.
    GlobalLoglikelihood,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub objective: Objective,
    /// Permit examples with more than one label-consistent execution.
    #[serde(default)]
    pub allow_multiple_labels: bool,
}

fn default_epochs() -> usize {
    10
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            search: SearchConfig::default(),
            objective: Objective::default(),
            allow_multiple_labels: false,
        }
    }
}

impl TrainingConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}
