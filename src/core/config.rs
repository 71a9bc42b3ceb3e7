//! Experiment configuration

use serde::{Deserialize, Serialize};

use super::training::TrainingConfig;
use crate::groups::GroupKind;
use crate::nn::LrSchedule;
use crate::{EmlpError, Result};

/// Network architecture settings shared by the network registry
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Hidden layer count
    pub num_layers: usize,
    /// Approximate hidden width
    pub ch: usize,
    /// Symmetry group; `None` takes the dataset's declared symmetry
    pub group: Option<GroupKind>,
}

impl Default for NetConfig {
    fn default() -> Self {
        NetConfig {
            num_layers: 2,
            ch: 128,
            group: Some(GroupKind::O2eR3),
        }
    }
}

/// Settings for the symmetric-projection dimension sweep
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Batch size
    pub batch_size: usize,
    /// Adam learning rate
    pub learning_rate: f64,
    /// Epoch budget
    pub num_epochs: usize,
    /// Stop once the mean training loss of an epoch falls below this
    pub accuracy: f64,
    /// Group override; `None` uses S(d) at each level
    pub group: Option<GroupKind>,
    /// Seed for every random draw in the run
    pub seed: u64,
    /// Compute device label, reported only
    pub device: String,
    /// Log verbosity: critical, error, warn, warning, info or debug
    pub log_level: String,
    /// Number of hidden layers
    pub hidden_layers: usize,
    /// Vector channels per hidden layer
    pub hidden_vectors: usize,
    /// Matrix channels per hidden layer
    pub hidden_matrices: usize,
    /// Dimension the model is trained at
    pub trained_dim: usize,
    /// Dimensions the trained family is evaluated at
    pub dimensions_to_extend: Vec<usize>,
    /// Examples in each of the train and test splits
    pub num_samples: usize,
    /// Held-out examples per evaluated dimension
    pub held_out_samples: usize,
    /// Evaluate the test split every this many epochs
    pub eval_every: usize,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        ExperimentConfig {
            batch_size: 500,
            learning_rate: 8e-3,
            num_epochs: 1000,
            accuracy: 1e-8,
            group: None,
            seed: 926,
            device: "cpu".to_string(),
            log_level: "info".to_string(),
            hidden_layers: 2,
            hidden_vectors: 4,
            hidden_matrices: 4,
            trained_dim: 4,
            dimensions_to_extend: (2..=5).collect(),
            num_samples: 3000,
            held_out_samples: 100,
            eval_every: 10,
        }
    }
}

impl ExperimentConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(EmlpError::InvalidConfig(msg.to_string()));

        if self.batch_size == 0 {
            return invalid("batch size must be positive");
        }

        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return invalid("learning rate must be positive");
        }

        if self.num_epochs == 0 {
            return invalid("epoch budget must be positive");
        }

        if self.eval_every == 0 {
            return invalid("evaluation period must be positive");
        }

        if self.trained_dim == 0 {
            return invalid("trained dimension must be positive");
        }

        if self.dimensions_to_extend.is_empty() {
            return invalid("at least one dimension to extend to is required");
        }

        if self.dimensions_to_extend.contains(&0) {
            return invalid("dimensions to extend to must be positive");
        }

        if let Some(group) = self.group {
            if !group.is_permutation() {
                return invalid("the dimension sweep needs a permutation group");
            }
            if group != (GroupKind::S { n: self.trained_dim }) {
                return invalid("the group must act on the trained dimension");
            }
        }

        crate::utils::parse_log_level(&self.log_level)?;
        Ok(())
    }

    /// Training-loop settings derived from this configuration
    pub fn training_config(&self) -> TrainingConfig {
        TrainingConfig {
            num_epochs: self.num_epochs,
            lr: LrSchedule::Constant(self.learning_rate),
            accuracy: self.accuracy,
            eval_every: self.eval_every,
        }
    }
}
