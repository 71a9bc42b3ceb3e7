//! Configuration, training loop and equivariance diagnostics

mod config;
mod equivariance;
mod training;

pub use config::{ExperimentConfig, NetConfig};
pub use equivariance::{equivariance_err, scale_adjusted_rel_err};
pub use training::{mean, split_dataset, train_loop, DataLoader, SplitSize, TrainingConfig, TrainingLog};
