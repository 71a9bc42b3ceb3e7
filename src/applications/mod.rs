//! Experiment drivers

pub mod hnn;
pub mod symmetric_projection;

pub use hnn::{make_trainer, DynamicsTrainer, HnnConfig, TrainerConfig, TrainerParts};
pub use symmetric_projection::{
    held_out_sets, test_different_dimensions, train_model, DimensionSweep, ProjectionResults, TrainedFamily,
};
