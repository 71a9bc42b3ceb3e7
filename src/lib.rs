//! # EMLP-Seq: dimension-extendable equivariant MLPs
//!
//! This library builds families of permutation-equivariant multilayer
//! perceptrons indexed by a size parameter `d`, trains one member of the
//! family and extends it to unseen sizes without retraining.
//!
//! ## Features
//!
//! - **Groups**: permutation groups, planar groups embedded in R³, trivial groups
//! - **Representations**: scalar/vector/tensor sums with a level-agnostic algebra
//! - **Neural Networks**: equivariant linear layers over the orbit basis, EMLP and MLP
//! - **Training**: seeded data loading, Adam, convergence-aware training loop
//! - **Applications**: symmetric-projection dimension sweep, HNN trainer assembly

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Symmetry groups and the name registry
pub mod groups;

/// Representations and the equivariant orbit basis
pub mod reps;

/// Neural network architectures, optimizers and datasets
pub mod nn;

/// Configuration, training loop and equivariance diagnostics
pub mod core;

/// Utility functions and helpers
pub mod utils;

/// Experiment drivers
pub mod applications;

// Re-export commonly used types
pub use groups::{Group, GroupKind};
pub use reps::{Rep, SeqRep};
pub use nn::{Emlp, EmlpSequence, Mlp, NetworkKind};
pub use crate::core::{ExperimentConfig, TrainingConfig, TrainingLog};

/// Error types for the library
#[derive(Debug, thiserror::Error)]
pub enum EmlpError {
    /// Configuration failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Array shapes or parameter counts do not line up
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A free model family was asked for a level it never trained
    #[error("No trained model at level {0}")]
    UntrainedLevel(usize),

    /// The architecture has no equivariant basis for this group
    #[error("Unsupported group {group} for {network}")]
    UnsupportedGroup {
        /// Group name
        group: String,
        /// Network name
        network: String,
    },

    /// Registry lookup by name failed
    #[error("Unknown {kind}: {name}")]
    UnknownName {
        /// What was being looked up
        kind: &'static str,
        /// The name given
        name: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for the library
pub type Result<T> = std::result::Result<T, EmlpError>;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        core::{equivariance_err, train_loop, DataLoader, ExperimentConfig, TrainingConfig},
        groups::{Group, GroupKind},
        nn::{Emlp, EmlpSequence, EquivariantModel, ModelHandle, Network, Trainable},
        reps::{Rep, SeqRep},
        EmlpError, Result,
    };
}
