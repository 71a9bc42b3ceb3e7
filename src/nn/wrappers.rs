//! Model wrappers that preprocess inputs

use ndarray::{Array1, Array2, Axis};

use super::{EquivariantModel, ModelHandle, Network, Trainable};
use crate::{EmlpError, Result};

/// Standardizes inputs with fixed per-feature statistics before the model.
///
/// Per-feature scaling is generally not equivariant, so diagnostics reach
/// through to the wrapped model via [`ModelHandle::underlying`].
pub struct Standardize<M> {
    model: M,
    mean: Array1<f64>,
    std: Array1<f64>,
}

impl<M: Network> Standardize<M> {
    /// Wrap with explicit statistics
    pub fn new(model: M, mean: Array1<f64>, std: Array1<f64>) -> Result<Self> {
        let dim = model.underlying().rep_in().size();
        if mean.len() != dim || std.len() != dim {
            return Err(EmlpError::ShapeMismatch(format!(
                "statistics of length {}/{} for {} input features",
                mean.len(),
                std.len(),
                dim
            )));
        }
        Ok(Standardize {
            model,
            mean,
            std: std.mapv(|s| s.max(1e-8)),
        })
    }

    /// Wrap with statistics estimated from a batch of inputs
    pub fn fit(model: M, x: &Array2<f64>) -> Result<Self> {
        let dim = x.ncols();
        let mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(dim));
        let std = if x.nrows() == 0 {
            Array1::ones(dim)
        } else {
            x.std_axis(Axis(0), 0.0)
        };
        Self::new(model, mean, std)
    }

    /// The wrapped model
    pub fn inner(&self) -> &M {
        &self.model
    }

    fn standardize(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.mean.len() {
            return Err(EmlpError::ShapeMismatch(format!(
                "expected {} input features, got {}",
                self.mean.len(),
                x.ncols()
            )));
        }
        Ok((x - &self.mean) / &self.std)
    }
}

impl<M: Network> ModelHandle for Standardize<M> {
    fn underlying(&self) -> &dyn EquivariantModel {
        self.model.underlying()
    }
}

impl<M: Network> Trainable for Standardize<M> {
    fn num_params(&self) -> usize {
        self.model.num_params()
    }

    fn params(&self) -> Array1<f64> {
        self.model.params()
    }

    fn set_params(&mut self, params: &Array1<f64>) -> Result<()> {
        self.model.set_params(params)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.model.predict(&self.standardize(x)?)
    }

    fn loss_and_grad(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<(f64, Array1<f64>)> {
        self.model.loss_and_grad(&self.standardize(x)?, y)
    }
}
