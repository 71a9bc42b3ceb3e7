//! Regression losses

use ndarray::Array2;

use crate::{EmlpError, Result};

fn check_shapes(prediction: &Array2<f64>, target: &Array2<f64>) -> Result<()> {
    if prediction.dim() != target.dim() {
        return Err(EmlpError::ShapeMismatch(format!(
            "prediction {:?} vs target {:?}",
            prediction.dim(),
            target.dim()
        )));
    }
    Ok(())
}

/// Mean squared error over every element; `NaN` for empty input
pub fn mse(prediction: &Array2<f64>, target: &Array2<f64>) -> Result<f64> {
    check_shapes(prediction, target)?;
    Ok((prediction - target).mapv(|d| d * d).mean().unwrap_or(f64::NAN))
}

/// Mean squared error and its gradient with respect to `prediction`
pub fn mse_with_grad(prediction: &Array2<f64>, target: &Array2<f64>) -> Result<(f64, Array2<f64>)> {
    check_shapes(prediction, target)?;
    let diff = prediction - target;
    let count = diff.len().max(1) as f64;
    let loss = diff.mapv(|d| d * d).mean().unwrap_or(f64::NAN);
    Ok((loss, diff * (2.0 / count)))
}
