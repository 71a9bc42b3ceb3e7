//! Equivariance diagnostics

use ndarray::{Array1, Array2};
use rand::Rng;
use rayon::prelude::*;

use crate::groups::{identity_deviation, Group, GroupKind};
use crate::nn::ModelHandle;
use crate::reps::Rep;
use crate::{EmlpError, Result};

fn rms(values: &Array2<f64>) -> f64 {
    values.mapv(|v| v * v).mean().unwrap_or(f64::NAN).sqrt()
}

/// Relative error between `a` and `b`, softened by how far the sampled
/// group elements are from the identity.
///
/// `rms(a − b) / (rms(a) + rms(b) + mean|g − I|)`
pub fn scale_adjusted_rel_err(a: &Array2<f64>, b: &Array2<f64>, gs: &[Array2<f64>]) -> Result<f64> {
    if a.dim() != b.dim() {
        return Err(EmlpError::ShapeMismatch(format!("{:?} vs {:?}", a.dim(), b.dim())));
    }
    let diff = a - b;
    Ok(rms(&diff) / (rms(a) + rms(b) + identity_deviation(gs)))
}

/// Apply `ρ(g_i)` to row `i` of `x`
fn act_rowwise(rep: &Rep, gs: &[Array2<f64>], x: &Array2<f64>) -> Result<Array2<f64>> {
    let rows: Vec<Array1<f64>> = gs
        .par_iter()
        .zip(x.outer_iter().collect::<Vec<_>>())
        .map(|(g, row)| -> Result<Array1<f64>> { Ok(rep.rho_dense(g)?.dot(&row)) })
        .collect::<Result<Vec<_>>>()?;

    let width = rep.size();
    let flat: Vec<f64> = rows.iter().flat_map(|row| row.iter().copied()).collect();
    Array2::from_shape_vec((rows.len(), width), flat).map_err(|e| EmlpError::ShapeMismatch(e.to_string()))
}

/// Equivariance error of a model on a batch of inputs.
///
/// Draws one group element per row of `x` and compares transforming the
/// input before the model with transforming the output after it. The
/// group defaults to the one the underlying model was built for. Empty
/// batches give `NaN`.
pub fn equivariance_err<H, R>(handle: &H, x: &Array2<f64>, group: Option<GroupKind>, rng: &mut R) -> Result<f64>
where
    H: ModelHandle + ?Sized,
    R: Rng,
{
    let model = handle.underlying();
    let group = group.unwrap_or(*model.symmetry());
    let gs = group.samples(x.nrows(), rng);

    let y1 = model.forward(&act_rowwise(model.rep_in(), &gs, x)?)?;
    let y2 = act_rowwise(model.rep_out(), &gs, &model.forward(x)?)?;
    scale_adjusted_rel_err(&y1, &y2, &gs)
}
