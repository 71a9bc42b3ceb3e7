//! Linear layers parameterized over an equivariant basis.
//!
//! A layer stores only coefficients. The dense weight is materialized as
//! `W = Σ_t θ_t B_t` from the basis terms, and gradients with respect to
//! `W` are projected back onto the coefficients.

use ndarray::{s, Array1, Array2, Axis};
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::reps::{block_count, is_pad_consistent, orbit_basis, set_partitions, Rep};
use crate::{EmlpError, Result};

/// Which orbit basis elements carry parameters
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BasisMode {
    /// Pad-consistent partitions only, so coefficients are shared by all
    /// levels and a larger member restricts to a smaller one
    Compatible,
    /// Only partitions realizable at the layer's level
    Free,
}

/// One basis matrix placed at a block of the dense weight
#[derive(Clone, Debug)]
struct Term {
    out_offset: usize,
    in_offset: usize,
    matrix: Arc<Array2<f64>>,
}

impl Term {
    fn rows(&self) -> std::ops::Range<usize> {
        self.out_offset..self.out_offset + self.matrix.nrows()
    }

    fn cols(&self) -> std::ops::Range<usize> {
        self.in_offset..self.in_offset + self.matrix.ncols()
    }
}

#[derive(Clone, Debug)]
enum LayerBasis {
    /// Permutation-equivariant terms
    Orbit { weight_terms: Vec<Term>, bias_terms: Vec<Term> },
    /// Unconstrained row-major weight and bias
    Dense,
}

/// Linear map between two representations
#[derive(Clone, Debug)]
pub struct EquivariantLinear {
    rep_in: Rep,
    rep_out: Rep,
    basis: LayerBasis,
    weight: Array1<f64>,
    bias: Array1<f64>,
}

/// Base dimension shared by the non-scalar blocks of both representations
fn common_level(rep_in: &Rep, rep_out: &Rep) -> Result<usize> {
    let has_tensors = |rep: &Rep| rep.blocks().iter().any(|&(order, _)| order > 0);
    match (has_tensors(rep_in), has_tensors(rep_out)) {
        (true, true) if rep_in.base_dim() != rep_out.base_dim() => Err(EmlpError::ShapeMismatch(format!(
            "layer maps between levels {} and {}",
            rep_in.base_dim(),
            rep_out.base_dim()
        ))),
        (true, _) => Ok(rep_in.base_dim()),
        (false, true) => Ok(rep_out.base_dim()),
        (false, false) => Ok(1),
    }
}

fn normal_vec(len: usize, std: f64, rng: &mut impl Rng) -> Array1<f64> {
    Array1::from_shape_simple_fn(len, || std * rng.sample::<f64, _>(StandardNormal))
}

impl EquivariantLinear {
    /// Permutation-equivariant layer over the orbit basis.
    ///
    /// In compatible mode tensor channels get no bias and scalars never
    /// feed tensors, since both would fill padded coordinates.
    pub fn orbit(rep_in: &Rep, rep_out: &Rep, mode: BasisMode, rng: &mut impl Rng) -> Result<Self> {
        let n = common_level(rep_in, rep_out)?;
        let mut cache: HashMap<(usize, usize), Vec<Arc<Array2<f64>>>> = HashMap::new();
        let mut active = |k_in: usize, k_out: usize| -> Vec<Arc<Array2<f64>>> {
            cache
                .entry((k_in, k_out))
                .or_insert_with(|| {
                    set_partitions(k_in + k_out)
                        .iter()
                        .zip(orbit_basis(k_in, k_out, n))
                        .filter(|(p, _)| match mode {
                            BasisMode::Compatible => is_pad_consistent(p, k_out),
                            BasisMode::Free => block_count(p) <= n,
                        })
                        .map(|(_, b)| Arc::new(b))
                        .collect()
                })
                .clone()
        };

        let in_channels = rep_in.channels();
        let out_channels = rep_out.channels();
        let mut weight_terms = Vec::new();
        let mut bias_terms = Vec::new();
        for out_ch in &out_channels {
            for in_ch in &in_channels {
                for matrix in active(in_ch.order, out_ch.order) {
                    weight_terms.push(Term {
                        out_offset: out_ch.offset,
                        in_offset: in_ch.offset,
                        matrix,
                    });
                }
            }
            for matrix in active(0, out_ch.order) {
                bias_terms.push(Term {
                    out_offset: out_ch.offset,
                    in_offset: 0,
                    matrix,
                });
            }
        }

        let fan_in = (weight_terms.len() / out_channels.len().max(1)).max(1);
        let weight = normal_vec(weight_terms.len(), 1.0 / (fan_in as f64).sqrt(), rng);
        let bias = Array1::zeros(bias_terms.len());

        Ok(EquivariantLinear {
            rep_in: rep_in.clone(),
            rep_out: rep_out.clone(),
            basis: LayerBasis::Orbit { weight_terms, bias_terms },
            weight,
            bias,
        })
    }

    /// Unconstrained dense layer
    pub fn dense(rep_in: &Rep, rep_out: &Rep, rng: &mut impl Rng) -> Self {
        let (d_in, d_out) = (rep_in.size(), rep_out.size());
        EquivariantLinear {
            rep_in: rep_in.clone(),
            rep_out: rep_out.clone(),
            basis: LayerBasis::Dense,
            weight: normal_vec(d_in * d_out, 1.0 / (d_in.max(1) as f64).sqrt(), rng),
            bias: Array1::zeros(d_out),
        }
    }

    /// Input representation
    pub fn rep_in(&self) -> &Rep {
        &self.rep_in
    }

    /// Output representation
    pub fn rep_out(&self) -> &Rep {
        &self.rep_out
    }

    /// Number of trainable coefficients
    pub fn num_params(&self) -> usize {
        self.weight.len() + self.bias.len()
    }

    /// Append coefficients (weight, then bias) to `out`
    pub fn write_params(&self, out: &mut Vec<f64>) {
        out.extend(self.weight.iter());
        out.extend(self.bias.iter());
    }

    /// Load coefficients from the front of `params`, returning the rest
    pub fn read_params<'a>(&mut self, params: &'a [f64]) -> Result<&'a [f64]> {
        let needed = self.num_params();
        if params.len() < needed {
            return Err(EmlpError::ShapeMismatch(format!(
                "layer needs {} parameters, {} left",
                needed,
                params.len()
            )));
        }
        let (weight, rest) = params.split_at(self.weight.len());
        let (bias, rest) = rest.split_at(self.bias.len());
        self.weight.assign(&Array1::from(weight.to_vec()));
        self.bias.assign(&Array1::from(bias.to_vec()));
        Ok(rest)
    }

    /// Dense `out × in` weight matrix
    pub fn weight_matrix(&self) -> Array2<f64> {
        let shape = (self.rep_out.size(), self.rep_in.size());
        match &self.basis {
            // weight holds exactly out × in entries, row-major
            LayerBasis::Dense => Array2::from_shape_fn(shape, |(i, j)| self.weight[i * shape.1 + j]),
            LayerBasis::Orbit { weight_terms, .. } => {
                let mut w = Array2::zeros(shape);
                for (term, &theta) in weight_terms.iter().zip(self.weight.iter()) {
                    w.slice_mut(s![term.rows(), term.cols()])
                        .scaled_add(theta, term.matrix.as_ref());
                }
                w
            }
        }
    }

    /// Dense bias vector
    pub fn bias_vector(&self) -> Array1<f64> {
        match &self.basis {
            LayerBasis::Dense => self.bias.clone(),
            LayerBasis::Orbit { bias_terms, .. } => {
                let mut b = Array1::zeros(self.rep_out.size());
                for (term, &theta) in bias_terms.iter().zip(self.bias.iter()) {
                    b.slice_mut(s![term.rows()])
                        .scaled_add(theta, &term.matrix.column(0));
                }
                b
            }
        }
    }

    /// `x Wᵀ + b` for a batch of row vectors
    pub fn forward(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.rep_in.size() {
            return Err(EmlpError::ShapeMismatch(format!(
                "expected {} input features, got {}",
                self.rep_in.size(),
                x.ncols()
            )));
        }
        Ok(x.dot(&self.weight_matrix().t()) + &self.bias_vector())
    }

    /// Backpropagate `delta = ∂L/∂output` through the layer.
    ///
    /// Returns `∂L/∂x` and the coefficient gradient laid out like
    /// [`write_params`](Self::write_params).
    pub fn backward(&self, x: &Array2<f64>, delta: &Array2<f64>) -> (Array2<f64>, Vec<f64>) {
        let w = self.weight_matrix();
        let dx = delta.dot(&w);
        let dw = delta.t().dot(x);
        let db = delta.sum_axis(Axis(0));

        let mut grad = Vec::with_capacity(self.num_params());
        match &self.basis {
            LayerBasis::Dense => {
                grad.extend(dw.iter());
                grad.extend(db.iter());
            }
            LayerBasis::Orbit { weight_terms, bias_terms } => {
                for term in weight_terms {
                    let block = dw.slice(s![term.rows(), term.cols()]);
                    grad.push((&block * term.matrix.as_ref()).sum());
                }
                for term in bias_terms {
                    let block = db.slice(s![term.rows()]);
                    grad.push(block.dot(&term.matrix.column(0)));
                }
            }
        }
        (dx, grad)
    }
}
