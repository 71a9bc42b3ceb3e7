//! Equivariant and unconstrained multilayer perceptrons

use ndarray::{Array1, Array2};
use rand::Rng;

use super::linear::{BasisMode, EquivariantLinear};
use super::loss::mse_with_grad;
use super::{EquivariantModel, ModelHandle, Trainable};
use crate::groups::GroupKind;
use crate::reps::{Rep, SeqRep};
use crate::{EmlpError, Result};

/// Swish activation `z·σ(z)`
pub fn swish(z: f64) -> f64 {
    z / (1.0 + (-z).exp())
}

fn swish_grad(z: f64) -> f64 {
    let s = 1.0 / (1.0 + (-z).exp());
    s + z * s * (1.0 - s)
}

/// Linear layers with swish between them and a linear head.
///
/// Elementwise activations commute with permutation representations, so
/// a stack of orbit-basis layers stays S(n)-equivariant.
#[derive(Clone, Debug)]
struct LayerStack {
    layers: Vec<EquivariantLinear>,
}

impl LayerStack {
    fn forward(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let last = self.layers.len().saturating_sub(1);
        let mut h = x.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&h)?;
            h = if i < last { z.mapv(swish) } else { z };
        }
        Ok(h)
    }

    fn loss_and_grad(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<(f64, Array1<f64>)> {
        let count = self.layers.len();
        let mut inputs = Vec::with_capacity(count);
        let mut pre_activations = Vec::with_capacity(count);
        let mut h = x.clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let z = layer.forward(&h)?;
            let next = if i + 1 < count { z.mapv(swish) } else { z.clone() };
            inputs.push(h);
            pre_activations.push(z);
            h = next;
        }

        let (loss, mut delta) = mse_with_grad(&h, y)?;
        let mut grads: Vec<Vec<f64>> = vec![Vec::new(); count];
        for i in (0..count).rev() {
            let (dx, grad) = self.layers[i].backward(&inputs[i], &delta);
            grads[i] = grad;
            if i > 0 {
                delta = dx * &pre_activations[i - 1].mapv(swish_grad);
            }
        }
        Ok((loss, Array1::from(grads.concat())))
    }

    fn num_params(&self) -> usize {
        self.layers.iter().map(EquivariantLinear::num_params).sum()
    }

    fn params(&self) -> Array1<f64> {
        let mut flat = Vec::with_capacity(self.num_params());
        for layer in &self.layers {
            layer.write_params(&mut flat);
        }
        Array1::from(flat)
    }

    fn set_params(&mut self, params: &Array1<f64>) -> Result<()> {
        if params.len() != self.num_params() {
            return Err(EmlpError::ShapeMismatch(format!(
                "model has {} parameters, got {}",
                self.num_params(),
                params.len()
            )));
        }
        let flat = params.to_vec();
        let mut rest = flat.as_slice();
        for layer in &mut self.layers {
            rest = layer.read_params(rest)?;
        }
        Ok(())
    }
}

/// Equivariant MLP over the permutation or trivial group
#[derive(Clone, Debug)]
pub struct Emlp {
    level: usize,
    mode: BasisMode,
    group: GroupKind,
    rep_in: Rep,
    rep_out: Rep,
    stack: LayerStack,
}

impl Emlp {
    /// S(level)-equivariant MLP from level-agnostic representations
    pub fn new(
        seq_in: &SeqRep,
        hidden: &[SeqRep],
        seq_out: &SeqRep,
        level: usize,
        mode: BasisMode,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        if level == 0 {
            return Err(EmlpError::InvalidConfig("level must be positive".to_string()));
        }
        let reps: Vec<Rep> = std::iter::once(seq_in)
            .chain(hidden)
            .chain(std::iter::once(seq_out))
            .map(|seq| seq.at_level(level))
            .collect();
        let layers = reps
            .windows(2)
            .map(|pair| EquivariantLinear::orbit(&pair[0], &pair[1], mode, rng))
            .collect::<Result<Vec<_>>>()?;

        Ok(Emlp {
            level,
            mode,
            group: GroupKind::S { n: level },
            rep_in: reps[0].clone(),
            rep_out: reps[reps.len() - 1].clone(),
            stack: LayerStack { layers },
        })
    }

    /// Build for a concrete input representation and group.
    ///
    /// Permutation groups use the orbit basis realizable at `n` (a single
    /// model never has to extend across levels); the trivial group admits
    /// every linear map. Other groups need a basis solver this crate does
    /// not provide.
    pub fn for_group(
        rep_in: &Rep,
        rep_out: &Rep,
        hidden: &[SeqRep],
        group: GroupKind,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        match group {
            GroupKind::S { n } => {
                if rep_in.base_dim() != n {
                    return Err(EmlpError::ShapeMismatch(format!(
                        "representation level {} does not match S({})",
                        rep_in.base_dim(),
                        n
                    )));
                }
                Emlp::new(&rep_in.seq_rep(), hidden, &rep_out.seq_rep(), n, BasisMode::Free, rng)
            }
            GroupKind::Trivial { .. } => {
                let level = rep_in.base_dim();
                let mut reps = vec![rep_in.clone()];
                reps.extend(hidden.iter().map(|seq| seq.at_level(level)));
                reps.push(rep_out.clone());
                let layers = reps
                    .windows(2)
                    .map(|pair| EquivariantLinear::dense(&pair[0], &pair[1], rng))
                    .collect();
                Ok(Emlp {
                    level,
                    mode: BasisMode::Free,
                    group,
                    rep_in: rep_in.clone(),
                    rep_out: rep_out.clone(),
                    stack: LayerStack { layers },
                })
            }
            other => Err(EmlpError::UnsupportedGroup {
                group: other.to_string(),
                network: "EMLP".to_string(),
            }),
        }
    }

    /// Base dimension the model is instantiated at
    pub fn level(&self) -> usize {
        self.level
    }

    /// Basis parameterization
    pub fn mode(&self) -> BasisMode {
        self.mode
    }
}

impl EquivariantModel for Emlp {
    fn rep_in(&self) -> &Rep {
        &self.rep_in
    }

    fn rep_out(&self) -> &Rep {
        &self.rep_out
    }

    fn symmetry(&self) -> &GroupKind {
        &self.group
    }

    fn forward(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.stack.forward(x)
    }
}

impl ModelHandle for Emlp {
    fn underlying(&self) -> &dyn EquivariantModel {
        self
    }
}

impl Trainable for Emlp {
    fn num_params(&self) -> usize {
        self.stack.num_params()
    }

    fn params(&self) -> Array1<f64> {
        self.stack.params()
    }

    fn set_params(&mut self, params: &Array1<f64>) -> Result<()> {
        self.stack.set_params(params)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.stack.forward(x)
    }

    fn loss_and_grad(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<(f64, Array1<f64>)> {
        self.stack.loss_and_grad(x, y)
    }
}

/// Unconstrained MLP baseline; the group is recorded for diagnostics only
#[derive(Clone, Debug)]
pub struct Mlp {
    group: GroupKind,
    rep_in: Rep,
    rep_out: Rep,
    stack: LayerStack,
}

impl Mlp {
    /// `num_layers` hidden layers of width `ch`
    pub fn new(
        rep_in: &Rep,
        rep_out: &Rep,
        ch: usize,
        num_layers: usize,
        group: GroupKind,
        rng: &mut impl Rng,
    ) -> Result<Self> {
        if ch == 0 && num_layers > 0 {
            return Err(EmlpError::InvalidConfig("hidden width must be positive".to_string()));
        }
        let hidden = SeqRep::vector().at_level(ch);
        let mut reps = vec![rep_in.clone()];
        reps.extend(std::iter::repeat(hidden).take(num_layers));
        reps.push(rep_out.clone());
        let layers = reps
            .windows(2)
            .map(|pair| EquivariantLinear::dense(&pair[0], &pair[1], rng))
            .collect();

        Ok(Mlp {
            group,
            rep_in: rep_in.clone(),
            rep_out: rep_out.clone(),
            stack: LayerStack { layers },
        })
    }
}

impl EquivariantModel for Mlp {
    fn rep_in(&self) -> &Rep {
        &self.rep_in
    }

    fn rep_out(&self) -> &Rep {
        &self.rep_out
    }

    fn symmetry(&self) -> &GroupKind {
        &self.group
    }

    fn forward(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.stack.forward(x)
    }
}

impl ModelHandle for Mlp {
    fn underlying(&self) -> &dyn EquivariantModel {
        self
    }
}

impl Trainable for Mlp {
    fn num_params(&self) -> usize {
        self.stack.num_params()
    }

    fn params(&self) -> Array1<f64> {
        self.stack.params()
    }

    fn set_params(&mut self, params: &Array1<f64>) -> Result<()> {
        self.stack.set_params(params)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.stack.forward(x)
    }

    fn loss_and_grad(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<(f64, Array1<f64>)> {
        self.stack.loss_and_grad(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_emlp(level: usize, rng: &mut StdRng) -> Emlp {
        let v2 = SeqRep::tensor(2);
        let inner = 2 * SeqRep::vector() + 2 * SeqRep::tensor(2);
        Emlp::new(&v2, &[inner], &v2, level, BasisMode::Compatible, rng).unwrap()
    }

    #[test]
    fn test_swish() {
        assert_eq!(swish(0.0), 0.0);
        assert!((swish(10.0) - 10.0).abs() < 1e-3);
        let h = 1e-6;
        let numeric = (swish(0.7 + h) - swish(0.7 - h)) / (2.0 * h);
        assert!((numeric - swish_grad(0.7)).abs() < 1e-8);
    }

    #[test]
    fn test_emlp_gradient_matches_finite_differences() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut model = small_emlp(3, &mut rng);
        let x = Array2::from_shape_fn((4, 9), |(i, j)| ((i * 9 + j) as f64 * 0.3).sin());
        let y = Array2::from_shape_fn((4, 9), |(i, j)| ((i + j) as f64 * 0.2).cos());
        let (_, grad) = model.loss_and_grad(&x, &y).unwrap();

        let params = model.params();
        let eps = 1e-6;
        for i in [0, params.len() / 3, params.len() / 2, params.len() - 1] {
            let mut bumped = params.clone();
            bumped[i] += eps;
            model.set_params(&bumped).unwrap();
            let up = model.loss(&x, &y).unwrap();
            bumped[i] -= 2.0 * eps;
            model.set_params(&bumped).unwrap();
            let down = model.loss(&x, &y).unwrap();
            let numeric = (up - down) / (2.0 * eps);
            assert!((numeric - grad[i]).abs() < 1e-5 * (1.0 + numeric.abs()), "param {}", i);
        }
    }

    #[test]
    fn test_compatible_params_transfer_across_levels() {
        let mut rng = StdRng::seed_from_u64(5);
        let model3 = small_emlp(3, &mut rng);
        let mut model5 = small_emlp(5, &mut rng);
        model5.set_params(&model3.params()).unwrap();
        assert_eq!(model5.level(), 5);
        let out = model5.forward(&Array2::ones((1, 25))).unwrap();
        assert_eq!(out.dim(), (1, 25));
    }

    #[test]
    fn test_set_params_rejects_wrong_length() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut model = small_emlp(2, &mut rng);
        assert!(model.set_params(&Array1::zeros(3)).is_err());
    }

    #[test]
    fn test_for_group_checks_level() {
        let mut rng = StdRng::seed_from_u64(7);
        let rep = SeqRep::tensor(2).at_level(3);
        assert!(Emlp::for_group(&rep, &rep, &[], GroupKind::S { n: 4 }, &mut rng).is_err());
        let perm = Emlp::for_group(&rep, &rep, &[], GroupKind::S { n: 3 }, &mut rng).unwrap();
        assert_eq!(perm.mode(), BasisMode::Free);
        // 14 partitions of 4 indices with at most 3 blocks, 2 bias terms
        assert_eq!(perm.num_params(), 14 + 2);
        let trivial = Emlp::for_group(&rep, &rep, &[SeqRep::vector()], GroupKind::Trivial { dim: 3 }, &mut rng).unwrap();
        assert_eq!(trivial.num_params(), 9 * 3 + 3 + 3 * 9 + 9);
    }

    #[test]
    fn test_mlp_shapes() {
        let mut rng = StdRng::seed_from_u64(8);
        let mlp = Mlp::new(&Rep::vectors(3, 2), &Rep::scalar(), 8, 2, GroupKind::SO2eR3, &mut rng).unwrap();
        assert_eq!(mlp.num_params(), 6 * 8 + 8 + 8 * 8 + 8 + 8 + 1);
        assert_eq!(mlp.predict(&Array2::zeros((3, 6))).unwrap().dim(), (3, 1));
    }
}
