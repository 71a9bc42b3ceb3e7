//! Families of EMLPs indexed by the base dimension

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::BTreeMap;
use tracing::debug;

use super::emlp::Emlp;
use super::linear::BasisMode;
use super::Trainable;
use crate::reps::SeqRep;
use crate::{EmlpError, Result};

/// A model family handle.
///
/// A *compatible* family parameterizes every level with one coefficient
/// vector over the pad-consistent orbit basis, so training at one level
/// defines the model at all levels and the member at `n + 1` applied to a
/// zero-padded input is the member at `n`, padded. A *free* family keeps
/// separate parameters per level over the basis realizable at that level.
#[derive(Clone, Debug)]
pub struct EmlpSequence {
    seq_in: SeqRep,
    seq_out: SeqRep,
    hidden: Vec<SeqRep>,
    compatible: bool,
    seed: u64,
    initial: Option<Array1<f64>>,
    trained: BTreeMap<usize, Array1<f64>>,
}

impl EmlpSequence {
    /// Build a family; `seed` fixes every initialization it hands out
    pub fn new(seq_in: SeqRep, seq_out: SeqRep, hidden: Vec<SeqRep>, compatible: bool, seed: u64) -> Result<Self> {
        let mut family = EmlpSequence {
            seq_in,
            seq_out,
            hidden,
            compatible,
            seed,
            initial: None,
            trained: BTreeMap::new(),
        };
        if compatible {
            // level-independent coefficients; any level draws the same ones
            let model = family.skeleton(1)?;
            family.initial = Some(model.params());
        }
        Ok(family)
    }

    /// Whether coefficients are shared across levels
    pub fn is_compatible(&self) -> bool {
        self.compatible
    }

    /// Levels with an authoritative trained model
    pub fn trained_levels(&self) -> Vec<usize> {
        self.trained.keys().copied().collect()
    }

    fn mode(&self) -> BasisMode {
        if self.compatible {
            BasisMode::Compatible
        } else {
            BasisMode::Free
        }
    }

    fn skeleton(&self, level: usize) -> Result<Emlp> {
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(level as u64));
        Emlp::new(&self.seq_in, &self.hidden, &self.seq_out, level, self.mode(), &mut rng)
    }

    /// The family member at `level`.
    ///
    /// With `trained = false` this is the initialization. With
    /// `trained = true` a compatible family reuses its trained
    /// coefficients at any level; a free family only answers for levels
    /// it was trained at and otherwise returns [`EmlpError::UntrainedLevel`].
    pub fn emlp_at_level(&self, level: usize, trained: bool) -> Result<Emlp> {
        let mut model = self.skeleton(level)?;
        let params = match (self.compatible, trained) {
            (true, false) => self.initial.as_ref(),
            (true, true) => self.trained.values().next_back(),
            (false, false) => None,
            (false, true) => self.trained.get(&level),
        };

        match params {
            Some(params) => model.set_params(params)?,
            None if trained => return Err(EmlpError::UntrainedLevel(level)),
            None => {}
        }
        debug!(level, trained, compatible = self.compatible, params = model.num_params(), "instantiated family member");
        Ok(model)
    }

    /// Record `model` as the trained representative for its level
    pub fn set_trained_emlp_at_level(&mut self, model: &Emlp) -> Result<()> {
        if model.mode() != self.mode() {
            return Err(EmlpError::ShapeMismatch(format!(
                "model uses {:?} basis, family expects {:?}",
                model.mode(),
                self.mode()
            )));
        }
        let expected = self.skeleton(model.level())?.num_params();
        if model.num_params() != expected {
            return Err(EmlpError::ShapeMismatch(format!(
                "model has {} parameters, family member at level {} has {}",
                model.num_params(),
                model.level(),
                expected
            )));
        }
        if self.compatible {
            // one coefficient set serves every level
            self.trained.clear();
        }
        self.trained.insert(model.level(), model.params());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::EquivariantModel;
    use ndarray::Array2;

    fn family(compatible: bool) -> EmlpSequence {
        let v2 = SeqRep::tensor(2);
        let inner = 2 * SeqRep::vector() + 2 * v2.clone();
        EmlpSequence::new(v2.clone(), v2, vec![inner], compatible, 17).unwrap()
    }

    #[test]
    fn test_compatible_extends_to_untrained_levels() {
        let mut fam = family(true);
        assert!(fam.emlp_at_level(3, true).is_err());

        let mut model = fam.emlp_at_level(4, false).unwrap();
        let shifted = model.params().mapv(|p| p + 0.01);
        model.set_params(&shifted).unwrap();
        fam.set_trained_emlp_at_level(&model).unwrap();

        for level in [2, 3, 5] {
            let extended = fam.emlp_at_level(level, true).unwrap();
            assert_eq!(extended.params(), shifted);
            let out = extended.forward(&Array2::ones((1, level * level))).unwrap();
            assert_eq!(out.ncols(), level * level);
        }
        assert_eq!(fam.trained_levels(), vec![4]);
    }

    fn pad(x: &Array2<f64>, n: usize) -> Array2<f64> {
        Array2::from_shape_fn((x.nrows(), (n + 1) * (n + 1)), |(r, c)| {
            let (i, j) = (c / (n + 1), c % (n + 1));
            if i < n && j < n {
                x[(r, i * n + j)]
            } else {
                0.0
            }
        })
    }

    fn project(y: &Array2<f64>, n: usize) -> Array2<f64> {
        Array2::from_shape_fn((y.nrows(), n * n), |(r, c)| y[(r, (c / n) * (n + 1) + c % n)])
    }

    #[test]
    fn test_deep_compatible_members_agree_on_padded_inputs() {
        let v2 = SeqRep::tensor(2);
        let inner = 4 * SeqRep::vector() + 4 * v2.clone();
        let mut fam = EmlpSequence::new(v2.clone(), v2, vec![inner.clone(), inner], true, 5).unwrap();

        let mut model = fam.emlp_at_level(4, false).unwrap();
        let params = Array1::from_shape_fn(model.num_params(), |i| 0.3 * (i as f64 * 1.7).sin() + 0.05);
        model.set_params(&params).unwrap();
        fam.set_trained_emlp_at_level(&model).unwrap();

        for n in 2..=5 {
            let small = fam.emlp_at_level(n, true).unwrap();
            let large = fam.emlp_at_level(n + 1, true).unwrap();
            let x = Array2::from_shape_fn((3, n * n), |(r, c)| ((r * 7 + c) as f64 * 0.9).cos());
            let expected = small.forward(&x).unwrap();
            let padded_out = large.forward(&pad(&x, n)).unwrap();
            let gap = (project(&padded_out, n) - &expected).mapv(f64::abs).sum();
            assert!(gap < 1e-10, "level {} gap {}", n, gap);
            let leaked = padded_out.mapv(f64::abs).sum() - project(&padded_out, n).mapv(f64::abs).sum();
            assert!(leaked.abs() < 1e-10, "level {} leaked {}", n, leaked);
        }
    }

    #[test]
    fn test_compatible_initialization_is_shared() {
        let fam = family(true);
        let a = fam.emlp_at_level(2, false).unwrap();
        let b = fam.emlp_at_level(5, false).unwrap();
        assert_eq!(a.params(), b.params());
    }

    #[test]
    fn test_free_family_refuses_untrained_levels() {
        let mut fam = family(false);
        let model = fam.emlp_at_level(4, false).unwrap();
        fam.set_trained_emlp_at_level(&model).unwrap();

        assert_eq!(fam.emlp_at_level(4, true).unwrap().params(), model.params());
        assert!(matches!(fam.emlp_at_level(3, true), Err(EmlpError::UntrainedLevel(3))));
        assert!(fam.emlp_at_level(3, false).is_ok());
    }

    #[test]
    fn test_rejects_model_from_other_family() {
        let mut free = family(false);
        let compatible_model = family(true).emlp_at_level(4, false).unwrap();
        assert!(free.set_trained_emlp_at_level(&compatible_model).is_err());
    }
}
