//! The symmetric group S(n)

use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::RngCore;

use super::Group;

/// Permutations of `n` coordinates, sampled uniformly
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Permutation(pub usize);

impl Permutation {
    /// Permutation matrix sending basis vector `i` to `perm[i]`
    pub fn matrix(perm: &[usize]) -> Array2<f64> {
        let n = perm.len();
        let mut p = Array2::zeros((n, n));
        for (i, &j) in perm.iter().enumerate() {
            p[(j, i)] = 1.0;
        }
        p
    }
}

impl Group for Permutation {
    fn name(&self) -> String {
        format!("S({})", self.0)
    }

    fn dim(&self) -> usize {
        self.0
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Array2<f64> {
        let mut perm: Vec<usize> = (0..self.0).collect();
        perm.shuffle(rng);
        Self::matrix(&perm)
    }
}
