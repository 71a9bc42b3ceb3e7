//! Representations built from tensor powers of a base representation.
//!
//! A [`SeqRep`] describes a sum of tensor blocks independently of the base
//! dimension, so the same description instantiates a whole sequence of
//! representations `V_n^{⊗k}`. [`SeqRep::at_level`] fixes the base
//! dimension and yields a concrete [`Rep`].

mod partitions;

use ndarray::{linalg::kron, s, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Mul};

use crate::{EmlpError, Result};

pub use partitions::{block_count, is_pad_consistent, orbit_basis, set_partitions};

/// Level-agnostic sum of tensor blocks: tensor order → multiplicity
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqRep {
    blocks: BTreeMap<usize, usize>,
}

impl SeqRep {
    /// Order-`order` tensors with multiplicity one
    pub fn tensor(order: usize) -> Self {
        let mut blocks = BTreeMap::new();
        blocks.insert(order, 1);
        SeqRep { blocks }
    }

    /// The trivial one-dimensional representation
    pub fn scalar() -> Self {
        Self::tensor(0)
    }

    /// The base (permutation) representation
    pub fn vector() -> Self {
        Self::tensor(1)
    }

    /// Multiplicity of each tensor order, in ascending order
    pub fn blocks(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.blocks.iter().map(|(&order, &mult)| (order, mult)).filter(|&(_, m)| m > 0)
    }

    /// Number of channels across all orders
    pub fn num_channels(&self) -> usize {
        self.blocks().map(|(_, m)| m).sum()
    }

    /// Highest tensor order present
    pub fn max_order(&self) -> usize {
        self.blocks().map(|(o, _)| o).max().unwrap_or(0)
    }

    /// Instantiate at base dimension `n`
    pub fn at_level(&self, n: usize) -> Rep {
        Rep {
            base_dim: n,
            blocks: self.blocks().collect(),
        }
    }

    /// Heuristic hidden representation of roughly `ch` dimensions at level `n`
    pub fn uniform(ch: usize, n: usize) -> Self {
        let per_order = (ch / (1 + n + n * n)).max(1);
        per_order * SeqRep::scalar() + per_order * SeqRep::vector() + per_order * SeqRep::tensor(2)
    }
}

impl Add for SeqRep {
    type Output = SeqRep;

    fn add(mut self, rhs: SeqRep) -> SeqRep {
        for (order, mult) in rhs.blocks {
            *self.blocks.entry(order).or_insert(0) += mult;
        }
        self
    }
}

impl Mul<SeqRep> for usize {
    type Output = SeqRep;

    fn mul(self, mut rhs: SeqRep) -> SeqRep {
        for mult in rhs.blocks.values_mut() {
            *mult *= self;
        }
        rhs
    }
}

/// Tensor product: orders add, multiplicities multiply
impl Mul for SeqRep {
    type Output = SeqRep;

    fn mul(self, rhs: SeqRep) -> SeqRep {
        let mut blocks = BTreeMap::new();
        for (&a, &ma) in &self.blocks {
            for (&b, &mb) in &rhs.blocks {
                *blocks.entry(a + b).or_insert(0) += ma * mb;
            }
        }
        SeqRep { blocks }
    }
}

impl fmt::Display for SeqRep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let terms: Vec<String> = self
            .blocks()
            .map(|(order, mult)| match order {
                0 => format!("{}V⁰", mult),
                1 => format!("{}V", mult),
                k => format!("{}V^{}", mult, k),
            })
            .collect();
        if terms.is_empty() {
            write!(f, "0")
        } else {
            write!(f, "{}", terms.join("+"))
        }
    }
}

/// One channel of a concrete representation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Channel {
    /// Tensor order
    pub order: usize,
    /// Offset into the flattened vector
    pub offset: usize,
    /// Flattened length, `n^order`
    pub len: usize,
}

/// A representation at a fixed base dimension
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rep {
    base_dim: usize,
    blocks: Vec<(usize, usize)>,
}

impl Rep {
    /// `mult` copies of the base representation at dimension `n`
    pub fn vectors(n: usize, mult: usize) -> Self {
        (mult * SeqRep::vector()).at_level(n)
    }

    /// The one-dimensional trivial representation
    pub fn scalar() -> Self {
        SeqRep::scalar().at_level(1)
    }

    /// Base dimension `n`
    pub fn base_dim(&self) -> usize {
        self.base_dim
    }

    /// `(order, multiplicity)` pairs in ascending order
    pub fn blocks(&self) -> &[(usize, usize)] {
        &self.blocks
    }

    /// The level-agnostic description of this representation
    pub fn seq_rep(&self) -> SeqRep {
        SeqRep {
            blocks: self.blocks.iter().copied().collect(),
        }
    }

    /// Total flattened dimension
    pub fn size(&self) -> usize {
        self.blocks
            .iter()
            .map(|&(order, mult)| mult * self.base_dim.pow(order as u32))
            .sum()
    }

    /// Channels in flattened order
    pub fn channels(&self) -> Vec<Channel> {
        let mut channels = Vec::new();
        let mut offset = 0;
        for &(order, mult) in &self.blocks {
            let len = self.base_dim.pow(order as u32);
            for _ in 0..mult {
                channels.push(Channel { order, offset, len });
                offset += len;
            }
        }
        channels
    }

    /// Dense matrix of `g` acting on this representation.
    ///
    /// `g` is an element of the base representation; order-k blocks
    /// receive the k-fold Kronecker power, laid out block-diagonally.
    pub fn rho_dense(&self, g: &Array2<f64>) -> Result<Array2<f64>> {
        // scalars are blind to the base dimension
        let acts = self.blocks.iter().any(|&(order, _)| order > 0);
        if acts && (g.nrows() != self.base_dim || g.ncols() != self.base_dim) {
            return Err(EmlpError::ShapeMismatch(format!(
                "group element is {}x{}, representation base dimension is {}",
                g.nrows(),
                g.ncols(),
                self.base_dim
            )));
        }

        let size = self.size();
        let mut rho = Array2::zeros((size, size));
        let mut powers: BTreeMap<usize, Array2<f64>> = BTreeMap::new();
        for channel in self.channels() {
            let block = powers
                .entry(channel.order)
                .or_insert_with(|| kron_power(g, channel.order));
            let range = channel.offset..channel.offset + channel.len;
            rho.slice_mut(s![range.clone(), range]).assign(block);
        }
        Ok(rho)
    }
}

impl fmt::Display for Rep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rep(n={}, dim={})", self.base_dim, self.size())
    }
}

fn kron_power(g: &Array2<f64>, order: usize) -> Array2<f64> {
    let mut out = Array2::ones((1, 1));
    for _ in 0..order {
        out = kron(&out, g);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::Permutation;

    #[test]
    fn test_seq_rep_algebra() {
        let ss = SeqRep::vector();
        let v2 = ss.clone() * ss.clone();
        assert_eq!(v2, SeqRep::tensor(2));

        let inner = 4 * ss.clone() + 4 * v2.clone();
        assert_eq!(inner.num_channels(), 8);
        assert_eq!(inner.at_level(4).size(), 4 * 4 + 4 * 16);
        assert_eq!(inner.max_order(), 2);

        let mixed = (SeqRep::scalar() + ss.clone()) * (SeqRep::scalar() + ss);
        let blocks: Vec<_> = mixed.blocks().collect();
        assert_eq!(blocks, vec![(0, 1), (1, 2), (2, 1)]);
    }

    #[test]
    fn test_channels_are_contiguous() {
        let rep = (2 * SeqRep::vector() + SeqRep::tensor(2)).at_level(3);
        let channels = rep.channels();
        assert_eq!(channels.len(), 3);
        assert_eq!(channels[1].offset, 3);
        assert_eq!(channels[2].offset, 6);
        assert_eq!(channels[2].len, 9);
    }

    #[test]
    fn test_rho_dense_on_matrix_is_conjugation() {
        let p = Permutation::matrix(&[2, 0, 1]);
        let rep = SeqRep::tensor(2).at_level(3);
        let rho = rep.rho_dense(&p).unwrap();

        let x = Array2::from_shape_fn((3, 3), |(i, j)| (3 * i + j) as f64);
        let flat = x.clone().into_shape_with_order(9).unwrap();
        let expected = p.dot(&x).dot(&p.t()).into_shape_with_order(9).unwrap();
        assert_eq!(rho.dot(&flat), expected);
    }

    #[test]
    fn test_rho_dense_rejects_wrong_dimension() {
        let rep = SeqRep::vector().at_level(4);
        assert!(rep.rho_dense(&Array2::eye(3)).is_err());
        assert_eq!(Rep::scalar().rho_dense(&Array2::eye(3)).unwrap(), Array2::<f64>::eye(1));
    }
}
