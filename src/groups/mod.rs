//! Symmetry groups acting on a base vector space.
//!
//! Every group is sampled as dense matrices of its base representation.
//! Higher representations (tensors, sums) are built from these in
//! [`crate::reps`].

mod permutation;
mod planar;

use ndarray::Array2;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{EmlpError, Result};

pub use permutation::Permutation;
pub use planar::{DkeR3, O2eR3, SO2eR3};

/// A matrix group that can be randomly sampled
pub trait Group: fmt::Debug + Send + Sync {
    /// Human readable name, e.g. `S(4)`
    fn name(&self) -> String;

    /// Dimension of the base representation
    fn dim(&self) -> usize;

    /// Draw one element as a dense `dim × dim` matrix
    fn sample(&self, rng: &mut dyn RngCore) -> Array2<f64>;

    /// Draw `count` independent elements
    fn samples(&self, count: usize, rng: &mut dyn RngCore) -> Vec<Array2<f64>> {
        (0..count).map(|_| self.sample(rng)).collect()
    }
}

/// The trivial group on `R^dim`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trivial(pub usize);

impl Group for Trivial {
    fn name(&self) -> String {
        format!("Trivial({})", self.0)
    }

    fn dim(&self) -> usize {
        self.0
    }

    fn sample(&self, _rng: &mut dyn RngCore) -> Array2<f64> {
        Array2::eye(self.0)
    }
}

/// Named groups selectable from configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GroupKind {
    /// Identity only
    Trivial {
        /// Base dimension
        dim: usize,
    },
    /// Symmetric group permuting `n` coordinates
    S {
        /// Number of permuted coordinates
        n: usize,
    },
    /// Rotations of the xy-plane inside R³
    SO2eR3,
    /// Rotations and reflections of the xy-plane inside R³
    O2eR3,
    /// Dihedral group of order `2k` acting on the xy-plane inside R³
    DkeR3 {
        /// Rotation order
        k: usize,
    },
}

impl GroupKind {
    /// Whether the orbit basis of set partitions applies to this group
    pub fn is_permutation(&self) -> bool {
        matches!(self, GroupKind::S { .. })
    }
}

impl Group for GroupKind {
    fn name(&self) -> String {
        self.to_string()
    }

    fn dim(&self) -> usize {
        match *self {
            GroupKind::Trivial { dim } => dim,
            GroupKind::S { n } => n,
            GroupKind::SO2eR3 | GroupKind::O2eR3 | GroupKind::DkeR3 { .. } => 3,
        }
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Array2<f64> {
        match *self {
            GroupKind::Trivial { dim } => Trivial(dim).sample(rng),
            GroupKind::S { n } => Permutation(n).sample(rng),
            GroupKind::SO2eR3 => SO2eR3.sample(rng),
            GroupKind::O2eR3 => O2eR3.sample(rng),
            GroupKind::DkeR3 { k } => DkeR3(k).sample(rng),
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupKind::Trivial { dim } => write!(f, "Trivial({})", dim),
            GroupKind::S { n } => write!(f, "S({})", n),
            GroupKind::SO2eR3 => write!(f, "SO2eR3"),
            GroupKind::O2eR3 => write!(f, "O2eR3"),
            GroupKind::DkeR3 { k } => write!(f, "DkeR3({})", k),
        }
    }
}

impl FromStr for GroupKind {
    type Err = EmlpError;

    /// Parse `Name` or `Name(arg)`, e.g. `S(4)`, `DkeR3(6)`, `O2eR3`
    fn from_str(s: &str) -> Result<Self> {
        let unknown = || EmlpError::UnknownName {
            kind: "group",
            name: s.to_string(),
        };
        let s = s.trim();
        let (name, arg) = match s.find('(') {
            Some(open) if s.ends_with(')') => {
                let arg = s[open + 1..s.len() - 1]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| unknown())?;
                (&s[..open], Some(arg))
            }
            Some(_) => return Err(unknown()),
            None => (s, None),
        };

        match (name, arg) {
            ("Trivial", Some(dim)) => Ok(GroupKind::Trivial { dim }),
            ("S", Some(n)) => Ok(GroupKind::S { n }),
            ("SO2eR3", None) => Ok(GroupKind::SO2eR3),
            ("O2eR3", None) => Ok(GroupKind::O2eR3),
            ("DkeR3", Some(k)) if k > 0 => Ok(GroupKind::DkeR3 { k }),
            _ => Err(unknown()),
        }
    }
}

/// Mean absolute deviation of the sampled elements from the identity
pub fn identity_deviation(samples: &[Array2<f64>]) -> f64 {
    let mut total = 0.0;
    let mut count = 0usize;
    for g in samples {
        let eye = Array2::<f64>::eye(g.nrows());
        total += (g - &eye).mapv(f64::abs).sum();
        count += g.len();
    }
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}
