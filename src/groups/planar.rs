//! Planar groups embedded in R³, acting on the xy-plane and fixing z

use ndarray::{array, Array2};
use rand::{Rng, RngCore};
use std::f64::consts::PI;

use super::Group;

fn embedded_rotation(theta: f64, reflect: bool) -> Array2<f64> {
    let (s, c) = theta.sin_cos();
    let flip = if reflect { -1.0 } else { 1.0 };
    // rotation after reflecting y
    array![
        [c, -s * flip, 0.0],
        [s, c * flip, 0.0],
        [0.0, 0.0, 1.0],
    ]
}

/// SO(2) rotations about the z axis
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SO2eR3;

impl Group for SO2eR3 {
    fn name(&self) -> String {
        "SO2eR3".to_string()
    }

    fn dim(&self) -> usize {
        3
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Array2<f64> {
        embedded_rotation(rng.gen_range(0.0..2.0 * PI), false)
    }
}

/// O(2) rotations and reflections about the z axis
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct O2eR3;

impl Group for O2eR3 {
    fn name(&self) -> String {
        "O2eR3".to_string()
    }

    fn dim(&self) -> usize {
        3
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Array2<f64> {
        let theta = rng.gen_range(0.0..2.0 * PI);
        embedded_rotation(theta, rng.gen_bool(0.5))
    }
}

/// Dihedral group D_k about the z axis
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DkeR3(pub usize);

impl Group for DkeR3 {
    fn name(&self) -> String {
        format!("DkeR3({})", self.0)
    }

    fn dim(&self) -> usize {
        3
    }

    fn sample(&self, rng: &mut dyn RngCore) -> Array2<f64> {
        let k = self.0.max(1);
        let j = rng.gen_range(0..k);
        embedded_rotation(2.0 * PI * j as f64 / k as f64, rng.gen_bool(0.5))
    }
}
