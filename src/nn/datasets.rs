//! Synthetic datasets for the experiments

use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::groups::GroupKind;
use crate::reps::Rep;
use crate::{EmlpError, Result};

/// One `(input, target)` pair of flattened vectors
pub type Example = (Array1<f64>, Array1<f64>);

/// A `size × size` matrix with standard normal entries
pub fn random_sample(size: usize, rng: &mut impl Rng) -> Array2<f64> {
    Array2::from_shape_simple_fn((size, size), || rng.sample(StandardNormal))
}

/// Symmetric part `(x + xᵀ)/2`
pub fn to_evaluate(x: &Array2<f64>) -> Array2<f64> {
    (x + &x.t()) / 2.0
}

/// `count` flattened symmetric-projection pairs at dimension `d`
pub fn projection_dataset(d: usize, count: usize, rng: &mut impl Rng) -> Vec<Example> {
    (0..count)
        .map(|_| {
            let x = random_sample(d, rng);
            let y = to_evaluate(&x);
            (Array1::from_iter(x.iter().copied()), Array1::from_iter(y.iter().copied()))
        })
        .collect()
}

/// Stack examples into `(inputs, targets)` batch matrices
pub fn stack_examples(examples: &[Example]) -> Result<(Array2<f64>, Array2<f64>)> {
    let (dx, dy) = match examples.first() {
        Some((x, y)) => (x.len(), y.len()),
        None => return Ok((Array2::zeros((0, 0)), Array2::zeros((0, 0)))),
    };
    let mut xs = Vec::with_capacity(examples.len() * dx);
    let mut ys = Vec::with_capacity(examples.len() * dy);
    for (x, y) in examples {
        if x.len() != dx || y.len() != dy {
            return Err(EmlpError::ShapeMismatch(
                "examples in one batch have different sizes".to_string(),
            ));
        }
        xs.extend(x.iter());
        ys.extend(y.iter());
    }
    let n = examples.len();
    let shape_err = |e: ndarray::ShapeError| EmlpError::ShapeMismatch(e.to_string());
    Ok((
        Array2::from_shape_vec((n, dx), xs).map_err(shape_err)?,
        Array2::from_shape_vec((n, dy), ys).map_err(shape_err)?,
    ))
}

/// A synthesized physical system with a declared symmetry
pub trait SystemDataset {
    /// Symmetry of the dynamics
    fn symmetry(&self) -> GroupKind;

    /// Representation of the state vector
    fn rep_in(&self) -> Rep;

    /// Sample times of each trajectory chunk
    fn time_grid(&self) -> Array1<f64>;

    /// Number of trajectories
    fn len(&self) -> usize;

    /// Whether the dataset holds no trajectories
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Initial state and flattened trajectory chunk
    fn example(&self, index: usize) -> Option<Example>;

    /// All examples in order
    fn examples(&self) -> Vec<Example> {
        (0..self.len()).filter_map(|i| self.example(i)).collect()
    }
}

/// Two unit masses on isotropic unit springs under gravity along `-z`.
///
/// State layout is `[q1, q2, p1, p2]`, each in R³. Trajectories are
/// closed-form, so no integrator is involved. Gravity leaves rotations
/// and reflections about the z axis as the symmetry.
#[derive(Clone, Debug)]
pub struct IsotropicOscillator {
    gravity: f64,
    times: Array1<f64>,
    states: Vec<Array1<f64>>,
}

impl IsotropicOscillator {
    /// Sample time step between trajectory points
    pub const DT: f64 = 0.1;

    /// `n_systems` random initial conditions, `chunk_len` samples each
    pub fn new(n_systems: usize, chunk_len: usize, rng: &mut impl Rng) -> Self {
        let states = (0..n_systems)
            .map(|_| Array1::from_shape_simple_fn(12, || rng.sample(StandardNormal)))
            .collect();
        IsotropicOscillator {
            gravity: 1.0,
            times: Array1::from_iter((0..chunk_len).map(|k| k as f64 * Self::DT)),
            states,
        }
    }

    /// State at time `t` starting from `z0`
    pub fn evolve(&self, z0: &Array1<f64>, t: f64) -> Array1<f64> {
        let (s, c) = t.sin_cos();
        let mut z = Array1::zeros(12);
        for body in 0..2 {
            for axis in 0..3 {
                let center = if axis == 2 { -self.gravity } else { 0.0 };
                let q0 = z0[3 * body + axis] - center;
                let p0 = z0[6 + 3 * body + axis];
                z[3 * body + axis] = center + q0 * c + p0 * s;
                z[6 + 3 * body + axis] = -q0 * s + p0 * c;
            }
        }
        z
    }

    /// Total energy of a state
    pub fn energy(&self, z: &Array1<f64>) -> f64 {
        let kinetic: f64 = z.iter().skip(6).map(|p| 0.5 * p * p).sum();
        let spring: f64 = z.iter().take(6).map(|q| 0.5 * q * q).sum();
        kinetic + spring + self.gravity * (z[2] + z[5])
    }
}

impl SystemDataset for IsotropicOscillator {
    fn symmetry(&self) -> GroupKind {
        GroupKind::O2eR3
    }

    fn rep_in(&self) -> Rep {
        Rep::vectors(3, 4)
    }

    fn time_grid(&self) -> Array1<f64> {
        self.times.clone()
    }

    fn len(&self) -> usize {
        self.states.len()
    }

    fn example(&self, index: usize) -> Option<Example> {
        let z0 = self.states.get(index)?;
        let trajectory: Vec<f64> = self
            .times
            .iter()
            .flat_map(|&t| self.evolve(z0, t).to_vec())
            .collect();
        Some((z0.clone(), Array1::from(trajectory)))
    }
}
