//! Optimizers and learning-rate schedules

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::{EmlpError, Result};

/// Adam over a flat parameter vector
#[derive(Clone, Debug)]
pub struct Adam {
    beta1: f64,
    beta2: f64,
    eps: f64,
    t: usize,
    m: Array1<f64>,
    v: Array1<f64>,
}

impl Adam {
    /// Fresh moment estimates for `num_params` parameters
    pub fn new(num_params: usize) -> Self {
        Adam {
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            t: 0,
            m: Array1::zeros(num_params),
            v: Array1::zeros(num_params),
        }
    }

    /// Number of steps taken
    pub fn steps(&self) -> usize {
        self.t
    }

    /// One bias-corrected update of `params` in place
    pub fn step(&mut self, params: &mut Array1<f64>, grads: &Array1<f64>, lr: f64) -> Result<()> {
        if params.len() != grads.len() || params.len() != self.m.len() {
            return Err(EmlpError::ShapeMismatch(format!(
                "optimizer tracks {} parameters, got {} parameters and {} gradients",
                self.m.len(),
                params.len(),
                grads.len()
            )));
        }
        self.t += 1;

        self.m = &self.m * self.beta1 + grads * (1.0 - self.beta1);
        self.v = &self.v * self.beta2 + grads.mapv(|g| g * g) * (1.0 - self.beta2);

        let b1t = 1.0 - self.beta1.powi(self.t as i32);
        let b2t = 1.0 - self.beta2.powi(self.t as i32);
        let eps = self.eps;
        ndarray::Zip::from(params)
            .and(&self.m)
            .and(&self.v)
            .for_each(|p, &m, &v| {
                *p -= lr * (m / b1t) / ((v / b2t).sqrt() + eps);
            });
        Ok(())
    }
}

/// Constructor for an optimizer given the parameter count
pub type OptimizerConstructor = fn(usize) -> Adam;

/// Learning rate as a function of the epoch
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum LrSchedule {
    /// Fixed learning rate
    Constant(f64),
    /// Cosine decay from `lr` to zero over `epochs`
    Cosine {
        /// Peak learning rate
        lr: f64,
        /// Decay horizon
        epochs: usize,
    },
}

impl LrSchedule {
    /// Learning rate at `epoch`
    pub fn at(&self, epoch: usize) -> f64 {
        match *self {
            LrSchedule::Constant(lr) => lr,
            LrSchedule::Cosine { lr, epochs } => {
                let progress = (epoch as f64 / epochs.max(1) as f64).min(1.0);
                lr * 0.5 * (1.0 + (PI * progress).cos())
            }
        }
    }
}
