//! Neural network architectures, optimizers and datasets

mod datasets;
mod emlp;
mod linear;
mod loss;
mod optim;
mod sequence;
mod wrappers;

use ndarray::{Array1, Array2};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::NetConfig;
use crate::groups::GroupKind;
use crate::reps::{Rep, SeqRep};
use crate::{EmlpError, Result};

pub use datasets::{
    projection_dataset, random_sample, stack_examples, to_evaluate, Example, IsotropicOscillator,
    SystemDataset,
};
pub use emlp::{swish, Emlp, Mlp};
pub use linear::{BasisMode, EquivariantLinear};
pub use loss::{mse, mse_with_grad};
pub use optim::{Adam, LrSchedule, OptimizerConstructor};
pub use sequence::EmlpSequence;
pub use wrappers::Standardize;

/// A model with declared input/output representations and symmetry
pub trait EquivariantModel: Send + Sync {
    /// Input representation
    fn rep_in(&self) -> &Rep;

    /// Output representation
    fn rep_out(&self) -> &Rep;

    /// Symmetry group the model was built for
    fn symmetry(&self) -> &GroupKind;

    /// Apply the model to a batch of row vectors
    fn forward(&self, x: &Array2<f64>) -> Result<Array2<f64>>;
}

/// Uniform access to the model behind a possibly-wrapped network
pub trait ModelHandle {
    /// The innermost model
    fn underlying(&self) -> &dyn EquivariantModel;

    /// Symmetry group of the innermost model
    fn group(&self) -> &GroupKind {
        self.underlying().symmetry()
    }
}

/// Flat-parameter interface used by the training loop
pub trait Trainable {
    /// Number of trainable parameters
    fn num_params(&self) -> usize;

    /// Current parameters as a flat vector
    fn params(&self) -> Array1<f64>;

    /// Replace all parameters
    fn set_params(&mut self, params: &Array1<f64>) -> Result<()>;

    /// Predictions for a batch, including any wrapping preprocessing
    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Mean squared error and its gradient with respect to the parameters
    fn loss_and_grad(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<(f64, Array1<f64>)>;

    /// Mean squared error only
    fn loss(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<f64> {
        mse(&self.predict(x)?, y)
    }
}

/// Anything the experiment drivers can train and diagnose
pub trait Network: ModelHandle + Trainable + Send {}

impl<T: ModelHandle + Trainable + Send> Network for T {}

impl ModelHandle for Box<dyn Network> {
    fn underlying(&self) -> &dyn EquivariantModel {
        (**self).underlying()
    }
}

impl Trainable for Box<dyn Network> {
    fn num_params(&self) -> usize {
        (**self).num_params()
    }

    fn params(&self) -> Array1<f64> {
        (**self).params()
    }

    fn set_params(&mut self, params: &Array1<f64>) -> Result<()> {
        (**self).set_params(params)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        (**self).predict(x)
    }

    fn loss_and_grad(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<(f64, Array1<f64>)> {
        (**self).loss_and_grad(x, y)
    }
}

/// Named network architectures selectable from configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkKind {
    /// Unconstrained MLP
    Mlp,
    /// Equivariant MLP
    Emlp,
    /// MLP producing a scalar Hamiltonian
    MlpH,
    /// Equivariant MLP producing a scalar Hamiltonian
    EmlpH,
}

impl NetworkKind {
    /// Whether the network outputs a scalar energy
    pub fn is_hamiltonian(&self) -> bool {
        matches!(self, NetworkKind::MlpH | NetworkKind::EmlpH)
    }

    /// Construct the network for the given representations and group
    pub fn build(
        &self,
        rep_in: &Rep,
        rep_out: &Rep,
        net: &NetConfig,
        group: GroupKind,
        rng: &mut impl Rng,
    ) -> Result<Box<dyn Network>> {
        let scalar = Rep::scalar();
        let rep_out = if self.is_hamiltonian() { &scalar } else { rep_out };
        let network: Box<dyn Network> = match self {
            NetworkKind::Mlp | NetworkKind::MlpH => Box::new(Mlp::new(
                rep_in,
                rep_out,
                net.ch,
                net.num_layers,
                group,
                rng,
            )?),
            NetworkKind::Emlp | NetworkKind::EmlpH => {
                let hidden = vec![SeqRep::uniform(net.ch, rep_in.base_dim()); net.num_layers];
                Box::new(Emlp::for_group(rep_in, rep_out, &hidden, group, rng).map_err(|e| match e {
                    EmlpError::UnsupportedGroup { group, .. } => EmlpError::UnsupportedGroup {
                        group,
                        network: self.to_string(),
                    },
                    other => other,
                })?)
            }
        };
        Ok(network)
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NetworkKind::Mlp => "MLP",
            NetworkKind::Emlp => "EMLP",
            NetworkKind::MlpH => "MLPH",
            NetworkKind::EmlpH => "EMLPH",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for NetworkKind {
    type Err = EmlpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MLP" => Ok(NetworkKind::Mlp),
            "EMLP" => Ok(NetworkKind::Emlp),
            "MLPH" => Ok(NetworkKind::MlpH),
            "EMLPH" => Ok(NetworkKind::EmlpH),
            _ => Err(EmlpError::UnknownName {
                kind: "network",
                name: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_network_names() {
        for kind in [NetworkKind::Mlp, NetworkKind::Emlp, NetworkKind::MlpH, NetworkKind::EmlpH] {
            assert_eq!(kind.to_string().parse::<NetworkKind>().unwrap(), kind);
        }
        assert!("transformer".parse::<NetworkKind>().is_err());
    }

    #[test]
    fn test_hamiltonian_networks_output_scalars() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = NetConfig { num_layers: 2, ch: 16, group: None };
        let rep_in = Rep::vectors(3, 4);
        let model = NetworkKind::MlpH
            .build(&rep_in, &rep_in, &net, GroupKind::O2eR3, &mut rng)
            .unwrap();
        assert_eq!(model.underlying().rep_out().size(), 1);
        assert_eq!(model.group(), &GroupKind::O2eR3);
        let y = model.predict(&Array2::zeros((5, 12))).unwrap();
        assert_eq!(y.dim(), (5, 1));
    }

    #[test]
    fn test_emlp_rejects_continuous_groups() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = NetConfig { num_layers: 1, ch: 8, group: None };
        let rep_in = Rep::vectors(3, 4);
        let err = NetworkKind::EmlpH
            .build(&rep_in, &Rep::scalar(), &net, GroupKind::O2eR3, &mut rng)
            .err()
            .unwrap();
        assert!(matches!(err, EmlpError::UnsupportedGroup { ref network, .. } if network == "EMLPH"));
    }

    #[test]
    fn test_emlp_builds_for_permutations() {
        let mut rng = StdRng::seed_from_u64(0);
        let net = NetConfig { num_layers: 2, ch: 32, group: None };
        let rep_in = SeqRep::tensor(2).at_level(3);
        let model = NetworkKind::Emlp
            .build(&rep_in, &rep_in, &net, GroupKind::S { n: 3 }, &mut rng)
            .unwrap();
        assert_eq!(model.predict(&Array2::zeros((2, 9))).unwrap().dim(), (2, 9));
    }
}
