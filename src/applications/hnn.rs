//! Hamiltonian neural network experiment assembly
//!
//! Builds everything a dynamics trainer needs (dataset splits, model,
//! loaders, optimizer and schedule) and hands the parts to any type
//! implementing [`DynamicsTrainer`]. Trajectory integration belongs to
//! the trainer.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;
use tracing::level_filters::LevelFilter;

use crate::core::{split_dataset, DataLoader, NetConfig, SplitSize};
use crate::nn::{stack_examples, Adam, LrSchedule, Network, NetworkKind, OptimizerConstructor, Standardize, SystemDataset};
use crate::reps::Rep;
use crate::utils::parse_log_level;
use crate::Result;

/// Trainer logging settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Directory for trainer logs; `None` disables file logging
    pub log_dir: Option<PathBuf>,
    /// Minimum seconds between log writes
    pub min_period: f64,
    /// Fraction of wall time the trainer may spend logging
    pub time_frac: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        TrainerConfig {
            log_dir: None,
            min_period: 0.02,
            time_frac: 0.75,
        }
    }
}

/// HNN experiment settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HnnConfig {
    /// Energy model architecture
    pub network: NetworkKind,
    /// Epoch budget handed to the trainer
    pub num_epochs: usize,
    /// Number of simulated systems
    pub ndata: usize,
    /// Samples per trajectory chunk
    pub chunk_len: usize,
    /// Seed for dataset synthesis, splitting and initialization
    pub seed: u64,
    /// Batch size cap
    pub bs: usize,
    /// Constant learning rate
    pub lr: f64,
    /// Compute device label, reported only
    pub device: String,
    /// Split sizes by name
    pub split: BTreeMap<String, SplitSize>,
    /// Network architecture settings
    pub net_config: NetConfig,
    /// Log verbosity name
    pub log_level: String,
    /// Settings forwarded to the trainer
    pub trainer_config: TrainerConfig,
    /// Whether the trainer should checkpoint
    pub save: bool,
    /// Wrap the model in input standardization fitted on the train split
    pub standardize: bool,
}

impl Default for HnnConfig {
    fn default() -> Self {
        let split = [
            ("train", SplitSize::Count(500)),
            ("val", SplitSize::Fraction(0.1)),
            ("test", SplitSize::Fraction(0.1)),
        ]
        .into_iter()
        .map(|(name, size)| (name.to_string(), size))
        .collect();

        HnnConfig {
            network: NetworkKind::MlpH,
            num_epochs: 2000,
            ndata: 5000,
            chunk_len: 5,
            seed: 2021,
            bs: 500,
            lr: 3e-3,
            device: "cuda".to_string(),
            split,
            net_config: NetConfig::default(),
            log_level: "info".to_string(),
            trainer_config: TrainerConfig::default(),
            save: false,
            standardize: false,
        }
    }
}

/// Everything a dynamics trainer is built from
pub struct TrainerParts {
    /// Energy model
    pub model: Box<dyn Network>,
    /// Loaders by split name. `Train` is a second loader over the `train`
    /// examples with the same batch size and shuffle flag; it keeps its
    /// own cursor and shuffle order.
    pub dataloaders: BTreeMap<String, DataLoader>,
    /// Optimizer factory
    pub opt_constr: OptimizerConstructor,
    /// Learning rate per epoch
    pub lr_sched: LrSchedule,
    /// Epoch budget
    pub num_epochs: usize,
    /// Logging settings
    pub trainer_config: TrainerConfig,
    /// Parsed verbosity for the caller's subscriber
    pub log_level: LevelFilter,
    /// Sample times of each trajectory chunk
    pub time_grid: Array1<f64>,
    /// Whether to checkpoint
    pub save: bool,
}

/// A trainer that integrates learned dynamics
pub trait DynamicsTrainer: Sized {
    /// Assemble the trainer
    fn from_parts(parts: TrainerParts) -> Result<Self>;
}

/// Build a trainer for a dataset produced by
/// `dataset(n_systems, chunk_len, rng)`.
///
/// The log level is validated before anything else. The group falls back
/// to the dataset's symmetry, and the model always outputs a scalar
/// energy. Only the `train` loaders shuffle. `Train` is cloned from
/// `train` before any pass, so both start in the same order and then
/// advance independently.
pub fn make_trainer<T, D, F>(cfg: &HnnConfig, dataset: F) -> Result<T>
where
    T: DynamicsTrainer,
    D: SystemDataset,
    F: FnOnce(usize, usize, &mut StdRng) -> D,
{
    let log_level = parse_log_level(&cfg.log_level)?;

    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let base = dataset(cfg.ndata, cfg.chunk_len, &mut rng);
    let splits = split_dataset(base.examples(), &cfg.split, &mut rng)?;

    let group = cfg.net_config.group.unwrap_or_else(|| base.symmetry());
    info!(
        systems = base.len(),
        %group,
        network = %cfg.network,
        device = %cfg.device,
        "assembling trainer"
    );
    let mut model = cfg.network.build(&base.rep_in(), &Rep::scalar(), &cfg.net_config, group, &mut rng)?;
    if cfg.standardize {
        let train = splits.get("train").map(Vec::as_slice).unwrap_or(&[]);
        let (x, _) = stack_examples(train)?;
        model = Box::new(Standardize::fit(model, &x)?);
    }

    let mut dataloaders = BTreeMap::new();
    for (name, examples) in splits {
        let batch_size = cfg.bs.min(examples.len()).max(1);
        let shuffle = name == "train";
        info!("{} split: {} examples", name, examples.len());
        dataloaders.insert(name, DataLoader::new(examples, batch_size, shuffle)?);
    }
    if let Some(train) = dataloaders.get("train").cloned() {
        dataloaders.insert("Train".to_string(), train);
    }

    T::from_parts(TrainerParts {
        model,
        dataloaders,
        opt_constr: Adam::new,
        lr_sched: LrSchedule::Constant(cfg.lr),
        num_epochs: cfg.num_epochs,
        trainer_config: cfg.trainer_config.clone(),
        log_level,
        time_grid: base.time_grid(),
        save: cfg.save,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groups::GroupKind;
    use crate::nn::{IsotropicOscillator, ModelHandle, Trainable};
    use crate::EmlpError;
    use ndarray::Array2;
    use std::cell::Cell;

    struct Recorder(TrainerParts);

    impl DynamicsTrainer for Recorder {
        fn from_parts(parts: TrainerParts) -> Result<Self> {
            Ok(Recorder(parts))
        }
    }

    fn oscillator(n_systems: usize, chunk_len: usize, rng: &mut StdRng) -> IsotropicOscillator {
        IsotropicOscillator::new(n_systems, chunk_len, rng)
    }

    fn small_config() -> HnnConfig {
        let mut cfg = HnnConfig {
            ndata: 100,
            bs: 32,
            net_config: NetConfig { num_layers: 1, ch: 16, group: Some(GroupKind::O2eR3) },
            ..HnnConfig::default()
        };
        cfg.split.insert("train".to_string(), SplitSize::Count(50));
        cfg
    }

    #[test]
    fn test_defaults() {
        let cfg = HnnConfig::default();
        assert_eq!(cfg.network, NetworkKind::MlpH);
        assert_eq!(cfg.split["train"], SplitSize::Count(500));
        assert_eq!(cfg.split["val"], SplitSize::Fraction(0.1));
        assert_eq!(cfg.net_config.group, Some(GroupKind::O2eR3));
        assert_eq!(cfg.trainer_config.min_period, 0.02);
    }

    #[test]
    fn test_assembles_loaders_and_scalar_model() {
        let Recorder(parts) = make_trainer(&small_config(), oscillator).unwrap();

        let names: Vec<_> = parts.dataloaders.keys().cloned().collect();
        assert_eq!(names, vec!["Train", "test", "train", "val"]);
        assert_eq!(parts.dataloaders["train"].len(), 50);
        assert_eq!(parts.dataloaders["val"].len(), 10);
        assert_eq!(parts.dataloaders["test"].batch_size(), 10);
        assert_eq!(parts.dataloaders["train"].batch_size(), 32);
        assert!(parts.dataloaders["train"].shuffles());
        assert!(parts.dataloaders["Train"].shuffles());
        assert!(!parts.dataloaders["val"].shuffles());

        assert_eq!(parts.model.underlying().rep_out().size(), 1);
        assert_eq!(parts.model.group(), &GroupKind::O2eR3);
        assert_eq!(parts.lr_sched.at(1999), 3e-3);
        assert_eq!(parts.log_level, LevelFilter::INFO);
        assert_eq!(parts.time_grid.len(), 5);

        let opt = (parts.opt_constr)(parts.model.num_params());
        assert_eq!(opt.steps(), 0);
    }

    #[test]
    fn test_capitalized_train_loader_is_independent_copy() {
        let Recorder(mut parts) = make_trainer(&small_config(), oscillator).unwrap();
        let (lower, upper) = (&parts.dataloaders["train"], &parts.dataloaders["Train"]);
        assert_eq!(lower.len(), upper.len());
        assert_eq!(lower.batch_size(), upper.batch_size());
        assert_eq!(lower.shuffles(), upper.shuffles());

        let first = parts.dataloaders.get_mut("train").unwrap().next_batch().unwrap().unwrap();
        let upper = parts.dataloaders.get_mut("Train").unwrap();
        let same = upper.next_batch().unwrap().unwrap();
        assert_eq!(first, same);
        // consuming `train` left the copy's cursor alone
        let mut rest = 1;
        while upper.next_batch().unwrap().is_some() {
            rest += 1;
        }
        assert_eq!(rest, upper.num_batches());
    }

    #[test]
    fn test_group_defaults_to_dataset_symmetry() {
        let mut cfg = small_config();
        cfg.net_config.group = None;
        let Recorder(parts) = make_trainer(&cfg, oscillator).unwrap();
        assert_eq!(parts.model.group(), &GroupKind::O2eR3);
    }

    #[test]
    fn test_bad_log_level_fails_before_synthesis() {
        let mut cfg = small_config();
        cfg.log_level = "loud".to_string();
        let called = Cell::new(false);
        let result = make_trainer::<Recorder, _, _>(&cfg, |n, len, rng: &mut StdRng| {
            called.set(true);
            IsotropicOscillator::new(n, len, rng)
        });
        assert!(matches!(result, Err(EmlpError::UnknownName { .. })));
        assert!(!called.get());
    }

    #[test]
    fn test_equivariant_energy_needs_discrete_group() {
        let mut cfg = small_config();
        cfg.network = NetworkKind::EmlpH;
        let result = make_trainer::<Recorder, _, _>(&cfg, oscillator);
        assert!(matches!(result, Err(EmlpError::UnsupportedGroup { .. })));
    }

    #[test]
    fn test_standardized_model_keeps_underlying_reps() {
        let mut cfg = small_config();
        cfg.standardize = true;
        let Recorder(parts) = make_trainer(&cfg, oscillator).unwrap();
        assert_eq!(parts.model.underlying().rep_in().size(), 12);
        let y = parts.model.predict(&Array2::ones((3, 12))).unwrap();
        assert_eq!(y.dim(), (3, 1));
    }

    #[test]
    fn test_same_seed_same_split() {
        let Recorder(a) = make_trainer(&small_config(), oscillator).unwrap();
        let Recorder(b) = make_trainer(&small_config(), oscillator).unwrap();
        let first = |parts: &TrainerParts| {
            let mut loader = parts.dataloaders["val"].clone();
            loader.next_batch().unwrap().unwrap().0
        };
        assert_eq!(first(&a), first(&b));
        assert_eq!(a.model.params(), b.model.params());
    }
}
