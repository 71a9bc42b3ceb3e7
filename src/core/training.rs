//! Training infrastructure: batching, splits and the training loop

use ndarray::Array2;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::info;

use super::equivariance::equivariance_err;
use crate::nn::{stack_examples, Adam, Example, LrSchedule, ModelHandle, Trainable};
use crate::{EmlpError, Result};

/// Training configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Epoch budget
    pub num_epochs: usize,
    /// Learning rate per epoch
    pub lr: LrSchedule,
    /// Convergence threshold on the mean training loss of an epoch
    pub accuracy: f64,
    /// Evaluate on the test split when `epoch % eval_every == 0`
    pub eval_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            num_epochs: 1000,
            lr: LrSchedule::Constant(8e-3),
            accuracy: 1e-8,
            eval_every: 10,
        }
    }
}

/// Per-epoch history of one training run
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrainingLog {
    /// Mean training loss of every epoch
    pub train_losses: Vec<f64>,
    /// Mean test loss of every evaluation epoch
    pub test_losses: Vec<f64>,
    /// Mean gradient norm of every epoch
    pub grad_norms: Vec<f64>,
    /// Equivariance error on the last test batch of every evaluation epoch
    pub equivariance_errors: Vec<f64>,
    /// Epochs actually run
    pub epochs_run: usize,
    /// Whether training stopped on the convergence threshold
    pub converged: bool,
    /// Total training time
    pub total_time: Duration,
}

impl TrainingLog {
    /// Create an empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Get summary statistics
    pub fn summary(&self) -> String {
        format!(
            "Epochs run: {} (converged: {})\nTotal training time: {:.2}s\nFinal train loss: {:.3e}\nFinal test loss: {:.3e}",
            self.epochs_run,
            self.converged,
            self.total_time.as_secs_f64(),
            self.train_losses.last().copied().unwrap_or(f64::NAN),
            self.test_losses.last().copied().unwrap_or(f64::NAN)
        )
    }
}

/// Mean of a slice; `NaN` when empty
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        f64::NAN
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Data loader for batching
#[derive(Clone, Debug)]
pub struct DataLoader {
    data: Vec<Example>,
    order: Vec<usize>,
    batch_size: usize,
    shuffle: bool,
    current_idx: usize,
}

impl DataLoader {
    /// Create new data loader
    pub fn new(data: Vec<Example>, batch_size: usize, shuffle: bool) -> Result<Self> {
        if batch_size == 0 {
            return Err(EmlpError::InvalidConfig("batch size must be positive".to_string()));
        }
        Ok(DataLoader {
            order: (0..data.len()).collect(),
            data,
            batch_size,
            shuffle,
            current_idx: 0,
        })
    }

    /// Start a new pass, reshuffling when enabled
    pub fn reset(&mut self, rng: &mut impl Rng) {
        self.current_idx = 0;
        if self.shuffle {
            self.order.shuffle(rng);
        }
    }

    /// Start a new pass in the current order
    pub fn rewind(&mut self) {
        self.current_idx = 0;
    }

    /// Get next batch as stacked `(inputs, targets)`
    pub fn next_batch(&mut self) -> Result<Option<(Array2<f64>, Array2<f64>)>> {
        if self.current_idx >= self.data.len() {
            return Ok(None);
        }

        let end_idx = (self.current_idx + self.batch_size).min(self.data.len());
        let batch: Vec<Example> = self.order[self.current_idx..end_idx]
            .iter()
            .map(|&i| self.data[i].clone())
            .collect();
        self.current_idx = end_idx;

        stack_examples(&batch).map(Some)
    }

    /// Get number of batches
    pub fn num_batches(&self) -> usize {
        self.data.len().div_ceil(self.batch_size)
    }

    /// Batch size
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of examples
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the loader holds no examples
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether passes are reshuffled
    pub fn shuffles(&self) -> bool {
        self.shuffle
    }
}

/// Size of one dataset split
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SplitSize {
    /// Exact number of examples
    Count(usize),
    /// Fraction of the whole dataset, rounded down
    Fraction(f64),
}

impl SplitSize {
    fn resolve(&self, total: usize) -> Result<usize> {
        match *self {
            SplitSize::Count(count) => Ok(count),
            SplitSize::Fraction(frac) if (0.0..=1.0).contains(&frac) => Ok((frac * total as f64) as usize),
            SplitSize::Fraction(frac) => Err(EmlpError::InvalidConfig(format!(
                "split fraction {} is outside [0, 1]",
                frac
            ))),
        }
    }
}

/// Shuffle `data` and carve out the named splits in key order.
///
/// Without an explicit `train` entry the leftover examples become `train`.
pub fn split_dataset(
    mut data: Vec<Example>,
    splits: &BTreeMap<String, SplitSize>,
    rng: &mut impl Rng,
) -> Result<BTreeMap<String, Vec<Example>>> {
    let total = data.len();
    let sizes = splits
        .iter()
        .map(|(name, size)| -> Result<(String, usize)> { Ok((name.clone(), size.resolve(total)?)) })
        .collect::<Result<Vec<_>>>()?;
    let requested: usize = sizes.iter().map(|(_, n)| n).sum();
    if requested > total {
        return Err(EmlpError::InvalidConfig(format!(
            "splits request {} examples but the dataset has {}",
            requested, total
        )));
    }

    data.shuffle(rng);
    let mut remaining = data.into_iter();
    let mut parts: BTreeMap<String, Vec<Example>> = sizes
        .into_iter()
        .map(|(name, n)| (name, remaining.by_ref().take(n).collect()))
        .collect();
    parts.entry("train".to_string()).or_insert_with(|| remaining.collect());
    Ok(parts)
}

/// Mean loss over one unshuffled pass and the last batch seen
fn evaluate<M>(model: &M, loader: &mut DataLoader) -> Result<(f64, Option<Array2<f64>>)>
where
    M: Trainable + ?Sized,
{
    loader.rewind();
    let mut losses = Vec::with_capacity(loader.num_batches());
    let mut last = None;
    while let Some((x, y)) = loader.next_batch()? {
        losses.push(model.loss(&x, &y)?);
        last = Some(x);
    }
    Ok((mean(&losses), last))
}

/// Generic training loop.
///
/// One Adam step per training batch. Every `eval_every` epochs, starting
/// at epoch 0, the test split is scored and the equivariance error of the
/// last test batch is recorded, both before the convergence check. Stops
/// when an epoch's mean training loss drops below `accuracy`.
pub fn train_loop<M>(
    model: &mut M,
    train: &mut DataLoader,
    test: &mut DataLoader,
    config: &TrainingConfig,
    rng: &mut impl Rng,
) -> Result<TrainingLog>
where
    M: Trainable + ModelHandle + ?Sized,
{
    info!("Training set size: {}", train.len());
    info!("Test set size: {}", test.len());

    let mut log = TrainingLog::new();
    let mut optimizer = Adam::new(model.num_params());
    let mut params = model.params();
    let eval_every = config.eval_every.max(1);
    let start_time = Instant::now();

    for epoch in 0..config.num_epochs {
        let lr = config.lr.at(epoch);
        train.reset(rng);

        let mut losses = Vec::with_capacity(train.num_batches());
        let mut grad_norms = Vec::with_capacity(train.num_batches());
        while let Some((x, y)) = train.next_batch()? {
            let (loss, grad) = model.loss_and_grad(&x, &y)?;
            grad_norms.push(grad.dot(&grad).sqrt());
            optimizer.step(&mut params, &grad, lr)?;
            model.set_params(&params)?;
            losses.push(loss);
        }

        let train_loss = mean(&losses);
        log.train_losses.push(train_loss);
        log.grad_norms.push(mean(&grad_norms));
        log.epochs_run = epoch + 1;

        if epoch % eval_every == 0 {
            let (test_loss, last_batch) = evaluate(&*model, test)?;
            let equivariance = match last_batch {
                Some(x) => equivariance_err(&*model, &x, None, rng)?,
                None => f64::NAN,
            };
            log.test_losses.push(test_loss);
            log.equivariance_errors.push(equivariance);
            info!(
                "Epoch {} Train loss {:.3e} Test loss {:.3e} Equi error {:.3e}",
                epoch, train_loss, test_loss, equivariance
            );
        }

        if train_loss < config.accuracy {
            log.converged = true;
            info!("Converged at epoch {}", epoch);
            break;
        }
    }

    log.total_time = start_time.elapsed();
    info!("Training complete\n{}", log.summary());
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{projection_dataset, BasisMode, Emlp};
    use crate::reps::SeqRep;
    use ndarray::Array1;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn toy(n: usize) -> Vec<Example> {
        (0..n)
            .map(|i| (Array1::from(vec![i as f64]), Array1::from(vec![2.0 * i as f64])))
            .collect()
    }

    fn linear_projection_model(level: usize) -> Emlp {
        let mut rng = StdRng::seed_from_u64(0);
        let v2 = SeqRep::tensor(2);
        Emlp::new(&v2, &[], &v2, level, BasisMode::Compatible, &mut rng).unwrap()
    }

    #[test]
    fn test_data_loader() {
        let mut loader = DataLoader::new(toy(5), 2, false).unwrap();
        assert_eq!(loader.num_batches(), 3);

        let (x1, _) = loader.next_batch().unwrap().unwrap();
        assert_eq!(x1.nrows(), 2);
        assert_eq!(x1[(0, 0)], 0.0);

        let (x2, _) = loader.next_batch().unwrap().unwrap();
        assert_eq!(x2.nrows(), 2);

        let (x3, y3) = loader.next_batch().unwrap().unwrap();
        assert_eq!(x3.nrows(), 1);
        assert_eq!(y3[(0, 0)], 8.0);

        assert!(loader.next_batch().unwrap().is_none());
        assert!(DataLoader::new(toy(1), 0, false).is_err());
    }

    #[test]
    fn test_shuffled_pass_covers_everything() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut loader = DataLoader::new(toy(7), 3, true).unwrap();
        loader.reset(&mut rng);
        let mut seen = Vec::new();
        while let Some((x, _)) = loader.next_batch().unwrap() {
            seen.extend(x.iter().map(|&v| v as usize));
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_dataset_counts_and_fractions() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut splits = BTreeMap::new();
        splits.insert("train".to_string(), SplitSize::Count(50));
        splits.insert("val".to_string(), SplitSize::Fraction(0.1));
        splits.insert("test".to_string(), SplitSize::Fraction(0.1));
        let parts = split_dataset(toy(100), &splits, &mut rng).unwrap();
        assert_eq!(parts["train"].len(), 50);
        assert_eq!(parts["val"].len(), 10);
        assert_eq!(parts["test"].len(), 10);

        splits.remove("train");
        let parts = split_dataset(toy(100), &splits, &mut rng).unwrap();
        assert_eq!(parts["train"].len(), 80);

        splits.insert("train".to_string(), SplitSize::Count(95));
        assert!(split_dataset(toy(100), &splits, &mut rng).is_err());
        splits.insert("train".to_string(), SplitSize::Fraction(1.5));
        assert!(split_dataset(toy(100), &splits, &mut rng).is_err());
    }

    #[test]
    fn test_split_size_json() {
        let sizes: Vec<SplitSize> = serde_json::from_str("[500, 0.1]").unwrap();
        assert_eq!(sizes, vec![SplitSize::Count(500), SplitSize::Fraction(0.1)]);
    }

    #[test]
    fn test_mean_of_empty_is_nan() {
        assert!(mean(&[]).is_nan());
        assert_eq!(mean(&[1.0, 3.0]), 2.0);
    }

    #[test]
    fn test_loop_respects_epoch_budget() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut model = linear_projection_model(3);
        let mut train = DataLoader::new(projection_dataset(3, 20, &mut rng), 10, true).unwrap();
        let mut test = DataLoader::new(projection_dataset(3, 10, &mut rng), 10, false).unwrap();
        let config = TrainingConfig {
            num_epochs: 12,
            lr: LrSchedule::Constant(1e-3),
            accuracy: 0.0,
            eval_every: 10,
        };
        let log = train_loop(&mut model, &mut train, &mut test, &config, &mut rng).unwrap();
        assert_eq!(log.epochs_run, 12);
        assert_eq!(log.train_losses.len(), 12);
        // epochs 0 and 10
        assert_eq!(log.test_losses.len(), 2);
        assert!(!log.converged);
        assert!(log.equivariance_errors.iter().all(|&e| e < 1e-10));
    }

    #[test]
    fn test_loop_stops_on_convergence() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut model = linear_projection_model(3);
        let mut train = DataLoader::new(projection_dataset(3, 40, &mut rng), 8, true).unwrap();
        let mut test = DataLoader::new(projection_dataset(3, 8, &mut rng), 8, false).unwrap();
        let config = TrainingConfig {
            num_epochs: 500,
            lr: LrSchedule::Constant(1e-2),
            accuracy: 1e-3,
            eval_every: 10,
        };
        let log = train_loop(&mut model, &mut train, &mut test, &config, &mut rng).unwrap();
        assert!(log.converged);
        assert!(log.epochs_run < 500);
        assert!(*log.train_losses.last().unwrap() < 1e-3);
        assert!(log.train_losses[0] > *log.train_losses.last().unwrap());
    }

    /// Drops the last gradient entry
    struct ShortGradient(Emlp);

    impl ModelHandle for ShortGradient {
        fn underlying(&self) -> &dyn crate::nn::EquivariantModel {
            &self.0
        }
    }

    impl Trainable for ShortGradient {
        fn num_params(&self) -> usize {
            self.0.num_params()
        }

        fn params(&self) -> Array1<f64> {
            self.0.params()
        }

        fn set_params(&mut self, params: &Array1<f64>) -> Result<()> {
            self.0.set_params(params)
        }

        fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
            self.0.predict(x)
        }

        fn loss_and_grad(&self, x: &Array2<f64>, y: &Array2<f64>) -> Result<(f64, Array1<f64>)> {
            let (loss, grad) = self.0.loss_and_grad(x, y)?;
            let keep = grad.len().saturating_sub(1);
            Ok((loss, grad.slice(ndarray::s![..keep]).to_owned()))
        }
    }

    #[test]
    fn test_loop_fails_on_mis_sized_gradient() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut model = ShortGradient(linear_projection_model(3));
        let before = model.params();
        let mut train = DataLoader::new(projection_dataset(3, 8, &mut rng), 4, true).unwrap();
        let mut test = DataLoader::new(projection_dataset(3, 4, &mut rng), 4, false).unwrap();
        let config = TrainingConfig { num_epochs: 3, ..TrainingConfig::default() };
        let result = train_loop(&mut model, &mut train, &mut test, &config, &mut rng);
        assert!(matches!(result, Err(EmlpError::ShapeMismatch(_))));
        assert_eq!(model.params(), before);
    }

    #[test]
    fn test_empty_test_split_gives_nan() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut model = linear_projection_model(2);
        let mut train = DataLoader::new(projection_dataset(2, 4, &mut rng), 2, true).unwrap();
        let mut test = DataLoader::new(Vec::new(), 2, false).unwrap();
        let config = TrainingConfig { num_epochs: 1, ..TrainingConfig::default() };
        let log = train_loop(&mut model, &mut train, &mut test, &config, &mut rng).unwrap();
        assert!(log.test_losses[0].is_nan());
        assert!(log.equivariance_errors[0].is_nan());
    }
}
