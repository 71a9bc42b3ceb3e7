//! Symmetric projection `X ↦ (X + Xᵀ)/2` learned at one dimension and
//! evaluated at others

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::core::{mean, train_loop, DataLoader, ExperimentConfig, TrainingLog};
use crate::nn::{mse, projection_dataset, stack_examples, Emlp, EmlpSequence, Example, Trainable};
use crate::reps::SeqRep;
use crate::utils::{save_json, timing::Timer};
use crate::{EmlpError, Result};

/// File name of the persisted result bundle
pub const STATE_FILE: &str = "symmetric_projection_state.json";

/// File name of the rendered figure
#[cfg(feature = "viz")]
pub const PLOT_FILE: &str = "symmetric_projection.svg";

/// Timing and accuracy of a family at each evaluated dimension
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionSweep {
    /// Seconds spent instantiating the trained model at each dimension
    pub times: Vec<f64>,
    /// Held-out mean squared error at each dimension
    #[serde(with = "nan_as_null")]
    pub mses: Vec<f64>,
}

/// Both families' sweeps, as written to [`STATE_FILE`]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectionResults {
    /// Evaluated dimensions
    pub dimensions: Vec<usize>,
    /// Extension times of the compatible family
    pub times_comp: Vec<f64>,
    /// Extension times of the free family
    pub times_free: Vec<f64>,
    /// Held-out errors of the compatible family
    #[serde(with = "nan_as_null")]
    pub mses_comp: Vec<f64>,
    /// Held-out errors of the free family; `NaN` where it cannot extend
    #[serde(with = "nan_as_null")]
    pub mses_free: Vec<f64>,
}

// JSON has no NaN; store it as null
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        values
            .iter()
            .map(|v| if v.is_nan() { None } else { Some(*v) })
            .collect::<Vec<_>>()
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        let values = Vec::<Option<f64>>::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

/// A trained family with the model it was trained through
#[derive(Debug)]
pub struct TrainedFamily {
    /// The trained member at the training dimension
    pub model: Emlp,
    /// Family with the trained member registered
    pub family: EmlpSequence,
    /// Training history
    pub log: TrainingLog,
}

/// `samples` held-out pairs for every dimension in `dims`
pub fn held_out_sets(dims: &[usize], samples: usize, rng: &mut impl Rng) -> Vec<Vec<Example>> {
    dims.iter().map(|&d| projection_dataset(d, samples, rng)).collect()
}

/// Hidden layers from the configured channel counts
fn hidden_layers(cfg: &ExperimentConfig) -> Vec<SeqRep> {
    let inner = cfg.hidden_vectors * SeqRep::vector() + cfg.hidden_matrices * SeqRep::tensor(2);
    vec![inner; cfg.hidden_layers]
}

/// Train a compatible or free family at `cfg.trained_dim`
pub fn train_model(
    compatible: bool,
    cfg: &ExperimentConfig,
    train: &[Example],
    test: &[Example],
    rng: &mut impl Rng,
) -> Result<TrainedFamily> {
    let v2 = SeqRep::tensor(2);
    let mut family = EmlpSequence::new(v2.clone(), v2, hidden_layers(cfg), compatible, cfg.seed)?;
    let mut model = family.emlp_at_level(cfg.trained_dim, false)?;
    info!(
        compatible,
        level = cfg.trained_dim,
        params = model.num_params(),
        "training family member"
    );

    let mut train_loader = DataLoader::new(train.to_vec(), cfg.batch_size, true)?;
    let mut test_loader = DataLoader::new(test.to_vec(), cfg.batch_size, false)?;
    let log = train_loop(&mut model, &mut train_loader, &mut test_loader, &cfg.training_config(), rng)?;

    family.set_trained_emlp_at_level(&model)?;
    Ok(TrainedFamily { model, family, log })
}

fn held_out_mse(model: &Emlp, examples: &[Example]) -> Result<f64> {
    if examples.is_empty() {
        return Ok(f64::NAN);
    }
    let (x, y) = stack_examples(examples)?;
    mse(&model.predict(&x)?, &y)
}

/// Instantiate the trained family at each dimension and score it on the
/// matching held-out set.
///
/// Levels a free family never trained at keep their timing and get a
/// `NaN` error.
pub fn test_different_dimensions(
    family: &EmlpSequence,
    dims: &[usize],
    held_out: &[Vec<Example>],
) -> Result<DimensionSweep> {
    if dims.len() != held_out.len() {
        return Err(EmlpError::ShapeMismatch(format!(
            "{} dimensions but {} held-out sets",
            dims.len(),
            held_out.len()
        )));
    }

    let mut sweep = DimensionSweep::default();
    for (&level, examples) in dims.iter().zip(held_out) {
        let timer = Timer::new(format!("extend to level {}", level));
        let model = family.emlp_at_level(level, true);
        sweep.times.push(timer.elapsed().as_secs_f64());

        let error = match model {
            Ok(model) => held_out_mse(&model, examples)?,
            Err(EmlpError::UntrainedLevel(_)) => {
                warn!("Level {} has no trained model; recording NaN", level);
                f64::NAN
            }
            Err(e) => return Err(e),
        };
        sweep.mses.push(error);
        info!(
            "Level {} time to extend {:.3e}s with MSE {:.3e}",
            level,
            sweep.times.last().copied().unwrap_or(f64::NAN),
            error
        );
    }
    Ok(sweep)
}

/// Full experiment: train both families, sweep the dimensions and write
/// the result bundle into `out_dir`.
pub fn run(cfg: &ExperimentConfig, out_dir: &Path) -> Result<ProjectionResults> {
    cfg.validate()?;
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    info!("Running on {}", cfg.device);

    let dims = &cfg.dimensions_to_extend;
    let held_out = held_out_sets(dims, cfg.held_out_samples, &mut rng);
    let train = projection_dataset(cfg.trained_dim, cfg.num_samples, &mut rng);
    let test = projection_dataset(cfg.trained_dim, cfg.num_samples, &mut rng);
    info!("Generated the data");

    let comp = train_model(true, cfg, &train, &test, &mut rng)?;
    let sweep_comp = test_different_dimensions(&comp.family, dims, &held_out)?;
    drop(comp);

    let free = train_model(false, cfg, &train, &test, &mut rng)?;
    let sweep_free = test_different_dimensions(&free.family, dims, &held_out)?;
    drop(free);

    let results = ProjectionResults {
        dimensions: dims.clone(),
        times_comp: sweep_comp.times,
        times_free: sweep_free.times,
        mses_comp: sweep_comp.mses,
        mses_free: sweep_free.mses,
    };
    info!(
        "Mean MSE compatible {:.3e}, free {:.3e}",
        mean(&results.mses_comp),
        mean(&results.mses_free)
    );

    std::fs::create_dir_all(out_dir)?;
    save_json(&results, out_dir.join(STATE_FILE))?;
    #[cfg(feature = "viz")]
    plot(&results, &out_dir.join(PLOT_FILE))?;
    Ok(results)
}

/// Log-scale error against dimension for both families
#[cfg(feature = "viz")]
pub fn plot(results: &ProjectionResults, path: &Path) -> Result<()> {
    use plotters::prelude::*;

    fn plot_err(e: impl std::fmt::Display) -> EmlpError {
        EmlpError::Io(std::io::Error::other(e.to_string()))
    }

    let finite = |mses: &[f64]| -> Vec<(f64, f64)> {
        results
            .dimensions
            .iter()
            .zip(mses)
            .filter(|(_, m)| m.is_finite() && **m > 0.0)
            .map(|(&d, &m)| (d as f64, m))
            .collect()
    };
    let comp = finite(&results.mses_comp);
    let free = finite(&results.mses_free);

    let (lo, hi) = comp
        .iter()
        .chain(&free)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(_, m)| (lo.min(m), hi.max(m)));
    let (lo, hi) = if lo.is_finite() { (lo / 2.0, hi * 2.0) } else { (1e-12, 1.0) };
    let x_min = results.dimensions.iter().min().copied().unwrap_or(0) as f64 - 0.5;
    let x_max = results.dimensions.iter().max().copied().unwrap_or(1) as f64 + 0.5;

    let root = SVGBackend::new(path, (640, 480)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Symmetric projection", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(x_min..x_max, (lo..hi).log_scale())
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Dimension d")
        .y_desc("Mean squared error")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(free, &RED))
        .map_err(plot_err)?
        .label("Free NN")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED));

    chart
        .draw_series(LineSeries::new(comp, &BLUE))
        .map_err(plot_err)?
        .label("Compatible NN")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}
