//! Experiment pipeline
//!
//! Runs the four stages strictly in order: prepare the data, build the
//! model, fit it, evaluate it once on the test partition. Artifacts of a
//! run (config, history, evaluation, charts, gallery) are written into a
//! timestamped directory under `output_dir`, created once the data is
//! prepared and has a non-empty test partition.

use std::path::{Path, PathBuf};

use burn::tensor::backend::AutodiffBackend;
use chrono::Local;
use colored::Colorize;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::backend::{default_device, TrainingBackend};
use crate::dataset::burn_dataset::NormalizedPartition;
use crate::dataset::corpus::CorpusSource;
use crate::dataset::prepare::{CifarData, DatasetMetadata, PartitionKind};
use crate::dataset::split::{SplitConfig, SplitStats};
use crate::dataset::{Cifar10Source, SyntheticSource};
use crate::inference::EvaluationReport;
use crate::model::cnn::{build_model, CompiledModel};
use crate::model::config::{CifarCnnConfig, OptimizerConfig};
use crate::training::config::FitConfig;
use crate::training::history::TrainingHistory;
use crate::training::trainer::{fit, FitOutcome};
use crate::utils::charts::{render_training_curves, TrainingCurves};
use crate::utils::error::{CifarError, Result, ResultExt};
use crate::utils::gallery::render_class_samples;

/// Upscaling of gallery tiles
const GALLERY_SCALE: u32 = 4;

/// Full configuration of one experiment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Seeds the split, the batch order and the gallery draw
    pub seed: u64,
    pub data_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Fetch the archive when no local cache exists
    pub download: bool,
    /// Write training curves and the class gallery
    pub plots: bool,
    /// Use a generated corpus instead of CIFAR-10
    pub synthetic: Option<SyntheticCorpus>,
    pub split: SplitConfig,
    pub model: CifarCnnConfig,
    pub optimizer: OptimizerConfig,
    pub fit: FitConfig,
}

/// Size of the generated corpus, per class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticCorpus {
    pub train_per_class: usize,
    pub test_per_class: usize,
}

impl Default for SyntheticCorpus {
    fn default() -> Self {
        Self {
            train_per_class: 100,
            test_per_class: 20,
        }
    }
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            seed: 7,
            data_dir: PathBuf::from("data/cifar10"),
            output_dir: PathBuf::from("output"),
            download: true,
            plots: true,
            synthetic: None,
            split: SplitConfig::default(),
            model: CifarCnnConfig::new(),
            optimizer: OptimizerConfig::default(),
            fit: FitConfig::default(),
        }
    }
}

impl ExperimentConfig {
    pub fn validate(&self) -> Result<()> {
        self.split.validate()?;
        self.model.validate()?;
        self.optimizer.validate()?;
        self.fit.validate()
    }

    /// Corpus source described by this configuration
    pub fn source(&self) -> Box<dyn CorpusSource> {
        match self.synthetic {
            Some(corpus) => Box::new(
                SyntheticSource::new(
                    self.model.input_shape(),
                    self.model.num_classes,
                    corpus.train_per_class,
                    corpus.test_per_class,
                )
                .with_seed(self.seed),
            ),
            None => {
                let source = Cifar10Source::new(&self.data_dir);
                if self.download {
                    Box::new(source)
                } else {
                    Box::new(source.offline())
                }
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

/// Everything a finished run produced
#[derive(Debug)]
pub struct ExperimentReport {
    pub run_dir: PathBuf,
    pub stats: SplitStats,
    pub history: TrainingHistory,
    pub evaluation: EvaluationReport,
    pub curves: Option<TrainingCurves>,
    pub gallery: Option<PathBuf>,
}

/// Run the experiment with the stock model and training driver
pub fn run_image_classification(config: &ExperimentConfig, source: &dyn CorpusSource) -> Result<ExperimentReport> {
    let device = default_device();
    run_image_classification_with::<TrainingBackend, _, _>(
        config,
        source,
        &device,
        |metadata, config, device| build_model(metadata, &config.model, &config.optimizer, device),
        |compiled, train, validation, config, rng, device| {
            fit(compiled, train, validation, &config.fit, rng, device)
        },
    )
}

/// Run the experiment with caller-supplied build and fit functions
pub fn run_image_classification_with<B, M, F>(
    config: &ExperimentConfig,
    source: &dyn CorpusSource,
    device: &B::Device,
    build: M,
    train: F,
) -> Result<ExperimentReport>
where
    B: AutodiffBackend,
    M: FnOnce(&DatasetMetadata, &ExperimentConfig, &B::Device) -> Result<CompiledModel<B>>,
    F: FnOnce(
        CompiledModel<B>,
        &NormalizedPartition,
        &NormalizedPartition,
        &ExperimentConfig,
        &mut ChaCha8Rng,
        &B::Device,
    ) -> Result<FitOutcome<B>>,
{
    config.validate()?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    println!("{}", "Preparing data...".cyan().bold());
    let data = CifarData::load(source, &config.split, &mut rng)?;
    if data.raw(PartitionKind::Test).is_empty() {
        return Err(CifarError::InvalidInput(format!(
            "test partition is empty after splitting {} images",
            data.stats().total_images
        )));
    }
    let stats = data.stats();
    println!("{}", stats);

    // Only runs with usable data get a directory
    let run_dir = config
        .output_dir
        .join(format!("run_{}", Local::now().format("%Y%m%d_%H%M%S")));
    std::fs::create_dir_all(&run_dir)?;
    config.save(&run_dir.join("config.json"))?;

    let gallery = if config.plots {
        let path = run_dir.join("samples.png");
        let shape = data.metadata().input_shape;
        let mut sample_rng = ChaCha8Rng::seed_from_u64(config.seed);
        let samples = data.sample_by_class(&mut sample_rng);
        render_class_samples(&samples, (shape.width as u32, shape.height as u32), GALLERY_SCALE, &path)?;
        Some(path)
    } else {
        None
    };

    println!("{}", "Creating model...".cyan().bold());
    let compiled = build(&data.metadata(), config, device)?;

    println!("{}", "Fitting model...".cyan().bold());
    let train_data = data.normalized(PartitionKind::Train);
    let validation_data = data.normalized(PartitionKind::Validation);
    let FitOutcome { model, history } = train(compiled, &train_data, &validation_data, config, &mut rng, device)?;
    history.save(&run_dir.join("history.json"))?;

    println!("{}", "Evaluating model...".cyan().bold());
    let test_data = data.normalized(PartitionKind::Test);
    let evaluation = model.evaluate(&test_data, config.fit.batch_size)?;
    std::fs::write(
        run_dir.join("evaluation.json"),
        serde_json::to_string_pretty(&evaluation.metrics)?,
    )?;
    println!("{} {:.4}", "Test accuracy:".green().bold(), evaluation.accuracy);

    let curves = if config.plots && !history.records.is_empty() {
        Some(render_training_curves(&history, &run_dir)?)
    } else {
        None
    };

    tracing::info!("Run artifacts written to {}", run_dir.display());

    Ok(ExperimentReport {
        run_dir,
        stats,
        history,
        evaluation,
        curves,
        gallery,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn smoke_config(output_dir: &Path) -> ExperimentConfig {
        ExperimentConfig {
            output_dir: output_dir.to_path_buf(),
            synthetic: Some(SyntheticCorpus {
                train_per_class: 8,
                test_per_class: 2,
            }),
            model: CifarCnnConfig::new()
                .with_input_height(8)
                .with_input_width(8)
                .with_block1_filters(4)
                .with_block2_filters(8)
                .with_dense_units(16),
            fit: FitConfig {
                epochs: 2,
                batch_size: 10,
                ..FitConfig::default()
            },
            ..ExperimentConfig::default()
        }
    }

    #[test]
    fn test_end_to_end_smoke() {
        let dir = tempfile::tempdir().unwrap();
        let config = smoke_config(dir.path());
        let source = config.source();

        let report = run_image_classification_with::<TestBackend, _, _>(
            &config,
            source.as_ref(),
            &Default::default(),
            |metadata, config, device| build_model(metadata, &config.model, &config.optimizer, device),
            |compiled, train, validation, config, rng, device| {
                fit(compiled, train, validation, &config.fit, rng, device)
            },
        )
        .unwrap();

        assert!((0.0..=1.0).contains(&report.evaluation.accuracy));
        assert_eq!(report.stats.total_images, 100);
        assert_eq!(report.stats.train_size, 75);
        assert_eq!(report.stats.validation_size, 15);
        assert_eq!(report.stats.test_size, 10);
        assert_eq!(report.evaluation.metrics.total_samples, 10);
        assert!(!report.history.records.is_empty());

        assert!(report.run_dir.join("config.json").exists());
        assert!(report.run_dir.join("history.json").exists());
        assert!(report.run_dir.join("evaluation.json").exists());
        assert!(report.gallery.unwrap().exists());
        assert!(report.curves.unwrap().loss.exists());
    }

    fn run_dirs(output_dir: &Path) -> usize {
        std::fs::read_dir(output_dir)
            .map(|entries| {
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_name().to_string_lossy().starts_with("run_"))
                    .count()
            })
            .unwrap_or(0)
    }

    #[test]
    fn test_empty_test_partition_stops_before_training() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = smoke_config(dir.path());
        // 10 images split 8 / 2 / 0
        config.synthetic = Some(SyntheticCorpus {
            train_per_class: 1,
            test_per_class: 0,
        });
        let source = config.source();

        let result = run_image_classification_with::<TestBackend, _, _>(
            &config,
            source.as_ref(),
            &Default::default(),
            |_, _, _| panic!("model must not be built"),
            |_, _, _, _, _, _| panic!("model must not be trained"),
        );

        assert!(matches!(result, Err(CifarError::InvalidInput(_))));
        assert_eq!(run_dirs(dir.path()), 0);
    }

    #[test]
    fn test_unavailable_corpus_leaves_no_run_dir() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("output");
        let mut config = smoke_config(&output);
        config.synthetic = None;
        config.download = false;
        config.data_dir = dir.path().join("missing");
        let source = config.source();

        let result = run_image_classification_with::<TestBackend, _, _>(
            &config,
            source.as_ref(),
            &Default::default(),
            |_, _, _| panic!("model must not be built"),
            |_, _, _, _, _, _| panic!("model must not be trained"),
        );

        assert!(matches!(result, Err(CifarError::DataUnavailable(_))));
        assert!(!output.exists());
        assert_eq!(run_dirs(&output), 0);
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.json");
        let config = smoke_config(dir.path());
        config.save(&path).unwrap();

        let loaded = ExperimentConfig::load(&path).unwrap();
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.fit, config.fit);
        assert_eq!(loaded.model.input_height, 8);
        assert_eq!(loaded.synthetic, config.synthetic);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ExperimentConfig::default();
        config.fit.epochs = 0;
        assert!(config.validate().is_err());
    }
}
