//! # CIFAR-10 CNN Classifier
//!
//! A Rust library that prepares the CIFAR-10 corpus, builds a small
//! convolutional network with the Burn framework, trains it with
//! reduce-on-plateau and early-stopping policies, and reports test accuracy.
//!
//! ## Modules
//!
//! - `dataset`: Corpus fetching, aligned shuffling, the 75 / 15 / 10 split and normalization
//! - `model`: CNN architecture and optimizer configuration
//! - `training`: Minibatch training loop and post-epoch policies
//! - `inference`: Single-pass test evaluation
//! - `pipeline`: The prepare, build, train, evaluate sequence
//! - `utils`: Errors, logging, metrics, charts and the sample gallery
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cifar_cnn::dataset::Cifar10Source;
//! use cifar_cnn::pipeline::{run_image_classification, ExperimentConfig};
//!
//! let config = ExperimentConfig::default();
//! let source = Cifar10Source::new(&config.data_dir);
//! let report = run_image_classification(&config, &source)?;
//! println!("Test accuracy: {:.4}", report.evaluation.accuracy);
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod training;
pub mod utils;

pub use dataset::{Cifar10Source, CifarData, CorpusSource, SplitConfig, SyntheticSource};
pub use inference::{EvaluationReport, TrainedModel};
pub use model::{build_model, CifarCnn, CifarCnnConfig, CompiledModel, OptimizerConfig};
pub use pipeline::{run_image_classification, run_image_classification_with, ExperimentConfig, ExperimentReport};
pub use training::{fit, FitConfig, FitOutcome, TrainingHistory};
pub use utils::error::{CifarError, Result};
pub use utils::metrics::{ConfusionMatrix, Metrics};

/// CIFAR-10 classes
pub const NUM_CLASSES: usize = 10;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
