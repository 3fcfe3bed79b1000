//! Model module for the CIFAR-10 CNN using the Burn framework
//!
//! This module provides:
//! - The two-block convolutional network
//! - Model and optimizer configuration
//! - Categorical cross-entropy and the accuracy metric
//!
//! `build_model` only reads the dataset's shape metadata, never its records.

pub mod cnn;
pub mod config;
pub mod loss;

pub use cnn::{build_model, CifarCnn, CompiledModel};
pub use config::{CifarCnnConfig, OptimizerConfig};
pub use loss::{categorical_cross_entropy, Loss, Metric};
