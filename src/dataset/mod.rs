//! Dataset module for CIFAR-10 data handling
//!
//! This module provides functionality for:
//! - Fetching and caching the CIFAR-10 binary corpus
//! - A synthetic corpus for offline runs
//! - Aligned shuffling and the 75 / 15 / 10 split
//! - Normalized burn datasets and batching
//! - Drawing one validation image per class

pub mod burn_dataset;
pub mod cifar10;
pub mod corpus;
pub mod prepare;
pub mod split;
pub mod synthetic;

pub use burn_dataset::{CifarBatch, CifarBatcher, CifarItem, NormalizedPartition};
pub use cifar10::Cifar10Source;
pub use corpus::{CorpusSource, ImageCorpus, ImageShape, UpstreamCorpus};
pub use prepare::{CifarData, ClassSample, DatasetMetadata, Partition, PartitionKind};
pub use split::{SplitConfig, SplitStats};
pub use synthetic::SyntheticSource;

/// CIFAR-10 class names, indexed by label
pub const CLASS_NAMES: [&str; 10] = [
    "airplane",
    "automobile",
    "bird",
    "cat",
    "deer",
    "dog",
    "frog",
    "horse",
    "ship",
    "truck",
];

/// Name of a class id, `"unknown"` outside the table
pub fn class_name(class: usize) -> &'static str {
    CLASS_NAMES.get(class).copied().unwrap_or("unknown")
}
