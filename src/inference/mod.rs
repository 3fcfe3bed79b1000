//! Evaluation of trained models
//!
//! `TrainedModel` is produced by the training driver and consumed by a
//! single test pass, which yields an `EvaluationReport`.

pub mod evaluator;

pub use evaluator::{evaluate_partition, EvaluationReport, PassSummary, TrainedModel};
