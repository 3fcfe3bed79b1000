//! Model evaluation
//!
//! `evaluate_partition` runs a model over a normalized partition without
//! touching its parameters. The trainer uses it for validation passes and
//! `TrainedModel::evaluate` for the single test pass.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::ElementConversion;

use crate::dataset::burn_dataset::{CifarBatch, CifarBatcher, NormalizedPartition};
use crate::dataset::prepare::DatasetMetadata;
use crate::model::cnn::CifarCnn;
use crate::model::loss::{predictions, Loss};
use crate::utils::error::{CifarError, Result};
use crate::utils::metrics::{AccuracyTracker, Metrics, RunningAverage};

/// Loss, accuracy and raw predictions of one pass over a partition
#[derive(Debug, Clone)]
pub struct PassSummary {
    pub loss: f64,
    pub accuracy: f64,
    pub predictions: Vec<usize>,
    pub labels: Vec<usize>,
}

/// Forward pass over `data` in order, batch by batch.
///
/// Returns `None` for an empty partition.
pub fn evaluate_partition<B: Backend>(
    model: &CifarCnn<B>,
    loss: Loss,
    data: &NormalizedPartition,
    batch_size: usize,
    device: &B::Device,
) -> Result<Option<PassSummary>> {
    if data.is_empty() {
        return Ok(None);
    }
    if batch_size == 0 {
        return Err(CifarError::InvalidInput("batch_size must be greater than 0".to_string()));
    }

    let batcher = CifarBatcher::new(data.shape(), data.num_classes());
    let mut mean_loss = RunningAverage::new();
    let mut accuracy = AccuracyTracker::new();
    let mut all_predictions = Vec::with_capacity(data.len());
    let mut all_labels = Vec::with_capacity(data.len());

    for start in (0..data.len()).step_by(batch_size) {
        let end = (start + batch_size).min(data.len());
        let items: Vec<_> = (start..end).filter_map(|i| data.get(i)).collect();
        if items.is_empty() {
            continue;
        }

        let labels: Vec<usize> = items.iter().map(|item| item.label).collect();
        let batch: CifarBatch<B> = batcher.batch(items, device);

        let logits = model.forward(batch.images);
        let batch_loss: f64 = loss.compute(logits.clone(), batch.targets).into_scalar().elem();
        let batch_predictions: Vec<usize> = predictions(logits)
            .into_data()
            .iter::<i64>()
            .map(|p| p as usize)
            .collect();

        mean_loss.add_weighted(batch_loss, labels.len());
        accuracy.add_batch(&batch_predictions, &labels);
        all_predictions.extend(batch_predictions);
        all_labels.extend(labels);
    }

    Ok(Some(PassSummary {
        loss: mean_loss.average(),
        accuracy: accuracy.accuracy(),
        predictions: all_predictions,
        labels: all_labels,
    }))
}

/// A model whose training has finished.
///
/// Only the training driver creates one, and `evaluate` consumes it.
#[derive(Debug)]
pub struct TrainedModel<B: AutodiffBackend> {
    model: CifarCnn<B>,
    loss: Loss,
    metadata: DatasetMetadata,
    device: B::Device,
}

impl<B: AutodiffBackend> TrainedModel<B> {
    pub(crate) fn new(model: CifarCnn<B>, loss: Loss, metadata: DatasetMetadata, device: B::Device) -> Self {
        Self {
            model,
            loss,
            metadata,
            device,
        }
    }

    pub fn model(&self) -> &CifarCnn<B> {
        &self.model
    }

    pub fn metadata(&self) -> &DatasetMetadata {
        &self.metadata
    }

    /// Single pass over the test partition
    pub fn evaluate(self, test: &NormalizedPartition, batch_size: usize) -> Result<EvaluationReport> {
        if test.shape() != self.metadata.input_shape {
            return Err(CifarError::ShapeMismatch {
                expected: self.metadata.input_shape,
                found: test.shape(),
            });
        }

        let model = self.model.valid();
        let summary = evaluate_partition(&model, self.loss, test, batch_size, &self.device)?
            .ok_or_else(|| CifarError::InvalidInput("test partition is empty".to_string()))?;

        let metrics = Metrics::from_predictions(&summary.predictions, &summary.labels, self.metadata.num_classes)
            .with_loss(summary.loss);

        tracing::info!(
            "Evaluated {} test images: loss {:.4}, accuracy {:.4}",
            metrics.total_samples,
            summary.loss,
            summary.accuracy
        );

        Ok(EvaluationReport {
            accuracy: summary.accuracy,
            loss: summary.loss,
            metrics,
        })
    }
}

/// Test-set result
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    /// In `[0, 1]`
    pub accuracy: f64,
    pub loss: f64,
    pub metrics: Metrics,
}

impl std::fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Test loss: {:.4}", self.loss)?;
        writeln!(f, "Test accuracy: {:.4}", self.accuracy)?;
        write!(f, "{}", self.metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use burn::backend::{Autodiff, NdArray};

    use crate::dataset::corpus::{ImageCorpus, ImageShape};
    use crate::dataset::prepare::{Partition, PartitionKind};
    use crate::model::config::CifarCnnConfig;

    type TestBackend = Autodiff<NdArray>;

    fn tiny_config() -> CifarCnnConfig {
        CifarCnnConfig::new()
            .with_input_height(8)
            .with_input_width(8)
            .with_block1_filters(4)
            .with_block2_filters(4)
            .with_dense_units(8)
    }

    fn partition(count: usize) -> NormalizedPartition {
        let shape = ImageShape::new(3, 8, 8);
        let pixels = vec![128u8; count * shape.num_values()];
        let labels = (0..count).map(|i| (i % 10) as u8).collect();
        let corpus = ImageCorpus::new(shape, pixels, labels).unwrap();
        let raw = Partition {
            kind: PartitionKind::Test,
            indices: (0..count).collect(),
            corpus,
        };
        NormalizedPartition::new(Arc::new(raw), 10)
    }

    fn trained(config: &CifarCnnConfig) -> TrainedModel<TestBackend> {
        let device = Default::default();
        let metadata = DatasetMetadata {
            input_shape: config.input_shape(),
            num_classes: 10,
        };
        TrainedModel::new(CifarCnn::new(config, &device), Loss::CategoricalCrossEntropy, metadata, device)
    }

    #[test]
    fn test_evaluate_reports_unit_accuracy() {
        let report = trained(&tiny_config()).evaluate(&partition(23), 10).unwrap();

        assert!((0.0..=1.0).contains(&report.accuracy));
        assert!(report.loss.is_finite());
        assert_eq!(report.metrics.total_samples, 23);
        assert_eq!(report.metrics.confusion_matrix.total(), 23);
    }

    #[test]
    fn test_empty_partition() {
        let config = tiny_config();
        let device = Default::default();
        let model = CifarCnn::<NdArray>::new(&config, &device);

        let summary = evaluate_partition(&model, Loss::CategoricalCrossEntropy, &partition(0), 10, &device).unwrap();
        assert!(summary.is_none());

        assert!(trained(&config).evaluate(&partition(0), 10).is_err());
    }

    #[test]
    fn test_partition_summary_keeps_order() {
        let config = tiny_config();
        let device = Default::default();
        let model = CifarCnn::<NdArray>::new(&config, &device);

        let summary = evaluate_partition(&model, Loss::CategoricalCrossEntropy, &partition(15), 4, &device)
            .unwrap()
            .unwrap();
        assert_eq!(summary.labels, (0..15).map(|i| i % 10).collect::<Vec<_>>());
        assert_eq!(summary.predictions.len(), 15);
        assert!(summary.predictions.iter().all(|&p| p < 10));
    }

    #[test]
    fn test_shape_mismatch() {
        let report = trained(&CifarCnnConfig::new()).evaluate(&partition(5), 10);
        assert!(matches!(report, Err(CifarError::ShapeMismatch { .. })));
    }
}
