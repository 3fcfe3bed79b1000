//! Training driver
//!
//! A minibatch loop over the training partition using burn's optimizer API
//! directly. After every pass the model is scored on the validation
//! partition and the registered policies decide the next learning rate,
//! whether to snapshot the parameters, and whether to stop.

use burn::{
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    module::AutodiffModule,
    optim::{GradientsParams, Optimizer},
    tensor::{backend::AutodiffBackend, ElementConversion},
};
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::dataset::burn_dataset::{CifarBatch, CifarBatcher, NormalizedPartition};
use crate::inference::evaluator::{evaluate_partition, TrainedModel};
use crate::model::cnn::{CifarCnn, CompiledModel};
use crate::model::loss::predictions;
use crate::training::callbacks::{EpochMetrics, TrainingCallback, TrainingControl};
use crate::training::config::FitConfig;
use crate::training::history::{EpochRecord, TrainingHistory};
use crate::utils::error::{CifarError, Result};
use crate::utils::logging::TrainingLogger;
use crate::utils::metrics::{AccuracyTracker, RunningAverage};

/// Result of a `fit` call
#[derive(Debug)]
pub struct FitOutcome<B: AutodiffBackend> {
    pub model: TrainedModel<B>,
    pub history: TrainingHistory,
}

/// Train with the policies configured in `config`
pub fn fit<B: AutodiffBackend>(
    compiled: CompiledModel<B>,
    train: &NormalizedPartition,
    validation: &NormalizedPartition,
    config: &FitConfig,
    rng: &mut ChaCha8Rng,
    device: &B::Device,
) -> Result<FitOutcome<B>> {
    let callbacks = config.callbacks();
    fit_with_callbacks(compiled, train, validation, config, callbacks, rng, device)
}

/// Train with an explicit set of post-pass policies.
///
/// The policy fields of `config` are ignored here.
pub fn fit_with_callbacks<B: AutodiffBackend>(
    compiled: CompiledModel<B>,
    train: &NormalizedPartition,
    validation: &NormalizedPartition,
    config: &FitConfig,
    callbacks: Vec<Box<dyn TrainingCallback>>,
    rng: &mut ChaCha8Rng,
    device: &B::Device,
) -> Result<FitOutcome<B>> {
    config.validate()?;

    let metadata = compiled.metadata;
    for partition in [train, validation] {
        if partition.shape() != metadata.input_shape {
            return Err(CifarError::ShapeMismatch {
                expected: metadata.input_shape,
                found: partition.shape(),
            });
        }
    }
    if train.is_empty() {
        return Err(CifarError::InvalidInput("training partition is empty".to_string()));
    }
    if validation.is_empty() {
        tracing::warn!("Validation partition is empty; plateau policies will not trigger");
    }

    let loss_fn = compiled.loss;
    let optimizer_config = compiled.optimizer;
    let mut model = compiled.model;
    let mut optimizer = optimizer_config.to_burn().init::<B, CifarCnn<B>>();
    let batcher = CifarBatcher::new(train.shape(), train.num_classes());

    let mut control: TrainingControl<CifarCnn<B>> = TrainingControl::new(optimizer_config.learning_rate, callbacks);
    let mut history = TrainingHistory::default();
    let mut logger = TrainingLogger::new(config.epochs);
    let mut iteration = 0usize;

    let num_batches = train.len().div_ceil(config.batch_size);
    let mut indices: Vec<usize> = (0..train.len()).collect();

    tracing::info!(
        "Training on {} images, validating on {} ({} batches of {} per epoch)",
        train.len(),
        validation.len(),
        num_batches,
        config.batch_size
    );

    for epoch in 1..=config.epochs {
        logger.start_epoch(epoch);
        if config.shuffle {
            indices.shuffle(rng);
        }

        let base_rate = control.learning_rate();
        let mut train_loss = RunningAverage::new();
        let mut train_accuracy = AccuracyTracker::new();
        let progress = batch_progress(epoch, config.epochs, num_batches);

        for chunk in indices.chunks(config.batch_size) {
            let items: Vec<_> = chunk.iter().filter_map(|&i| train.get(i)).collect();
            if items.is_empty() {
                continue;
            }
            let labels: Vec<usize> = items.iter().map(|item| item.label).collect();
            let batch: CifarBatch<B> = batcher.batch(items, device);

            let logits = model.forward(batch.images);
            let loss = loss_fn.compute(logits.clone(), batch.targets);
            let loss_value: f64 = loss.clone().into_scalar().elem();
            if !loss_value.is_finite() {
                progress.abandon();
                return Err(CifarError::Diverged {
                    epoch,
                    last: history.last().cloned(),
                });
            }

            let batch_predictions: Vec<usize> = predictions(logits.detach())
                .into_data()
                .iter::<i64>()
                .map(|p| p as usize)
                .collect();
            train_loss.add_weighted(loss_value, labels.len());
            train_accuracy.add_batch(&batch_predictions, &labels);

            let grads = GradientsParams::from_grads(loss.backward(), &model);
            let rate = optimizer_config.learning_rate_at(base_rate, iteration);
            model = optimizer.step(rate, model, grads);
            iteration += 1;

            progress.inc(1);
            progress.set_message(format!("loss {:.4}", train_loss.average()));
        }
        progress.finish_and_clear();

        let validation_summary =
            evaluate_partition(&model.valid(), loss_fn, validation, config.batch_size, device)?;
        if let Some(summary) = &validation_summary {
            if !summary.loss.is_finite() {
                return Err(CifarError::Diverged {
                    epoch,
                    last: history.last().cloned(),
                });
            }
        }

        let metrics = EpochMetrics {
            epoch,
            train_loss: train_loss.average(),
            train_accuracy: train_accuracy.accuracy(),
            val_loss: validation_summary.as_ref().map(|s| s.loss),
            val_accuracy: validation_summary.as_ref().map(|s| s.accuracy),
        };
        let record = EpochRecord::new(&metrics, base_rate);
        logger.end_epoch(&record);
        history.push(record);

        let decision = control.on_epoch_end(&metrics, || model.clone());
        if let Some((old, new)) = decision.lr_change {
            logger.log_lr_change(old, new);
        }
        if decision.checkpointed {
            if let Some(val_loss) = metrics.val_loss {
                logger.log_new_best(val_loss);
            }
        }
        if decision.stop {
            let patience = config.early_stopping.as_ref().map_or(0, |c| c.patience);
            logger.log_early_stop(patience);
            history.stopped_epoch = Some(epoch);
            break;
        }
    }

    logger.log_complete(history.epochs_run());

    let (model, restored_epoch) = control.finish(model);
    if let Some(epoch) = restored_epoch {
        tracing::info!("Restored parameters from epoch {}", epoch);
    }
    history.restored_epoch = restored_epoch;

    Ok(FitOutcome {
        model: TrainedModel::new(model, loss_fn, metadata, device.clone()),
        history,
    })
}

fn batch_progress(epoch: usize, total_epochs: usize, num_batches: usize) -> ProgressBar {
    let progress = ProgressBar::new(num_batches as u64);
    let style = ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {prefix} [{bar:40.cyan/blue}] {pos}/{len} batches {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-");
    progress.set_style(style);
    progress.set_prefix(format!("Epoch {}/{}", epoch, total_epochs));
    progress
}
