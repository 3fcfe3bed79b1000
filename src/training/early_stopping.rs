//! Early stopping policy
//!
//! Halts training once the monitored validation quantity has gone
//! `patience` epochs without improving. When `restore_best_weights` is set
//! it asks for a checkpoint on every improvement so the driver can hand back
//! the best parameters.

use crate::training::callbacks::{CallbackAction, EpochMetrics, TrainingCallback};
use crate::training::config::EarlyStoppingConfig;

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    config: EarlyStoppingConfig,
    best: f64,
    best_epoch: Option<usize>,
    wait: usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(config: EarlyStoppingConfig) -> Self {
        Self {
            best: config.monitor.mode().initial_best(),
            config,
            best_epoch: None,
            wait: 0,
            stopped_epoch: None,
        }
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }
}

impl TrainingCallback for EarlyStopping {
    fn name(&self) -> &str {
        "early_stopping"
    }

    fn on_epoch_end(&mut self, metrics: &EpochMetrics, _current_lr: f64) -> CallbackAction {
        let Some(current) = self.config.monitor.value(metrics) else {
            return CallbackAction::Continue;
        };

        let mode = self.config.monitor.mode();
        if mode.is_improvement(current, self.best, self.config.min_delta) {
            self.best = current;
            self.best_epoch = Some(metrics.epoch);
            self.wait = 0;
            return if self.config.restore_best_weights {
                CallbackAction::CheckpointBest
            } else {
                CallbackAction::Continue
            };
        }

        self.wait += 1;
        if self.wait >= self.config.patience {
            self.stopped_epoch = Some(metrics.epoch);
            tracing::warn!(
                "Early stopping after epoch {}: {} did not improve for {} epochs (best {:.4} at epoch {})",
                metrics.epoch,
                self.config.monitor,
                self.wait,
                self.best,
                self.best_epoch.unwrap_or(0)
            );
            return CallbackAction::Stop;
        }

        CallbackAction::Continue
    }

    fn restores_best(&self) -> bool {
        self.config.restore_best_weights
    }
}
