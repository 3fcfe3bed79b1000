//! Reduce-on-plateau learning rate policy
//!
//! Scales the learning rate by `factor` once the monitored validation
//! quantity has not improved by more than `min_delta` for `patience`
//! epochs. The rate never drops below `min_lr`.

use crate::training::callbacks::{CallbackAction, EpochMetrics, TrainingCallback};
use crate::training::config::ReduceLrConfig;

/// Direction of improvement for a monitored quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlateauMode {
    /// Metric should decrease (e.g., loss)
    Min,
    /// Metric should increase (e.g., accuracy)
    Max,
}

impl PlateauMode {
    /// Starting reference, beaten by any finite value
    pub fn initial_best(&self) -> f64 {
        match self {
            PlateauMode::Min => f64::INFINITY,
            PlateauMode::Max => f64::NEG_INFINITY,
        }
    }

    pub fn is_improvement(&self, current: f64, best: f64, min_delta: f64) -> bool {
        match self {
            PlateauMode::Min => current < best - min_delta,
            PlateauMode::Max => current > best + min_delta,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReduceLrOnPlateau {
    config: ReduceLrConfig,
    best: f64,
    wait: usize,
    cooldown_counter: usize,
}

impl ReduceLrOnPlateau {
    pub fn new(config: ReduceLrConfig) -> Self {
        Self {
            best: config.monitor.mode().initial_best(),
            config,
            wait: 0,
            cooldown_counter: 0,
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    fn in_cooldown(&self) -> bool {
        self.cooldown_counter > 0
    }
}

impl TrainingCallback for ReduceLrOnPlateau {
    fn name(&self) -> &str {
        "reduce_lr_on_plateau"
    }

    fn on_epoch_end(&mut self, metrics: &EpochMetrics, current_lr: f64) -> CallbackAction {
        let Some(current) = self.config.monitor.value(metrics) else {
            return CallbackAction::Continue;
        };

        if self.in_cooldown() {
            self.cooldown_counter -= 1;
            self.wait = 0;
        }

        let mode = self.config.monitor.mode();
        if mode.is_improvement(current, self.best, self.config.min_delta) {
            self.best = current;
            self.wait = 0;
            return CallbackAction::Continue;
        }

        if self.in_cooldown() {
            return CallbackAction::Continue;
        }

        self.wait += 1;
        if self.wait >= self.config.patience && current_lr > self.config.min_lr {
            let new_lr = (current_lr * self.config.factor).max(self.config.min_lr);
            tracing::info!(
                "Epoch {}: {} has not improved for {} epochs, reducing learning rate to {:.6}",
                metrics.epoch,
                self.config.monitor,
                self.wait,
                new_lr
            );
            self.cooldown_counter = self.config.cooldown;
            self.wait = 0;
            return CallbackAction::SetLearningRate(new_lr);
        }

        CallbackAction::Continue
    }
}
