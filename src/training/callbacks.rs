//! Post-epoch hooks
//!
//! Each registered policy sees the metrics of the finished epoch and the
//! learning rate in effect, and answers with a `CallbackAction`.
//! `TrainingControl` applies the answers: it owns the learning rate and
//! the best parameter snapshot, and decides whether training continues.

use serde::{Deserialize, Serialize};

/// Metrics of one finished epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    /// `None` when the validation partition is empty
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
}

/// What a policy asks the driver to do after an epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CallbackAction {
    Continue,
    SetLearningRate(f64),
    /// Keep the current parameters as the best seen so far
    CheckpointBest,
    Stop,
}

pub trait TrainingCallback {
    fn name(&self) -> &str;

    fn on_epoch_end(&mut self, metrics: &EpochMetrics, current_lr: f64) -> CallbackAction;

    /// Whether the best snapshot replaces the final parameters
    fn restores_best(&self) -> bool {
        false
    }
}

/// Result of applying every policy for one epoch
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EpochDecision {
    pub stop: bool,
    /// `(old, new)` when the learning rate changed
    pub lr_change: Option<(f64, f64)>,
    pub checkpointed: bool,
}

/// Policy registry plus the state the policies steer
pub struct TrainingControl<S: Clone> {
    callbacks: Vec<Box<dyn TrainingCallback>>,
    learning_rate: f64,
    best: Option<(usize, S)>,
}

impl<S: Clone> TrainingControl<S> {
    pub fn new(learning_rate: f64, callbacks: Vec<Box<dyn TrainingCallback>>) -> Self {
        Self {
            callbacks,
            learning_rate,
            best: None,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best.as_ref().map(|(epoch, _)| *epoch)
    }

    pub fn restores_best(&self) -> bool {
        self.callbacks.iter().any(|c| c.restores_best())
    }

    /// Run every policy for a finished epoch.
    ///
    /// `snapshot` is only called when some policy asks for a checkpoint.
    pub fn on_epoch_end(&mut self, metrics: &EpochMetrics, snapshot: impl FnOnce() -> S) -> EpochDecision {
        let mut decision = EpochDecision::default();
        let mut checkpoint = false;

        for callback in self.callbacks.iter_mut() {
            match callback.on_epoch_end(metrics, self.learning_rate) {
                CallbackAction::Continue => {}
                CallbackAction::SetLearningRate(new_lr) => {
                    tracing::debug!("{} sets learning rate to {:.6}", callback.name(), new_lr);
                    let old = decision.lr_change.map_or(self.learning_rate, |(old, _)| old);
                    self.learning_rate = new_lr;
                    decision.lr_change = Some((old, new_lr));
                }
                CallbackAction::CheckpointBest => checkpoint = true,
                CallbackAction::Stop => {
                    tracing::debug!("{} requests stop after epoch {}", callback.name(), metrics.epoch);
                    decision.stop = true;
                }
            }
        }

        if checkpoint {
            self.best = Some((metrics.epoch, snapshot()));
            decision.checkpointed = true;
        }

        decision
    }

    /// Final parameters: the best snapshot when a policy restores it, else `last`.
    ///
    /// Returns the epoch the parameters come from when it is a restored snapshot.
    pub fn finish(self, last: S) -> (S, Option<usize>) {
        let restore = self.restores_best();
        match self.best {
            Some((epoch, best)) if restore => (best, Some(epoch)),
            _ => (last, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::config::{EarlyStoppingConfig, Monitor, ReduceLrConfig};
    use crate::training::early_stopping::EarlyStopping;
    use crate::training::scheduler::ReduceLrOnPlateau;

    fn metrics(epoch: usize, val_loss: f64, val_accuracy: f64) -> EpochMetrics {
        EpochMetrics {
            epoch,
            train_loss: 1.0,
            train_accuracy: 0.5,
            val_loss: Some(val_loss),
            val_accuracy: Some(val_accuracy),
        }
    }

    fn early_stopping(patience: usize) -> Box<dyn TrainingCallback> {
        Box::new(EarlyStopping::new(EarlyStoppingConfig {
            monitor: Monitor::ValLoss,
            patience,
            min_delta: 0.0,
            restore_best_weights: true,
        }))
    }

    /// Simulates a training loop whose "parameters" are the epoch number.
    fn run(control: &mut TrainingControl<usize>, losses: &[f64]) -> usize {
        let mut epochs_run = 0;
        for (i, &loss) in losses.iter().enumerate() {
            let epoch = i + 1;
            epochs_run = epoch;
            let decision = control.on_epoch_end(&metrics(epoch, loss, 0.5), || epoch);
            if decision.stop {
                break;
            }
        }
        epochs_run
    }

    #[test]
    fn test_early_stop_restores_best_epoch() {
        let mut control = TrainingControl::new(0.001, vec![early_stopping(1)]);

        let epochs_run = run(&mut control, &[0.5, 0.3, 0.35, 0.4]);
        assert_eq!(epochs_run, 3);
        assert_eq!(control.best_epoch(), Some(2));

        let (params, restored_from) = control.finish(epochs_run);
        assert_eq!(params, 2);
        assert_eq!(restored_from, Some(2));
    }

    #[test]
    fn test_best_restored_at_epoch_limit() {
        let mut control = TrainingControl::new(0.001, vec![early_stopping(5)]);
        let epochs_run = run(&mut control, &[0.5, 0.3, 0.35]);
        assert_eq!(epochs_run, 3);
        assert_eq!(control.finish(epochs_run), (2, Some(2)));
    }

    #[test]
    fn test_without_restore_keeps_last() {
        let callback = Box::new(EarlyStopping::new(EarlyStoppingConfig {
            restore_best_weights: false,
            patience: 1,
            ..EarlyStoppingConfig::default()
        }));
        let mut control = TrainingControl::new(0.001, vec![callback]);
        let epochs_run = run(&mut control, &[0.5, 0.3, 0.35, 0.4]);
        assert_eq!(control.finish(epochs_run), (3, None));
    }

    #[test]
    fn test_no_validation_metrics_runs_to_limit() {
        let mut control = TrainingControl::new(
            0.001,
            vec![
                Box::new(ReduceLrOnPlateau::new(ReduceLrConfig::default())) as Box<dyn TrainingCallback>,
                early_stopping(1),
            ],
        );

        for epoch in 1..=10 {
            let m = EpochMetrics {
                epoch,
                train_loss: 1.0,
                train_accuracy: 0.1,
                val_loss: None,
                val_accuracy: None,
            };
            let decision = control.on_epoch_end(&m, || epoch);
            assert_eq!(decision, EpochDecision::default());
        }
        assert_eq!(control.learning_rate(), 0.001);
        assert_eq!(control.finish(10), (10, None));
    }

    #[test]
    fn test_learning_rate_change_is_applied() {
        let reduce = ReduceLrConfig {
            patience: 1,
            ..ReduceLrConfig::default()
        };
        let mut control: TrainingControl<usize> =
            TrainingControl::new(0.001, vec![Box::new(ReduceLrOnPlateau::new(reduce))]);

        control.on_epoch_end(&metrics(1, 1.0, 0.5), || 1);
        let decision = control.on_epoch_end(&metrics(2, 1.0, 0.5), || 2);

        assert_eq!(decision.lr_change, Some((0.001, 0.0005)));
        assert_eq!(control.learning_rate(), 0.0005);
    }
}
