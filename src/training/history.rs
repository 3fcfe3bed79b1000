//! Training run record
//!
//! Per-epoch losses, accuracies and learning rates, plus where training
//! stopped and which epoch's parameters were returned.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::training::callbacks::EpochMetrics;
use crate::utils::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: Option<f64>,
    pub val_accuracy: Option<f64>,
    /// Base rate in effect during the epoch
    pub learning_rate: f64,
}

impl EpochRecord {
    pub fn new(metrics: &EpochMetrics, learning_rate: f64) -> Self {
        Self {
            epoch: metrics.epoch,
            train_loss: metrics.train_loss,
            train_accuracy: metrics.train_accuracy,
            val_loss: metrics.val_loss,
            val_accuracy: metrics.val_accuracy,
            learning_rate,
        }
    }
}

impl std::fmt::Display for EpochRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "epoch {} - loss: {:.4} - acc: {:.4}",
            self.epoch, self.train_loss, self.train_accuracy
        )?;
        if let (Some(loss), Some(acc)) = (self.val_loss, self.val_accuracy) {
            write!(f, " - val_loss: {:.4} - val_acc: {:.4}", loss, acc)?;
        }
        write!(f, " - lr: {:.6}", self.learning_rate)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub records: Vec<EpochRecord>,
    /// Epoch whose parameters were returned, when restored from a snapshot
    pub restored_epoch: Option<usize>,
    /// Set when a policy ended training before the epoch limit
    pub stopped_epoch: Option<usize>,
}

impl TrainingHistory {
    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn epochs_run(&self) -> usize {
        self.records.len()
    }

    pub fn last(&self) -> Option<&EpochRecord> {
        self.records.last()
    }

    /// Record with the lowest validation loss
    pub fn best_by_val_loss(&self) -> Option<&EpochRecord> {
        self.records
            .iter()
            .filter(|r| r.val_loss.is_some_and(f64::is_finite))
            .min_by(|a, b| a.val_loss.partial_cmp(&b.val_loss).unwrap_or(std::cmp::Ordering::Equal))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(epoch: usize, val_loss: Option<f64>) -> EpochRecord {
        EpochRecord {
            epoch,
            train_loss: 1.0,
            train_accuracy: 0.5,
            val_loss,
            val_accuracy: val_loss.map(|_| 0.4),
            learning_rate: 0.001,
        }
    }

    #[test]
    fn test_best_by_val_loss() {
        let mut history = TrainingHistory::default();
        history.push(record(1, Some(0.5)));
        history.push(record(2, Some(0.3)));
        history.push(record(3, Some(0.35)));

        assert_eq!(history.best_by_val_loss().unwrap().epoch, 2);
        assert_eq!(history.epochs_run(), 3);
        assert_eq!(history.last().unwrap().epoch, 3);
    }

    #[test]
    fn test_display() {
        let text = record(4, Some(0.25)).to_string();
        assert!(text.starts_with("epoch 4"));
        assert!(text.contains("val_loss: 0.2500"));

        let text = record(1, None).to_string();
        assert!(!text.contains("val_loss"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut history = TrainingHistory::default();
        history.push(record(1, Some(0.5)));
        history.push(record(2, None));
        history.stopped_epoch = Some(2);
        history.save(&path).unwrap();

        assert_eq!(TrainingHistory::load(&path).unwrap(), history);
    }
}
