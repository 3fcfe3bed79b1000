//! Training driver configuration

use serde::{Deserialize, Serialize};

use crate::training::callbacks::{EpochMetrics, TrainingCallback};
use crate::training::early_stopping::EarlyStopping;
use crate::training::scheduler::{PlateauMode, ReduceLrOnPlateau};
use crate::utils::error::{CifarError, Result};

/// Validation quantity a policy watches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Monitor {
    ValLoss,
    ValAccuracy,
}

impl Monitor {
    /// Loss should fall, accuracy should rise
    pub fn mode(&self) -> PlateauMode {
        match self {
            Monitor::ValLoss => PlateauMode::Min,
            Monitor::ValAccuracy => PlateauMode::Max,
        }
    }

    pub fn value(&self, metrics: &EpochMetrics) -> Option<f64> {
        match self {
            Monitor::ValLoss => metrics.val_loss,
            Monitor::ValAccuracy => metrics.val_accuracy,
        }
    }
}

impl std::fmt::Display for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Monitor::ValLoss => write!(f, "val_loss"),
            Monitor::ValAccuracy => write!(f, "val_accuracy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReduceLrConfig {
    pub monitor: Monitor,
    /// Multiplier applied on a plateau
    pub factor: f64,
    /// Epochs without improvement before reducing
    pub patience: usize,
    /// Floor for the learning rate
    pub min_lr: f64,
    pub min_delta: f64,
    /// Epochs to wait after a reduction before counting again
    pub cooldown: usize,
}

impl Default for ReduceLrConfig {
    fn default() -> Self {
        Self {
            monitor: Monitor::ValAccuracy,
            factor: 0.5,
            patience: 2,
            min_lr: 1e-5,
            min_delta: 1e-4,
            cooldown: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingConfig {
    pub monitor: Monitor,
    pub patience: usize,
    pub min_delta: f64,
    /// Return the parameters of the best epoch instead of the last one
    pub restore_best_weights: bool,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            monitor: Monitor::ValLoss,
            patience: 5,
            min_delta: 0.0,
            restore_best_weights: true,
        }
    }
}

/// Configuration of a `fit` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    /// Maximum number of passes over the training partition
    pub epochs: usize,
    pub batch_size: usize,
    /// Reshuffle training batches every epoch
    pub shuffle: bool,
    pub reduce_lr: Option<ReduceLrConfig>,
    pub early_stopping: Option<EarlyStoppingConfig>,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            epochs: 20,
            batch_size: 100,
            shuffle: true,
            reduce_lr: Some(ReduceLrConfig::default()),
            early_stopping: Some(EarlyStoppingConfig::default()),
        }
    }
}

impl FitConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(CifarError::Config("epochs must be greater than 0".to_string()));
        }
        if self.batch_size == 0 {
            return Err(CifarError::Config("batch_size must be greater than 0".to_string()));
        }
        if let Some(reduce) = &self.reduce_lr {
            if !(reduce.factor > 0.0 && reduce.factor < 1.0) {
                return Err(CifarError::Config("reduce_lr.factor must be in range (0.0, 1.0)".to_string()));
            }
            if reduce.min_lr < 0.0 || reduce.min_delta < 0.0 {
                return Err(CifarError::Config("reduce_lr.min_lr and min_delta must not be negative".to_string()));
            }
        }
        if let Some(stop) = &self.early_stopping {
            if stop.min_delta < 0.0 {
                return Err(CifarError::Config("early_stopping.min_delta must not be negative".to_string()));
            }
        }
        Ok(())
    }

    /// Policies to register for this configuration, plateau reduction first
    pub fn callbacks(&self) -> Vec<Box<dyn TrainingCallback>> {
        let mut callbacks: Vec<Box<dyn TrainingCallback>> = Vec::new();
        if let Some(reduce) = &self.reduce_lr {
            callbacks.push(Box::new(ReduceLrOnPlateau::new(reduce.clone())));
        }
        if let Some(stop) = &self.early_stopping {
            callbacks.push(Box::new(EarlyStopping::new(stop.clone())));
        }
        callbacks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FitConfig::default();
        assert_eq!(config.epochs, 20);
        assert_eq!(config.batch_size, 100);
        assert_eq!(config.reduce_lr.as_ref().unwrap().monitor, Monitor::ValAccuracy);
        assert_eq!(config.early_stopping.as_ref().unwrap().monitor, Monitor::ValLoss);
        assert!(config.validate().is_ok());
        assert_eq!(config.callbacks().len(), 2);
    }

    #[test]
    fn test_validation() {
        let config = FitConfig {
            batch_size: 0,
            ..FitConfig::default()
        };
        assert!(config.validate().is_err());

        let config = FitConfig {
            reduce_lr: Some(ReduceLrConfig {
                factor: 1.5,
                ..ReduceLrConfig::default()
            }),
            ..FitConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_monitor_json_names() {
        let json = serde_json::to_string(&Monitor::ValAccuracy).unwrap();
        assert_eq!(json, "\"val_accuracy\"");
    }
}
