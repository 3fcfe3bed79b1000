//! Model and optimizer configuration

use burn::config::Config;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::RmsPropConfig;
use serde::{Deserialize, Serialize};

use crate::dataset::corpus::ImageShape;
use crate::utils::error::{self, CifarError};

/// Labels are stored as single bytes
pub const MAX_CLASSES: usize = u8::MAX as usize + 1;

/// Configuration for the CIFAR-10 CNN
///
/// The defaults describe the two-block network: two 3x3 convolutions with
/// 32 filters, then two 2x2 convolutions with 64 filters, then a 256-unit
/// dense layer.
#[derive(Config, Debug)]
pub struct CifarCnnConfig {
    #[config(default = "10")]
    pub num_classes: usize,

    #[config(default = "3")]
    pub in_channels: usize,

    #[config(default = "32")]
    pub input_height: usize,

    #[config(default = "32")]
    pub input_width: usize,

    /// Filters of both convolutions in the first block
    #[config(default = "32")]
    pub block1_filters: usize,

    #[config(default = "3")]
    pub block1_kernel: usize,

    /// Dropout between the two convolutions of the first block
    /// (0.5 in the earlier network variant)
    #[config(default = "0.0")]
    pub block1_inner_dropout: f64,

    /// Filters of both convolutions in the second block
    #[config(default = "64")]
    pub block2_filters: usize,

    /// 2 in the later network variant, 3 in the earlier one
    #[config(default = "2")]
    pub block2_kernel: usize,

    #[config(default = "256")]
    pub dense_units: usize,

    /// Dropout after each pooling stage
    #[config(default = "0.25")]
    pub conv_dropout: f64,

    /// Dropout after the dense layer
    #[config(default = "0.5")]
    pub dense_dropout: f64,
}

impl CifarCnnConfig {
    pub fn input_shape(&self) -> ImageShape {
        ImageShape::new(self.in_channels, self.input_height, self.input_width)
    }

    /// Flattened feature count entering the dense layer
    pub fn flattened_features(&self) -> usize {
        self.block2_filters * (self.input_height / 4) * (self.input_width / 4)
    }

    pub fn validate(&self) -> error::Result<()> {
        if self.num_classes == 0 || self.num_classes > MAX_CLASSES {
            return Err(CifarError::Config(format!(
                "num_classes must be in range [1, {}]",
                MAX_CLASSES
            )));
        }
        if self.in_channels == 0 || self.block1_filters == 0 || self.block2_filters == 0 || self.dense_units == 0 {
            return Err(CifarError::Config("layer widths must be greater than 0".to_string()));
        }
        if self.block1_kernel == 0 || self.block2_kernel == 0 {
            return Err(CifarError::Config("kernel sizes must be greater than 0".to_string()));
        }
        for (name, rate) in [
            ("block1_inner_dropout", self.block1_inner_dropout),
            ("conv_dropout", self.conv_dropout),
            ("dense_dropout", self.dense_dropout),
        ] {
            if !(0.0..1.0).contains(&rate) {
                return Err(CifarError::Config(format!("{} must be in range [0.0, 1.0)", name)));
            }
        }
        Ok(())
    }
}

/// RMSprop settings with time-based learning-rate decay
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    /// Smoothing constant of the squared-gradient average
    pub rho: f32,
    pub epsilon: f32,
    /// Time-based decay per optimizer step: `lr / (1 + decay * step)`
    pub decay: f64,
    /// L2 penalty, disabled when `None`
    pub weight_decay: Option<f32>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            rho: 0.9,
            epsilon: 1e-8,
            decay: 0.0,
            weight_decay: None,
        }
    }
}

impl OptimizerConfig {
    /// Effective rate after `iteration` optimizer steps, given the base rate
    pub fn learning_rate_at(&self, base_rate: f64, iteration: usize) -> f64 {
        base_rate / (1.0 + self.decay * iteration as f64)
    }

    pub fn to_burn(&self) -> RmsPropConfig {
        RmsPropConfig::new()
            .with_alpha(self.rho)
            .with_epsilon(self.epsilon)
            .with_momentum(0.0)
            .with_centered(false)
            .with_weight_decay(self.weight_decay.map(WeightDecayConfig::new))
    }

    pub fn validate(&self) -> error::Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(CifarError::Config("learning_rate must be a positive number".to_string()));
        }
        if !(0.0..1.0).contains(&self.rho) {
            return Err(CifarError::Config("rho must be in range [0.0, 1.0)".to_string()));
        }
        if self.epsilon <= 0.0 {
            return Err(CifarError::Config("epsilon must be greater than 0".to_string()));
        }
        if self.decay < 0.0 {
            return Err(CifarError::Config("decay must not be negative".to_string()));
        }
        Ok(())
    }
}
