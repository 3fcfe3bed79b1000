//! Logging Module
//!
//! Structured logging through `tracing`, plus a per-epoch logger used by the
//! training driver.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::training::history::EpochRecord;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Debug output with module paths
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            ansi_colors: true,
        }
    }

    /// Errors only
    pub fn quiet() -> Self {
        Self {
            level: LogLevel::Error,
            include_target: false,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Parse a level name, falling back to `Info`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        write!(f, "{}", name)
    }
}

/// Install the global subscriber.
///
/// Fails if a subscriber was already installed.
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Per-epoch timing and summary lines for the training driver
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch (1-based)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();
        tracing::debug!("Epoch {}/{} started", epoch, self.total_epochs);
    }

    /// Log the metrics of a finished epoch with an ETA for the remaining ones
    pub fn end_epoch(&self, record: &EpochRecord) {
        let epoch_time = self.epoch_start.elapsed().as_secs_f64();
        let total_time = self.training_start.elapsed().as_secs_f64();

        let epochs_remaining = self.total_epochs.saturating_sub(self.epoch);
        let avg_epoch_time = total_time / self.epoch.max(1) as f64;
        let eta_secs = epochs_remaining as f64 * avg_epoch_time;

        tracing::info!(
            "Epoch {}/{} completed in {} | {} | ETA: {}",
            self.epoch,
            self.total_epochs,
            super::format_duration(epoch_time),
            record,
            super::format_duration(eta_secs)
        );
    }

    pub fn log_lr_change(&self, old_lr: f64, new_lr: f64) {
        tracing::info!("Learning rate reduced: {:.6} -> {:.6}", old_lr, new_lr);
    }

    pub fn log_new_best(&self, val_loss: f64) {
        tracing::debug!("New best validation loss: {:.4}", val_loss);
    }

    pub fn log_early_stop(&self, patience: usize) {
        tracing::warn!(
            "Early stopping after epoch {}: no improvement for {} epochs",
            self.epoch,
            patience
        );
    }

    pub fn log_complete(&self, epochs_run: usize) {
        tracing::info!(
            "Training complete: {} epochs in {}",
            epochs_run,
            super::format_duration(self.training_start.elapsed().as_secs_f64())
        );
    }
}
