//! Training module
//!
//! - `trainer`: minibatch loop with per-epoch validation
//! - `callbacks`: post-epoch hook interface and the control state it drives
//! - `scheduler`: reduce-on-plateau learning rate policy
//! - `early_stopping`: patience-based halting with best-parameter restore
//! - `history`: per-epoch record of the run

pub mod callbacks;
pub mod config;
pub mod early_stopping;
pub mod history;
pub mod scheduler;
pub mod trainer;

pub use callbacks::{CallbackAction, EpochDecision, EpochMetrics, TrainingCallback, TrainingControl};
pub use config::{EarlyStoppingConfig, FitConfig, Monitor, ReduceLrConfig};
pub use early_stopping::EarlyStopping;
pub use history::{EpochRecord, TrainingHistory};
pub use scheduler::{PlateauMode, ReduceLrOnPlateau};
pub use trainer::{fit, fit_with_callbacks, FitOutcome};
