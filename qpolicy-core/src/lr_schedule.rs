//! Learning rate schedules.
use serde::{Deserialize, Serialize};

/// A learning rate as a function of the remaining training progress.
///
/// `progress_remaining` goes from `1.0` at the beginning of training to `0.0`
/// at the end. Any closure `Fn(f64) -> f64` is a schedule.
pub trait LrSchedule {
    /// Returns the learning rate.
    fn lr(&self, progress_remaining: f64) -> f64;
}

impl<F> LrSchedule for F
where
    F: Fn(f64) -> f64,
{
    fn lr(&self, progress_remaining: f64) -> f64 {
        self(progress_remaining)
    }
}

/// Serializable learning rate schedules.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub enum LrScheduleConfig {
    /// The same learning rate throughout training.
    Constant {
        /// Learning rate.
        lr: f64,
    },

    /// Linear interpolation from `initial_lr` to `final_lr`.
    Linear {
        /// Learning rate when `progress_remaining == 1`.
        initial_lr: f64,

        /// Learning rate when `progress_remaining == 0`.
        final_lr: f64,
    },
}

impl Default for LrScheduleConfig {
    fn default() -> Self {
        Self::Constant { lr: 1e-4 }
    }
}

impl LrSchedule for LrScheduleConfig {
    fn lr(&self, progress_remaining: f64) -> f64 {
        match self {
            Self::Constant { lr } => *lr,
            Self::Linear {
                initial_lr,
                final_lr,
            } => {
                let p = progress_remaining.clamp(0.0, 1.0);
                final_lr + (initial_lr - final_lr) * p
            }
        }
    }
}
