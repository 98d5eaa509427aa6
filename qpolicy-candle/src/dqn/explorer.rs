//! Exploration rate schedule.
use serde::{Deserialize, Serialize};

/// Linearly decaying exploration rate.
///
/// Training loops query [`EpsilonSchedule::value`] and pass the result to
/// [`DqnPolicy::update_epsilon`](super::DqnPolicy::update_epsilon).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct EpsilonSchedule {
    pub eps_start: f64,
    pub eps_final: f64,
    pub final_step: usize,
}

impl Default for EpsilonSchedule {
    fn default() -> Self {
        Self {
            eps_start: 1.0,
            eps_final: 0.05,
            final_step: 100_000,
        }
    }
}

impl EpsilonSchedule {
    /// Constructs the schedule reaching `eps_final` at `final_step`.
    pub fn with_final_step(final_step: usize) -> Self {
        Self {
            final_step,
            ..Self::default()
        }
    }

    /// Set the epsilon value at the final step.
    pub fn eps_final(mut self, v: f64) -> Self {
        self.eps_final = v;
        self
    }

    /// Set the epsilon value at the start.
    pub fn eps_start(mut self, v: f64) -> Self {
        self.eps_start = v;
        self
    }

    /// Exploration rate at `step`.
    pub fn value(&self, step: usize) -> f64 {
        if self.final_step == 0 {
            return self.eps_final;
        }
        let d = (self.eps_start - self.eps_final) / (self.final_step as f64);
        (self.eps_start - d * step as f64).max(self.eps_final)
    }
}
