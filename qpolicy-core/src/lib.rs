#![warn(missing_docs)]
//! Backend-agnostic building blocks of DQN policies.
//!
//! This crate provides observation and action [`Space`]s, the error type
//! [`PolicyError`], learning-rate schedules and the [`Policy`] and
//! [`Configurable`] traits. Neural network backends, such as
//! `qpolicy-candle`, implement policies on top of them.
pub mod error;
pub mod lr_schedule;
pub mod space;

mod base;
pub use base::{Configurable, Policy};
pub use error::PolicyError;
pub use lr_schedule::{LrSchedule, LrScheduleConfig};
pub use space::{BoxSpace, Discrete, Space, SpaceDtype};
