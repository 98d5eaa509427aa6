//! DQN policy.
mod base;
mod config;
mod explorer;
mod qnet;
pub use base::DqnPolicy;
pub use config::{DqnPolicyConfig, ValueNetworkConfig};
pub use explorer::EpsilonSchedule;
pub use qnet::QValueNetwork;

/// Alias under which [`DqnPolicy`] is registered.
pub type MlpPolicy = DqnPolicy;
