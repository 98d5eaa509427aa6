//! Errors in the library.
use thiserror::Error;

/// Errors raised while building or running a policy.
#[derive(Error, Debug, PartialEq)]
pub enum PolicyError {
    /// The given space cannot be used in this position, e.g., a continuous action space.
    #[error("Unsupported space: {0}")]
    UnsupportedSpace(String),

    /// Invalid network architecture or inconsistent configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An observation does not match the shape of the observation space.
    #[error("Dimension mismatch: expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        /// Expected shape, without the batch dimension.
        expected: Vec<usize>,

        /// Shape of the given tensor.
        got: Vec<usize>,
    },

    /// An observation value lies outside the observation space.
    #[error("Invalid observation: {0}")]
    InvalidObservation(String),

    /// No policy is registered under the name.
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    /// A parameter name not found in the network.
    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),
}
