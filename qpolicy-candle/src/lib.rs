//! DQN policy implemented with [candle](https://crates.io/crates/candle-core).
//!
//! [`DqnPolicy`](dqn::DqnPolicy) owns an online and a target
//! [`QValueNetwork`](dqn::QValueNetwork). Actions are always selected with the
//! online network, while the target network is kept for computing bootstrapped
//! targets in a training loop and is only overwritten on request.
pub mod dqn;
pub mod extractor;
pub mod mlp;
pub mod opt;
pub mod registry;
pub mod util;
use anyhow::Result;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Copy, Deserialize, Serialize, PartialEq)]
/// Device for using candle.
///
/// This enum is added because [`candle_core::Device`] does not support serialization.
pub enum Device {
    /// The main CPU device.
    Cpu,

    /// The main GPU device.
    Cuda(usize),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cpu
    }
}

impl Device {
    /// Returns the candle device.
    pub fn to_candle(self) -> Result<candle_core::Device> {
        match self {
            Self::Cpu => Ok(candle_core::Device::Cpu),
            Self::Cuda(n) => Ok(candle_core::Device::new_cuda(n)?),
        }
    }
}
