//! Multilayer perceptron.
mod base;
mod config;
pub use base::Mlp;
use candle_core::{Result, Tensor};
use candle_nn::{Linear, Module};
pub use config::MlpConfig;
use serde::{Deserialize, Serialize};

/// Activation functions applied after hidden layers.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub enum Activation {
    /// Rectified linear unit.
    Relu,

    /// Hyperbolic tangent.
    Tanh,

    /// Logistic sigmoid.
    Sigmoid,

    /// Gaussian error linear unit.
    Gelu,

    /// Sigmoid linear unit.
    Silu,

    /// Exponential linear unit with the given alpha.
    Elu(f64),

    /// Leaky ReLU with the given negative slope.
    LeakyRelu(f64),
}

impl Default for Activation {
    fn default() -> Self {
        Self::Relu
    }
}

impl Activation {
    /// Applies the activation function.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        match self {
            Self::Relu => xs.relu(),
            Self::Tanh => xs.tanh(),
            Self::Sigmoid => candle_nn::ops::sigmoid(xs),
            Self::Gelu => xs.gelu(),
            Self::Silu => xs.silu(),
            Self::Elu(alpha) => xs.elu(*alpha),
            Self::LeakyRelu(slope) => candle_nn::ops::leaky_relu(xs, *slope),
        }
    }
}

/// Hidden layers are followed by `act`, the output layer is left linear.
fn mlp_forward(xs: Tensor, layers: &[Linear], act: &Activation) -> Result<Tensor> {
    let n_layers = layers.len();
    let mut xs = xs;

    for (i, layer) in layers.iter().enumerate() {
        xs = layer.forward(&xs)?;
        if i + 1 < n_layers {
            xs = act.forward(&xs)?;
        }
    }

    Ok(xs)
}
