use super::{mlp_forward, MlpConfig};
use anyhow::Result;
use candle_core::Tensor;
use candle_nn::{linear, Linear, VarBuilder};

/// Returns vector of linear modules from [`MlpConfig`].
///
/// Variables are named `{prefix}.ln{i}.weight` and `{prefix}.ln{i}.bias`.
fn create_linear_layers(prefix: &str, vb: VarBuilder, config: &MlpConfig) -> Result<Vec<Linear>> {
    let vb = vb.pp(prefix);

    let layers = config
        .in_out_pairs()
        .into_iter()
        .enumerate()
        .map(|(i, (in_dim, out_dim))| linear(in_dim, out_dim, vb.pp(format!("ln{}", i))))
        .collect::<candle_core::Result<Vec<_>>>()?;

    Ok(layers)
}

/// Multilayer perceptron with a configurable activation function on hidden layers.
pub struct Mlp {
    config: MlpConfig,
    layers: Vec<Linear>,
}

impl Mlp {
    /// Builds the MLP, registering its variables under `prefix` in `vb`.
    pub fn build(prefix: &str, vb: VarBuilder, config: MlpConfig) -> Result<Self> {
        let layers = create_linear_layers(prefix, vb, &config)?;
        Ok(Self { config, layers })
    }

    /// Applies the MLP on `xs` of shape `[batch, in_dim]`.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        Ok(mlp_forward(
            xs.clone(),
            &self.layers,
            &self.config.activation,
        )?)
    }

    /// Configuration.
    pub fn config(&self) -> &MlpConfig {
        &self.config
    }

    /// The number of affine layers.
    pub fn n_layers(&self) -> usize {
        self.layers.len()
    }
}
