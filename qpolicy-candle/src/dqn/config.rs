//! Configurations of [`QValueNetwork`](super::QValueNetwork) and [`DqnPolicy`](super::DqnPolicy).
use crate::{mlp::Activation, opt::OptimizerConfig, Device};
use anyhow::Result;
use qpolicy_core::{LrScheduleConfig, PolicyError, Space};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, Write},
    path::Path,
};

/// Configuration shared by the online and the target network of a policy.
///
/// The policy builds it once and hands the same value to both network
/// constructors, so the two networks cannot differ in architecture.
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct ValueNetworkConfig {
    pub(super) observation_space: Space,
    pub(super) action_space: Space,
    pub(super) features_dim: usize,
    pub(super) action_dim: usize,
    pub(super) net_arch: Vec<usize>,
    pub(super) activation: Activation,
    pub(super) epsilon: f64,
    pub(super) normalize_images: bool,
    pub(super) device: Device,
}

impl ValueNetworkConfig {
    /// Constructs a configuration with `features_dim` and `action_dim` derived from the spaces.
    ///
    /// Fails with [`PolicyError::UnsupportedSpace`] if `action_space` is not discrete.
    pub fn new(observation_space: Space, action_space: Space) -> Result<Self> {
        let action_dim = action_space.as_discrete()?.n;
        let features_dim = observation_space.dimensionality();

        Ok(Self {
            observation_space,
            action_space,
            features_dim,
            action_dim,
            net_arch: vec![64, 64],
            activation: Activation::default(),
            epsilon: 0.05,
            normalize_images: true,
            device: Device::default(),
        })
    }

    /// Sets the width of feature vectors given by the feature extractor.
    pub fn features_dim(mut self, v: usize) -> Self {
        self.features_dim = v;
        self
    }

    /// Sets the widths of hidden layers.
    pub fn net_arch(mut self, v: Vec<usize>) -> Self {
        self.net_arch = v;
        self
    }

    /// Sets the activation function of hidden layers.
    pub fn activation(mut self, v: Activation) -> Self {
        self.activation = v;
        self
    }

    /// Sets the initial exploration rate.
    pub fn epsilon(mut self, v: f64) -> Self {
        self.epsilon = v;
        self
    }

    /// Sets if image observations are scaled into `[0, 1]`.
    pub fn normalize_images(mut self, v: bool) -> Self {
        self.normalize_images = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Returns the number of actions.
    pub fn get_action_dim(&self) -> usize {
        self.action_dim
    }

    /// Returns the width of feature vectors.
    pub fn get_features_dim(&self) -> usize {
        self.features_dim
    }

    /// Returns the widths of hidden layers.
    pub fn get_net_arch(&self) -> &[usize] {
        &self.net_arch
    }

    /// Checks the dimensions of the network.
    pub fn validate(&self) -> Result<()> {
        let action_dim = self.action_space.as_discrete()?.n;
        if action_dim != self.action_dim {
            return Err(PolicyError::Configuration(format!(
                "action_dim ({}) differs from the size of the action space ({})",
                self.action_dim, action_dim
            ))
            .into());
        }
        if self.action_dim == 0 {
            return Err(PolicyError::Configuration("action_dim must be positive".into()).into());
        }
        if self.features_dim == 0 {
            return Err(PolicyError::Configuration("features_dim must be positive".into()).into());
        }
        if let Some(i) = self.net_arch.iter().position(|&u| u == 0) {
            return Err(PolicyError::Configuration(format!(
                "net_arch[{}] must be positive, got {:?}",
                i, self.net_arch
            ))
            .into());
        }

        Ok(())
    }
}

fn default_net_arch() -> Vec<usize> {
    vec![256, 256]
}

fn default_epsilon() -> f64 {
    0.05
}

fn default_normalize_images() -> bool {
    true
}

fn default_seed() -> u64 {
    42
}

/// Configuration of [`DqnPolicy`](super::DqnPolicy).
#[derive(Debug, Deserialize, Serialize, PartialEq, Clone)]
pub struct DqnPolicyConfig {
    pub(super) observation_space: Space,
    pub(super) action_space: Space,
    #[serde(default = "default_net_arch")]
    pub(super) net_arch: Vec<usize>,
    #[serde(default)]
    pub(super) activation: Activation,
    #[serde(default = "default_epsilon")]
    pub(super) epsilon: f64,
    #[serde(default = "default_normalize_images")]
    pub(super) normalize_images: bool,
    #[serde(default)]
    pub(super) device: Device,
    #[serde(default)]
    pub(super) lr_schedule: LrScheduleConfig,
    #[serde(default)]
    pub(super) opt_config: OptimizerConfig,
    #[serde(default = "default_seed")]
    pub(super) seed: u64,
}

impl DqnPolicyConfig {
    /// Constructs a configuration with default values for the given spaces.
    pub fn new(observation_space: Space, action_space: Space) -> Self {
        Self {
            observation_space,
            action_space,
            net_arch: default_net_arch(),
            activation: Activation::default(),
            epsilon: default_epsilon(),
            normalize_images: default_normalize_images(),
            device: Device::default(),
            lr_schedule: LrScheduleConfig::default(),
            opt_config: OptimizerConfig::default(),
            seed: default_seed(),
        }
    }

    /// Sets the widths of hidden layers.
    pub fn net_arch(mut self, v: Vec<usize>) -> Self {
        self.net_arch = v;
        self
    }

    /// Sets the activation function of hidden layers.
    pub fn activation(mut self, v: Activation) -> Self {
        self.activation = v;
        self
    }

    /// Sets the exploration rate.
    pub fn epsilon(mut self, v: f64) -> Self {
        self.epsilon = v;
        self
    }

    /// Sets if image observations are scaled into `[0, 1]`.
    pub fn normalize_images(mut self, v: bool) -> Self {
        self.normalize_images = v;
        self
    }

    /// Sets the device.
    pub fn device(mut self, v: Device) -> Self {
        self.device = v;
        self
    }

    /// Sets the learning rate schedule.
    pub fn lr_schedule(mut self, v: LrScheduleConfig) -> Self {
        self.lr_schedule = v;
        self
    }

    /// Sets the optimizer configuration.
    ///
    /// The learning rate in it is overridden by the schedule when the policy is built.
    pub fn opt_config(mut self, v: OptimizerConfig) -> Self {
        self.opt_config = v;
        self
    }

    /// Sets the random seed for exploration.
    pub fn seed(mut self, v: u64) -> Self {
        self.seed = v;
        self
    }

    /// Observation space.
    pub fn get_observation_space(&self) -> &Space {
        &self.observation_space
    }

    /// Action space.
    pub fn get_action_space(&self) -> &Space {
        &self.action_space
    }

    /// Constructs [`DqnPolicyConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`DqnPolicyConfig`] as a YAML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}
