//! DQN policy implemented with candle.
use super::{
    config::{DqnPolicyConfig, ValueNetworkConfig},
    qnet::QValueNetwork,
};
use crate::{
    extractor::{FeatureExtractor, FlattenExtractor},
    opt::Optimizer,
    util::{copy_vars, track},
};
use anyhow::Result;
use candle_core::Tensor;
use log::{debug, info};
use qpolicy_core::{Configurable, LrSchedule, Policy};
use rand::{rngs::SmallRng, SeedableRng};
use std::{fs, path::Path, sync::Arc};

/// Policy with an online and a target action-value network.
///
/// Actions are always selected by the online network. The target network
/// starts as an exact copy of the online network and is overwritten only by
/// [`DqnPolicy::synchronize_target`] or [`DqnPolicy::soft_update_target`].
/// The optimizer is bound to the variables of the online network.
pub struct DqnPolicy {
    config: DqnPolicyConfig,
    q_net: QValueNetwork,
    q_net_target: QValueNetwork,
    opt: Optimizer,
    epsilon: f64,
    rng: SmallRng,
}

impl DqnPolicy {
    /// Builds the policy with the learning rate schedule in the configuration.
    pub fn build(config: DqnPolicyConfig) -> Result<Self> {
        let lr_schedule = config.lr_schedule.clone();
        Self::build_with_schedule(config, &lr_schedule)
    }

    /// Builds the policy with a given learning rate schedule.
    ///
    /// The initial learning rate of the optimizer is `lr_schedule.lr(1.0)`.
    pub fn build_with_schedule<S>(config: DqnPolicyConfig, lr_schedule: &S) -> Result<Self>
    where
        S: LrSchedule + ?Sized,
    {
        let device = config.device.to_candle()?;
        let extractor: Arc<dyn FeatureExtractor> = Arc::new(FlattenExtractor::new(
            config.observation_space.clone(),
            config.normalize_images,
            device,
        ));
        let net_config =
            ValueNetworkConfig::new(config.observation_space.clone(), config.action_space.clone())?
                .features_dim(extractor.features_dim())
                .net_arch(config.net_arch.clone())
                .activation(config.activation)
                .epsilon(config.epsilon)
                .normalize_images(config.normalize_images)
                .device(config.device);

        let q_net = QValueNetwork::build(&net_config, extractor.clone())?;
        let q_net_target = QValueNetwork::build(&net_config, extractor)?;
        copy_vars(q_net_target.varmap(), q_net.varmap())?;

        let lr = lr_schedule.lr(1.0);
        let opt = config
            .opt_config
            .clone()
            .learning_rate(lr)
            .build(q_net.varmap().all_vars())?;

        info!(
            "Build DQN policy: features_dim = {}, net_arch = {:?}, action_dim = {}, lr = {}",
            net_config.get_features_dim(),
            net_config.get_net_arch(),
            net_config.get_action_dim(),
            lr
        );

        Ok(Self {
            epsilon: config.epsilon,
            rng: SmallRng::seed_from_u64(config.seed),
            config,
            q_net,
            q_net_target,
            opt,
        })
    }

    /// Overwrites all parameters of the target network with those of the online network.
    pub fn synchronize_target(&mut self) -> Result<()> {
        copy_vars(self.q_net_target.varmap(), self.q_net.varmap())?;
        debug!("Synchronize target network");
        Ok(())
    }

    /// Moves the target network toward the online network.
    ///
    /// target = tau * online + (1 - tau) * target
    pub fn soft_update_target(&mut self, tau: f64) -> Result<()> {
        track(self.q_net_target.varmap(), self.q_net.varmap(), tau)
    }

    /// Sets the exploration rate of the policy and both networks.
    pub fn update_epsilon(&mut self, epsilon: f64) {
        self.q_net.update_epsilon(epsilon);
        self.q_net_target.update_epsilon(epsilon);
        self.epsilon = epsilon;
    }

    /// Exploration rate.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Selects actions with the online network, returns a 1-D `i64` tensor.
    pub fn predict(&mut self, obs: &Tensor, deterministic: bool) -> Result<Tensor> {
        self.q_net.select_action(obs, deterministic, &mut self.rng)
    }

    /// Selects actions with exploration.
    pub fn q_forward(&mut self, obs: &Tensor) -> Result<Tensor> {
        self.predict(obs, false)
    }

    /// Action values of the online network.
    pub fn q_values(&self, obs: &Tensor) -> Result<Tensor> {
        self.q_net.forward(obs)
    }

    /// Action values of the target network, used for bootstrapped targets.
    pub fn target_q_values(&self, obs: &Tensor) -> Result<Tensor> {
        self.q_net_target.forward(obs)
    }

    /// Applies an optimization step on the online network.
    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        self.opt.backward_step(loss)
    }

    /// Current learning rate of the optimizer.
    pub fn learning_rate(&self) -> f64 {
        self.opt.learning_rate()
    }

    /// Sets the learning rate of the optimizer.
    pub fn set_learning_rate(&mut self, lr: f64) {
        self.opt.set_learning_rate(lr);
    }

    /// Reseeds the random number generator used for exploration.
    pub fn seed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }

    /// Online network.
    pub fn online(&self) -> &QValueNetwork {
        &self.q_net
    }

    /// Target network.
    pub fn target(&self) -> &QValueNetwork {
        &self.q_net_target
    }

    /// Configuration the policy was built from.
    pub fn config(&self) -> &DqnPolicyConfig {
        &self.config
    }

    /// Saves both networks in `path`, a directory.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        fs::create_dir_all(&path)?;
        self.q_net.save(path.as_ref().join("online.safetensors"))?;
        self.q_net_target
            .save(path.as_ref().join("target.safetensors"))?;
        info!("Save DQN policy to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads both networks from `path`, a directory.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.q_net.load(path.as_ref().join("online.safetensors"))?;
        self.q_net_target
            .load(path.as_ref().join("target.safetensors"))?;
        info!("Load DQN policy from {:?}", path.as_ref());
        Ok(())
    }
}

impl Policy for DqnPolicy {
    type Obs = Tensor;
    type Act = Tensor;

    fn sample(&mut self, obs: &Self::Obs) -> Result<Self::Act> {
        self.predict(obs, false)
    }
}

impl Configurable for DqnPolicy {
    type Config = DqnPolicyConfig;

    fn build(config: Self::Config) -> Result<Self> {
        DqnPolicy::build(config)
    }
}
