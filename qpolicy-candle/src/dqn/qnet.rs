//! Action-value network.
use super::config::ValueNetworkConfig;
use crate::{
    extractor::FeatureExtractor,
    mlp::{Mlp, MlpConfig},
    util::{argmax_rows, named_tensors, set_var},
};
use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use log::info;
use qpolicy_core::{Discrete, PolicyError};
use rand::Rng;
use std::{path::Path, sync::Arc};

/// Maps observations to action values, one for each discrete action.
///
/// Features are computed with a feature extractor shared with other networks,
/// then fed to an MLP of `features_dim -> net_arch[0] -> ... -> action_dim`.
/// The output layer has no activation.
pub struct QValueNetwork {
    config: ValueNetworkConfig,
    action_space: Discrete,
    extractor: Arc<dyn FeatureExtractor>,
    device: Device,
    varmap: VarMap,
    q_net: Mlp,
    epsilon: f64,
}

impl QValueNetwork {
    /// Builds the network with freshly initialized weights.
    pub fn build(config: &ValueNetworkConfig, extractor: Arc<dyn FeatureExtractor>) -> Result<Self> {
        config.validate()?;
        if extractor.features_dim() != config.features_dim {
            return Err(PolicyError::Configuration(format!(
                "features_dim ({}) differs from the output width of the feature extractor ({})",
                config.features_dim,
                extractor.features_dim()
            ))
            .into());
        }

        let action_space = config.action_space.as_discrete()?.clone();
        let device = config.device.to_candle()?;
        let varmap = VarMap::new();
        let q_net = {
            let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
            let mlp_config = MlpConfig::new(
                config.features_dim,
                config.net_arch.clone(),
                config.action_dim,
                config.activation,
            );
            Mlp::build("q_net", vb, mlp_config)?
        };

        Ok(Self {
            config: config.clone(),
            action_space,
            extractor,
            device,
            varmap,
            q_net,
            epsilon: config.epsilon,
        })
    }

    /// Returns action values of shape `[action_dim]` for a single observation,
    /// or `[batch, action_dim]` for a batch of observations.
    pub fn forward(&self, obs: &Tensor) -> Result<Tensor> {
        let batched = self.extractor.batch_size(obs)?.is_some();
        let features = self.extractor.extract(obs)?;
        let q = self.q_net.forward(&features)?;

        match batched {
            true => Ok(q),
            false => Ok(q.squeeze(0)?),
        }
    }

    /// Selects actions with epsilon-greedy exploration, returns a 1-D `i64` tensor.
    ///
    /// Unless `deterministic`, a single uniform number is drawn per call. If it is
    /// less than epsilon, every element in the batch gets an action sampled
    /// uniformly from the action space and the network is not evaluated.
    /// Otherwise, or if `deterministic`, the action with the largest value is
    /// taken, the lowest index winning ties.
    pub fn select_action<R: Rng + ?Sized>(
        &self,
        obs: &Tensor,
        deterministic: bool,
        rng: &mut R,
    ) -> Result<Tensor> {
        // Invalid observations are rejected even if the network is not evaluated
        let features = self.extractor.extract(obs)?;
        let batch_size = features.dims()[0];
        let explore = !deterministic && rng.gen::<f64>() < self.epsilon;

        let act = match explore {
            true => (0..batch_size)
                .map(|_| self.action_space.sample(rng))
                .collect::<Vec<_>>(),
            false => argmax_rows(&self.q_net.forward(&features)?)?,
        };
        let n = act.len();

        Ok(Tensor::from_vec(act, (n,), &self.device)?)
    }

    /// Sets the exploration rate of this network.
    pub fn update_epsilon(&mut self, epsilon: f64) {
        self.epsilon = epsilon;
    }

    /// Exploration rate.
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// The number of actions.
    pub fn action_dim(&self) -> usize {
        self.config.action_dim
    }

    /// Width of the feature vectors.
    pub fn features_dim(&self) -> usize {
        self.config.features_dim
    }

    /// Configuration the network was built from.
    pub fn config(&self) -> &ValueNetworkConfig {
        &self.config
    }

    /// Variables of the network.
    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Copies of the parameters as `(name, tensor)` pairs sorted by name.
    pub fn parameters(&self) -> Result<Vec<(String, Tensor)>> {
        named_tensors(&self.varmap)
    }

    /// Overwrites a parameter in place.
    pub fn set_parameter(&self, name: &str, value: &Tensor) -> Result<()> {
        set_var(&self.varmap, name, value)
    }

    /// Saves the parameters in safetensors format.
    pub fn save<T: AsRef<Path>>(&self, path: T) -> Result<()> {
        self.varmap.save(&path)?;
        info!("Save q-network to {:?}", path.as_ref());
        Ok(())
    }

    /// Loads the parameters in safetensors format.
    pub fn load<T: AsRef<Path>>(&mut self, path: T) -> Result<()> {
        self.varmap.load(&path)?;
        info!("Load q-network from {:?}", path.as_ref());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::FlattenExtractor;
    use qpolicy_core::Space;
    use rand::{rngs::SmallRng, SeedableRng};

    fn build_qnet(obs_dim: usize, n_actions: usize, net_arch: Vec<usize>) -> Result<QValueNetwork> {
        let obs_space = Space::boxed(vec![obs_dim], -1.0, 1.0);
        let config = ValueNetworkConfig::new(obs_space.clone(), Space::discrete(n_actions))?
            .net_arch(net_arch);
        let extractor = Arc::new(FlattenExtractor::new(obs_space, true, Device::Cpu));
        QValueNetwork::build(&config, extractor)
    }

    /// Makes the network output `bias` regardless of the observation.
    fn force_output(qnet: &QValueNetwork, bias: &[f32]) -> Result<()> {
        let n = bias.len();
        let in_dim = qnet.features_dim();
        qnet.set_parameter(
            "q_net.ln0.weight",
            &Tensor::zeros((n, in_dim), DType::F32, &Device::Cpu)?,
        )?;
        qnet.set_parameter("q_net.ln0.bias", &Tensor::from_slice(bias, (n,), &Device::Cpu)?)?;
        Ok(())
    }

    #[test]
    fn test_forward_shapes() -> Result<()> {
        let qnet = build_qnet(4, 3, vec![16, 16])?;
        let obs = Tensor::zeros((4,), DType::F32, &Device::Cpu)?;
        assert_eq!(qnet.forward(&obs)?.dims(), &[3]);

        let obs = Tensor::zeros((5, 4), DType::F32, &Device::Cpu)?;
        assert_eq!(qnet.forward(&obs)?.dims(), &[5, 3]);
        Ok(())
    }

    #[test]
    fn test_dimension_mismatch() -> Result<()> {
        let qnet = build_qnet(4, 3, vec![16])?;
        let obs = Tensor::zeros((5, 3), DType::F32, &Device::Cpu)?;
        let err = qnet.forward(&obs).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PolicyError>(),
            Some(PolicyError::DimensionMismatch { .. })
        ));

        let mut rng = SmallRng::seed_from_u64(0);
        assert!(qnet.select_action(&obs, false, &mut rng).is_err());
        Ok(())
    }

    #[test]
    fn test_invalid_architecture() {
        assert!(build_qnet(4, 0, vec![16]).is_err());
        assert!(build_qnet(4, 2, vec![16, 0]).is_err());
    }

    #[test]
    fn test_extractor_width_mismatch() -> Result<()> {
        let obs_space = Space::boxed(vec![4], -1.0, 1.0);
        let config = ValueNetworkConfig::new(obs_space, Space::discrete(2))?;
        let extractor = Arc::new(FlattenExtractor::new(
            Space::boxed(vec![5], -1.0, 1.0),
            true,
            Device::Cpu,
        ));
        let err = QValueNetwork::build(&config, extractor).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<PolicyError>(),
            Some(PolicyError::Configuration(_))
        ));
        Ok(())
    }

    #[test]
    fn test_greedy_action_tie_break() -> Result<()> {
        let qnet = build_qnet(2, 4, vec![])?;
        force_output(&qnet, &[0.1, 0.9, 0.9, 0.2])?;
        let mut rng = SmallRng::seed_from_u64(0);

        let obs = Tensor::from_slice(&[0.3f32, -0.5], (2,), &Device::Cpu)?;
        let act: Vec<i64> = qnet.select_action(&obs, true, &mut rng)?.to_vec1()?;
        assert_eq!(act, vec![1]);

        let obs = Tensor::zeros((3, 2), DType::F32, &Device::Cpu)?;
        let act: Vec<i64> = qnet.select_action(&obs, true, &mut rng)?.to_vec1()?;
        assert_eq!(act, vec![1, 1, 1]);

        force_output(&qnet, &[0.5, 0.5, 0.1, 0.2])?;
        let act: Vec<i64> = qnet.select_action(&obs, true, &mut rng)?.to_vec1()?;
        assert_eq!(act, vec![0, 0, 0]);
        Ok(())
    }

    #[test]
    fn test_deterministic_is_repeatable() -> Result<()> {
        let mut qnet = build_qnet(4, 5, vec![32, 32])?;
        qnet.update_epsilon(1.0);
        let mut rng = SmallRng::seed_from_u64(7);
        let obs = Tensor::randn(0f32, 1.0, (16, 4), &Device::Cpu)?;

        let act: Vec<i64> = qnet.select_action(&obs, true, &mut rng)?.to_vec1()?;
        for _ in 0..10 {
            let act_: Vec<i64> = qnet.select_action(&obs, true, &mut rng)?.to_vec1()?;
            assert_eq!(act, act_);
        }
        Ok(())
    }

    #[test]
    fn test_epsilon_zero_matches_greedy() -> Result<()> {
        let mut qnet = build_qnet(4, 5, vec![32])?;
        qnet.update_epsilon(0.0);
        let mut rng = SmallRng::seed_from_u64(7);

        for _ in 0..20 {
            let obs = Tensor::randn(0f32, 1.0, (8, 4), &Device::Cpu)?;
            let a1: Vec<i64> = qnet.select_action(&obs, false, &mut rng)?.to_vec1()?;
            let a2: Vec<i64> = qnet.select_action(&obs, true, &mut rng)?.to_vec1()?;
            assert_eq!(a1, a2);
        }
        Ok(())
    }

    #[test]
    fn test_epsilon_one_is_uniform() -> Result<()> {
        let n_actions = 4;
        let mut qnet = build_qnet(2, n_actions, vec![])?;
        force_output(&qnet, &[0.0, 0.0, 10.0, 0.0])?;
        qnet.update_epsilon(1.0);
        let mut rng = SmallRng::seed_from_u64(42);
        let obs = Tensor::zeros((2,), DType::F32, &Device::Cpu)?;

        let n_draws = 1000;
        let mut counts = vec![0usize; n_actions];
        for _ in 0..n_draws {
            let act: Vec<i64> = qnet.select_action(&obs, false, &mut rng)?.to_vec1()?;
            assert_eq!(act.len(), 1);
            assert!((0..n_actions as i64).contains(&act[0]));
            counts[act[0] as usize] += 1;
        }

        // Chi-squared test with 3 degrees of freedom at the 0.1% level
        let expected = n_draws as f64 / n_actions as f64;
        let chi2: f64 = counts
            .iter()
            .map(|&c| (c as f64 - expected).powi(2) / expected)
            .sum();
        assert!(chi2 < 16.27, "counts = {:?}, chi2 = {}", counts, chi2);
        Ok(())
    }

    #[test]
    fn test_exploration_rate() -> Result<()> {
        // The greedy action is always 2, so other actions reveal exploration
        let n_actions = 4;
        let mut qnet = build_qnet(2, n_actions, vec![])?;
        force_output(&qnet, &[0.0, 0.0, 10.0, 0.0])?;
        let obs = Tensor::zeros((2,), DType::F32, &Device::Cpu)?;

        for &eps in [0.0, 0.2, 0.5, 0.9].iter() {
            qnet.update_epsilon(eps);
            let mut rng = SmallRng::seed_from_u64(123);
            let n_draws = 20_000;
            let mut n_non_greedy = 0;
            for _ in 0..n_draws {
                let act: Vec<i64> = qnet.select_action(&obs, false, &mut rng)?.to_vec1()?;
                if act[0] != 2 {
                    n_non_greedy += 1;
                }
            }
            // A random action is non-greedy with probability 3/4
            let rate = n_non_greedy as f64 / n_draws as f64;
            let expected = eps * (n_actions - 1) as f64 / n_actions as f64;
            assert!((rate - expected).abs() < 0.02, "eps = {}, rate = {}", eps, rate);
        }
        Ok(())
    }

    #[test]
    fn test_batch_explores_or_exploits_as_a_whole() -> Result<()> {
        let n_actions = 4;
        let mut qnet = build_qnet(2, n_actions, vec![])?;
        force_output(&qnet, &[0.0, 0.0, 10.0, 0.0])?;
        qnet.update_epsilon(0.5);
        let mut rng = SmallRng::seed_from_u64(5);
        let obs = Tensor::zeros((64, 2), DType::F32, &Device::Cpu)?;

        let (mut n_explore, mut n_exploit) = (0, 0);
        for _ in 0..200 {
            let act: Vec<i64> = qnet.select_action(&obs, false, &mut rng)?.to_vec1()?;
            assert_eq!(act.len(), 64);
            if act.iter().all(|&a| a == 2) {
                n_exploit += 1;
            } else {
                // Random actions are drawn independently per element
                assert!(act.iter().any(|&a| a != act[0]));
                n_explore += 1;
            }
        }
        assert!(n_explore > 0 && n_exploit > 0);
        Ok(())
    }

    #[test]
    fn test_independent_initialization() -> Result<()> {
        let q1 = build_qnet(4, 2, vec![16])?;
        let q2 = build_qnet(4, 2, vec![16])?;
        let p1 = q1.parameters()?;
        let p2 = q2.parameters()?;
        assert_eq!(p1.len(), p2.len());

        let w1: Vec<Vec<f32>> = p1[1].1.to_vec2()?;
        let w2: Vec<Vec<f32>> = p2[1].1.to_vec2()?;
        assert_ne!(w1, w2);
        Ok(())
    }
}
