use anyhow::Result;
use candle_core::Tensor;
use clap::Parser;
use log::info;
use ndarray::{ArrayD, IxDyn};
use qpolicy_candle::{
    dqn::{DqnPolicy, DqnPolicyConfig, EpsilonSchedule},
    registry::{make_policy, register_default_policies, registered_policies},
    util::arrayd_to_tensor,
};
use qpolicy_core::Space;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use std::path::PathBuf;

const DIM_OBS: usize = 4;
const DIM_ACT: usize = 2;
const OBS_BOUND: f32 = 4.8;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML file of the policy configuration, a CartPole-sized policy if not given
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Registered name of the policy
    #[arg(short, long, default_value = "MlpPolicy")]
    policy: String,

    /// The number of predictions
    #[arg(short, long, default_value_t = 1000)]
    steps: usize,

    /// Batch size of observations, unbatched observations if not given
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Take greedy actions only
    #[arg(short, long, default_value_t = false)]
    deterministic: bool,

    /// Override the exploration rate in the configuration
    #[arg(short, long)]
    epsilon: Option<f64>,

    /// Decay the exploration rate linearly from 1 over this number of steps
    #[arg(long)]
    decay_steps: Option<usize>,

    /// Seed for sampling observations
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Directory where the policy parameters are saved
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Write the configuration in use as YAML
    #[arg(long)]
    write_config: Option<PathBuf>,
}

fn default_config() -> DqnPolicyConfig {
    DqnPolicyConfig::new(
        Space::boxed(vec![DIM_OBS], -OBS_BOUND, OBS_BOUND),
        Space::discrete(DIM_ACT),
    )
}

fn load_config(args: &Args) -> Result<DqnPolicyConfig> {
    let config = match &args.config {
        Some(path) => DqnPolicyConfig::load(path)?,
        None => default_config(),
    };

    Ok(match args.epsilon {
        Some(eps) => config.epsilon(eps),
        None => config,
    })
}

/// Samples observations uniformly from the observation space.
fn sample_obs<R: Rng>(space: &Space, batch_size: Option<usize>, rng: &mut R) -> Result<Tensor> {
    let n = batch_size.unwrap_or(1);
    let mut shape = space.shape();
    if let Some(n) = batch_size {
        shape.insert(0, n);
    }

    match space {
        Space::Box(b) => {
            let data: Vec<f32> = (0..n).flat_map(|_| b.sample(rng)).collect();
            let a = ArrayD::from_shape_vec(IxDyn(&shape), data)?;
            arrayd_to_tensor::<f32, f32>(a, false)
        }
        Space::Discrete(d) => {
            let data: Vec<i64> = (0..n).map(|_| d.sample(rng)).collect();
            let a = ArrayD::from_shape_vec(IxDyn(&shape), data)?;
            arrayd_to_tensor::<i64, i64>(a, false)
        }
    }
}

/// Runs predictions and returns the number of times each action is taken.
fn run(args: &Args, policy: &mut DqnPolicy) -> Result<Vec<usize>> {
    let obs_space = policy.config().get_observation_space().clone();
    let n_actions = policy.online().action_dim();
    let schedule = args
        .decay_steps
        .map(|n| EpsilonSchedule::with_final_step(n).eps_final(policy.epsilon()));
    let mut rng = SmallRng::seed_from_u64(args.seed);
    let mut counts = vec![0usize; n_actions];

    for step in 0..args.steps {
        if let Some(schedule) = &schedule {
            policy.update_epsilon(schedule.value(step));
        }
        let obs = sample_obs(&obs_space, args.batch_size, &mut rng)?;
        let act: Vec<i64> = policy.predict(&obs, args.deterministic)?.to_vec1()?;
        for a in act {
            counts[a as usize] += 1;
        }
    }

    Ok(counts)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    register_default_policies()?;
    info!("Registered policies: {:?}", registered_policies()?);

    let config = load_config(&args)?;
    if let Some(path) = &args.write_config {
        config.save(path)?;
        info!("Write configuration to {:?}", path);
    }

    let mut policy = make_policy(&args.policy, config)?;
    let counts = run(&args, &mut policy)?;
    let total: usize = counts.iter().sum();
    for (a, c) in counts.iter().enumerate() {
        info!(
            "action {}: {} ({:.3})",
            a,
            c,
            *c as f64 / total.max(1) as f64
        );
    }

    if let Some(path) = &args.save_dir {
        policy.save(path)?;
    }

    Ok(())
}
