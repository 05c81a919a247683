use anyhow::Result;
use clap::Parser;
use legged_core::{
    record::{BufferedRecorder, RecordValue},
    util::rollout,
    Policy,
};
use legged_env::{KinematicSim, LeggedAct, LeggedEnv, LeggedEnvConfig, LeggedObs};
use log::info;
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeMap;

type Env = LeggedEnv<KinematicSim>;
type Config = LeggedEnvConfig<KinematicSim>;

/// Uniform random actions in `[-scale, scale]`.
struct RandomPolicy {
    num_actions: usize,
    scale: f32,
    rng: StdRng,
}

impl Policy<Env> for RandomPolicy {
    fn sample(&mut self, obs: &LeggedObs) -> LeggedAct {
        let n = obs.policy.nrows();
        let (scale, rng) = (self.scale, &mut self.rng);
        LeggedAct(Array2::from_shape_fn((n, self.num_actions), |_| rng.gen_range(-scale..=scale)))
    }
}

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Environment configuration in YAML. Defaults to a quadruped on flat
    /// terrain.
    #[arg(long)]
    config: Option<String>,

    /// Number of robots
    #[arg(long, default_value_t = 64)]
    num_envs: usize,

    /// Number of policy steps
    #[arg(long, default_value_t = 500)]
    n_steps: usize,

    /// Magnitude of the random actions
    #[arg(long, default_value_t = 0.5)]
    scale: f32,

    #[arg(long, default_value_t = 42)]
    seed: i64,
}

fn default_config() -> Config {
    let angles = |v: [(&str, f32); 3]| v.iter().map(|(k, a)| (k.to_string(), *a)).collect::<BTreeMap<_, _>>();
    let mut config = Config::default();
    config.init_state.pos = [0.0, 0.0, 0.42];
    config.init_state.default_joint_angles = angles([("hip", 0.0), ("thigh", 0.8), ("calf", -1.5)]);
    config.control.stiffness = BTreeMap::from([("joint".to_string(), 20.0)]);
    config.control.damping = BTreeMap::from([("joint".to_string(), 0.5)]);
    config.asset.name = "go2".to_string();
    config.asset.foot_name = "foot".to_string();
    config.asset.penalize_contacts_on = vec!["thigh".to_string(), "calf".to_string()];
    config.asset.terminate_after_contacts_on = vec!["base".to_string()];
    config
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match args.config.as_ref() {
        Some(path) => Config::load(path)?,
        None => default_config(),
    }
    .num_envs(args.num_envs);

    let mut env = <Env as legged_core::Env>::build(&config, args.seed)?;
    let mut policy = RandomPolicy {
        num_actions: env.num_actions(),
        scale: args.scale,
        rng: StdRng::seed_from_u64(args.seed as u64),
    };
    let mut recorder = BufferedRecorder::new();
    let rewards = rollout(&mut env, &mut policy, args.n_steps, &mut recorder)?;

    let mean = rewards.iter().sum::<f32>() / rewards.len().max(1) as f32;
    info!("Mean step reward: {}", mean);
    if let Some(record) = recorder.iter().last() {
        for (k, v) in record.iter() {
            if let RecordValue::Scalar(v) = v {
                info!("{}: {}", k, v);
            }
        }
    }

    Ok(())
}
