//! Vectorized legged-robot locomotion environment.
//!
//! [`LeggedEnv`] drives a batch of robots in a physics simulator behind the
//! [`Simulator`] trait. Every policy step filters and applies the actions
//! through a joint controller, advances physics `decimation` times, checks
//! termination, computes rewards, resets the terminated robots and assembles
//! the observations. Physical parameters are perturbed per robot by the
//! domain randomization in [`domain_rand`], and reference motions from a
//! [`MotionProvider`](legged_motion::MotionProvider) can be used for imitation
//! rewards and reference state initialization.
//!
//! [`KinematicSim`] is a CPU backend of [`Simulator`] without collision
//! handling, for tests and for checking a configuration.
//!
//! ```no_run
//! use anyhow::Result;
//! use legged_core::Env;
//! use legged_env::{KinematicSim, LeggedAct, LeggedEnv, LeggedEnvConfig};
//!
//! fn main() -> Result<()> {
//!     let config = LeggedEnvConfig::<KinematicSim>::load("go2.yaml")?;
//!     let mut env = LeggedEnv::<KinematicSim>::build(&config, 42)?;
//!     let obs = env.reset()?;
//!     let act = LeggedAct::zeros(env.num_envs(), env.num_actions());
//!     let (step, record) = env.step(&act)?;
//!     println!("{:?} {:?}", step.reward, record.get_scalar("rew_tracking_lin_vel"));
//!     Ok(())
//! }
//! ```
mod base;
pub mod batch;
pub mod command;
pub mod config;
pub mod control;
pub mod domain_rand;
mod env;
pub mod error;
pub mod lifecycle;
pub mod math;
pub mod observation;
pub mod reward;
pub mod sim;
pub mod terrain;

pub use base::{LeggedAct, LeggedInfo, LeggedObs};
pub use batch::EnvironmentBatch;
pub use config::{ControlMode, LeggedEnvConfig, MeshType};
pub use env::LeggedEnv;
pub use error::EnvError;
pub use reward::RewardTerm;
pub use sim::{
    kinematic::{KinematicSim, KinematicSimConfig},
    AssetInfo, DofProperties, EnvProperties, HeightField, Simulator,
};
