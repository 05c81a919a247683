//! Environment.
use super::{Act, Info, Obs, Step};
use crate::record::Record;
use anyhow::Result;

/// Represents a vectorized environment.
///
/// All instances advance together. Instances that terminate or time out during
/// [`Env::step`] are reset before the step returns, and the returned
/// observation already belongs to the new episode for those instances.
pub trait Env {
    /// Configurations.
    type Config: Clone;

    /// Observation of the environment.
    type Obs: Obs;

    /// Action of the environment.
    type Act: Act;

    /// Information in the [`Step`] object.
    type Info: Info;

    /// Builds an environment with a given random seed.
    fn build(config: &Self::Config, seed: i64) -> Result<Self>
    where
        Self: Sized;

    /// Performes an environment step for every instance.
    ///
    /// The returned [`Record`] holds episode statistics of the instances reset
    /// in this step.
    fn step(&mut self, a: &Self::Act) -> Result<(Step<Self>, Record)>
    where
        Self: Sized;

    /// Resets all instances and returns the first observation.
    fn reset(&mut self) -> Result<Self::Obs>;

    /// The number of instances.
    fn num_envs(&self) -> usize;
}
