use crate::FrameLayout;
use anyhow::Result;
use ndarray::Array2;
use rand::Rng;
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Source of reference motion frames.
///
/// Every frame returned by a provider has [`MotionProvider::layout`]`().width()`
/// columns.
pub trait MotionProvider {
    /// Configuration of the provider.
    type Config: Clone + Debug + Serialize + DeserializeOwned;

    /// Builds the provider.
    fn build(config: &Self::Config) -> Result<Self>
    where
        Self: Sized;

    /// Layout of frames.
    fn layout(&self) -> FrameLayout;

    /// Names of the trajectories, indexed by trajectory id.
    fn trajectory_names(&self) -> &[String];

    /// Duration of a trajectory in seconds.
    fn trajectory_duration(&self, traj_id: usize) -> Result<f32>;

    /// Returns one frame per `(traj_ids[i], times[i])` pair.
    ///
    /// Times outside `[0, duration]` are clamped to the trajectory ends.
    fn frames_at_time(&self, traj_ids: &[usize], times: &[f32]) -> Result<Array2<f32>>;

    /// Samples `count` frames at random trajectories and times.
    fn random_frames<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Result<Array2<f32>>;
}
