//! Environment step.
use super::Env;

/// Additional information to `Obs` and `Act`.
pub trait Info {}

impl Info for () {}

/// Action, next observation and reward of every instance of a vectorized
/// environment, with flags telling which instances ended their episode.
pub struct Step<E: Env> {
    /// Action.
    pub act: E::Act,

    /// Observation.
    ///
    /// For instances reset in the step, this is the first observation of the
    /// new episode.
    pub obs: E::Obs,

    /// Reward.
    pub reward: Vec<f32>,

    /// Flag denoting if episode is terminated.
    pub is_terminated: Vec<i8>,

    /// Flag denoting if episode is truncated.
    pub is_truncated: Vec<i8>,

    /// Information defined by user.
    pub info: E::Info,
}

impl<E: Env> Step<E> {
    /// Constructs a [`Step`] object.
    pub fn new(
        obs: E::Obs,
        act: E::Act,
        reward: Vec<f32>,
        is_terminated: Vec<i8>,
        is_truncated: Vec<i8>,
        info: E::Info,
    ) -> Self {
        Step {
            act,
            obs,
            reward,
            is_terminated,
            is_truncated,
            info,
        }
    }

    #[inline]
    /// Terminated or truncated at instance `i`.
    pub fn is_done(&self, i: usize) -> bool {
        self.is_terminated[i] == 1 || self.is_truncated[i] == 1
    }

    /// Indices of the instances whose episode ended in this step.
    pub fn done_indices(&self) -> Vec<usize> {
        (0..self.reward.len()).filter(|&i| self.is_done(i)).collect()
    }
}
