//! Observation, action and step information of [`LeggedEnv`](crate::LeggedEnv).
use legged_core::{Act, Info, Obs};
use ndarray::Array2;

/// Observations of all instances.
#[derive(Debug, Clone)]
pub struct LeggedObs {
    /// Policy observation, `[N, num_obs]` or `[N, k * num_obs]` with history.
    pub policy: Array2<f32>,

    /// Critic observation, `[N, num_privileged_obs]`.
    pub privileged: Array2<f32>,
}

impl Obs for LeggedObs {
    fn len(&self) -> usize {
        self.policy.nrows()
    }
}

/// Actions of all instances, `[N, J]`.
#[derive(Debug, Clone)]
pub struct LeggedAct(pub Array2<f32>);

impl LeggedAct {
    /// Zero actions for `num_envs` instances with `num_actions` joints.
    pub fn zeros(num_envs: usize, num_actions: usize) -> Self {
        Self(Array2::zeros((num_envs, num_actions)))
    }
}

impl From<Array2<f32>> for LeggedAct {
    fn from(act: Array2<f32>) -> Self {
        Self(act)
    }
}

impl Act for LeggedAct {
    fn len(&self) -> usize {
        self.0.nrows()
    }
}

/// Information of a step.
#[derive(Debug, Clone, Default)]
pub struct LeggedInfo {
    /// Instances reset in the step.
    pub reset_ids: Vec<usize>,

    /// Imitation observations of the reset instances captured before reset,
    /// one row per entry of `reset_ids`.
    pub terminal_imitation_obs: Array2<f32>,
}

impl Info for LeggedInfo {}
