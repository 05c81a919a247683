//! Assembly of policy and privileged observations.
use crate::{
    base::LeggedObs,
    batch::EnvironmentBatch,
    config::{NoiseConfig, NormalizationConfig, ObsScales},
};
use anyhow::Result;
use ndarray::{concatenate, s, Array1, Array2, Array3, ArrayView2, Axis};
use rand::Rng;

/// Builds observations from the batch.
///
/// The policy observation is
/// `[ang_vel (3), gravity (3), joint error (J), joint vel (J), action (J)]`
/// followed by the height samples when heights are measured. The privileged
/// observation prepends the linear velocity, appends the Euler angles and
/// carries the same height samples. Noise is only added to the policy
/// observation.
#[derive(Debug, Clone)]
pub struct ObservationAssembler {
    scales: ObsScales,
    clip: f32,
    add_noise: bool,
    noise_vec: Array1<f32>,
    num_points: usize,
    num_obs: usize,
    num_privileged_obs: usize,

    // [N, k, num_obs], oldest first
    history: Option<Array3<f32>>,
}

impl ObservationAssembler {
    /// Creates an assembler for `num_dof` joints and `num_points` height
    /// samples (zero when heights are not measured).
    pub fn new(
        normalization: &NormalizationConfig,
        noise: &NoiseConfig,
        num_envs: usize,
        num_dof: usize,
        num_points: usize,
        history_steps: Option<usize>,
    ) -> Self {
        let num_obs = 6 + 3 * num_dof + num_points;
        let num_privileged_obs = 12 + 3 * num_dof + num_points;
        let noise_vec = Self::noise_vec(normalization, noise, num_dof, num_points);

        Self {
            scales: normalization.obs_scales.clone(),
            clip: normalization.clip_observations,
            add_noise: noise.add_noise,
            noise_vec,
            num_points,
            num_obs,
            num_privileged_obs,
            history: history_steps.map(|k| Array3::zeros((num_envs, k.max(1), num_obs))),
        }
    }

    fn noise_vec(normalization: &NormalizationConfig, noise: &NoiseConfig, num_dof: usize, num_points: usize) -> Array1<f32> {
        let (s, n, l) = (&normalization.obs_scales, &noise.noise_scales, noise.noise_level);
        let j = num_dof;
        let mut v = Array1::zeros(6 + 3 * j + num_points);
        v.slice_mut(s![0..3]).fill(n.ang_vel * l * s.ang_vel);
        v.slice_mut(s![3..6]).fill(n.gravity * l);
        v.slice_mut(s![6..6 + j]).fill(n.dof_pos * l * s.dof_pos);
        v.slice_mut(s![6 + j..6 + 2 * j]).fill(n.dof_vel * l * s.dof_vel);
        v.slice_mut(s![6 + 3 * j..]).fill(n.height_measurements * l * s.height_measurements);
        v
    }

    /// Width of one policy observation.
    pub fn num_obs(&self) -> usize {
        self.num_obs
    }

    /// Width of the privileged observation.
    pub fn num_privileged_obs(&self) -> usize {
        self.num_privileged_obs
    }

    /// Width of the policy observation handed out, with history.
    pub fn policy_width(&self) -> usize {
        match &self.history {
            Some(h) => h.len_of(Axis(1)) * self.num_obs,
            None => self.num_obs,
        }
    }

    /// Per-channel noise magnitudes.
    pub fn noise_scale_vec(&self) -> &Array1<f32> {
        &self.noise_vec
    }

    fn heights(&self, batch: &EnvironmentBatch) -> Array2<f32> {
        let scale = self.scales.height_measurements;
        Array2::from_shape_fn((batch.num_envs, self.num_points), |(i, p)| {
            (batch.root_states[[i, 2]] - 0.5 - batch.measured_heights[[i, p]]).clamp(-1.0, 1.0) * scale
        })
    }

    /// Computes the observations of all instances.
    ///
    /// The history of the instances `reset_ids` is filled with their current
    /// observation before the newest observation is pushed.
    pub fn compute<R: Rng + ?Sized>(
        &mut self,
        batch: &EnvironmentBatch,
        reset_ids: &[usize],
        rng: &mut R,
    ) -> Result<LeggedObs> {
        let s = &self.scales;
        let default = batch.default_dof_pos.view().insert_axis(Axis(0));
        let lin_vel = &batch.base_lin_vel * s.lin_vel;
        let ang_vel = &batch.base_ang_vel * s.ang_vel;
        let dof_err = (&batch.dof_pos - &default) * s.dof_pos;
        let dof_vel = &batch.dof_vel * s.dof_vel;
        let euler = &batch.euler * s.quat;
        let heights = self.heights(batch);

        let common: [ArrayView2<f32>; 5] = [
            ang_vel.view(),
            batch.projected_gravity.view(),
            dof_err.view(),
            dof_vel.view(),
            batch.actions.view(),
        ];
        let mut parts = common.to_vec();
        parts.push(heights.view());
        let mut obs = concatenate(Axis(1), &parts)?;

        let mut parts = vec![lin_vel.view()];
        parts.extend_from_slice(&common);
        parts.extend_from_slice(&[euler.view(), heights.view()]);
        let mut privileged = concatenate(Axis(1), &parts)?;

        if self.add_noise {
            for mut row in obs.rows_mut() {
                for (o, &n) in row.iter_mut().zip(self.noise_vec.iter()) {
                    *o += (2.0 * rng.gen::<f32>() - 1.0) * n;
                }
            }
        }
        let clip = self.clip;
        obs.mapv_inplace(|o| o.clamp(-clip, clip));
        privileged.mapv_inplace(|o| o.clamp(-clip, clip));

        let policy = match self.history.as_mut() {
            None => obs,
            Some(history) => {
                let k = history.len_of(Axis(1));
                for &i in reset_ids {
                    for t in 0..k {
                        history.slice_mut(s![i, t, ..]).assign(&obs.row(i));
                    }
                }
                let shifted = history.slice(s![.., 1.., ..]).to_owned();
                history.slice_mut(s![.., ..k - 1, ..]).assign(&shifted);
                history.slice_mut(s![.., k - 1, ..]).assign(&obs);
                let n = history.len_of(Axis(0));
                history.clone().into_shape((n, k * self.num_obs))?
            }
        };

        Ok(LeggedObs { policy, privileged })
    }
}
