//! State of all environment instances.
use crate::{
    config::CommandRanges,
    domain_rand::RandomizedParams,
    math::{euler_from_quat, quat_from_xyzw, quat_rotate_inverse},
    sim::{AssetInfo, HeightField},
    Simulator,
};
use legged_motion::FrameLayout;
use ndarray::{s, Array1, Array2, Array3, Axis};

/// Buffers of a batch of `num_envs` environment instances.
///
/// Every per-instance buffer has the instance index as its leading
/// dimension. Components of the environment take the batch by `&mut`
/// together with the indices of the instances they update.
#[derive(Debug, Clone)]
pub struct EnvironmentBatch {
    pub num_envs: usize,
    pub num_dof: usize,
    pub num_bodies: usize,

    /// Policy step in seconds.
    pub dt: f32,

    /// Simulation step in seconds.
    pub sim_dt: f32,

    pub dof_names: Vec<String>,
    pub body_names: Vec<String>,
    pub feet_indices: Vec<usize>,
    pub penalised_contact_indices: Vec<usize>,
    pub termination_contact_indices: Vec<usize>,

    // Simulator state, refreshed after physics steps
    pub root_states: Array2<f32>,
    pub dof_pos: Array2<f32>,
    pub dof_vel: Array2<f32>,
    pub rigid_body_pos: Array3<f32>,
    pub contact_forces: Array3<f32>,

    // Derived state
    pub base_quat: Array2<f32>,
    pub base_lin_vel: Array2<f32>,
    pub base_ang_vel: Array2<f32>,
    pub projected_gravity: Array2<f32>,
    /// Roll, pitch and yaw.
    pub euler: Array2<f32>,
    /// Foot positions relative to the base in the base frame, `[N, 3 * F]`.
    pub foot_pos_body: Array2<f32>,

    // Actions and torques
    pub actions: Array2<f32>,
    pub torques: Array2<f32>,
    /// Filtered actions of the last `action_buf_len` steps, oldest first.
    pub action_history: Array3<f32>,

    pub last_actions: Array2<f32>,
    pub last_dof_pos: Array2<f32>,
    pub last_dof_vel: Array2<f32>,
    pub last_torques: Array2<f32>,
    pub last_root_vel: Array2<f32>,

    /// `[lin_vel_x, lin_vel_y, ang_vel_yaw, heading]`.
    pub commands: Array2<f32>,

    /// Current command ranges, widened by the command curriculum.
    pub command_ranges: CommandRanges,

    pub feet_air_time: Array2<f32>,
    pub last_contacts: Array2<bool>,

    pub episode_length: Array1<usize>,
    pub reset_buf: Array1<bool>,
    pub time_out_buf: Array1<bool>,
    pub rew_buf: Array1<f32>,

    /// Running sums of the active reward terms, one column per term.
    pub episode_sums: Array2<f32>,

    pub common_step_counter: usize,
    pub max_episode_length: usize,
    pub max_episode_length_s: f32,

    // Terrain
    pub env_origins: Array2<f32>,
    pub custom_origins: bool,
    pub terrain_levels: Array1<usize>,
    pub terrain_types: Array1<usize>,
    pub max_terrain_level: usize,
    pub height_field: Option<HeightField>,
    /// Body-frame xy offsets of the height samples, `[P, 2]`.
    pub height_points: Array2<f32>,
    pub measured_heights: Array2<f32>,

    /// Reference frames at the current episode time, when a motion is
    /// configured.
    pub frames: Option<Array2<f32>>,
    pub frame_layout: FrameLayout,

    // Nominal joint parameters
    pub default_dof_pos: Array1<f32>,
    pub p_gains: Array1<f32>,
    pub d_gains: Array1<f32>,
    pub torque_limits: Array1<f32>,
    pub dof_vel_limits: Array1<f32>,
    /// Soft position limits, `[J, 2]`.
    pub dof_pos_limits: Array2<f32>,

    pub gravity_vec: [f32; 3],

    pub params: RandomizedParams,

    /// `false` until the first full reset completed.
    pub init_done: bool,
}

impl EnvironmentBatch {
    /// Creates zeroed buffers for the robot described by `asset`.
    pub fn new(
        num_envs: usize,
        asset: &AssetInfo,
        height_points: Array2<f32>,
        action_buf_len: usize,
        command_ranges: CommandRanges,
    ) -> Self {
        let j = asset.dof_names.len();
        let b = asset.body_names.len();
        let n = num_envs;
        let mut base_quat = Array2::zeros((n, 4));
        base_quat.column_mut(3).fill(1.0);
        let num_points = height_points.nrows();

        Self {
            num_envs,
            num_dof: j,
            num_bodies: b,
            dt: 0.0,
            sim_dt: 0.0,
            dof_names: asset.dof_names.clone(),
            body_names: asset.body_names.clone(),
            feet_indices: vec![],
            penalised_contact_indices: vec![],
            termination_contact_indices: vec![],
            root_states: Array2::zeros((n, 13)),
            dof_pos: Array2::zeros((n, j)),
            dof_vel: Array2::zeros((n, j)),
            rigid_body_pos: Array3::zeros((n, b, 3)),
            contact_forces: Array3::zeros((n, b, 3)),
            base_quat,
            base_lin_vel: Array2::zeros((n, 3)),
            base_ang_vel: Array2::zeros((n, 3)),
            projected_gravity: Array2::zeros((n, 3)),
            euler: Array2::zeros((n, 3)),
            foot_pos_body: Array2::zeros((n, 0)),
            actions: Array2::zeros((n, j)),
            torques: Array2::zeros((n, j)),
            action_history: Array3::zeros((n, action_buf_len, j)),
            last_actions: Array2::zeros((n, j)),
            last_dof_pos: Array2::zeros((n, j)),
            last_dof_vel: Array2::zeros((n, j)),
            last_torques: Array2::zeros((n, j)),
            last_root_vel: Array2::zeros((n, 6)),
            commands: Array2::zeros((n, 4)),
            command_ranges,
            feet_air_time: Array2::zeros((n, 0)),
            last_contacts: Array2::from_elem((n, 0), false),
            episode_length: Array1::zeros(n),
            reset_buf: Array1::from_elem(n, false),
            time_out_buf: Array1::from_elem(n, false),
            rew_buf: Array1::zeros(n),
            episode_sums: Array2::zeros((n, 0)),
            common_step_counter: 0,
            max_episode_length: 0,
            max_episode_length_s: 0.0,
            env_origins: Array2::zeros((n, 3)),
            custom_origins: false,
            terrain_levels: Array1::zeros(n),
            terrain_types: Array1::zeros(n),
            max_terrain_level: 0,
            height_field: None,
            measured_heights: Array2::zeros((n, num_points)),
            height_points,
            frames: None,
            frame_layout: FrameLayout::new(0, j),
            default_dof_pos: Array1::zeros(j),
            p_gains: Array1::zeros(j),
            d_gains: Array1::zeros(j),
            torque_limits: Array1::from(asset.dof_props.effort.clone()),
            dof_vel_limits: Array1::from(asset.dof_props.velocity.clone()),
            dof_pos_limits: Array2::zeros((j, 2)),
            gravity_vec: [0.0, 0.0, -1.0],
            params: RandomizedParams::new(n, j, b),
            init_done: false,
        }
    }

    /// Sets the feet bodies and sizes the per-foot buffers.
    pub fn set_feet(&mut self, feet_indices: Vec<usize>) {
        let f = feet_indices.len();
        self.feet_indices = feet_indices;
        self.foot_pos_body = Array2::zeros((self.num_envs, 3 * f));
        self.feet_air_time = Array2::zeros((self.num_envs, f));
        self.last_contacts = Array2::from_elem((self.num_envs, f), false);
        self.frame_layout = FrameLayout::new(f, self.num_dof);
    }

    /// Sets the soft joint position limits around the center of the range.
    pub fn set_soft_dof_pos_limits(&mut self, lower: &[f32], upper: &[f32], soft: f32) {
        for j in 0..self.num_dof {
            let m = (lower[j] + upper[j]) / 2.0;
            let r = upper[j] - lower[j];
            self.dof_pos_limits[[j, 0]] = m - 0.5 * r * soft;
            self.dof_pos_limits[[j, 1]] = m + 0.5 * r * soft;
        }
    }

    /// Copies the joint state from the simulator.
    pub fn refresh_dof_state<S: Simulator>(&mut self, sim: &S) {
        self.dof_pos.assign(&sim.dof_positions());
        self.dof_vel.assign(&sim.dof_velocities());
    }

    /// Copies root, rigid body and contact state from the simulator.
    pub fn refresh_body_state<S: Simulator>(&mut self, sim: &S) {
        self.root_states.assign(&sim.root_states());
        self.rigid_body_pos.assign(&sim.rigid_body_positions());
        self.contact_forces.assign(&sim.contact_forces());
    }

    /// Recomputes the body-frame quantities from the root and body state.
    pub fn compute_derived(&mut self) {
        for i in 0..self.num_envs {
            let root = self.root_states.row(i);
            let quat = root.slice(s![3..7]);
            self.base_quat.row_mut(i).assign(&quat);
            let q = quat_from_xyzw(quat);

            let lin_vel = quat_rotate_inverse(&q, [root[7], root[8], root[9]]);
            let ang_vel = quat_rotate_inverse(&q, [root[10], root[11], root[12]]);
            let gravity = quat_rotate_inverse(&q, self.gravity_vec);
            let euler = euler_from_quat(&q);
            for k in 0..3 {
                self.base_lin_vel[[i, k]] = lin_vel[k];
                self.base_ang_vel[[i, k]] = ang_vel[k];
                self.projected_gravity[[i, k]] = gravity[k];
                self.euler[[i, k]] = euler[k];
            }

            for (f, &b) in self.feet_indices.iter().enumerate() {
                let rel = [
                    self.rigid_body_pos[[i, b, 0]] - root[0],
                    self.rigid_body_pos[[i, b, 1]] - root[1],
                    self.rigid_body_pos[[i, b, 2]] - root[2],
                ];
                let p = quat_rotate_inverse(&q, rel);
                for k in 0..3 {
                    self.foot_pos_body[[i, 3 * f + k]] = p[k];
                }
            }
        }
    }

    /// Feet with a vertical contact force above `threshold`, `[N, F]`.
    pub fn foot_contacts(&self, threshold: f32) -> Array2<bool> {
        let mut contacts = Array2::from_elem((self.num_envs, self.feet_indices.len()), false);
        for i in 0..self.num_envs {
            for (f, &b) in self.feet_indices.iter().enumerate() {
                contacts[[i, f]] = self.contact_forces[[i, b, 2]] > threshold;
            }
        }
        contacts
    }

    /// Norm of the contact force of `body` in instance `env_id`.
    pub fn contact_norm(&self, env_id: usize, body: usize) -> f32 {
        self.contact_forces
            .slice(s![env_id, body, ..])
            .iter()
            .map(|f| f * f)
            .sum::<f32>()
            .sqrt()
    }

    /// Indices of the instances flagged for reset.
    pub fn reset_indices(&self) -> Vec<usize> {
        self.reset_buf
            .iter()
            .enumerate()
            .filter(|(_, &r)| r)
            .map(|(i, _)| i)
            .collect()
    }

    /// Observations of the instances `env_ids` compared against reference
    /// motions: `[root lin vel (world), root ang vel (world), foot pos body,
    /// dof pos, dof vel]`.
    pub fn imitation_obs(&self, env_ids: &[usize]) -> Array2<f32> {
        let root = self.root_states.select(Axis(0), env_ids);
        let parts = [
            root.slice(s![.., 7..10]).to_owned(),
            root.slice(s![.., 10..13]).to_owned(),
            self.foot_pos_body.select(Axis(0), env_ids),
            self.dof_pos.select(Axis(0), env_ids),
            self.dof_vel.select(Axis(0), env_ids),
        ];
        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        ndarray::concatenate(Axis(1), &views).unwrap_or_else(|_| Array2::zeros((0, 0)))
    }

    /// Stores the current actions, joint state, torques and root velocity
    /// for rate terms of the next step.
    pub fn update_last_buffers(&mut self) {
        self.last_actions.assign(&self.actions);
        self.last_dof_pos.assign(&self.dof_pos);
        self.last_dof_vel.assign(&self.dof_vel);
        self.last_torques.assign(&self.torques);
        self.last_root_vel.assign(&self.root_states.slice(s![.., 7..13]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{sim::DofProperties, math::quat_to_xyzw};
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};
    use ndarray::aview1;

    fn asset() -> AssetInfo {
        AssetInfo {
            dof_names: vec!["a".into(), "b".into()],
            body_names: vec!["base".into(), "foot".into()],
            dof_props: DofProperties {
                lower: vec![-1.0, 0.0],
                upper: vec![1.0, 2.0],
                velocity: vec![10.0; 2],
                effort: vec![5.0; 2],
                friction: vec![0.0; 2],
                damping: vec![0.0; 2],
                armature: vec![0.0; 2],
            },
            body_masses: vec![1.0, 0.1],
        }
    }

    #[test]
    fn test_derived_state_of_turned_robot() {
        let mut batch = EnvironmentBatch::new(2, &asset(), Array2::zeros((0, 2)), 1, CommandRanges::default());
        batch.set_feet(vec![1]);
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2);
        let mut row = [0.0; 13];
        row[..3].copy_from_slice(&[1.0, 1.0, 0.5]);
        row[3..7].copy_from_slice(&quat_to_xyzw(&q));
        row[7..10].copy_from_slice(&[0.0, 2.0, 0.0]);
        batch.root_states.row_mut(1).assign(&aview1(&row));
        batch.root_states[[0, 6]] = 1.0;
        batch.rigid_body_pos.slice_mut(s![1, 1, ..]).assign(&aview1(&[1.0, 1.3, 0.2]));

        batch.compute_derived();

        assert_relative_eq!(batch.base_lin_vel[[1, 0]], 2.0, epsilon = 1e-6);
        assert_relative_eq!(batch.base_lin_vel[[1, 1]], 0.0, epsilon = 1e-6);
        assert_relative_eq!(batch.projected_gravity[[1, 2]], -1.0, epsilon = 1e-6);
        assert_relative_eq!(batch.euler[[1, 2]], std::f32::consts::FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(batch.foot_pos_body[[1, 0]], 0.3, epsilon = 1e-6);
        assert_relative_eq!(batch.foot_pos_body[[1, 2]], -0.3, epsilon = 1e-6);
    }

    #[test]
    fn test_soft_limits() {
        let mut batch = EnvironmentBatch::new(1, &asset(), Array2::zeros((0, 2)), 1, CommandRanges::default());
        batch.set_soft_dof_pos_limits(&[-1.0, 0.0], &[1.0, 2.0], 0.9);
        assert_relative_eq!(batch.dof_pos_limits[[0, 0]], -0.9);
        assert_relative_eq!(batch.dof_pos_limits[[1, 1]], 1.9);
    }

    #[test]
    fn test_imitation_obs_width() {
        let mut batch = EnvironmentBatch::new(3, &asset(), Array2::zeros((0, 2)), 1, CommandRanges::default());
        batch.set_feet(vec![1]);
        batch.dof_pos[[2, 1]] = 0.7;
        let obs = batch.imitation_obs(&[2]);
        assert_eq!(obs.dim(), (1, 3 + 3 + 3 + 2 + 2));
        assert_eq!(obs[[0, 10]], 0.7);
    }
}
