//! Termination and reset of environment instances.
use crate::{
    batch::EnvironmentBatch,
    command::{resample_commands, update_command_curriculum},
    config::{InitStateConfig, LeggedEnvConfig},
    domain_rand::{factors_enabled, randomize_dof_props, randomize_motor_props, refresh_dof_props},
    error::EnvError,
    math::{quat_from_xyzw, quat_rotate, uniform},
    reward::{RewardEngine, RewardTerm},
    sim::AssetInfo,
    terrain::{mean_level, update_terrain_curriculum},
    Simulator,
};
use anyhow::Result;
use legged_core::record::{Record, RecordValue};
use legged_motion::{FrameLayout, MotionProvider};
use log::info;
use ndarray::{s, Array2};
use rand::Rng;

/// Reference motion and the trajectory tracked in every episode.
#[derive(Debug)]
pub struct ReferenceMotion<M> {
    provider: M,
    traj_id: usize,
}

impl<M: MotionProvider> ReferenceMotion<M> {
    /// Selects the only trajectory whose name contains `name`. `None` matches
    /// every trajectory.
    pub fn select(provider: M, name: Option<&str>) -> Result<Self> {
        let pattern = name.unwrap_or("");
        let matches: Vec<usize> = provider
            .trajectory_names()
            .iter()
            .enumerate()
            .filter(|(_, n)| n.contains(pattern))
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [traj_id] => {
                info!(
                    "Tracking trajectory {}",
                    provider.trajectory_names()[*traj_id]
                );
                Ok(Self {
                    provider,
                    traj_id: *traj_id,
                })
            }
            [] => Err(EnvError::NoMatchingTrajectory(pattern.to_string()).into()),
            _ => Err(EnvError::AmbiguousTrajectory {
                name: pattern.to_string(),
                count: matches.len(),
            }
            .into()),
        }
    }

    /// The motion provider.
    pub fn provider(&self) -> &M {
        &self.provider
    }

    /// Index of the tracked trajectory.
    pub fn traj_id(&self) -> usize {
        self.traj_id
    }

    /// Duration of the tracked trajectory in seconds.
    pub fn duration(&self) -> Result<f32> {
        self.provider.trajectory_duration(self.traj_id)
    }

    /// Frames of the tracked trajectory at the given times.
    pub fn frames_at(&self, times: &[f32]) -> Result<Array2<f32>> {
        let ids = vec![self.traj_id; times.len()];
        self.provider.frames_at_time(&ids, times)
    }

    /// Frames to initialize `count` instances from: random frames of any
    /// trajectory, or the first frame of the tracked one.
    pub fn initial_frames<R: Rng + ?Sized>(&self, count: usize, traj_rand: bool, rng: &mut R) -> Result<Array2<f32>> {
        if traj_rand {
            self.provider.random_frames(count, rng)
        } else {
            self.frames_at(&vec![0.0; count])
        }
    }
}

/// Flags instances touching the ground with a termination body and
/// instances beyond the maximum episode length.
pub fn check_termination(batch: &mut EnvironmentBatch, check_contact: bool) {
    for i in 0..batch.num_envs {
        let contact = check_contact
            && batch
                .termination_contact_indices
                .iter()
                .any(|&b| batch.contact_norm(i, b) > 1.0);
        let time_out = batch.episode_length[i] > batch.max_episode_length;
        batch.time_out_buf[i] = time_out;
        batch.reset_buf[i] = contact || time_out;
    }
}

/// Places the instances at their origin in the initial state.
///
/// Joints start at the default angles scaled by `U(0.5, 1.5)` and at rest,
/// the root with random velocities in `U(-0.5, 0.5)`.
fn place_default<R: Rng + ?Sized>(
    batch: &mut EnvironmentBatch,
    init_state: &InitStateConfig,
    env_ids: &[usize],
    rng: &mut R,
) {
    let base = init_state.root_state();
    for &i in env_ids {
        for j in 0..batch.num_dof {
            batch.dof_pos[[i, j]] = batch.default_dof_pos[j] * uniform(rng, 0.5, 1.5);
            batch.dof_vel[[i, j]] = 0.0;
        }

        let mut root = base;
        for k in 0..3 {
            root[k] += batch.env_origins[[i, k]];
        }
        if batch.custom_origins {
            root[0] += uniform(rng, -1.0, 1.0);
            root[1] += uniform(rng, -1.0, 1.0);
        }
        for v in root[7..13].iter_mut() {
            *v = uniform(rng, -0.5, 0.5);
        }
        for (k, v) in root.iter().enumerate() {
            batch.root_states[[i, k]] = *v;
        }
    }
}

/// Places the instances in the state of reference frames.
///
/// Root velocities of the frames are rotated from the root frame to the
/// world frame.
fn place_from_frames<R: Rng + ?Sized>(
    batch: &mut EnvironmentBatch,
    frames: &Array2<f32>,
    layout: FrameLayout,
    joint_noise: bool,
    env_ids: &[usize],
    rng: &mut R,
) {
    for (k, &i) in env_ids.iter().enumerate() {
        let f = frames.row(k);
        let joint_pos = f.slice(s![layout.joint_pos()]);
        let joint_vel = f.slice(s![layout.joint_vel()]);
        for j in 0..batch.num_dof {
            let noise = if joint_noise { uniform(rng, -0.05, 0.05) } else { 0.0 };
            batch.dof_pos[[i, j]] = joint_pos[j] + noise;
            batch.dof_vel[[i, j]] = joint_vel[j];
        }

        let pos = f.slice(s![layout.root_pos()]);
        let rot = f.slice(s![layout.root_rot()]);
        let q = quat_from_xyzw(rot);
        let lin = f.slice(s![layout.lin_vel()]);
        let ang = f.slice(s![layout.ang_vel()]);
        let lin = quat_rotate(&q, [lin[0], lin[1], lin[2]]);
        let ang = quat_rotate(&q, [ang[0], ang[1], ang[2]]);

        let mut root = batch.root_states.row_mut(i);
        root[0] = pos[0] + batch.env_origins[[i, 0]];
        root[1] = pos[1] + batch.env_origins[[i, 1]];
        root[2] = pos[2];
        root.slice_mut(s![3..7]).assign(&rot);
        for c in 0..3 {
            root[7 + c] = lin[c];
            root[10 + c] = ang[c];
        }
    }
}

/// Resets the instances `env_ids` and returns the episode statistics.
///
/// Curricula are updated first, then the robots are placed, commands and
/// actuator parameters resampled and the per-episode buffers cleared. The
/// record holds `rew_<term>`, the mean episode sum of each active term over
/// the reset instances divided by the episode length in seconds, and the
/// curriculum and timeout entries when enabled.
#[allow(clippy::too_many_arguments)]
pub fn reset_idx<S: Simulator, M: MotionProvider, R: Rng + ?Sized>(
    batch: &mut EnvironmentBatch,
    sim: &mut S,
    cfg: &LeggedEnvConfig<S, M>,
    asset: &AssetInfo,
    motion: Option<&ReferenceMotion<M>>,
    engine: &RewardEngine,
    env_ids: &[usize],
    rng: &mut R,
) -> Result<Record> {
    if env_ids.is_empty() {
        return Ok(Record::empty());
    }

    if cfg.terrain.curriculum && cfg.terrain.mesh_type.is_rough() {
        update_terrain_curriculum(batch, env_ids, rng);
    }
    if cfg.commands.curriculum && batch.common_step_counter % batch.max_episode_length.max(1) == 0 {
        let term = RewardTerm::TrackingLinVel;
        if let (Some(col), Some(scale)) = (engine.column(term), engine.scale(term)) {
            let sum: f32 = env_ids.iter().map(|&i| batch.episode_sums[[i, col]]).sum();
            let mean = sum / env_ids.len() as f32 / batch.max_episode_length.max(1) as f32;
            update_command_curriculum(&mut batch.command_ranges, mean, scale, cfg.commands.max_curriculum);
        }
    }

    let dr = &cfg.domain_rand;
    if dr.rsi {
        let motion = motion.ok_or_else(|| EnvError::MotionRequired("Reference state initialization".to_string()))?;
        let frames = motion.initial_frames(env_ids.len(), dr.rsi_traj_rand, rng)?;
        let layout = motion.provider().layout();
        place_from_frames(batch, &frames, layout, dr.rsi_rand, env_ids, rng);
    } else {
        place_default(batch, &cfg.init_state, env_ids, rng);
    }
    sim.write_dof_states(batch.dof_pos.view(), batch.dof_vel.view(), env_ids)?;
    sim.write_root_states(batch.root_states.view(), env_ids)?;

    resample_commands(batch, &cfg.commands, env_ids, rng);

    randomize_motor_props(&mut batch.params, dr, &batch.p_gains, &batch.d_gains, env_ids, rng);
    randomize_dof_props(&mut batch.params, dr, env_ids, rng);
    if factors_enabled(dr) {
        refresh_dof_props(sim, &batch.params, asset, env_ids)?;
    }

    for &i in env_ids {
        batch.last_actions.row_mut(i).fill(0.0);
        batch.last_dof_vel.row_mut(i).fill(0.0);
        batch.last_dof_pos.row_mut(i).fill(0.0);
        batch.last_torques.row_mut(i).fill(0.0);
        batch.feet_air_time.row_mut(i).fill(0.0);
        batch.action_history.slice_mut(s![i, .., ..]).fill(0.0);
        batch.episode_length[i] = 0;
        batch.reset_buf[i] = true;
    }

    let mut record = Record::empty();
    for (col, term) in engine.terms().into_iter().enumerate() {
        let mut sum = 0.0;
        for &i in env_ids {
            sum += batch.episode_sums[[i, col]];
            batch.episode_sums[[i, col]] = 0.0;
        }
        let mean = sum / env_ids.len() as f32 / batch.max_episode_length_s;
        record.insert(format!("rew_{}", term.name()), RecordValue::Scalar(mean));
    }
    if cfg.terrain.curriculum {
        record.insert("terrain_level", RecordValue::Scalar(mean_level(batch)));
    }
    if cfg.commands.curriculum {
        record.insert("max_command_x", RecordValue::Scalar(batch.command_ranges.lin_vel_x[1]));
    }
    if cfg.env.send_timeouts {
        let time_outs = batch.time_out_buf.iter().map(|&t| t as u8 as f32).collect();
        record.insert("time_outs", RecordValue::Array1(time_outs));
    }

    Ok(record)
}
