//! Reward terms and their aggregation.
//!
//! Every term is a function of the batch returning one value per instance.
//! [`RewardEngine`] keeps the terms with a non-zero scale, multiplies the
//! scales by the policy step and sums the scaled values. The termination term
//! is added after the optional clamp at zero so that it is never clamped
//! away.
use crate::{
    batch::EnvironmentBatch,
    command::lin_command_norm,
    config::RewardConfig,
    error::EnvError,
    math::{euler_from_quat, quat_from_xyzw, wrap_to_pi},
};
use anyhow::Result;
use log::info;
use ndarray::{s, Array1, Axis};

/// Reward terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RewardTerm {
    Termination,
    TrackingLinVel,
    TrackingAngVel,
    LinVelZ,
    AngVelXy,
    Orientation,
    Torques,
    DofVel,
    DofAcc,
    BaseHeight,
    FeetAirTime,
    Collision,
    FeetStumble,
    ActionRate,
    StandStill,
    DofPosLimits,
    DofVelLimits,
    TorqueLimits,
    FeetContactForces,
    TrackRootPos,
    TrackRootHeight,
    TrackRootRot,
    TrackToePos,
    TrackDofPos,
    TrackingYaw,
}

/// Function computing a term for every instance.
pub type RewardFn = fn(&mut EnvironmentBatch, &RewardConfig) -> Array1<f32>;

static REWARD_TABLE: [(RewardTerm, &str, RewardFn); 25] = [
    (RewardTerm::Termination, "termination", termination),
    (RewardTerm::TrackingLinVel, "tracking_lin_vel", tracking_lin_vel),
    (RewardTerm::TrackingAngVel, "tracking_ang_vel", tracking_ang_vel),
    (RewardTerm::LinVelZ, "lin_vel_z", lin_vel_z),
    (RewardTerm::AngVelXy, "ang_vel_xy", ang_vel_xy),
    (RewardTerm::Orientation, "orientation", orientation),
    (RewardTerm::Torques, "torques", torques),
    (RewardTerm::DofVel, "dof_vel", dof_vel),
    (RewardTerm::DofAcc, "dof_acc", dof_acc),
    (RewardTerm::BaseHeight, "base_height", base_height),
    (RewardTerm::FeetAirTime, "feet_air_time", feet_air_time),
    (RewardTerm::Collision, "collision", collision),
    (RewardTerm::FeetStumble, "feet_stumble", feet_stumble),
    (RewardTerm::ActionRate, "action_rate", action_rate),
    (RewardTerm::StandStill, "stand_still", stand_still),
    (RewardTerm::DofPosLimits, "dof_pos_limits", dof_pos_limits),
    (RewardTerm::DofVelLimits, "dof_vel_limits", dof_vel_limits),
    (RewardTerm::TorqueLimits, "torque_limits", torque_limits),
    (RewardTerm::FeetContactForces, "feet_contact_forces", feet_contact_forces),
    (RewardTerm::TrackRootPos, "track_root_pos", track_root_pos),
    (RewardTerm::TrackRootHeight, "track_root_height", track_root_height),
    (RewardTerm::TrackRootRot, "track_root_rot", track_root_rot),
    (RewardTerm::TrackToePos, "track_toe_pos", track_toe_pos),
    (RewardTerm::TrackDofPos, "track_dof_pos", track_dof_pos),
    (RewardTerm::TrackingYaw, "tracking_yaw", tracking_yaw),
];

impl RewardTerm {
    /// Every term, in table order.
    pub const ALL: [RewardTerm; 25] = [
        RewardTerm::Termination,
        RewardTerm::TrackingLinVel,
        RewardTerm::TrackingAngVel,
        RewardTerm::LinVelZ,
        RewardTerm::AngVelXy,
        RewardTerm::Orientation,
        RewardTerm::Torques,
        RewardTerm::DofVel,
        RewardTerm::DofAcc,
        RewardTerm::BaseHeight,
        RewardTerm::FeetAirTime,
        RewardTerm::Collision,
        RewardTerm::FeetStumble,
        RewardTerm::ActionRate,
        RewardTerm::StandStill,
        RewardTerm::DofPosLimits,
        RewardTerm::DofVelLimits,
        RewardTerm::TorqueLimits,
        RewardTerm::FeetContactForces,
        RewardTerm::TrackRootPos,
        RewardTerm::TrackRootHeight,
        RewardTerm::TrackRootRot,
        RewardTerm::TrackToePos,
        RewardTerm::TrackDofPos,
        RewardTerm::TrackingYaw,
    ];

    /// Name of the term, as in configuration files and episode records.
    pub fn name(self) -> &'static str {
        REWARD_TABLE[self as usize].1
    }

    /// Function computing the term.
    pub fn function(self) -> RewardFn {
        REWARD_TABLE[self as usize].2
    }

    /// `true` for terms comparing the robot against a reference motion.
    pub fn is_imitation(self) -> bool {
        matches!(
            self,
            RewardTerm::TrackRootPos
                | RewardTerm::TrackRootHeight
                | RewardTerm::TrackRootRot
                | RewardTerm::TrackToePos
                | RewardTerm::TrackDofPos
                | RewardTerm::TrackingYaw
        )
    }
}

/// Active reward terms and their scales.
#[derive(Debug, Clone)]
pub struct RewardEngine {
    // Non-termination terms with dt-scaled scales
    terms: Vec<(RewardTerm, f32)>,

    // Scale of the termination term
    termination: Option<f32>,

    only_positive_rewards: bool,
}

impl RewardEngine {
    /// Keeps the terms with a non-zero scale and multiplies their scales by
    /// `dt`.
    ///
    /// Imitation terms require a reference motion.
    pub fn new(cfg: &RewardConfig, dt: f32, has_motion: bool) -> Result<Self> {
        let mut terms = vec![];
        let mut termination = None;
        for term in RewardTerm::ALL {
            let scale = cfg.scales.get(term);
            if scale == 0.0 {
                continue;
            }
            if term.is_imitation() && !has_motion {
                return Err(EnvError::MotionRequired(format!("Reward term {}", term.name())).into());
            }
            if term == RewardTerm::Termination {
                termination = Some(scale * dt);
            } else {
                terms.push((term, scale * dt));
            }
        }
        info!(
            "Reward terms: {:?}",
            terms.iter().map(|(t, _)| t.name()).collect::<Vec<_>>()
        );

        Ok(Self {
            terms,
            termination,
            only_positive_rewards: cfg.only_positive_rewards,
        })
    }

    /// Active terms in the column order of the episode sums.
    pub fn terms(&self) -> Vec<RewardTerm> {
        let mut terms: Vec<_> = self.terms.iter().map(|(t, _)| *t).collect();
        if self.termination.is_some() {
            terms.push(RewardTerm::Termination);
        }
        terms
    }

    /// Number of active terms.
    pub fn len(&self) -> usize {
        self.terms.len() + self.termination.is_some() as usize
    }

    /// `true` if no term is active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Column of `term` in the episode sums.
    pub fn column(&self, term: RewardTerm) -> Option<usize> {
        self.terms().iter().position(|&t| t == term)
    }

    /// dt-scaled scale of an active term.
    pub fn scale(&self, term: RewardTerm) -> Option<f32> {
        if term == RewardTerm::Termination {
            return self.termination;
        }
        self.terms.iter().find(|(t, _)| *t == term).map(|(_, s)| *s)
    }

    /// Computes the total reward into `batch.rew_buf` and adds every term to
    /// its episode sum.
    pub fn compute(&self, batch: &mut EnvironmentBatch, cfg: &RewardConfig) {
        let mut rew = Array1::zeros(batch.num_envs);
        for (k, &(term, scale)) in self.terms.iter().enumerate() {
            let value = term.function()(batch, cfg) * scale;
            rew += &value;
            let mut sums = batch.episode_sums.column_mut(k);
            sums += &value;
        }
        if self.only_positive_rewards {
            rew.mapv_inplace(|r: f32| r.max(0.0));
        }
        if let Some(scale) = self.termination {
            let value = termination(batch, cfg) * scale;
            rew += &value;
            let mut sums = batch.episode_sums.column_mut(self.terms.len());
            sums += &value;
        }
        batch.rew_buf = rew;
    }
}

fn sum_sq(a: ndarray::ArrayView2<f32>) -> Array1<f32> {
    a.map_axis(Axis(1), |r| r.iter().map(|v| v * v).sum())
}

/// Gaussian kernel `exp(-error / sigma)` of a squared error.
pub fn gaussian(sq_error: f32, sigma: f32) -> f32 {
    (-sq_error / sigma).exp()
}

fn termination(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    Array1::from_shape_fn(b.num_envs, |i| (b.reset_buf[i] && !b.time_out_buf[i]) as u8 as f32)
}

fn tracking_lin_vel(b: &mut EnvironmentBatch, cfg: &RewardConfig) -> Array1<f32> {
    let err = &b.commands.slice(s![.., ..2]) - &b.base_lin_vel.slice(s![.., ..2]);
    sum_sq(err.view()).mapv(|e| gaussian(e, cfg.tracking_sigma))
}

fn tracking_ang_vel(b: &mut EnvironmentBatch, cfg: &RewardConfig) -> Array1<f32> {
    Array1::from_shape_fn(b.num_envs, |i| {
        let e = b.commands[[i, 2]] - b.base_ang_vel[[i, 2]];
        gaussian(e * e, cfg.tracking_sigma)
    })
}

fn lin_vel_z(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    b.base_lin_vel.column(2).mapv(|v| v * v)
}

fn ang_vel_xy(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    sum_sq(b.base_ang_vel.slice(s![.., ..2]))
}

fn orientation(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    sum_sq(b.projected_gravity.slice(s![.., ..2]))
}

fn torques(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    sum_sq(b.torques.view())
}

fn dof_vel(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    sum_sq(b.dof_vel.view())
}

fn dof_acc(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    let acc = (&b.last_dof_vel - &b.dof_vel) / b.dt;
    sum_sq(acc.view())
}

fn base_height(b: &mut EnvironmentBatch, cfg: &RewardConfig) -> Array1<f32> {
    let num_points = b.measured_heights.ncols();
    Array1::from_shape_fn(b.num_envs, |i| {
        let z = b.root_states[[i, 2]];
        let h = if num_points == 0 {
            z
        } else {
            b.measured_heights.row(i).iter().map(|m| z - m).sum::<f32>() / num_points as f32
        };
        (h - cfg.base_height_target).powi(2)
    })
}

fn feet_air_time(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    let contact = b.foot_contacts(1.0);
    let mut rew = Array1::zeros(b.num_envs);
    for i in 0..b.num_envs {
        let moving = lin_command_norm(b, i) > 0.1;
        for f in 0..b.feet_indices.len() {
            let contact_filt = contact[[i, f]] || b.last_contacts[[i, f]];
            b.last_contacts[[i, f]] = contact[[i, f]];
            let first_contact = b.feet_air_time[[i, f]] > 0.0 && contact_filt;
            b.feet_air_time[[i, f]] += b.dt;
            if first_contact && moving {
                rew[i] += b.feet_air_time[[i, f]] - 0.5;
            }
            if contact_filt {
                b.feet_air_time[[i, f]] = 0.0;
            }
        }
    }
    rew
}

fn collision(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    Array1::from_shape_fn(b.num_envs, |i| {
        b.penalised_contact_indices
            .iter()
            .filter(|&&body| b.contact_norm(i, body) > 0.1)
            .count() as f32
    })
}

fn feet_stumble(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    Array1::from_shape_fn(b.num_envs, |i| {
        b.feet_indices.iter().any(|&f| {
            let (fx, fy, fz) = (
                b.contact_forces[[i, f, 0]],
                b.contact_forces[[i, f, 1]],
                b.contact_forces[[i, f, 2]],
            );
            (fx * fx + fy * fy).sqrt() > 5.0 * fz.abs()
        }) as u8 as f32
    })
}

fn action_rate(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    sum_sq((&b.last_actions - &b.actions).view())
}

fn stand_still(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    let default = b.default_dof_pos.view().insert_axis(Axis(0));
    let err = (&b.dof_pos - &default).mapv(f32::abs).sum_axis(Axis(1));
    Array1::from_shape_fn(b.num_envs, |i| if lin_command_norm(b, i) < 0.1 { err[i] } else { 0.0 })
}

fn dof_pos_limits(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    Array1::from_shape_fn(b.num_envs, |i| {
        (0..b.num_dof)
            .map(|j| {
                let q = b.dof_pos[[i, j]];
                (b.dof_pos_limits[[j, 0]] - q).max(0.0) + (q - b.dof_pos_limits[[j, 1]]).max(0.0)
            })
            .sum()
    })
}

fn dof_vel_limits(b: &mut EnvironmentBatch, cfg: &RewardConfig) -> Array1<f32> {
    Array1::from_shape_fn(b.num_envs, |i| {
        (0..b.num_dof)
            .map(|j| (b.dof_vel[[i, j]].abs() - b.dof_vel_limits[j] * cfg.soft_dof_vel_limit).clamp(0.0, 1.0))
            .sum()
    })
}

fn torque_limits(b: &mut EnvironmentBatch, cfg: &RewardConfig) -> Array1<f32> {
    Array1::from_shape_fn(b.num_envs, |i| {
        (0..b.num_dof)
            .map(|j| (b.torques[[i, j]].abs() - b.torque_limits[j] * cfg.soft_torque_limit).max(0.0))
            .sum()
    })
}

fn feet_contact_forces(b: &mut EnvironmentBatch, cfg: &RewardConfig) -> Array1<f32> {
    Array1::from_shape_fn(b.num_envs, |i| {
        b.feet_indices
            .iter()
            .map(|&f| (b.contact_norm(i, f) - cfg.max_contact_force).max(0.0))
            .sum()
    })
}

fn track_root_pos(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    let Some(frames) = b.frames.as_ref() else {
        return Array1::zeros(b.num_envs);
    };
    let cols = b.frame_layout.root_pos();
    Array1::from_shape_fn(b.num_envs, |i| {
        let err: f32 = (0..3)
            .map(|k| {
                let e = b.root_states[[i, k]] - b.env_origins[[i, k]] - frames[[i, cols.start + k]];
                e * e
            })
            .sum();
        (-20.0 * err).exp()
    })
}

fn track_root_height(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    let Some(frames) = b.frames.as_ref() else {
        return Array1::zeros(b.num_envs);
    };
    let z = b.frame_layout.root_pos().start + 2;
    Array1::from_shape_fn(b.num_envs, |i| {
        let e = b.root_states[[i, 2]] - frames[[i, z]];
        (-20.0 * e * e).exp()
    })
}

fn reference_euler(b: &EnvironmentBatch, frames: &ndarray::Array2<f32>, i: usize) -> [f32; 3] {
    let q = quat_from_xyzw(frames.slice(s![i, b.frame_layout.root_rot()]));
    euler_from_quat(&q)
}

fn track_root_rot(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    let Some(frames) = b.frames.as_ref() else {
        return Array1::zeros(b.num_envs);
    };
    Array1::from_shape_fn(b.num_envs, |i| {
        let reference = reference_euler(b, frames, i);
        let err: f32 = (0..3)
            .map(|k| wrap_to_pi(reference[k] - b.euler[[i, k]]).powi(2))
            .sum();
        (-50.0 * err).exp()
    })
}

fn track_toe_pos(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    let Some(frames) = b.frames.as_ref() else {
        return Array1::zeros(b.num_envs);
    };
    let reference = frames.slice(s![.., b.frame_layout.foot_pos()]);
    let err = &b.foot_pos_body - &reference;
    sum_sq(err.view()).mapv(|e| (-50.0 * e).exp())
}

fn track_dof_pos(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    let Some(frames) = b.frames.as_ref() else {
        return Array1::zeros(b.num_envs);
    };
    let reference = frames.slice(s![.., b.frame_layout.joint_pos()]);
    let err = &b.dof_pos - &reference;
    sum_sq(err.view()).mapv(|e| (-5.0 * e).exp())
}

fn tracking_yaw(b: &mut EnvironmentBatch, _: &RewardConfig) -> Array1<f32> {
    let Some(frames) = b.frames.as_ref() else {
        return Array1::zeros(b.num_envs);
    };
    Array1::from_shape_fn(b.num_envs, |i| {
        let yaw = reference_euler(b, frames, i)[2];
        (-wrap_to_pi(yaw - b.euler[[i, 2]]).abs()).exp()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{CommandRanges, RewardScales},
        sim::{AssetInfo, DofProperties},
    };
    use approx::assert_relative_eq;
    use ndarray::Array2;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn batch(n: usize) -> EnvironmentBatch {
        let asset = AssetInfo {
            dof_names: vec!["a".into(), "b".into()],
            body_names: vec!["base".into(), "thigh".into(), "foot".into()],
            dof_props: DofProperties {
                lower: vec![-1.0; 2],
                upper: vec![1.0; 2],
                velocity: vec![10.0; 2],
                effort: vec![5.0; 2],
                friction: vec![0.0; 2],
                damping: vec![0.0; 2],
                armature: vec![0.0; 2],
            },
            body_masses: vec![1.0; 3],
        };
        let mut b = EnvironmentBatch::new(n, &asset, Array2::zeros((0, 2)), 1, CommandRanges::default());
        b.set_feet(vec![2]);
        b.penalised_contact_indices = vec![1];
        b.dt = 0.02;
        b
    }

    fn engine(scales: RewardScales, only_positive: bool, b: &mut EnvironmentBatch) -> RewardEngine {
        let cfg = RewardConfig {
            scales,
            only_positive_rewards: only_positive,
            ..Default::default()
        };
        let engine = RewardEngine::new(&cfg, b.dt, false).unwrap();
        b.episode_sums = Array2::zeros((b.num_envs, engine.len()));
        engine
    }

    #[test]
    fn test_table_order_matches_enum() {
        for (i, term) in RewardTerm::ALL.iter().enumerate() {
            assert_eq!(REWARD_TABLE[i].0, *term);
            assert_eq!(*term as usize, i);
        }
        assert_eq!(RewardTerm::FeetStumble.name(), "feet_stumble");
    }

    #[test]
    fn test_zero_scales_are_pruned_and_scaled_by_dt() {
        let mut b = batch(1);
        let e = engine(RewardScales::default(), true, &mut b);
        assert_eq!(e.scale(RewardTerm::Termination), None);
        assert_eq!(e.scale(RewardTerm::Orientation), None);
        assert_relative_eq!(e.scale(RewardTerm::TrackingLinVel).unwrap(), 0.02);
        assert_relative_eq!(e.scale(RewardTerm::Collision).unwrap(), -0.02);
        assert_eq!(e.len(), 9);
    }

    #[test]
    fn test_imitation_requires_motion() {
        let cfg = RewardConfig {
            scales: RewardScales::zero().set(RewardTerm::TrackDofPos, 1.0),
            ..Default::default()
        };
        let err = RewardEngine::new(&cfg, 0.02, false).unwrap_err();
        assert!(matches!(err.downcast_ref::<EnvError>(), Some(EnvError::MotionRequired(_))));
        assert!(RewardEngine::new(&cfg, 0.02, true).is_ok());
    }

    #[test]
    fn test_clamp_before_termination() {
        let mut b = batch(2);
        let scales = RewardScales::zero()
            .set(RewardTerm::Torques, -1.0)
            .set(RewardTerm::Termination, -10.0);
        let cfg = RewardConfig {
            scales: scales.clone(),
            ..Default::default()
        };
        let e = engine(scales, true, &mut b);
        b.torques.fill(1.0);
        b.reset_buf[1] = true;
        e.compute(&mut b, &cfg);

        assert_eq!(b.rew_buf[0], 0.0);
        assert_relative_eq!(b.rew_buf[1], -10.0 * 0.02);
        // sums keep the unclamped values
        let col = e.column(RewardTerm::Torques).unwrap();
        assert_relative_eq!(b.episode_sums[[0, col]], -2.0 * 0.02);
        let col = e.column(RewardTerm::Termination).unwrap();
        assert_relative_eq!(b.episode_sums[[1, col]], -10.0 * 0.02);
    }

    #[test]
    fn test_termination_excludes_timeouts() {
        let mut b = batch(3);
        b.reset_buf.assign(&ndarray::arr1(&[true, true, false]));
        b.time_out_buf.assign(&ndarray::arr1(&[true, false, false]));
        let v = termination(&mut b, &RewardConfig::default());
        assert_eq!(v.to_vec(), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_gaussian_tracking_in_unit_interval() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut b = batch(64);
        b.commands.mapv_inplace(|_| rng.gen_range(-5.0..5.0));
        b.base_lin_vel.mapv_inplace(|_| rng.gen_range(-5.0..5.0));
        b.base_ang_vel.mapv_inplace(|_| rng.gen_range(-5.0..5.0));
        let cfg = RewardConfig::default();
        for v in tracking_lin_vel(&mut b, &cfg).iter().chain(tracking_ang_vel(&mut b, &cfg).iter()) {
            assert!(*v > 0.0 && *v <= 1.0);
        }

        b.commands.fill(0.3);
        b.base_lin_vel.fill(0.3);
        b.base_ang_vel.fill(0.3);
        assert!(tracking_lin_vel(&mut b, &cfg).iter().all(|&v| v == 1.0));
        assert!(tracking_ang_vel(&mut b, &cfg).iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_feet_air_time_rewards_first_contact() {
        let mut b = batch(1);
        b.commands[[0, 0]] = 1.0;
        let cfg = RewardConfig::default();
        // 30 steps in the air
        for _ in 0..30 {
            let r = feet_air_time(&mut b, &cfg);
            assert_eq!(r[0], 0.0);
        }
        assert_relative_eq!(b.feet_air_time[[0, 0]], 0.6, epsilon = 1e-5);
        b.contact_forces[[0, 2, 2]] = 10.0;
        let r = feet_air_time(&mut b, &cfg);
        assert_relative_eq!(r[0], 0.62 - 0.5, epsilon = 1e-5);
        assert_eq!(b.feet_air_time[[0, 0]], 0.0);
    }

    #[test]
    fn test_contact_terms() {
        let mut b = batch(2);
        b.contact_forces[[0, 1, 0]] = 1.0;
        b.contact_forces[[1, 2, 0]] = 10.0;
        b.contact_forces[[1, 2, 2]] = 1.0;
        let cfg = RewardConfig::default();
        assert_eq!(collision(&mut b, &cfg).to_vec(), vec![1.0, 0.0]);
        assert_eq!(feet_stumble(&mut b, &cfg).to_vec(), vec![0.0, 1.0]);

        b.contact_forces[[0, 2, 2]] = 130.0;
        assert_relative_eq!(feet_contact_forces(&mut b, &cfg)[0], 30.0);
    }

    #[test]
    fn test_limit_terms() {
        let mut b = batch(1);
        b.set_soft_dof_pos_limits(&[-1.0, -1.0], &[1.0, 1.0], 0.9);
        b.dof_pos[[0, 0]] = 1.0;
        b.dof_vel[[0, 1]] = 12.0;
        b.torques[[0, 0]] = -5.5;
        let cfg = RewardConfig::default();
        assert_relative_eq!(dof_pos_limits(&mut b, &cfg)[0], 0.1, epsilon = 1e-6);
        assert_relative_eq!(dof_vel_limits(&mut b, &cfg)[0], 1.0);
        assert_relative_eq!(torque_limits(&mut b, &cfg)[0], 0.5);
    }

    #[test]
    fn test_imitation_terms_at_reference() {
        let mut b = batch(1);
        let layout = b.frame_layout;
        let mut frames = Array2::zeros((1, layout.width()));
        frames[[0, 2]] = 0.3;
        frames[[0, 6]] = 1.0;
        frames[[0, layout.joint_pos().start]] = 0.2;
        b.root_states[[0, 2]] = 0.3;
        b.dof_pos[[0, 0]] = 0.2;
        b.frames = Some(frames);

        let cfg = RewardConfig::default();
        assert_relative_eq!(track_root_pos(&mut b, &cfg)[0], 1.0);
        assert_relative_eq!(track_root_height(&mut b, &cfg)[0], 1.0);
        assert_relative_eq!(track_root_rot(&mut b, &cfg)[0], 1.0);
        assert_relative_eq!(track_toe_pos(&mut b, &cfg)[0], 1.0);
        assert_relative_eq!(track_dof_pos(&mut b, &cfg)[0], 1.0);
        assert_relative_eq!(tracking_yaw(&mut b, &cfg)[0], 1.0);

        b.dof_pos[[0, 1]] = 0.1;
        assert_relative_eq!(track_dof_pos(&mut b, &cfg)[0], (-0.05f32).exp(), epsilon = 1e-6);
    }

    #[test]
    fn test_yaw_error_wraps_across_pi() {
        let mut b = batch(1);
        let layout = b.frame_layout;
        let yaw = std::f32::consts::PI - 0.05;
        let mut frames = Array2::zeros((1, layout.width()));
        let rot = layout.root_rot().start;
        frames[[0, rot + 2]] = (yaw / 2.0).sin();
        frames[[0, rot + 3]] = (yaw / 2.0).cos();
        b.frames = Some(frames);
        b.euler[[0, 2]] = -std::f32::consts::PI + 0.05;

        let cfg = RewardConfig::default();
        assert_relative_eq!(tracking_yaw(&mut b, &cfg)[0], (-0.1f32).exp(), epsilon = 1e-4);
        assert_relative_eq!(track_root_rot(&mut b, &cfg)[0], (-0.5f32).exp(), epsilon = 1e-3);
    }
}
