//! Locomotion commands and the command curriculum.
use crate::{
    batch::EnvironmentBatch,
    config::{CommandConfig, CommandRanges},
    math::{heading, quat_from_xyzw, uniform_in, wrap_to_pi},
};
use log::debug;
use ndarray::s;
use rand::Rng;

/// Linear commands with a norm at or below this value are zeroed.
pub const COMMAND_DEADBAND: f32 = 0.2;

/// Samples new commands for the instances `env_ids` from the current ranges.
pub fn resample_commands<R: Rng + ?Sized>(
    batch: &mut EnvironmentBatch,
    cfg: &CommandConfig,
    env_ids: &[usize],
    rng: &mut R,
) {
    let ranges = batch.command_ranges.clone();
    for &i in env_ids {
        let x = uniform_in(rng, ranges.lin_vel_x);
        let y = uniform_in(rng, ranges.lin_vel_y);
        if cfg.heading_command {
            batch.commands[[i, 3]] = uniform_in(rng, ranges.heading);
        } else {
            batch.commands[[i, 2]] = uniform_in(rng, ranges.ang_vel_yaw);
        }
        let keep = (x * x + y * y).sqrt() > COMMAND_DEADBAND;
        batch.commands[[i, 0]] = if keep { x } else { 0.0 };
        batch.commands[[i, 1]] = if keep { y } else { 0.0 };
    }
}

/// Resamples the commands of the instances whose episode length is a
/// multiple of the resampling period.
pub fn resample_on_period<R: Rng + ?Sized>(batch: &mut EnvironmentBatch, cfg: &CommandConfig, rng: &mut R) {
    let period = ((cfg.resampling_time / batch.dt) as usize).max(1);
    let env_ids: Vec<usize> = batch
        .episode_length
        .iter()
        .enumerate()
        .filter(|(_, &l)| l % period == 0)
        .map(|(i, _)| i)
        .collect();
    resample_commands(batch, cfg, &env_ids, rng);
}

/// Sets the yaw rate commands tracking the heading commands.
pub fn update_heading(batch: &mut EnvironmentBatch) {
    for i in 0..batch.num_envs {
        let q = quat_from_xyzw(batch.base_quat.row(i));
        let err = wrap_to_pi(batch.commands[[i, 3]] - heading(&q));
        batch.commands[[i, 2]] = (0.5 * err).clamp(-1.0, 1.0);
    }
}

/// Widens the range of x velocity commands by 0.5 on both ends when the
/// mean episode sum of the tracking reward exceeds 80% of its maximum.
///
/// `mean_tracking` is the mean episode sum over the reset instances divided
/// by the maximum episode length, `scale` the dt-scaled reward scale.
pub fn update_command_curriculum(ranges: &mut CommandRanges, mean_tracking: f32, scale: f32, max_curriculum: f32) {
    if mean_tracking > 0.8 * scale {
        ranges.lin_vel_x[0] = (ranges.lin_vel_x[0] - 0.5).clamp(-max_curriculum, 0.0);
        ranges.lin_vel_x[1] = (ranges.lin_vel_x[1] + 0.5).clamp(0.0, max_curriculum);
        debug!("Command range of x velocity: {:?}", ranges.lin_vel_x);
    }
}

/// Norm of the linear velocity command of instance `env_id`.
pub fn lin_command_norm(batch: &EnvironmentBatch, env_id: usize) -> f32 {
    let c = batch.commands.slice(s![env_id, ..2]);
    (c[0] * c[0] + c[1] * c[1]).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        math::quat_to_xyzw,
        sim::{AssetInfo, DofProperties},
    };
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};
    use ndarray::{aview1, Array2};
    use rand::{rngs::StdRng, SeedableRng};

    fn batch(n: usize) -> EnvironmentBatch {
        let asset = AssetInfo {
            dof_names: vec!["a".into()],
            body_names: vec!["base".into()],
            dof_props: DofProperties::default(),
            body_masses: vec![1.0],
        };
        let mut b = EnvironmentBatch::new(n, &asset, Array2::zeros((0, 2)), 1, CommandRanges::default());
        b.dt = 0.02;
        b.base_quat.column_mut(3).fill(1.0);
        b
    }

    #[test]
    fn test_deadband() {
        let mut b = batch(1000);
        let mut rng = StdRng::seed_from_u64(0);
        let ids: Vec<usize> = (0..1000).collect();
        resample_commands(&mut b, &CommandConfig::default(), &ids, &mut rng);

        let mut zeroed = 0;
        for i in 0..1000 {
            let (x, y) = (b.commands[[i, 0]], b.commands[[i, 1]]);
            if x == 0.0 && y == 0.0 {
                zeroed += 1;
            } else {
                assert!((x * x + y * y).sqrt() > COMMAND_DEADBAND);
            }
            assert!((-3.14..3.14).contains(&b.commands[[i, 3]]));
        }
        assert!(zeroed > 0);
    }

    #[test]
    fn test_resample_only_on_period() {
        let mut b = batch(2);
        b.episode_length[0] = 500;
        b.episode_length[1] = 501;
        b.commands.fill(7.0);
        let mut rng = StdRng::seed_from_u64(0);
        resample_on_period(&mut b, &CommandConfig::default(), &mut rng);
        assert_ne!(b.commands[[0, 3]], 7.0);
        assert_eq!(b.commands.row(1).to_vec(), vec![7.0; 4]);
    }

    #[test]
    fn test_heading_command() {
        let mut b = batch(2);
        let q = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.5);
        b.base_quat.row_mut(1).assign(&aview1(&quat_to_xyzw(&q)));
        b.commands[[0, 3]] = 0.4;
        b.commands[[1, 3]] = -3.0;
        update_heading(&mut b);
        assert_relative_eq!(b.commands[[0, 2]], 0.2, epsilon = 1e-6);
        // error wraps to 2.78, clipped
        assert_relative_eq!(b.commands[[1, 2]], 1.0);
    }

    #[test]
    fn test_command_curriculum() {
        let mut ranges = CommandRanges::default();
        update_command_curriculum(&mut ranges, 0.5, 1.0, 2.0);
        assert_eq!(ranges.lin_vel_x, [-1.0, 1.0]);
        update_command_curriculum(&mut ranges, 0.9, 1.0, 2.0);
        assert_eq!(ranges.lin_vel_x, [-1.5, 1.5]);
        for _ in 0..5 {
            update_command_curriculum(&mut ranges, 0.9, 1.0, 2.0);
        }
        assert_eq!(ranges.lin_vel_x, [-2.0, 2.0]);
    }
}
