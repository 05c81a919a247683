//! Conversion of actions to joint torques.
use crate::{
    batch::EnvironmentBatch,
    config::{ControlConfig, ControlMode},
    error::EnvError,
};
use anyhow::Result;
use log::warn;
use ndarray::{s, Array1, Array2, ArrayView2, Axis, Zip};
use std::collections::BTreeMap;

/// Value of `name` in `map`: the exact key, else the last key contained in
/// the name.
pub fn lookup(name: &str, map: &BTreeMap<String, f32>) -> Option<f32> {
    map.get(name).copied().or_else(|| {
        map.iter()
            .filter(|(k, _)| name.contains(k.as_str()))
            .last()
            .map(|(_, &v)| v)
    })
}

/// Per-joint gains resolved from a name map.
///
/// Joints without a matching key get a zero gain, with a warning when the
/// controller uses the gain.
pub fn resolve_gains(dof_names: &[String], map: &BTreeMap<String, f32>, what: &str, mode: ControlMode) -> Array1<f32> {
    dof_names
        .iter()
        .map(|name| {
            lookup(name, map).unwrap_or_else(|| {
                if mode != ControlMode::Torque {
                    warn!("{} of joint {} is not defined, setting it to zero", what, name);
                }
                0.0
            })
        })
        .collect()
}

/// Default joint angles resolved from a name map.
pub fn resolve_default_angles(dof_names: &[String], map: &BTreeMap<String, f32>) -> Result<Array1<f32>> {
    dof_names
        .iter()
        .map(|name| {
            lookup(name, map)
                .ok_or_else(|| anyhow::Error::from(EnvError::MissingDefaultJointAngle(name.clone())))
        })
        .collect()
}

/// Applies the action filter and the action clip, and stores the result as
/// the current action.
///
/// The filtered action is `(1 - d) * raw + d * last_action` with the
/// per-instance delay coefficient `d` when `action_delay` is set.
pub fn filter_actions(
    batch: &mut EnvironmentBatch,
    raw: ArrayView2<f32>,
    action_delay: bool,
    clip_actions: f32,
    action_scale: f32,
) -> Result<()> {
    let (n, j) = (batch.num_envs, batch.num_dof);
    if raw.dim() != (n, j) {
        let (rn, rj) = raw.dim();
        return Err(EnvError::ActionShape(n, j, rn, rj).into());
    }

    let bound = clip_actions / action_scale;
    let mut actions = raw.to_owned();
    if action_delay {
        let delay = batch.params.action_delay.view().insert_axis(Axis(1));
        actions = &actions * &(1.0 - &delay) + &batch.last_actions * &delay;
    }
    actions.mapv_inplace(|a| a.clamp(-bound, bound));
    batch.actions.assign(&actions);

    let len = batch.action_history.len_of(Axis(1));
    if len > 0 {
        let shifted = batch.action_history.slice(s![.., 1.., ..]).to_owned();
        batch.action_history.slice_mut(s![.., ..len - 1, ..]).assign(&shifted);
        batch.action_history.slice_mut(s![.., len - 1, ..]).assign(&actions);
    }
    Ok(())
}

/// Torques of one simulation step for the current actions, clipped to the
/// torque limits.
///
/// `randomized` selects the randomized actuator parameters of position
/// control: motor strengths, gains, offsets, Coulomb and viscous friction
/// and torque multipliers.
pub fn compute_torques(batch: &EnvironmentBatch, control: &ControlConfig, randomized: bool, sim_dt: f32) -> Array2<f32> {
    let scaled = &batch.actions * control.action_scale;
    let p = batch.p_gains.view().insert_axis(Axis(0));
    let d = batch.d_gains.view().insert_axis(Axis(0));
    let default = batch.default_dof_pos.view().insert_axis(Axis(0));

    let mut torques = match control.control_type {
        ControlMode::Position if randomized => {
            let rp = &batch.params;
            let target = &scaled + &default - &batch.dof_pos + &rp.motor_offsets;
            let sign = batch.dof_vel.mapv(|v| if v == 0.0 { 0.0 } else { v.signum() });
            let raw = &rp.motor_strength.index_axis(Axis(0), 0) * &rp.p_gains * &target
                - &rp.motor_strength.index_axis(Axis(0), 1) * &rp.d_gains * &batch.dof_vel
                - &rp.coulomb_friction * &sign
                - &rp.viscous_friction * &batch.dof_vel;
            raw * &rp.torque_multiplier
        }
        ControlMode::Position => &p * &(&scaled + &default - &batch.dof_pos) - &d * &batch.dof_vel,
        ControlMode::Velocity => {
            &p * &(&scaled - &batch.dof_vel) - &d * &((&batch.dof_vel - &batch.last_dof_vel) / sim_dt)
        }
        ControlMode::Torque => scaled,
    };

    let limits = batch.torque_limits.view().insert_axis(Axis(0));
    Zip::from(&mut torques)
        .and_broadcast(&limits)
        .for_each(|t, &l| *t = t.clamp(-l, l));
    torques
}
