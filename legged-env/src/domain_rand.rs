//! Domain randomization.
//!
//! Physical properties are sampled once when the instances are created.
//! Actuator parameters and joint property factors are sampled again every
//! time an instance is reset. Every sample is drawn from the single random
//! source of the environment.
use crate::{
    batch::EnvironmentBatch,
    config::DomainRandConfig,
    error::EnvError,
    math::{uniform, uniform_in},
    sim::{AssetInfo, DofProperties, EnvProperties},
    Simulator,
};
use anyhow::Result;
use log::{debug, info};
use ndarray::{Array1, Array2, Array3};
use rand::Rng;

/// Number of distinct friction and restitution values.
const NUM_BUCKETS: usize = 64;

/// Randomized physical and actuator parameters of every instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomizedParams {
    pub friction_coeffs: Array1<f32>,
    pub restitution_coeffs: Array1<f32>,

    /// Joint friction before the factor, `[N, J]`.
    pub joint_friction: Array2<f32>,
    pub joint_damping: Array2<f32>,
    pub joint_armature: Array2<f32>,
    pub joint_friction_factor: Array2<f32>,
    pub joint_damping_factor: Array2<f32>,
    pub joint_armature_factor: Array2<f32>,

    /// Strength of the P (row 0) and D (row 1) terms, `[2, N, J]`.
    pub motor_strength: Array3<f32>,
    pub torque_multiplier: Array2<f32>,
    pub motor_offsets: Array2<f32>,
    pub p_gains: Array2<f32>,
    pub d_gains: Array2<f32>,
    pub coulomb_friction: Array2<f32>,
    pub viscous_friction: Array2<f32>,

    /// Weight of the previous action in the action filter.
    pub action_delay: Array1<f32>,

    pub added_base_mass: Array1<f32>,
    pub added_base_com: Array2<f32>,
    /// Mass added to every body except the base, `[N, B - 1]`.
    pub added_link_masses: Array2<f32>,
}

impl RandomizedParams {
    /// Nominal parameters: unit factors and no perturbation.
    pub fn new(num_envs: usize, num_dof: usize, num_bodies: usize) -> Self {
        let (n, j) = (num_envs, num_dof);
        Self {
            friction_coeffs: Array1::ones(n),
            restitution_coeffs: Array1::zeros(n),
            joint_friction: Array2::zeros((n, j)),
            joint_damping: Array2::zeros((n, j)),
            joint_armature: Array2::zeros((n, j)),
            joint_friction_factor: Array2::ones((n, j)),
            joint_damping_factor: Array2::ones((n, j)),
            joint_armature_factor: Array2::ones((n, j)),
            motor_strength: Array3::ones((2, n, j)),
            torque_multiplier: Array2::ones((n, j)),
            motor_offsets: Array2::zeros((n, j)),
            p_gains: Array2::zeros((n, j)),
            d_gains: Array2::zeros((n, j)),
            coulomb_friction: Array2::zeros((n, j)),
            viscous_friction: Array2::zeros((n, j)),
            action_delay: Array1::zeros(n),
            added_base_mass: Array1::zeros(n),
            added_base_com: Array2::zeros((n, 3)),
            added_link_masses: Array2::zeros((n, num_bodies.saturating_sub(1))),
        }
    }

    /// Joint properties of instance `env_id`: asset limits with the
    /// randomized friction, damping and armature times their factors.
    pub fn dof_properties(&self, env_id: usize, asset: &AssetInfo) -> DofProperties {
        let mut props = asset.dof_props.clone();
        props.friction = (&self.joint_friction.row(env_id) * &self.joint_friction_factor.row(env_id)).to_vec();
        props.damping = (&self.joint_damping.row(env_id) * &self.joint_damping_factor.row(env_id)).to_vec();
        props.armature = (&self.joint_armature.row(env_id) * &self.joint_armature_factor.row(env_id)).to_vec();
        props
    }

    /// Rigid body masses of instance `env_id`.
    pub fn body_masses(&self, env_id: usize, asset: &AssetInfo) -> Vec<f32> {
        let mut masses = asset.body_masses.clone();
        if let Some(base) = masses.first_mut() {
            *base += self.added_base_mass[env_id];
        }
        for (m, dm) in masses.iter_mut().skip(1).zip(self.added_link_masses.row(env_id)) {
            *m += dm;
        }
        masses
    }

    /// Properties handed to the simulator when instance `env_id` is created.
    pub fn env_properties(
        &self,
        env_id: usize,
        asset: &AssetInfo,
        start_pos: [f32; 3],
        cfg: &DomainRandConfig,
    ) -> EnvProperties {
        let com = self.added_base_com.row(env_id);
        EnvProperties {
            start_pos,
            friction: cfg.randomize_friction.then(|| self.friction_coeffs[env_id]),
            restitution: cfg.randomize_restitution.then(|| self.restitution_coeffs[env_id]),
            dof_props: self.dof_properties(env_id, asset),
            body_masses: self.body_masses(env_id, asset),
            base_com_offset: [com[0], com[1], com[2]],
        }
    }
}

/// Samples `n` values from `NUM_BUCKETS` values drawn from `range`.
fn bucketed<R: Rng + ?Sized>(rng: &mut R, n: usize, range: [f32; 2]) -> Array1<f32> {
    let buckets: Vec<f32> = (0..NUM_BUCKETS).map(|_| uniform_in(rng, range)).collect();
    Array1::from_shape_fn(n, |_| buckets[rng.gen_range(0..NUM_BUCKETS)])
}

/// Writes the base value of a joint property of every instance: the asset
/// default, a random value, or a fixed value.
fn sample_joint_property<R: Rng + ?Sized>(
    out: &mut Array2<f32>,
    default: &[f32],
    use_default: bool,
    random: Option<([f32; 2], bool)>,
    fixed: &[f32],
    rng: &mut R,
) {
    let num_dof = out.ncols();
    for mut row in out.rows_mut() {
        if use_default {
            row.assign(&Array1::from(default.to_vec()));
        } else if let Some((range, each_joint)) = random {
            let shared = uniform_in(rng, range);
            for j in 0..num_dof {
                row[j] = if each_joint { uniform_in(rng, range) } else { shared };
            }
        } else {
            for j in 0..num_dof {
                row[j] = fixed[j % fixed.len().max(1)];
            }
        }
    }
}

fn check_each_joint(name: &'static str, ranges: &[[f32; 2]], num_dof: usize) -> Result<()> {
    if ranges.len() != num_dof {
        return Err(EnvError::JointRangeCount {
            name,
            actual: ranges.len(),
            expected: num_dof,
        }
        .into());
    }
    Ok(())
}

/// Checks the per-joint ranges of the enabled each-joint randomizations.
pub fn validate(cfg: &DomainRandConfig, num_dof: usize) -> Result<()> {
    if cfg.randomize_joint_friction && cfg.randomize_joint_friction_each_joint {
        check_each_joint("joint_friction_factor_each", &cfg.joint_friction_factor_each, num_dof)?;
    }
    if cfg.randomize_joint_damping && cfg.randomize_joint_damping_each_joint {
        check_each_joint("joint_damping_factor_each", &cfg.joint_damping_factor_each, num_dof)?;
    }
    if cfg.randomize_joint_armature && cfg.randomize_joint_armature_each_joint {
        check_each_joint("joint_armature_factor_each", &cfg.joint_armature_factor_each, num_dof)?;
    }
    Ok(())
}

/// Samples the properties fixed at creation: friction, restitution, joint
/// friction, damping and armature, masses, center of mass, action delay and
/// motor strength.
pub fn randomize_on_creation<R: Rng + ?Sized>(
    params: &mut RandomizedParams,
    cfg: &DomainRandConfig,
    asset: &AssetInfo,
    num_leg: usize,
    rng: &mut R,
) {
    let n = params.friction_coeffs.len();

    if cfg.randomize_friction {
        params.friction_coeffs = bucketed(rng, n, cfg.friction_range);
    }
    if cfg.randomize_restitution {
        params.restitution_coeffs = bucketed(rng, n, cfg.restitution_range);
    }

    let random = |enabled: bool, range: [f32; 2], each_joint: bool| enabled.then_some((range, each_joint));
    sample_joint_property(
        &mut params.joint_friction,
        &asset.dof_props.friction,
        cfg.use_default_friction,
        random(
            cfg.use_random_friction_value,
            cfg.joint_friction_range,
            cfg.randomize_joint_friction_each_joint,
        ),
        &[cfg.joint_friction_value],
        rng,
    );
    sample_joint_property(
        &mut params.joint_damping,
        &asset.dof_props.damping,
        cfg.use_default_damping,
        random(
            cfg.use_random_damping_value,
            cfg.joint_damping_range,
            cfg.randomize_joint_damping_each_joint,
        ),
        &[cfg.joint_damping_value],
        rng,
    );
    let armature: Vec<f32> = (0..num_leg.max(1))
        .flat_map(|_| cfg.joint_armature_value.iter().copied())
        .collect();
    sample_joint_property(
        &mut params.joint_armature,
        &asset.dof_props.armature,
        cfg.use_default_armature,
        random(
            cfg.use_random_armature_value,
            cfg.joint_armature_range,
            cfg.randomize_joint_armature_each_joint,
        ),
        &armature,
        rng,
    );
    info!(
        "Joint properties: friction {}, damping {}, armature {}",
        source(cfg.use_default_friction, cfg.use_random_friction_value),
        source(cfg.use_default_damping, cfg.use_random_damping_value),
        source(cfg.use_default_armature, cfg.use_random_armature_value),
    );

    if cfg.randomize_base_mass {
        params.added_base_mass = Array1::from_shape_fn(n, |_| uniform_in(rng, cfg.added_mass_range));
    }
    if cfg.randomize_base_com {
        params.added_base_com = Array2::from_shape_fn((n, 3), |_| uniform_in(rng, cfg.added_com_range));
    }
    if cfg.randomize_link_mass {
        let dim = params.added_link_masses.dim();
        params.added_link_masses =
            Array2::from_shape_fn(dim, |_| uniform_in(rng, cfg.added_link_mass_range));
    }
    if n > 0 {
        let before: f32 = asset.body_masses.iter().sum();
        let after: f32 = params.body_masses(0, asset).iter().sum();
        info!("Total mass {:.3} (instance 0 after randomization {:.3})", before, after);
    }

    if cfg.action_delay {
        params.action_delay = Array1::from_shape_fn(n, |_| uniform_in(rng, cfg.action_delay_range));
    }
    if cfg.randomize_motor {
        let dim = params.motor_strength.dim();
        params.motor_strength =
            Array3::from_shape_fn(dim, |_| uniform_in(rng, cfg.motor_strength_range));
    }
}

fn source(use_default: bool, use_random: bool) -> &'static str {
    match (use_default, use_random) {
        (true, _) => "asset default",
        (false, true) => "random",
        (false, false) => "fixed value",
    }
}

/// Resamples the actuator parameters of the instances `env_ids`.
///
/// Gains are multipliers of the nominal gains. With `randomize_motor`
/// disabled the parameters keep their nominal values.
pub fn randomize_motor_props<R: Rng + ?Sized>(
    params: &mut RandomizedParams,
    cfg: &DomainRandConfig,
    nominal_p: &Array1<f32>,
    nominal_d: &Array1<f32>,
    env_ids: &[usize],
    rng: &mut R,
) {
    if !cfg.randomize_motor {
        return;
    }
    let num_dof = nominal_p.len();
    for &i in env_ids {
        for j in 0..num_dof {
            if cfg.randomize_torque {
                params.torque_multiplier[[i, j]] = uniform_in(rng, cfg.torque_multiplier_range);
            }
            if cfg.randomize_motor_offset {
                params.motor_offsets[[i, j]] = uniform_in(rng, cfg.motor_offset_range);
            }
            if cfg.randomize_gains {
                params.p_gains[[i, j]] = uniform_in(rng, cfg.stiffness_multiplier_range) * nominal_p[j];
                params.d_gains[[i, j]] = uniform_in(rng, cfg.damping_multiplier_range) * nominal_d[j];
            }
            if cfg.randomize_coulomb_friction {
                params.coulomb_friction[[i, j]] = uniform_in(rng, cfg.joint_coulomb_range);
                params.viscous_friction[[i, j]] = uniform_in(rng, cfg.joint_viscous_range);
            }
        }
    }
}

fn sample_factor<R: Rng + ?Sized>(
    out: &mut Array2<f32>,
    env_ids: &[usize],
    shared: [f32; 2],
    each: Option<&[[f32; 2]]>,
    rng: &mut R,
) {
    let num_dof = out.ncols();
    for &i in env_ids {
        match each {
            Some(ranges) => {
                for j in 0..num_dof {
                    out[[i, j]] = uniform_in(rng, ranges[j]);
                }
            }
            None => {
                let f = uniform_in(rng, shared);
                out.row_mut(i).fill(f);
            }
        }
    }
}

fn each(on: bool, ranges: &[[f32; 2]]) -> Option<&[[f32; 2]]> {
    on.then_some(ranges)
}

/// `true` if any joint property factor is randomized.
pub fn factors_enabled(cfg: &DomainRandConfig) -> bool {
    cfg.randomize_joint_friction || cfg.randomize_joint_damping || cfg.randomize_joint_armature
}

/// Resamples the joint property factors of the instances `env_ids`.
pub fn randomize_dof_props<R: Rng + ?Sized>(
    params: &mut RandomizedParams,
    cfg: &DomainRandConfig,
    env_ids: &[usize],
    rng: &mut R,
) {
    if cfg.randomize_joint_friction {
        sample_factor(
            &mut params.joint_friction_factor,
            env_ids,
            cfg.joint_friction_factor,
            each(cfg.randomize_joint_friction_each_joint, &cfg.joint_friction_factor_each),
            rng,
        );
    }
    if cfg.randomize_joint_damping {
        sample_factor(
            &mut params.joint_damping_factor,
            env_ids,
            cfg.joint_damping_factor,
            each(cfg.randomize_joint_damping_each_joint, &cfg.joint_damping_factor_each),
            rng,
        );
    }
    if cfg.randomize_joint_armature {
        sample_factor(
            &mut params.joint_armature_factor,
            env_ids,
            cfg.joint_armature_factor,
            each(cfg.randomize_joint_armature_each_joint, &cfg.joint_armature_factor_each),
            rng,
        );
    }
}

/// Writes the joint properties with the current factors of the instances
/// `env_ids` to the simulator.
pub fn refresh_dof_props<S: Simulator>(
    sim: &mut S,
    params: &RandomizedParams,
    asset: &AssetInfo,
    env_ids: &[usize],
) -> Result<()> {
    for &i in env_ids {
        sim.write_dof_properties(i, &params.dof_properties(i, asset))?;
    }
    Ok(())
}

/// Pushes every robot by overwriting its root velocities.
///
/// The roll rate is set only when every foot of every instance touches the
/// ground.
pub fn push_robots<S: Simulator, R: Rng + ?Sized>(
    batch: &mut EnvironmentBatch,
    sim: &mut S,
    cfg: &DomainRandConfig,
    rng: &mut R,
) -> Result<()> {
    let n = batch.num_envs;
    if cfg.push_vel {
        let v = cfg.max_push_vel_xy;
        for i in 0..n {
            batch.root_states[[i, 7]] = uniform(rng, -v, v);
            batch.root_states[[i, 8]] = uniform(rng, -v, v);
        }
    }
    if cfg.push_ang {
        let w = cfg.max_push_ang_vel;
        for i in 0..n {
            for k in 10..13 {
                batch.root_states[[i, k]] = uniform(rng, -w, w);
            }
        }
    }
    if cfg.swing_roll && batch.foot_contacts(5.0).iter().all(|&c| c) {
        let w = cfg.max_swing_roll;
        for i in 0..n {
            batch.root_states[[i, 10]] = uniform(rng, -w, w);
        }
    }
    if !(cfg.push_vel || cfg.push_ang) {
        return Ok(());
    }
    debug!("Pushed robots at step {}", batch.common_step_counter);
    let all: Vec<usize> = (0..n).collect();
    sim.write_root_states(batch.root_states.view(), &all)
}
