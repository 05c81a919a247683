//! Configuration of [`LeggedEnv`](crate::LeggedEnv).
//!
//! The configuration is a tree of plain option structs, one per concern,
//! mirroring the sections of a YAML file:
//!
//! ```yaml
//! env:
//!   num_envs: 4096
//!   episode_length_s: 20.0
//! control:
//!   control_type: P
//!   stiffness: { joint: 20.0 }
//! rewards:
//!   scales:
//!     tracking_lin_vel: 1.0
//! ```
//!
//! Every section has defaults, so a file only needs the options it changes.
use crate::{error::EnvError, reward::RewardTerm, Simulator};
use anyhow::Result;
use legged_motion::{MotionLibrary, MotionProvider};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt,
    fs::File,
    io::{BufReader, Write},
    path::Path,
    str::FromStr,
};

/// Controller converting actions to joint torques.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ControlMode {
    /// Actions are joint position targets of a PD controller.
    Position,
    /// Actions are joint velocity targets.
    Velocity,
    /// Actions are torques.
    Torque,
}

impl FromStr for ControlMode {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "P" => Ok(Self::Position),
            "V" => Ok(Self::Velocity),
            "T" => Ok(Self::Torque),
            _ => Err(EnvError::UnknownControlMode(s.to_string())),
        }
    }
}

impl TryFrom<String> for ControlMode {
    type Error = EnvError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ControlMode> for String {
    fn from(m: ControlMode) -> Self {
        m.to_string()
    }
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Position => "P",
            Self::Velocity => "V",
            Self::Torque => "T",
        };
        write!(f, "{}", s)
    }
}

/// Kind of terrain added to the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MeshType {
    /// No terrain at all.
    None,
    /// Flat ground plane.
    Plane,
    /// Heightfield terrain.
    Heightfield,
    /// Triangle mesh terrain backed by a heightfield.
    Trimesh,
}

impl MeshType {
    /// `true` for terrains with per-level origins and height samples.
    pub fn is_rough(&self) -> bool {
        matches!(self, Self::Heightfield | Self::Trimesh)
    }
}

impl FromStr for MeshType {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "plane" => Ok(Self::Plane),
            "heightfield" => Ok(Self::Heightfield),
            "trimesh" => Ok(Self::Trimesh),
            _ => Err(EnvError::UnknownMeshType(s.to_string())),
        }
    }
}

impl TryFrom<String> for MeshType {
    type Error = EnvError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MeshType> for String {
    fn from(m: MeshType) -> Self {
        m.to_string()
    }
}

impl fmt::Display for MeshType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::Plane => "plane",
            Self::Heightfield => "heightfield",
            Self::Trimesh => "trimesh",
        };
        write!(f, "{}", s)
    }
}

/// Batch size, episode length and reference motion selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvParams {
    pub num_envs: usize,

    /// Distance between robots on flat terrain.
    pub env_spacing: f32,

    /// Report timeouts in the info record.
    pub send_timeouts: bool,

    /// Episode length in seconds. Replaced by the duration of the selected
    /// trajectory when a reference motion is configured.
    pub episode_length_s: f32,

    /// Number of stacked policy observations. `None` disables stacking.
    pub include_history_steps: Option<usize>,

    /// Terminate on contacts of the bodies listed in
    /// [`AssetConfig::terminate_after_contacts_on`].
    pub check_contact: bool,

    pub num_leg: usize,

    /// Substring selecting one trajectory of the reference motion.
    pub motion_name: Option<String>,
}

impl Default for EnvParams {
    fn default() -> Self {
        Self {
            num_envs: 4096,
            env_spacing: 3.0,
            send_timeouts: true,
            episode_length_s: 20.0,
            include_history_steps: None,
            check_contact: true,
            num_leg: 4,
            motion_name: None,
        }
    }
}

/// Terrain and height measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerrainConfig {
    pub mesh_type: MeshType,
    pub horizontal_scale: f32,
    pub vertical_scale: f32,
    pub border_size: f32,

    /// Terrain curriculum. Only effective on heightfield and trimesh terrains.
    pub curriculum: bool,
    pub static_friction: f32,
    pub dynamic_friction: f32,
    pub restitution: f32,
    pub measure_heights: bool,

    /// Body-frame x offsets of the height samples.
    pub measured_points_x: Vec<f32>,

    /// Body-frame y offsets of the height samples.
    pub measured_points_y: Vec<f32>,
    pub max_init_terrain_level: usize,
    pub terrain_length: f32,
    pub terrain_width: f32,

    /// Number of terrain levels.
    pub num_rows: usize,

    /// Number of terrain types.
    pub num_cols: usize,
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            mesh_type: MeshType::Plane,
            horizontal_scale: 0.1,
            vertical_scale: 0.005,
            border_size: 25.0,
            curriculum: true,
            static_friction: 1.0,
            dynamic_friction: 1.0,
            restitution: 0.0,
            measure_heights: false,
            measured_points_x: (-8..=8).map(|i| i as f32 * 0.1).collect(),
            measured_points_y: (-5..=5).map(|i| i as f32 * 0.1).collect(),
            max_init_terrain_level: 5,
            terrain_length: 8.0,
            terrain_width: 8.0,
            num_rows: 10,
            num_cols: 20,
        }
    }
}

/// Sampling ranges of commands, `[min, max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandRanges {
    pub lin_vel_x: [f32; 2],
    pub lin_vel_y: [f32; 2],
    pub ang_vel_yaw: [f32; 2],
    pub heading: [f32; 2],
}

impl Default for CommandRanges {
    fn default() -> Self {
        Self {
            lin_vel_x: [-1.0, 1.0],
            lin_vel_y: [-1.0, 1.0],
            ang_vel_yaw: [-1.0, 1.0],
            heading: [-3.14, 3.14],
        }
    }
}

/// Locomotion commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub curriculum: bool,
    pub max_curriculum: f32,

    /// Seconds between command resampling.
    pub resampling_time: f32,

    /// Compute the yaw rate command from a heading target.
    pub heading_command: bool,
    pub ranges: CommandRanges,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            curriculum: false,
            max_curriculum: 1.0,
            resampling_time: 10.0,
            heading_command: true,
            ranges: CommandRanges::default(),
        }
    }
}

/// Initial root state and default joint angles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitStateConfig {
    pub pos: [f32; 3],

    /// Orientation, xyzw.
    pub rot: [f32; 4],
    pub lin_vel: [f32; 3],
    pub ang_vel: [f32; 3],

    /// Joint angles when the action is zero, keyed by joint name.
    pub default_joint_angles: BTreeMap<String, f32>,
}

impl Default for InitStateConfig {
    fn default() -> Self {
        Self {
            pos: [0.0, 0.0, 1.0],
            rot: [0.0, 0.0, 0.0, 1.0],
            lin_vel: [0.0; 3],
            ang_vel: [0.0; 3],
            default_joint_angles: BTreeMap::from([
                ("joint_a".to_string(), 0.0),
                ("joint_b".to_string(), 0.0),
            ]),
        }
    }
}

impl InitStateConfig {
    /// Root state row `[pos, rot, lin_vel, ang_vel]`.
    pub fn root_state(&self) -> [f32; 13] {
        let mut s = [0.0; 13];
        s[0..3].copy_from_slice(&self.pos);
        s[3..7].copy_from_slice(&self.rot);
        s[7..10].copy_from_slice(&self.lin_vel);
        s[10..13].copy_from_slice(&self.ang_vel);
        s
    }
}

/// Actuation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub control_type: ControlMode,

    /// P gains keyed by joint name or joint name pattern.
    pub stiffness: BTreeMap<String, f32>,

    /// D gains keyed by joint name or joint name pattern.
    pub damping: BTreeMap<String, f32>,

    /// Target angle = `action_scale * action + default_angle`.
    pub action_scale: f32,

    /// Simulation steps per policy step.
    pub decimation: usize,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            control_type: ControlMode::Position,
            stiffness: BTreeMap::from([("joint_a".to_string(), 10.0), ("joint_b".to_string(), 15.0)]),
            damping: BTreeMap::from([("joint_a".to_string(), 1.0), ("joint_b".to_string(), 1.5)]),
            action_scale: 0.5,
            decimation: 4,
        }
    }
}

/// Robot asset and contact bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub file: String,
    pub name: String,

    /// Substring of the names of the feet bodies.
    pub foot_name: String,

    /// Substrings of the bodies whose contacts are penalized.
    pub penalize_contacts_on: Vec<String>,

    /// Substrings of the bodies whose contacts terminate the episode.
    pub terminate_after_contacts_on: Vec<String>,
    pub disable_gravity: bool,
    pub fix_base_link: bool,
}

impl Default for AssetConfig {
    fn default() -> Self {
        Self {
            file: String::new(),
            name: "legged_robot".to_string(),
            foot_name: "None".to_string(),
            penalize_contacts_on: vec![],
            terminate_after_contacts_on: vec![],
            disable_gravity: false,
            fix_base_link: false,
        }
    }
}

/// Domain randomization.
///
/// Ranges are `[min, max]` and sampled uniformly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainRandConfig {
    pub randomize_friction: bool,
    pub friction_range: [f32; 2],
    pub randomize_restitution: bool,
    pub restitution_range: [f32; 2],

    pub use_default_friction: bool,
    pub use_random_friction_value: bool,
    pub joint_friction_range: [f32; 2],
    pub joint_friction_value: f32,
    pub randomize_joint_friction: bool,
    pub randomize_joint_friction_each_joint: bool,
    pub joint_friction_factor: [f32; 2],
    /// Per-joint factor ranges used with `randomize_joint_friction_each_joint`.
    pub joint_friction_factor_each: Vec<[f32; 2]>,

    pub use_default_damping: bool,
    pub use_random_damping_value: bool,
    pub joint_damping_range: [f32; 2],
    pub joint_damping_value: f32,
    pub randomize_joint_damping: bool,
    pub randomize_joint_damping_each_joint: bool,
    pub joint_damping_factor: [f32; 2],
    pub joint_damping_factor_each: Vec<[f32; 2]>,

    pub use_default_armature: bool,
    pub use_random_armature_value: bool,
    pub joint_armature_range: [f32; 2],
    /// Armature of the joints of one leg, repeated for every leg.
    pub joint_armature_value: Vec<f32>,
    pub randomize_joint_armature: bool,
    pub randomize_joint_armature_each_joint: bool,
    pub joint_armature_factor: [f32; 2],
    pub joint_armature_factor_each: Vec<[f32; 2]>,

    /// Master switch of every actuator randomization below.
    pub randomize_motor: bool,
    pub motor_strength_range: [f32; 2],
    pub randomize_torque: bool,
    pub torque_multiplier_range: [f32; 2],
    pub randomize_motor_offset: bool,
    pub motor_offset_range: [f32; 2],
    pub randomize_gains: bool,
    pub stiffness_multiplier_range: [f32; 2],
    pub damping_multiplier_range: [f32; 2],
    pub randomize_coulomb_friction: bool,
    pub joint_coulomb_range: [f32; 2],
    pub joint_viscous_range: [f32; 2],

    pub randomize_base_mass: bool,
    pub added_mass_range: [f32; 2],
    pub randomize_base_com: bool,
    pub added_com_range: [f32; 2],
    pub randomize_link_mass: bool,
    pub added_link_mass_range: [f32; 2],

    pub push_robots: bool,
    pub push_interval_s: f32,
    pub push_vel: bool,
    pub max_push_vel_xy: f32,
    pub push_ang: bool,
    pub max_push_ang_vel: f32,
    pub swing_roll: bool,
    pub max_swing_roll: f32,

    pub action_delay: bool,
    pub action_buf_len: usize,
    pub action_delay_range: [f32; 2],

    /// Reference state initialization.
    pub rsi: bool,
    /// Joint position noise on top of the reference state.
    pub rsi_rand: bool,
    /// Random frames of random trajectories instead of the selected
    /// trajectory at time zero.
    pub rsi_traj_rand: bool,
}

impl Default for DomainRandConfig {
    fn default() -> Self {
        Self {
            randomize_friction: true,
            friction_range: [0.5, 1.25],
            randomize_restitution: true,
            restitution_range: [0.0, 0.4],

            use_default_friction: true,
            use_random_friction_value: false,
            joint_friction_range: [0.0, 0.02],
            joint_friction_value: 0.3,
            randomize_joint_friction: false,
            randomize_joint_friction_each_joint: false,
            joint_friction_factor: [0.9, 1.1],
            joint_friction_factor_each: vec![],

            use_default_damping: true,
            use_random_damping_value: true,
            joint_damping_range: [0.1, 5.0],
            joint_damping_value: 0.01,
            randomize_joint_damping: false,
            randomize_joint_damping_each_joint: false,
            joint_damping_factor: [0.9, 1.1],
            joint_damping_factor_each: vec![],

            use_default_armature: true,
            use_random_armature_value: true,
            joint_armature_range: [0.01, 0.2],
            joint_armature_value: vec![0.0355, 0.0220, 0.1289],
            randomize_joint_armature: false,
            randomize_joint_armature_each_joint: false,
            joint_armature_factor: [0.9, 1.1],
            joint_armature_factor_each: vec![],

            randomize_motor: true,
            motor_strength_range: [0.9, 1.1],
            randomize_torque: true,
            torque_multiplier_range: [0.9, 1.1],
            randomize_motor_offset: false,
            motor_offset_range: [-0.035, 0.035],
            randomize_gains: false,
            stiffness_multiplier_range: [0.9, 1.1],
            damping_multiplier_range: [0.9, 1.1],
            randomize_coulomb_friction: false,
            joint_coulomb_range: [0.1, 1.0],
            joint_viscous_range: [0.1, 0.9],

            randomize_base_mass: true,
            added_mass_range: [-1.0, 1.0],
            randomize_base_com: true,
            added_com_range: [-0.2, 0.2],
            randomize_link_mass: true,
            added_link_mass_range: [0.0, 0.2],

            push_robots: true,
            push_interval_s: 15.0,
            push_vel: true,
            max_push_vel_xy: 1.0,
            push_ang: true,
            max_push_ang_vel: 0.6,
            swing_roll: false,
            max_swing_roll: 0.35,

            action_delay: true,
            action_buf_len: 8,
            action_delay_range: [0.0, 0.75],

            rsi: false,
            rsi_rand: false,
            rsi_traj_rand: true,
        }
    }
}

impl DomainRandConfig {
    /// Disables every randomization, push and delay.
    pub fn disabled() -> Self {
        Self {
            randomize_friction: false,
            randomize_restitution: false,
            use_random_damping_value: false,
            use_random_armature_value: false,
            randomize_motor: false,
            randomize_torque: false,
            randomize_base_mass: false,
            randomize_base_com: false,
            randomize_link_mass: false,
            push_robots: false,
            action_delay: false,
            ..Default::default()
        }
    }
}

/// Reward scales, one per [`RewardTerm`]. Zero disables a term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardScales {
    pub termination: f32,
    pub tracking_lin_vel: f32,
    pub tracking_ang_vel: f32,
    pub lin_vel_z: f32,
    pub ang_vel_xy: f32,
    pub orientation: f32,
    pub torques: f32,
    pub dof_vel: f32,
    pub dof_acc: f32,
    pub base_height: f32,
    pub feet_air_time: f32,
    pub collision: f32,
    pub feet_stumble: f32,
    pub action_rate: f32,
    pub stand_still: f32,
    pub dof_pos_limits: f32,
    pub dof_vel_limits: f32,
    pub torque_limits: f32,
    pub feet_contact_forces: f32,
    pub track_root_pos: f32,
    pub track_root_height: f32,
    pub track_root_rot: f32,
    pub track_toe_pos: f32,
    pub track_dof_pos: f32,
    pub tracking_yaw: f32,
}

impl Default for RewardScales {
    fn default() -> Self {
        Self {
            termination: 0.0,
            tracking_lin_vel: 1.0,
            tracking_ang_vel: 0.5,
            lin_vel_z: -2.0,
            ang_vel_xy: -0.05,
            orientation: 0.0,
            torques: -0.00001,
            dof_vel: 0.0,
            dof_acc: -2.5e-7,
            base_height: 0.0,
            feet_air_time: 1.0,
            collision: -1.0,
            feet_stumble: 0.0,
            action_rate: -0.01,
            stand_still: 0.0,
            dof_pos_limits: 0.0,
            dof_vel_limits: 0.0,
            torque_limits: 0.0,
            feet_contact_forces: 0.0,
            track_root_pos: 0.0,
            track_root_height: 0.0,
            track_root_rot: 0.0,
            track_toe_pos: 0.0,
            track_dof_pos: 0.0,
            tracking_yaw: 0.0,
        }
    }
}

impl RewardScales {
    /// All scales set to zero.
    pub fn zero() -> Self {
        Self {
            tracking_lin_vel: 0.0,
            tracking_ang_vel: 0.0,
            lin_vel_z: 0.0,
            ang_vel_xy: 0.0,
            torques: 0.0,
            dof_acc: 0.0,
            feet_air_time: 0.0,
            collision: 0.0,
            action_rate: 0.0,
            ..Default::default()
        }
    }

    /// Scale of a term.
    pub fn get(&self, term: RewardTerm) -> f32 {
        *self.slot(term)
    }

    /// Sets the scale of a term.
    pub fn set(mut self, term: RewardTerm, scale: f32) -> Self {
        *self.slot_mut(term) = scale;
        self
    }

    fn slot(&self, term: RewardTerm) -> &f32 {
        use RewardTerm::*;
        match term {
            Termination => &self.termination,
            TrackingLinVel => &self.tracking_lin_vel,
            TrackingAngVel => &self.tracking_ang_vel,
            LinVelZ => &self.lin_vel_z,
            AngVelXy => &self.ang_vel_xy,
            Orientation => &self.orientation,
            Torques => &self.torques,
            DofVel => &self.dof_vel,
            DofAcc => &self.dof_acc,
            BaseHeight => &self.base_height,
            FeetAirTime => &self.feet_air_time,
            Collision => &self.collision,
            FeetStumble => &self.feet_stumble,
            ActionRate => &self.action_rate,
            StandStill => &self.stand_still,
            DofPosLimits => &self.dof_pos_limits,
            DofVelLimits => &self.dof_vel_limits,
            TorqueLimits => &self.torque_limits,
            FeetContactForces => &self.feet_contact_forces,
            TrackRootPos => &self.track_root_pos,
            TrackRootHeight => &self.track_root_height,
            TrackRootRot => &self.track_root_rot,
            TrackToePos => &self.track_toe_pos,
            TrackDofPos => &self.track_dof_pos,
            TrackingYaw => &self.tracking_yaw,
        }
    }

    fn slot_mut(&mut self, term: RewardTerm) -> &mut f32 {
        use RewardTerm::*;
        match term {
            Termination => &mut self.termination,
            TrackingLinVel => &mut self.tracking_lin_vel,
            TrackingAngVel => &mut self.tracking_ang_vel,
            LinVelZ => &mut self.lin_vel_z,
            AngVelXy => &mut self.ang_vel_xy,
            Orientation => &mut self.orientation,
            Torques => &mut self.torques,
            DofVel => &mut self.dof_vel,
            DofAcc => &mut self.dof_acc,
            BaseHeight => &mut self.base_height,
            FeetAirTime => &mut self.feet_air_time,
            Collision => &mut self.collision,
            FeetStumble => &mut self.feet_stumble,
            ActionRate => &mut self.action_rate,
            StandStill => &mut self.stand_still,
            DofPosLimits => &mut self.dof_pos_limits,
            DofVelLimits => &mut self.dof_vel_limits,
            TorqueLimits => &mut self.torque_limits,
            FeetContactForces => &mut self.feet_contact_forces,
            TrackRootPos => &mut self.track_root_pos,
            TrackRootHeight => &mut self.track_root_height,
            TrackRootRot => &mut self.track_root_rot,
            TrackToePos => &mut self.track_toe_pos,
            TrackDofPos => &mut self.track_dof_pos,
            TrackingYaw => &mut self.tracking_yaw,
        }
    }
}

/// Reward shaping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub scales: RewardScales,

    /// Clip negative totals at zero before the termination term is added.
    pub only_positive_rewards: bool,

    /// Tracking reward = `exp(-error^2 / tracking_sigma)`.
    pub tracking_sigma: f32,

    /// Fraction of the joint range beyond which positions are penalized.
    pub soft_dof_pos_limit: f32,
    pub soft_dof_vel_limit: f32,
    pub soft_torque_limit: f32,
    pub base_height_target: f32,
    pub max_contact_force: f32,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            scales: RewardScales::default(),
            only_positive_rewards: true,
            tracking_sigma: 0.25,
            soft_dof_pos_limit: 1.0,
            soft_dof_vel_limit: 1.0,
            soft_torque_limit: 1.0,
            base_height_target: 1.0,
            max_contact_force: 100.0,
        }
    }
}

/// Observation scales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObsScales {
    pub lin_vel: f32,
    pub ang_vel: f32,
    pub dof_pos: f32,
    pub dof_vel: f32,
    pub quat: f32,
    pub height_measurements: f32,
}

impl Default for ObsScales {
    fn default() -> Self {
        Self {
            lin_vel: 2.0,
            ang_vel: 0.25,
            dof_pos: 1.0,
            dof_vel: 0.05,
            quat: 1.0,
            height_measurements: 5.0,
        }
    }
}

/// Observation scaling and clipping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizationConfig {
    pub obs_scales: ObsScales,
    pub clip_observations: f32,
    pub clip_actions: f32,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            obs_scales: ObsScales::default(),
            clip_observations: 100.0,
            clip_actions: 2.5,
        }
    }
}

/// Noise magnitudes per observation channel, before the observation scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseScales {
    pub dof_pos: f32,
    pub dof_vel: f32,
    pub lin_vel: f32,
    pub ang_vel: f32,
    pub gravity: f32,
    pub height_measurements: f32,
}

impl Default for NoiseScales {
    fn default() -> Self {
        Self {
            dof_pos: 0.01,
            dof_vel: 1.5,
            lin_vel: 0.1,
            ang_vel: 0.2,
            gravity: 0.05,
            height_measurements: 0.1,
        }
    }
}

/// Observation noise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    pub add_noise: bool,
    pub noise_level: f32,
    pub noise_scales: NoiseScales,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            add_noise: true,
            noise_level: 1.0,
            noise_scales: NoiseScales::default(),
        }
    }
}

/// Physics stepping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimParams {
    /// Seconds per simulation step.
    pub dt: f32,
    pub substeps: usize,
    pub gravity: [f32; 3],
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            dt: 0.005,
            substeps: 1,
            gravity: [0.0, 0.0, -9.81],
        }
    }
}

/// Configuration of [`LeggedEnv`](crate::LeggedEnv).
#[derive(Serialize, Deserialize, Debug)]
pub struct LeggedEnvConfig<S, M = MotionLibrary>
where
    S: Simulator,
    M: MotionProvider,
{
    #[serde(default)]
    pub env: EnvParams,
    #[serde(default)]
    pub terrain: TerrainConfig,
    #[serde(default)]
    pub commands: CommandConfig,
    #[serde(default)]
    pub init_state: InitStateConfig,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub asset: AssetConfig,
    #[serde(default)]
    pub domain_rand: DomainRandConfig,
    #[serde(default)]
    pub rewards: RewardConfig,
    #[serde(default)]
    pub normalization: NormalizationConfig,
    #[serde(default)]
    pub noise: NoiseConfig,
    #[serde(default)]
    pub sim: SimParams,

    /// Configuration of the simulator backend.
    #[serde(default)]
    pub sim_config: S::Config,

    /// Configuration of the reference motion. `None` disables imitation.
    #[serde(default)]
    pub motion: Option<M::Config>,
}

impl<S, M> Clone for LeggedEnvConfig<S, M>
where
    S: Simulator,
    M: MotionProvider,
{
    fn clone(&self) -> Self {
        Self {
            env: self.env.clone(),
            terrain: self.terrain.clone(),
            commands: self.commands.clone(),
            init_state: self.init_state.clone(),
            control: self.control.clone(),
            asset: self.asset.clone(),
            domain_rand: self.domain_rand.clone(),
            rewards: self.rewards.clone(),
            normalization: self.normalization.clone(),
            noise: self.noise.clone(),
            sim: self.sim.clone(),
            sim_config: self.sim_config.clone(),
            motion: self.motion.clone(),
        }
    }
}

impl<S, M> Default for LeggedEnvConfig<S, M>
where
    S: Simulator,
    M: MotionProvider,
{
    fn default() -> Self {
        Self {
            env: EnvParams::default(),
            terrain: TerrainConfig::default(),
            commands: CommandConfig::default(),
            init_state: InitStateConfig::default(),
            control: ControlConfig::default(),
            asset: AssetConfig::default(),
            domain_rand: DomainRandConfig::default(),
            rewards: RewardConfig::default(),
            normalization: NormalizationConfig::default(),
            noise: NoiseConfig::default(),
            sim: SimParams::default(),
            sim_config: S::Config::default(),
            motion: None,
        }
    }
}

impl<S, M> LeggedEnvConfig<S, M>
where
    S: Simulator,
    M: MotionProvider,
{
    /// Sets the number of environment instances.
    pub fn num_envs(mut self, v: usize) -> Self {
        self.env.num_envs = v;
        self
    }

    /// Sets the episode length in seconds.
    pub fn episode_length_s(mut self, v: f32) -> Self {
        self.env.episode_length_s = v;
        self
    }

    /// Sets the terrain mesh type.
    pub fn mesh_type(mut self, v: MeshType) -> Self {
        self.terrain.mesh_type = v;
        self
    }

    /// Sets the controller mode.
    pub fn control_type(mut self, v: ControlMode) -> Self {
        self.control.control_type = v;
        self
    }

    /// Sets the domain randomization options.
    pub fn domain_rand(mut self, v: DomainRandConfig) -> Self {
        self.domain_rand = v;
        self
    }

    /// Sets the reward scales.
    pub fn reward_scales(mut self, v: RewardScales) -> Self {
        self.rewards.scales = v;
        self
    }

    /// Enables or disables observation noise.
    pub fn add_noise(mut self, v: bool) -> Self {
        self.noise.add_noise = v;
        self
    }

    /// Sets the simulator configuration.
    pub fn sim_config(mut self, v: S::Config) -> Self {
        self.sim_config = v;
        self
    }

    /// Sets the reference motion and the name of the trajectory to track.
    pub fn motion(mut self, config: M::Config, motion_name: impl Into<String>) -> Self {
        self.motion = Some(config);
        self.env.motion_name = Some(motion_name.into());
        self
    }

    /// Policy steps per second, `decimation * sim.dt`.
    pub fn dt(&self) -> f32 {
        self.control.decimation as f32 * self.sim.dt
    }

    /// Constructs [`LeggedEnvConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`LeggedEnvConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KinematicSim;
    use tempdir::TempDir;

    type Config = LeggedEnvConfig<KinematicSim>;

    #[test]
    fn test_parse_modes() {
        assert_eq!("P".parse::<ControlMode>(), Ok(ControlMode::Position));
        assert_eq!("T".parse::<ControlMode>(), Ok(ControlMode::Torque));
        assert_eq!(
            "X".parse::<ControlMode>(),
            Err(EnvError::UnknownControlMode("X".to_string()))
        );
        assert_eq!("trimesh".parse::<MeshType>(), Ok(MeshType::Trimesh));
        assert_eq!(
            "stairs".parse::<MeshType>(),
            Err(EnvError::UnknownMeshType("stairs".to_string()))
        );
    }

    #[test]
    fn test_unknown_control_type_in_yaml() {
        let yaml = "control:\n  control_type: PD\n";
        let err = serde_yaml::from_str::<Config>(yaml).unwrap_err();
        assert!(err.to_string().contains("Unknown controller type: PD"));
    }

    #[test]
    fn test_partial_yaml_uses_defaults() -> Result<()> {
        let yaml = "env:\n  num_envs: 8\nterrain:\n  mesh_type: heightfield\nrewards:\n  scales:\n    termination: -5.0\n";
        let config: Config = serde_yaml::from_str(yaml)?;
        assert_eq!(config.env.num_envs, 8);
        assert_eq!(config.env.episode_length_s, 20.0);
        assert_eq!(config.terrain.mesh_type, MeshType::Heightfield);
        assert_eq!(config.rewards.scales.termination, -5.0);
        assert_eq!(config.rewards.scales.tracking_lin_vel, 1.0);
        Ok(())
    }

    #[test]
    fn test_serde_config() -> Result<()> {
        let config = Config::default()
            .num_envs(16)
            .control_type(ControlMode::Velocity)
            .reward_scales(RewardScales::zero().set(RewardTerm::Torques, -1e-4));

        let dir = TempDir::new("legged_env_config")?;
        let path = dir.path().join("legged_env_config.yaml");
        config.save(&path)?;
        let config_ = Config::load(&path)?;

        assert_eq!(config_.env, config.env);
        assert_eq!(config_.control, config.control);
        assert_eq!(config_.rewards, config.rewards);
        assert_eq!(config_.sim_config, config.sim_config);
        Ok(())
    }

    #[test]
    fn test_reward_scale_slots() {
        let scales = RewardScales::zero().set(RewardTerm::TrackDofPos, 2.0);
        for term in RewardTerm::ALL {
            let expected = if term == RewardTerm::TrackDofPos { 2.0 } else { 0.0 };
            assert_eq!(scales.get(term), expected, "{}", term.name());
        }
    }
}
