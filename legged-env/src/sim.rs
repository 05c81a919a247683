//! Boundary to the physics simulator.
pub mod kinematic;
use crate::config::{AssetConfig, SimParams, TerrainConfig};
use anyhow::Result;
use ndarray::{Array2, Array3, ArrayView2, ArrayView3};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::Debug;

/// Joint properties of one robot, one entry per joint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DofProperties {
    pub lower: Vec<f32>,
    pub upper: Vec<f32>,
    /// Velocity limits.
    pub velocity: Vec<f32>,
    /// Torque limits.
    pub effort: Vec<f32>,
    pub friction: Vec<f32>,
    pub damping: Vec<f32>,
    pub armature: Vec<f32>,
}

impl DofProperties {
    /// Number of joints.
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    /// `true` for a robot without joints.
    pub fn is_empty(&self) -> bool {
        self.lower.is_empty()
    }
}

/// Robot description returned by [`Simulator::load_asset`].
#[derive(Debug, Clone)]
pub struct AssetInfo {
    /// Joint names in simulator order.
    pub dof_names: Vec<String>,

    /// Rigid body names in simulator order. Body 0 is the base.
    pub body_names: Vec<String>,

    /// Default joint properties.
    pub dof_props: DofProperties,

    /// Default rigid body masses.
    pub body_masses: Vec<f32>,
}

impl AssetInfo {
    /// Indices of the bodies whose name contains `pattern`.
    pub fn find_bodies(&self, pattern: &str) -> Vec<usize> {
        self.body_names
            .iter()
            .enumerate()
            .filter(|(_, n)| n.contains(pattern))
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of the bodies matching any of the patterns, in body order.
    pub fn find_bodies_any(&self, patterns: &[String]) -> Vec<usize> {
        let mut ids: Vec<usize> = patterns.iter().flat_map(|p| self.find_bodies(p)).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Heightfield of rough terrain returned by [`Simulator::add_terrain`].
#[derive(Debug, Clone)]
pub struct HeightField {
    /// Heights in units of `vertical_scale`, indexed by cells of
    /// `horizontal_scale` including the border.
    pub height_samples: Array2<f32>,

    /// Spawn origin of each (level, type) pair, `[num_rows, num_cols, 3]`.
    pub env_origins: Array3<f32>,

    /// Length of a terrain tile along x.
    pub env_length: f32,
}

/// Properties of one environment instance handed to
/// [`Simulator::create_envs`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnvProperties {
    /// Initial root position.
    pub start_pos: [f32; 3],

    /// Friction of every rigid shape. `None` keeps the asset value.
    pub friction: Option<f32>,

    /// Restitution of every rigid shape. `None` keeps the asset value.
    pub restitution: Option<f32>,

    pub dof_props: DofProperties,
    pub body_masses: Vec<f32>,

    /// Offset added to the center of mass of the base.
    pub base_com_offset: [f32; 3],
}

/// A batched rigid-body simulator.
///
/// State is exchanged as dense arrays with the environment index as the
/// leading dimension. Root states are rows `[pos(3), quat xyzw(4),
/// lin_vel(3), ang_vel(3)]` in world frame.
pub trait Simulator {
    /// Configuration of the backend.
    type Config: Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned;

    /// Creates a simulator of `num_envs` instances.
    fn build(config: &Self::Config, params: &SimParams, num_envs: usize) -> Result<Self>
    where
        Self: Sized;

    /// Loads the robot.
    fn load_asset(&mut self, asset: &AssetConfig) -> Result<AssetInfo>;

    /// Adds the ground. Rough terrains return their heightfield.
    fn add_terrain(&mut self, terrain: &TerrainConfig) -> Result<Option<HeightField>>;

    /// Creates one robot per entry of `props`.
    fn create_envs(&mut self, props: &[EnvProperties]) -> Result<()>;

    /// Advances physics by one simulation step. Blocks until the state
    /// buffers are up to date.
    fn advance_physics(&mut self) -> Result<()>;

    /// Root states, `[N, 13]`.
    fn root_states(&self) -> ArrayView2<f32>;

    /// Joint positions, `[N, J]`.
    fn dof_positions(&self) -> ArrayView2<f32>;

    /// Joint velocities, `[N, J]`.
    fn dof_velocities(&self) -> ArrayView2<f32>;

    /// Rigid body positions in world frame, `[N, B, 3]`.
    fn rigid_body_positions(&self) -> ArrayView3<f32>;

    /// Net contact forces on rigid bodies in world frame, `[N, B, 3]`.
    fn contact_forces(&self) -> ArrayView3<f32>;

    /// Sets the joint torques applied until the next call.
    fn write_dof_torques(&mut self, torques: ArrayView2<f32>) -> Result<()>;

    /// Writes the rows `env_ids` of `states` to the root states.
    fn write_root_states(&mut self, states: ArrayView2<f32>, env_ids: &[usize]) -> Result<()>;

    /// Writes the rows `env_ids` of `pos` and `vel` to the joint states.
    fn write_dof_states(
        &mut self,
        pos: ArrayView2<f32>,
        vel: ArrayView2<f32>,
        env_ids: &[usize],
    ) -> Result<()>;

    /// Replaces the joint properties of one instance.
    fn write_dof_properties(&mut self, env_id: usize, props: &DofProperties) -> Result<()>;
}
