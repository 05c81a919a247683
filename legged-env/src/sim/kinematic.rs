//! CPU simulator backend without collision handling.
use super::{AssetInfo, DofProperties, EnvProperties, HeightField, Simulator};
use crate::config::{AssetConfig, SimParams, TerrainConfig};
use crate::math::quat_from_xyzw;
use anyhow::{bail, Result};
use log::{debug, info};
use nalgebra::{UnitQuaternion, Vector3};
use ndarray::{s, Array2, Array3, ArrayView2, ArrayView3};
use serde::{Deserialize, Serialize};

/// Configuration of [`KinematicSim`].
///
/// The robot has one base and, for every leg, a hip, thigh, calf and foot
/// body. Joint `j` of leg `l` is named `{l}_{j}_joint`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicSimConfig {
    /// Leg prefixes.
    pub legs: Vec<String>,

    /// Joint names of a leg.
    pub leg_joints: Vec<String>,

    /// Lower position limits of the joints of a leg.
    pub lower: Vec<f32>,

    /// Upper position limits of the joints of a leg.
    pub upper: Vec<f32>,

    /// Velocity limits of the joints of a leg.
    pub velocity: Vec<f32>,

    /// Torque limits of the joints of a leg.
    pub effort: Vec<f32>,

    pub base_mass: f32,
    pub link_mass: f32,

    /// Hip positions in the base frame, one per leg.
    pub hip_offsets: Vec<[f32; 3]>,

    /// Distance from hip to foot.
    pub leg_length: f32,

    /// Feet carry the weight of the robot.
    pub feet_in_contact: bool,

    /// Height gained per level of rough terrain.
    pub level_step_height: f32,
}

impl Default for KinematicSimConfig {
    fn default() -> Self {
        Self {
            legs: ["FL", "FR", "RL", "RR"].iter().map(|s| s.to_string()).collect(),
            leg_joints: ["hip", "thigh", "calf"].iter().map(|s| s.to_string()).collect(),
            lower: vec![-1.0472, -1.5708, -2.7227],
            upper: vec![1.0472, 3.4907, -0.8378],
            velocity: vec![30.1, 30.1, 15.7],
            effort: vec![23.7, 23.7, 45.43],
            base_mass: 6.921,
            link_mass: 0.6,
            hip_offsets: vec![
                [0.1934, 0.0465, 0.0],
                [0.1934, -0.0465, 0.0],
                [-0.1934, 0.0465, 0.0],
                [-0.1934, -0.0465, 0.0],
            ],
            leg_length: 0.3,
            feet_in_contact: true,
            level_step_height: 0.05,
        }
    }
}

impl KinematicSimConfig {
    /// Sets whether the feet carry the weight of the robot.
    pub fn feet_in_contact(mut self, v: bool) -> Self {
        self.feet_in_contact = v;
        self
    }

    fn dof_names(&self) -> Vec<String> {
        self.legs
            .iter()
            .flat_map(|l| self.leg_joints.iter().map(move |j| format!("{}_{}_joint", l, j)))
            .collect()
    }

    fn body_names(&self) -> Vec<String> {
        let mut names = vec!["base".to_string()];
        for l in self.legs.iter() {
            for b in ["hip", "thigh", "calf", "foot"] {
                names.push(format!("{}_{}", l, b));
            }
        }
        names
    }

    fn per_joint(&self, v: &[f32]) -> Vec<f32> {
        self.legs.iter().flat_map(|_| v.iter().copied()).collect()
    }
}

/// A batched integrator of joint and root motion.
///
/// Joints have unit inertia plus armature and are driven by the written
/// torques against viscous damping and Coulomb friction. Positions stop at
/// the joint limits. The root moves with its velocities and is not affected
/// by gravity or contacts. Contact forces are the weight of the robot shared
/// by the feet, when enabled, plus the forces set by
/// [`KinematicSim::apply_contact_force`].
#[derive(Debug)]
pub struct KinematicSim {
    config: KinematicSimConfig,
    params: SimParams,
    num_envs: usize,
    fix_base_link: bool,
    dof_names: Vec<String>,
    body_names: Vec<String>,
    env_props: Vec<EnvProperties>,
    root_states: Array2<f32>,
    dof_pos: Array2<f32>,
    dof_vel: Array2<f32>,
    torques: Array2<f32>,
    body_pos: Array3<f32>,
    contact_forces: Array3<f32>,
    applied_forces: Array3<f32>,
}

impl KinematicSim {
    /// Adds a persistent external contact force on a body.
    pub fn apply_contact_force(&mut self, env_id: usize, body_id: usize, force: [f32; 3]) {
        for k in 0..3 {
            self.applied_forces[[env_id, body_id, k]] += force[k];
            self.contact_forces[[env_id, body_id, k]] += force[k];
        }
    }

    /// Removes the forces added by [`KinematicSim::apply_contact_force`].
    pub fn clear_contact_forces(&mut self) {
        self.applied_forces.fill(0.0);
        self.update_contacts();
    }

    /// Properties the instances were created with, updated by
    /// [`Simulator::write_dof_properties`].
    pub fn env_properties(&self) -> &[EnvProperties] {
        &self.env_props
    }

    /// Torques applied in the last simulation step.
    pub fn applied_torques(&self) -> ArrayView2<f32> {
        self.torques.view()
    }

    fn num_dof(&self) -> usize {
        self.dof_names.len()
    }

    fn integrate_joints(&mut self, dt: f32) {
        for i in 0..self.num_envs {
            let p = &self.env_props[i].dof_props;
            for j in 0..self.dof_names.len() {
                let v = self.dof_vel[[i, j]];
                let friction = if v == 0.0 { 0.0 } else { p.friction[j] * v.signum() };
                let tau = self.torques[[i, j]] - p.damping[j] * v - friction;
                let acc = tau / (1.0 + p.armature[j]);
                let mut v = (v + acc * dt).clamp(-p.velocity[j], p.velocity[j]);
                let mut q = self.dof_pos[[i, j]] + v * dt;
                if q < p.lower[j] || q > p.upper[j] {
                    q = q.clamp(p.lower[j], p.upper[j]);
                    v = 0.0;
                }
                self.dof_pos[[i, j]] = q;
                self.dof_vel[[i, j]] = v;
            }
        }
    }

    fn integrate_root(&mut self, dt: f32) {
        for mut row in self.root_states.rows_mut() {
            let q = quat_from_xyzw(row.slice(s![3..7]));
            let omega = Vector3::new(row[10], row[11], row[12]);
            let q = UnitQuaternion::from_scaled_axis(omega * dt) * q;
            for k in 0..3 {
                row[k] += row[7 + k] * dt;
            }
            row[3] = q.i;
            row[4] = q.j;
            row[5] = q.k;
            row[6] = q.w;
        }
    }

    fn update_bodies(&mut self) {
        let n_legs = self.config.legs.len();
        for i in 0..self.num_envs {
            let root = self.root_states.row(i);
            let q = quat_from_xyzw(root.slice(s![3..7]));
            let p = Vector3::new(root[0], root[1], root[2]);
            self.body_pos
                .slice_mut(s![i, 0, ..])
                .assign(&ndarray::aview1(&[p.x, p.y, p.z]));
            for l in 0..n_legs {
                let hip = Vector3::from(self.config.hip_offsets[l]);
                let down = Vector3::new(0.0, 0.0, -self.config.leg_length);
                let offsets = [hip, hip, hip + down * 0.5, hip + down];
                for (b, o) in offsets.iter().enumerate() {
                    let w = p + q * o;
                    let body = 1 + 4 * l + b;
                    self.body_pos
                        .slice_mut(s![i, body, ..])
                        .assign(&ndarray::aview1(&[w.x, w.y, w.z]));
                }
            }
        }
    }

    fn update_contacts(&mut self) {
        self.contact_forces.assign(&self.applied_forces);
        if !self.config.feet_in_contact {
            return;
        }
        let n_legs = self.config.legs.len();
        let g = -self.params.gravity[2];
        for i in 0..self.num_envs {
            let mass: f32 = self.env_props[i].body_masses.iter().sum();
            for l in 0..n_legs {
                self.contact_forces[[i, 4 + 4 * l, 2]] += mass * g / n_legs as f32;
            }
        }
    }

    fn heightfield(&self, terrain: &TerrainConfig) -> HeightField {
        let hs = terrain.horizontal_scale;
        let length_px = (terrain.terrain_length / hs) as usize;
        let width_px = (terrain.terrain_width / hs) as usize;
        let border_px = (terrain.border_size / hs) as usize;
        let rows = terrain.num_rows * length_px + 2 * border_px;
        let cols = terrain.num_cols * width_px + 2 * border_px;
        let step = (self.config.level_step_height / terrain.vertical_scale).round();

        let mut height_samples = Array2::zeros((rows, cols));
        let mut env_origins = Array3::zeros((terrain.num_rows, terrain.num_cols, 3));
        for r in 0..terrain.num_rows {
            let x0 = border_px + r * length_px;
            let height = r as f32 * step;
            height_samples
                .slice_mut(s![x0..x0 + length_px, border_px..cols - border_px])
                .fill(height);
            for c in 0..terrain.num_cols {
                env_origins[[r, c, 0]] = (r as f32 + 0.5) * terrain.terrain_length;
                env_origins[[r, c, 1]] = (c as f32 + 0.5) * terrain.terrain_width;
                env_origins[[r, c, 2]] = height * terrain.vertical_scale;
            }
        }

        HeightField {
            height_samples,
            env_origins,
            env_length: terrain.terrain_length,
        }
    }
}

impl Simulator for KinematicSim {
    type Config = KinematicSimConfig;

    fn build(config: &Self::Config, params: &SimParams, num_envs: usize) -> Result<Self> {
        let n_legs = config.legs.len();
        let n = config.leg_joints.len();
        for (name, v) in [
            ("lower", &config.lower),
            ("upper", &config.upper),
            ("velocity", &config.velocity),
            ("effort", &config.effort),
        ] {
            if v.len() != n {
                bail!("{} has {} values for {} joints per leg", name, v.len(), n);
            }
        }
        if config.hip_offsets.len() != n_legs {
            bail!("hip_offsets has {} values for {} legs", config.hip_offsets.len(), n_legs);
        }

        let dof_names = config.dof_names();
        let body_names = config.body_names();
        let (num_dof, num_bodies) = (dof_names.len(), body_names.len());
        let mut root_states = Array2::zeros((num_envs, 13));
        root_states.column_mut(6).fill(1.0);

        Ok(Self {
            config: config.clone(),
            params: params.clone(),
            num_envs,
            fix_base_link: false,
            dof_names,
            body_names,
            env_props: vec![],
            root_states,
            dof_pos: Array2::zeros((num_envs, num_dof)),
            dof_vel: Array2::zeros((num_envs, num_dof)),
            torques: Array2::zeros((num_envs, num_dof)),
            body_pos: Array3::zeros((num_envs, num_bodies, 3)),
            contact_forces: Array3::zeros((num_envs, num_bodies, 3)),
            applied_forces: Array3::zeros((num_envs, num_bodies, 3)),
        })
    }

    fn load_asset(&mut self, asset: &AssetConfig) -> Result<AssetInfo> {
        debug!("Kinematic robot for asset {} ({})", asset.name, asset.file);
        self.fix_base_link = asset.fix_base_link;
        let num_dof = self.num_dof();
        let mut body_masses = vec![self.config.link_mass; self.body_names.len()];
        body_masses[0] = self.config.base_mass;

        Ok(AssetInfo {
            dof_names: self.dof_names.clone(),
            body_names: self.body_names.clone(),
            dof_props: DofProperties {
                lower: self.config.per_joint(&self.config.lower),
                upper: self.config.per_joint(&self.config.upper),
                velocity: self.config.per_joint(&self.config.velocity),
                effort: self.config.per_joint(&self.config.effort),
                friction: vec![0.0; num_dof],
                damping: vec![0.0; num_dof],
                armature: vec![0.0; num_dof],
            },
            body_masses,
        })
    }

    fn add_terrain(&mut self, terrain: &TerrainConfig) -> Result<Option<HeightField>> {
        if terrain.mesh_type.is_rough() {
            let hf = self.heightfield(terrain);
            info!("Heightfield terrain {:?}", hf.height_samples.dim());
            Ok(Some(hf))
        } else {
            Ok(None)
        }
    }

    fn create_envs(&mut self, props: &[EnvProperties]) -> Result<()> {
        if props.len() != self.num_envs {
            bail!("Got properties of {} instances for {}", props.len(), self.num_envs);
        }
        for (i, p) in props.iter().enumerate() {
            if p.dof_props.len() != self.num_dof() {
                bail!("Instance {} has properties of {} joints", i, p.dof_props.len());
            }
            for k in 0..3 {
                self.root_states[[i, k]] = p.start_pos[k];
            }
        }
        self.env_props = props.to_vec();
        self.update_bodies();
        self.update_contacts();
        Ok(())
    }

    fn advance_physics(&mut self) -> Result<()> {
        if self.env_props.is_empty() {
            bail!("advance_physics() called before create_envs()");
        }
        let substeps = self.params.substeps.max(1);
        let dt = self.params.dt / substeps as f32;
        for _ in 0..substeps {
            self.integrate_joints(dt);
            if !self.fix_base_link {
                self.integrate_root(dt);
            }
        }
        self.update_bodies();
        self.update_contacts();
        Ok(())
    }

    fn root_states(&self) -> ArrayView2<f32> {
        self.root_states.view()
    }

    fn dof_positions(&self) -> ArrayView2<f32> {
        self.dof_pos.view()
    }

    fn dof_velocities(&self) -> ArrayView2<f32> {
        self.dof_vel.view()
    }

    fn rigid_body_positions(&self) -> ArrayView3<f32> {
        self.body_pos.view()
    }

    fn contact_forces(&self) -> ArrayView3<f32> {
        self.contact_forces.view()
    }

    fn write_dof_torques(&mut self, torques: ArrayView2<f32>) -> Result<()> {
        if torques.dim() != self.torques.dim() {
            bail!("Torques of shape {:?}, expected {:?}", torques.dim(), self.torques.dim());
        }
        self.torques.assign(&torques);
        Ok(())
    }

    fn write_root_states(&mut self, states: ArrayView2<f32>, env_ids: &[usize]) -> Result<()> {
        for &i in env_ids {
            self.root_states.row_mut(i).assign(&states.row(i));
        }
        self.update_bodies();
        Ok(())
    }

    fn write_dof_states(
        &mut self,
        pos: ArrayView2<f32>,
        vel: ArrayView2<f32>,
        env_ids: &[usize],
    ) -> Result<()> {
        for &i in env_ids {
            self.dof_pos.row_mut(i).assign(&pos.row(i));
            self.dof_vel.row_mut(i).assign(&vel.row(i));
        }
        Ok(())
    }

    fn write_dof_properties(&mut self, env_id: usize, props: &DofProperties) -> Result<()> {
        match self.env_props.get_mut(env_id) {
            Some(p) => {
                p.dof_props = props.clone();
                Ok(())
            }
            None => bail!("No instance {}", env_id),
        }
    }
}
