//! Vectorized legged-robot environment.
use crate::{
    base::{LeggedAct, LeggedInfo, LeggedObs},
    batch::EnvironmentBatch,
    command::{resample_on_period, update_heading},
    config::{ControlMode, LeggedEnvConfig, MeshType},
    control::{compute_torques, filter_actions, resolve_default_angles, resolve_gains},
    domain_rand::{
        push_robots, randomize_dof_props, randomize_motor_props, randomize_on_creation, validate,
    },
    error::EnvError,
    lifecycle::{check_termination, reset_idx, ReferenceMotion},
    observation::ObservationAssembler,
    reward::RewardEngine,
    sim::AssetInfo,
    terrain::{check_height_field, height_points, init_origins, measure_heights},
    Simulator,
};
use anyhow::{Context, Result};
use legged_core::{record::Record, Env, Step};
use legged_motion::{MotionLibrary, MotionProvider};
use log::{debug, info, trace};
use ndarray::{Array2, Axis};
use rand::{rngs::StdRng, SeedableRng};

/// A batch of legged robots in a simulator `S`, optionally tracking
/// reference motions from `M`.
pub struct LeggedEnv<S, M = MotionLibrary>
where
    S: Simulator,
    M: MotionProvider,
{
    config: LeggedEnvConfig<S, M>,
    sim: S,
    asset: AssetInfo,
    batch: EnvironmentBatch,
    motion: Option<ReferenceMotion<M>>,
    rewards: RewardEngine,
    observations: ObservationAssembler,

    // Policy steps between pushes
    push_interval: usize,

    rng: StdRng,
}

impl<S, M> LeggedEnv<S, M>
where
    S: Simulator,
    M: MotionProvider,
{
    /// Number of actuated joints.
    pub fn num_actions(&self) -> usize {
        self.batch.num_dof
    }

    /// Width of the policy observation, including history.
    pub fn num_obs(&self) -> usize {
        self.observations.policy_width()
    }

    /// Width of the privileged observation.
    pub fn num_privileged_obs(&self) -> usize {
        self.observations.num_privileged_obs()
    }

    /// Configuration the environment was built with. Terrain curriculum is
    /// disabled on flat terrain.
    pub fn config(&self) -> &LeggedEnvConfig<S, M> {
        &self.config
    }

    /// Robot description.
    pub fn asset(&self) -> &AssetInfo {
        &self.asset
    }

    /// Buffers of all instances.
    pub fn batch(&self) -> &EnvironmentBatch {
        &self.batch
    }

    /// Mutable buffers of all instances.
    pub fn batch_mut(&mut self) -> &mut EnvironmentBatch {
        &mut self.batch
    }

    /// The simulator.
    pub fn sim(&self) -> &S {
        &self.sim
    }

    /// The simulator, mutable.
    pub fn sim_mut(&mut self) -> &mut S {
        &mut self.sim
    }

    /// Active reward terms.
    pub fn reward_engine(&self) -> &RewardEngine {
        &self.rewards
    }

    /// The tracked reference motion.
    pub fn motion(&self) -> Option<&ReferenceMotion<M>> {
        self.motion.as_ref()
    }

    /// Heights of the terrain under the height samples of the instances
    /// `env_ids`, or of all instances for `None`.
    pub fn heights(&self, env_ids: Option<&[usize]>) -> Result<Array2<f32>> {
        measure_heights(&self.batch, &self.config.terrain, env_ids)
    }

    fn check_config(config: &LeggedEnvConfig<S, M>) -> Result<()> {
        if config.domain_rand.rsi && config.motion.is_none() {
            return Err(EnvError::MotionRequired("Reference state initialization".to_string()).into());
        }
        if config.commands.curriculum && config.rewards.scales.tracking_lin_vel == 0.0 {
            return Err(EnvError::CurriculumWithoutTracking.into());
        }
        Ok(())
    }

    fn build_motion(config: &LeggedEnvConfig<S, M>, batch: &EnvironmentBatch) -> Result<Option<ReferenceMotion<M>>> {
        let Some(motion_config) = config.motion.as_ref() else {
            return Ok(None);
        };
        let provider = M::build(motion_config)?;
        let layout = provider.layout();
        if layout.num_joints != batch.num_dof {
            return Err(EnvError::MotionLayoutMismatch {
                what: "joints",
                motion: layout.num_joints,
                robot: batch.num_dof,
            }
            .into());
        }
        if layout.num_feet != batch.feet_indices.len() {
            return Err(EnvError::MotionLayoutMismatch {
                what: "feet",
                motion: layout.num_feet,
                robot: batch.feet_indices.len(),
            }
            .into());
        }
        let motion = ReferenceMotion::select(provider, config.env.motion_name.as_deref())?;
        Ok(Some(motion))
    }

    /// Runs the physics-side phases of a policy step and returns the step.
    fn post_physics_step(&mut self, act: &LeggedAct) -> Result<(Step<Self>, Record)> {
        let cfg = &self.config;
        let batch = &mut self.batch;
        batch.refresh_dof_state(&self.sim);
        batch.refresh_body_state(&self.sim);
        // Reference frames are looked up at the time before this step.
        let times: Vec<f32> = batch.episode_length.iter().map(|&l| l as f32 * batch.dt).collect();
        batch.episode_length.mapv_inplace(|l| l + 1);
        batch.common_step_counter += 1;
        batch.compute_derived();

        if let Some(motion) = self.motion.as_ref() {
            batch.frames = Some(motion.frames_at(&times)?);
        }

        resample_on_period(batch, &cfg.commands, &mut self.rng);
        if cfg.commands.heading_command {
            update_heading(batch);
        }
        if cfg.terrain.measure_heights {
            batch.measured_heights = measure_heights(batch, &cfg.terrain, None)?;
        }
        if cfg.domain_rand.push_robots && batch.common_step_counter % self.push_interval == 0 {
            push_robots(batch, &mut self.sim, &cfg.domain_rand, &mut self.rng)?;
        }

        check_termination(batch, cfg.env.check_contact);
        self.rewards.compute(batch, &cfg.rewards);

        let reset_ids = batch.reset_indices();
        let terminal_imitation_obs = batch.imitation_obs(&reset_ids);
        let record = reset_idx(
            batch,
            &mut self.sim,
            cfg,
            &self.asset,
            self.motion.as_ref(),
            &self.rewards,
            &reset_ids,
            &mut self.rng,
        )?;
        if !reset_ids.is_empty() {
            debug!("Reset {} instances at step {}", reset_ids.len(), batch.common_step_counter);
        }

        let obs = self.observations.compute(batch, &reset_ids, &mut self.rng)?;
        batch.update_last_buffers();

        let reward = batch.rew_buf.to_vec();
        let is_truncated: Vec<i8> = batch.time_out_buf.iter().map(|&t| t as i8).collect();
        let is_terminated: Vec<i8> = batch
            .reset_buf
            .iter()
            .zip(batch.time_out_buf.iter())
            .map(|(&r, &t)| (r && !t) as i8)
            .collect();
        let info = LeggedInfo {
            reset_ids,
            terminal_imitation_obs,
        };
        let step = Step::new(obs, act.clone(), reward, is_terminated, is_truncated, info);

        Ok((step, record))
    }
}

impl<S, M> Env for LeggedEnv<S, M>
where
    S: Simulator,
    M: MotionProvider,
{
    type Config = LeggedEnvConfig<S, M>;
    type Obs = LeggedObs;
    type Act = LeggedAct;
    type Info = LeggedInfo;

    fn build(config: &Self::Config, seed: i64) -> Result<Self> {
        Self::check_config(config)?;
        let mut config = config.clone();
        let n = config.env.num_envs;
        let dt = config.dt();

        let mut sim = S::build(&config.sim_config, &config.sim, n).context("Failed to build the simulator")?;
        let asset = sim.load_asset(&config.asset)?;
        let num_dof = asset.dof_names.len();
        validate(&config.domain_rand, num_dof)?;
        info!(
            "Robot {} with {} joints and {} bodies",
            config.asset.name,
            num_dof,
            asset.body_names.len()
        );

        let terrain = &mut config.terrain;
        let height_field = sim.add_terrain(terrain)?;
        if terrain.mesh_type.is_rough() && height_field.is_none() {
            return Err(EnvError::MissingHeightField(terrain.mesh_type.to_string()).into());
        }
        if let Some(hf) = height_field.as_ref() {
            check_height_field(hf)?;
        }
        if !terrain.mesh_type.is_rough() {
            terrain.curriculum = false;
        }
        let points = if terrain.measure_heights {
            if terrain.mesh_type == MeshType::None {
                return Err(EnvError::HeightQueryUnsupported.into());
            }
            height_points(terrain)
        } else {
            Array2::zeros((0, 2))
        };

        let mut batch = EnvironmentBatch::new(
            n,
            &asset,
            points,
            config.domain_rand.action_buf_len,
            config.commands.ranges.clone(),
        );
        batch.dt = dt;
        batch.sim_dt = config.sim.dt;
        batch.height_field = height_field;
        batch.set_feet(asset.find_bodies(&config.asset.foot_name));
        batch.penalised_contact_indices = asset.find_bodies_any(&config.asset.penalize_contacts_on);
        batch.termination_contact_indices = asset.find_bodies_any(&config.asset.terminate_after_contacts_on);

        let mode = config.control.control_type;
        batch.default_dof_pos = resolve_default_angles(&asset.dof_names, &config.init_state.default_joint_angles)?;
        batch.p_gains = resolve_gains(&asset.dof_names, &config.control.stiffness, "P gain", mode);
        batch.d_gains = resolve_gains(&asset.dof_names, &config.control.damping, "D gain", mode);
        let props = &asset.dof_props;
        batch.set_soft_dof_pos_limits(&props.lower, &props.upper, config.rewards.soft_dof_pos_limit);

        let motion = Self::build_motion(&config, &batch)?;
        batch.max_episode_length_s = match motion.as_ref() {
            Some(m) => m.duration()?,
            None => config.env.episode_length_s,
        };
        batch.max_episode_length = (batch.max_episode_length_s / dt).ceil() as usize;
        info!(
            "Episode length {} s ({} steps of {} s)",
            batch.max_episode_length_s, batch.max_episode_length, dt
        );

        let mut rng = StdRng::seed_from_u64(seed as u64);
        init_origins(&mut batch, &config.terrain, config.env.env_spacing, &mut rng);

        let dr = &config.domain_rand;
        randomize_on_creation(&mut batch.params, dr, &asset, config.env.num_leg, &mut rng);
        batch.params.p_gains = batch.p_gains.broadcast((n, num_dof)).context("P gains")?.to_owned();
        batch.params.d_gains = batch.d_gains.broadcast((n, num_dof)).context("D gains")?.to_owned();
        let all: Vec<usize> = (0..n).collect();
        randomize_motor_props(&mut batch.params, dr, &batch.p_gains, &batch.d_gains, &all, &mut rng);
        randomize_dof_props(&mut batch.params, dr, &all, &mut rng);

        let base_pos = config.init_state.pos;
        let env_props: Vec<_> = (0..n)
            .map(|i| {
                let o = batch.env_origins.row(i);
                let start = [base_pos[0] + o[0], base_pos[1] + o[1], base_pos[2] + o[2]];
                batch.params.env_properties(i, &asset, start, dr)
            })
            .collect();
        sim.create_envs(&env_props)?;

        let rewards = RewardEngine::new(&config.rewards, dt, motion.is_some())?;
        batch.episode_sums = Array2::zeros((n, rewards.len()));
        let observations = ObservationAssembler::new(
            &config.normalization,
            &config.noise,
            n,
            num_dof,
            batch.height_points.len_of(Axis(0)),
            config.env.include_history_steps,
        );
        let push_interval = ((dr.push_interval_s / dt).ceil() as usize).max(1);

        batch.refresh_dof_state(&sim);
        batch.refresh_body_state(&sim);
        batch.compute_derived();
        info!(
            "Built {} instances, {} observations, {} privileged observations",
            n,
            observations.policy_width(),
            observations.num_privileged_obs()
        );

        Ok(Self {
            config,
            sim,
            asset,
            batch,
            motion,
            rewards,
            observations,
            push_interval,
            rng,
        })
    }

    fn step(&mut self, act: &Self::Act) -> Result<(Step<Self>, Record)> {
        trace!("LeggedEnv::step()");
        let control = &self.config.control;
        let randomized = self.config.domain_rand.randomize_motor && control.control_type == ControlMode::Position;
        filter_actions(
            &mut self.batch,
            act.0.view(),
            self.config.domain_rand.action_delay,
            self.config.normalization.clip_actions,
            control.action_scale,
        )?;

        for _ in 0..control.decimation {
            let torques = compute_torques(&self.batch, control, randomized, self.batch.sim_dt);
            self.sim.write_dof_torques(torques.view())?;
            self.sim
                .advance_physics()
                .with_context(|| format!("Physics step failed at step {}", self.batch.common_step_counter))?;
            self.batch.refresh_dof_state(&self.sim);
            self.batch.torques = torques;
        }

        self.post_physics_step(act)
    }

    fn reset(&mut self) -> Result<Self::Obs> {
        trace!("LeggedEnv::reset()");
        let all: Vec<usize> = (0..self.batch.num_envs).collect();
        reset_idx(
            &mut self.batch,
            &mut self.sim,
            &self.config,
            &self.asset,
            self.motion.as_ref(),
            &self.rewards,
            &all,
            &mut self.rng,
        )?;
        let act = LeggedAct::zeros(self.batch.num_envs, self.batch.num_dof);
        let (step, _) = self.step(&act)?;
        self.batch.init_done = true;
        Ok(step.obs)
    }

    fn num_envs(&self) -> usize {
        self.batch.num_envs
    }
}
