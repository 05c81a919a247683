use anyhow::Result;
use approx::assert_relative_eq;
use legged_core::{Env, Obs};
use legged_env::{
    config::{DomainRandConfig, RewardScales},
    ControlMode, EnvError, KinematicSim, LeggedAct, LeggedEnv, LeggedEnvConfig, MeshType, RewardTerm,
};
use legged_motion::{FrameLayout, MotionLibraryConfig, TrajectoryFile};
use ndarray::Array2;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{collections::BTreeMap, fs::File, io::Write, path::Path};
use tempdir::TempDir;

type Config = LeggedEnvConfig<KinematicSim>;

const STANCE: [f32; 3] = [0.0, 0.8, -1.5];

fn map(entries: &[(&str, f32)]) -> BTreeMap<String, f32> {
    entries.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

fn robot_config(num_envs: usize) -> Config {
    let mut config = Config::default()
        .num_envs(num_envs)
        .mesh_type(MeshType::Plane)
        .domain_rand(DomainRandConfig::disabled())
        .add_noise(false);
    config.init_state.pos = [0.0, 0.0, 0.4];
    config.init_state.default_joint_angles = map(&[("hip", STANCE[0]), ("thigh", STANCE[1]), ("calf", STANCE[2])]);
    config.control.stiffness = map(&[("joint", 20.0)]);
    config.control.damping = map(&[("joint", 0.5)]);
    config.asset.foot_name = "foot".to_string();
    config.asset.penalize_contacts_on = vec!["thigh".to_string(), "calf".to_string()];
    config.asset.terminate_after_contacts_on = vec!["base".to_string()];
    config
}

/// Writes a trajectory standing at `STANCE` whose root rises by `climb` per
/// frame.
fn write_trajectory(path: &Path, n_frames: usize, climb: f32) -> Result<()> {
    let layout = FrameLayout::default();
    let frames = (0..n_frames)
        .map(|k| {
            let mut f = vec![0.0; layout.width()];
            f[layout.root_pos()].copy_from_slice(&[0.0, 0.0, 0.4 + climb * k as f32]);
            f[layout.root_rot()].copy_from_slice(&[0.0, 0.0, 0.0, 1.0]);
            for (k, q) in f[layout.joint_pos()].iter_mut().enumerate() {
                *q = STANCE[k % 3];
            }
            f
        })
        .collect();
    let traj = TrajectoryFile {
        name: Some("trot".to_string()),
        frame_duration: 0.02,
        weight: 1.0,
        frames,
    };
    let mut file = File::create(path)?;
    file.write_all(serde_json::to_string(&traj)?.as_bytes())?;
    Ok(())
}

#[test]
fn test_observation_widths() -> Result<()> {
    let mut env = LeggedEnv::<KinematicSim>::build(&robot_config(3), 0)?;
    assert_eq!(env.num_actions(), 12);
    assert_eq!(env.num_obs(), 42);
    assert_eq!(env.num_privileged_obs(), 48);

    let obs = env.reset()?;
    assert_eq!(obs.len(), 3);
    assert_eq!(obs.policy.dim(), (3, 42));
    assert_eq!(obs.privileged.dim(), (3, 48));
    assert!(env.batch().init_done);
    Ok(())
}

#[test]
fn test_observation_widths_with_heights_and_history() -> Result<()> {
    let mut config = robot_config(2);
    config.terrain.measure_heights = true;
    config.env.include_history_steps = Some(3);
    let mut env = LeggedEnv::<KinematicSim>::build(&config, 0)?;
    assert_eq!(env.num_obs(), 3 * (42 + 187));
    assert_eq!(env.num_privileged_obs(), 48 + 187);

    let obs = env.reset()?;
    assert_eq!(obs.policy.ncols(), env.num_obs());
    assert_eq!(env.heights(None)?.dim(), (2, 187));
    assert_eq!(env.heights(Some(&[]))?.dim(), (0, 187));
    assert!(env.heights(Some(&[1]))?.iter().all(|&h| h == 0.0));
    Ok(())
}

#[test]
fn test_height_query_without_terrain_is_an_error() {
    let mut config = robot_config(2).mesh_type(MeshType::None);
    config.terrain.measure_heights = true;
    let err = LeggedEnv::<KinematicSim>::build(&config, 0).err().unwrap();
    assert_eq!(err.downcast_ref::<EnvError>(), Some(&EnvError::HeightQueryUnsupported));
}

#[test]
fn test_zero_gains_give_zero_torques() -> Result<()> {
    let mut config = robot_config(4);
    config.init_state.default_joint_angles = map(&[("joint", 0.0)]);
    config.control.stiffness = map(&[("joint", 0.0)]);
    config.control.damping = map(&[("joint", 0.0)]);
    let mut env = LeggedEnv::<KinematicSim>::build(&config, 0)?;
    env.reset()?;

    let (step, _) = env.step(&LeggedAct::zeros(4, 12))?;
    assert!(env.sim().applied_torques().iter().all(|&t| t == 0.0));
    assert!(env.batch().torques.iter().all(|&t| t == 0.0));
    assert_eq!(step.reward.len(), 4);
    Ok(())
}

#[test]
fn test_torques_stay_within_limits() -> Result<()> {
    let config = robot_config(8).domain_rand(DomainRandConfig {
        push_robots: false,
        ..Default::default()
    });
    let mut env = LeggedEnv::<KinematicSim>::build(&config, 7)?;
    env.reset()?;
    let effort = env.asset().dof_props.effort.clone();

    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..20 {
        let act = Array2::from_shape_fn((8, 12), |_| rng.gen_range(-10.0..10.0));
        env.step(&LeggedAct(act))?;
        for row in env.sim().applied_torques().rows() {
            for (t, l) in row.iter().zip(effort.iter()) {
                assert!(t.abs() <= l + 1e-4);
            }
        }
    }
    Ok(())
}

#[test]
fn test_timeout_truncates_without_termination_reward() -> Result<()> {
    let config = robot_config(3)
        .episode_length_s(0.2)
        .reward_scales(RewardScales::default().set(RewardTerm::Termination, -1.0));
    let mut env = LeggedEnv::<KinematicSim>::build(&config, 0)?;
    env.reset()?;
    assert_eq!(env.batch().episode_length[0], 1);

    let max_len = env.batch().max_episode_length;
    for k in 1..max_len {
        let (step, _) = env.step(&LeggedAct::zeros(3, 12))?;
        assert!(step.is_truncated.iter().all(|&t| t == 0), "truncated at step {}", k);
    }

    let (step, record) = env.step(&LeggedAct::zeros(3, 12))?;
    assert_eq!(step.is_truncated, vec![1, 1, 1]);
    assert_eq!(step.is_terminated, vec![0, 0, 0]);
    assert_eq!(step.info.reset_ids, vec![0, 1, 2]);
    assert_eq!(step.info.terminal_imitation_obs.dim(), (3, 42));
    assert_eq!(record.get_array1("time_outs")?, vec![1.0, 1.0, 1.0]);
    assert_eq!(record.get_scalar("rew_termination")?, 0.0);
    assert!(record.contains_key("rew_tracking_lin_vel"));
    assert!(env.batch().episode_length.iter().all(|&l| l == 0));
    Ok(())
}

#[test]
fn test_contact_on_base_terminates() -> Result<()> {
    let config = robot_config(4).reward_scales(RewardScales::default().set(RewardTerm::Termination, -1.0));
    let mut env = LeggedEnv::<KinematicSim>::build(&config, 0)?;
    env.reset()?;
    env.step(&LeggedAct::zeros(4, 12))?;
    let base = env.asset().body_names.iter().position(|b| b == "base").unwrap();

    env.sim_mut().apply_contact_force(2, base, [0.0, 0.0, 1.5]);
    let (step, record) = env.step(&LeggedAct::zeros(4, 12))?;
    assert_eq!(step.is_terminated, vec![0, 0, 1, 0]);
    assert_eq!(step.is_truncated, vec![0, 0, 0, 0]);
    assert_eq!(step.info.reset_ids, vec![2]);
    assert!(record.get_scalar("rew_termination")? < 0.0);

    let batch = env.batch();
    assert_eq!(batch.episode_length[2], 0);
    assert_eq!(batch.episode_length[0], 3);
    assert!(batch.feet_air_time.row(2).iter().all(|&t| t == 0.0));
    assert!(batch.episode_sums.row(2).iter().all(|&s| s == 0.0));
    for j in 0..12 {
        let (q, q0) = (batch.dof_pos[[2, j]], STANCE[j % 3]);
        let (lo, hi) = ((0.5 * q0).min(1.5 * q0), (0.5 * q0).max(1.5 * q0));
        assert!(q >= lo - 1e-6 && q <= hi + 1e-6);
        assert_eq!(batch.dof_vel[[2, j]], 0.0);
    }

    env.sim_mut().clear_contact_forces();
    let (step, _) = env.step(&LeggedAct::zeros(4, 12))?;
    assert!(step.info.reset_ids.is_empty());
    Ok(())
}

#[test]
fn test_same_seed_same_randomization() -> Result<()> {
    let config = robot_config(6).domain_rand(DomainRandConfig::default());
    let a = LeggedEnv::<KinematicSim>::build(&config, 11)?;
    let b = LeggedEnv::<KinematicSim>::build(&config, 11)?;
    let c = LeggedEnv::<KinematicSim>::build(&config, 12)?;

    assert_eq!(a.batch().params, b.batch().params);
    assert_eq!(a.sim().env_properties(), b.sim().env_properties());
    assert_ne!(a.batch().params, c.batch().params);
    Ok(())
}

#[test]
fn test_velocity_and_torque_control_build() -> Result<()> {
    for mode in [ControlMode::Velocity, ControlMode::Torque] {
        let mut env = LeggedEnv::<KinematicSim>::build(&robot_config(2).control_type(mode), 0)?;
        env.reset()?;
        let (step, _) = env.step(&LeggedAct(Array2::from_elem((2, 12), 0.1)))?;
        assert_eq!(step.reward.len(), 2);
    }
    Ok(())
}

#[test]
fn test_rough_terrain_curriculum() -> Result<()> {
    let mut config = robot_config(4).mesh_type(MeshType::Heightfield).episode_length_s(0.1);
    config.terrain.num_rows = 3;
    config.terrain.num_cols = 2;
    config.terrain.border_size = 1.0;
    config.terrain.max_init_terrain_level = 1;
    let mut env = LeggedEnv::<KinematicSim>::build(&config, 0)?;
    assert!(env.config().terrain.curriculum);
    assert!(env.batch().custom_origins);
    assert!(env.batch().terrain_levels.iter().all(|&l| l <= 1));
    env.reset()?;

    let mut levels = None;
    for _ in 0..20 {
        let (_, record) = env.step(&LeggedAct::zeros(4, 12))?;
        if record.contains_key("terrain_level") {
            levels = Some(record.get_scalar("terrain_level")?);
        }
    }
    assert!(levels.is_some());
    Ok(())
}

#[test]
fn test_flat_terrain_disables_curriculum() -> Result<()> {
    let env = LeggedEnv::<KinematicSim>::build(&robot_config(2), 0)?;
    assert!(!env.config().terrain.curriculum);
    assert!(!env.batch().custom_origins);
    Ok(())
}

#[test]
fn test_missing_default_joint_angle() {
    let mut config = robot_config(2);
    config.init_state.default_joint_angles = map(&[("hip", 0.0), ("thigh", 0.8)]);
    let err = LeggedEnv::<KinematicSim>::build(&config, 0).err().unwrap();
    assert_eq!(
        err.downcast_ref::<EnvError>(),
        Some(&EnvError::MissingDefaultJointAngle("FL_calf_joint".to_string()))
    );
}

#[test]
fn test_curriculum_without_tracking_is_an_error() {
    let mut config = robot_config(2).reward_scales(RewardScales::zero());
    config.commands.curriculum = true;
    let err = LeggedEnv::<KinematicSim>::build(&config, 0).err().unwrap();
    assert_eq!(err.downcast_ref::<EnvError>(), Some(&EnvError::CurriculumWithoutTracking));
}

#[test]
fn test_imitation_without_motion_is_an_error() {
    let config = robot_config(2).reward_scales(RewardScales::default().set(RewardTerm::TrackDofPos, 1.0));
    let err = LeggedEnv::<KinematicSim>::build(&config, 0).err().unwrap();
    assert!(matches!(err.downcast_ref::<EnvError>(), Some(EnvError::MotionRequired(_))));

    let mut config = robot_config(2);
    config.domain_rand.rsi = true;
    let err = LeggedEnv::<KinematicSim>::build(&config, 0).err().unwrap();
    assert!(matches!(err.downcast_ref::<EnvError>(), Some(EnvError::MotionRequired(_))));
}

#[test]
fn test_motion_layout_mismatch() -> Result<()> {
    let dir = TempDir::new("legged_env_motion")?;
    let path = dir.path().join("trot.json");
    write_trajectory(&path, 11, 0.0)?;
    let motion = MotionLibraryConfig::default().file(&path).layout(FrameLayout::new(4, 10));
    let config = robot_config(2).motion(motion, "trot");
    let err = LeggedEnv::<KinematicSim>::build(&config, 0).err().unwrap();
    assert_eq!(
        err.downcast_ref::<EnvError>(),
        Some(&EnvError::MotionLayoutMismatch {
            what: "joints",
            motion: 10,
            robot: 12
        })
    );
    Ok(())
}

#[test]
fn test_reference_state_initialization() -> Result<()> {
    let dir = TempDir::new("legged_env_motion")?;
    let path = dir.path().join("trot.json");
    write_trajectory(&path, 50, 0.0)?;

    let mut config = robot_config(3)
        .motion(MotionLibraryConfig::default().file(&path), "tro")
        .reward_scales(RewardScales::default().set(RewardTerm::TrackDofPos, 1.0));
    config.domain_rand.rsi = true;
    config.domain_rand.rsi_traj_rand = false;
    let mut env = LeggedEnv::<KinematicSim>::build(&config, 0)?;
    assert_relative_eq!(env.batch().max_episode_length_s, 0.98, epsilon = 1e-5);
    assert_eq!(env.motion().map(|m| m.traj_id()), Some(0));

    env.reset()?;
    let batch = env.batch();
    for i in 0..3 {
        assert_relative_eq!(batch.root_states[[i, 2]], 0.4, epsilon = 1e-5);
        for j in 0..12 {
            assert_relative_eq!(batch.dof_pos[[i, j]], STANCE[j % 3], epsilon = 1e-5);
        }
    }
    assert_eq!(batch.frames.as_ref().map(|f| f.dim()), Some((3, FrameLayout::default().width())));

    let (step, _) = env.step(&LeggedAct::zeros(3, 12))?;
    let col = env.reward_engine().column(RewardTerm::TrackDofPos).unwrap();
    assert!(env.batch().episode_sums[[0, col]] > 0.0);
    assert!(step.reward.iter().all(|&r| r >= 0.0));
    Ok(())
}

#[test]
fn test_ambiguous_motion_name() -> Result<()> {
    let dir = TempDir::new("legged_env_motion")?;
    let a = dir.path().join("trot_a.json");
    let b = dir.path().join("trot_b.json");
    write_trajectory(&a, 11, 0.0)?;
    write_trajectory(&b, 11, 0.0)?;

    let motion = MotionLibraryConfig::default().file(&a).file(&b);
    let config = robot_config(2).motion(motion, "trot");
    let err = LeggedEnv::<KinematicSim>::build(&config, 0).err().unwrap();
    assert_eq!(
        err.downcast_ref::<EnvError>(),
        Some(&EnvError::AmbiguousTrajectory {
            name: "trot".to_string(),
            count: 2
        })
    );
    Ok(())
}

#[test]
fn test_frames_follow_time_before_step() -> Result<()> {
    let dir = TempDir::new("legged_env_motion")?;
    let path = dir.path().join("climb.json");
    write_trajectory(&path, 50, 0.01)?;

    let config = robot_config(2).motion(MotionLibraryConfig::default().file(&path), "trot");
    let mut env = LeggedEnv::<KinematicSim>::build(&config, 0)?;
    let z = FrameLayout::default().root_pos().start + 2;

    env.reset()?;
    assert_eq!(env.batch().episode_length[0], 1);
    let frames = env.batch().frames.clone().unwrap();
    assert_relative_eq!(frames[[0, z]], 0.40, epsilon = 1e-4);

    env.step(&LeggedAct::zeros(2, 12))?;
    assert_eq!(env.batch().episode_length[0], 2);
    let frames = env.batch().frames.clone().unwrap();
    assert_relative_eq!(frames[[1, z]], 0.41, epsilon = 1e-4);
    Ok(())
}

#[test]
fn test_pushes_only_on_interval() -> Result<()> {
    let mut config = robot_config(3);
    config.domain_rand.push_robots = true;
    config.domain_rand.push_interval_s = 0.05;
    let mut env = LeggedEnv::<KinematicSim>::build(&config, 0)?;
    env.reset()?;
    assert_relative_eq!(env.batch().dt, 0.02, epsilon = 1e-6);

    let mut pushes = 0;
    for _ in 0..9 {
        let before = env.batch().root_states.slice(ndarray::s![.., 7..13]).to_owned();
        env.step(&LeggedAct::zeros(3, 12))?;
        let after = env.batch().root_states.slice(ndarray::s![.., 7..13]).to_owned();
        let pushed = env.batch().common_step_counter % 3 == 0;
        assert_eq!(before != after, pushed, "step {}", env.batch().common_step_counter);
        pushes += pushed as usize;
    }
    assert_eq!(pushes, 3);
    Ok(())
}

#[test]
fn test_single_sample_heightfield_is_an_error() {
    let mut config = robot_config(2).mesh_type(MeshType::Heightfield);
    config.terrain.num_rows = 1;
    config.terrain.num_cols = 1;
    config.terrain.border_size = 0.0;
    config.terrain.terrain_length = 0.1;
    config.terrain.terrain_width = 0.1;
    let err = LeggedEnv::<KinematicSim>::build(&config, 0).err().unwrap();
    assert_eq!(
        err.downcast_ref::<EnvError>(),
        Some(&EnvError::DegenerateHeightField { rows: 1, cols: 1 })
    );
}
