//! Spawn origins, terrain curriculum and height measurement.
use crate::{
    batch::EnvironmentBatch,
    command::lin_command_norm,
    config::{MeshType, TerrainConfig},
    error::EnvError,
    math::{quat_apply_yaw, quat_from_xyzw},
    sim::HeightField,
};
use anyhow::Result;
use log::debug;
use ndarray::{s, Array2};
use rand::Rng;

/// Body-frame xy offsets of the height samples, x-major, `[P, 2]`.
pub fn height_points(cfg: &TerrainConfig) -> Array2<f32> {
    let (xs, ys) = (&cfg.measured_points_x, &cfg.measured_points_y);
    let mut points = Array2::zeros((xs.len() * ys.len(), 2));
    for (i, &x) in xs.iter().enumerate() {
        for (j, &y) in ys.iter().enumerate() {
            points[[i * ys.len() + j, 0]] = x;
            points[[i * ys.len() + j, 1]] = y;
        }
    }
    points
}

/// Rejects height fields that spawn placement and the height query can't
/// index.
pub fn check_height_field(hf: &HeightField) -> Result<(), EnvError> {
    let (rows, cols) = hf.height_samples.dim();
    if rows < 2 || cols < 2 {
        return Err(EnvError::DegenerateHeightField { rows, cols });
    }
    let (levels, types, _) = hf.env_origins.dim();
    if levels == 0 || types == 0 {
        return Err(EnvError::EmptyTerrainGrid { levels, types });
    }
    Ok(())
}

/// Places the instances.
///
/// On rough terrain every instance gets a random level below the maximum
/// initial level and a type column, and spawns at the origin of its tile.
/// Otherwise instances are laid out on a square grid of `env_spacing`.
pub fn init_origins<R: Rng + ?Sized>(
    batch: &mut EnvironmentBatch,
    cfg: &TerrainConfig,
    env_spacing: f32,
    rng: &mut R,
) {
    let n = batch.num_envs;
    let origins = batch.height_field.as_ref().map(|hf| hf.env_origins.clone());
    match origins {
        Some(table) if cfg.mesh_type.is_rough() => {
            batch.custom_origins = true;
            let max_init_level = if cfg.curriculum {
                cfg.max_init_terrain_level
            } else {
                cfg.num_rows.saturating_sub(1)
            };
            let num_cols = cfg.num_cols.max(1);
            for i in 0..n {
                batch.terrain_levels[i] = rng.gen_range(0..=max_init_level).min(cfg.num_rows.saturating_sub(1));
                let t = (i as f32 / (n as f32 / num_cols as f32)).floor() as usize;
                batch.terrain_types[i] = t.min(num_cols - 1);
            }
            batch.max_terrain_level = cfg.num_rows;
            for i in 0..n {
                let origin = table.slice(s![batch.terrain_levels[i], batch.terrain_types[i], ..]);
                batch.env_origins.row_mut(i).assign(&origin);
            }
        }
        _ => {
            batch.custom_origins = false;
            let num_cols = ((n as f32).sqrt().floor() as usize).max(1);
            for i in 0..n {
                batch.env_origins[[i, 0]] = env_spacing * (i / num_cols) as f32;
                batch.env_origins[[i, 1]] = env_spacing * (i % num_cols) as f32;
                batch.env_origins[[i, 2]] = 0.0;
            }
        }
    }
}

/// Level change of one instance at reset: `+1` if the robot walked farther
/// than half a tile, `-1` if it walked less than half the commanded
/// distance, `0` otherwise.
pub fn level_change(distance: f32, command_norm: f32, env_length: f32, episode_length_s: f32) -> i64 {
    let move_up = distance > env_length / 2.0;
    let move_down = distance < command_norm * episode_length_s * 0.5 && !move_up;
    move_up as i64 - move_down as i64
}

/// Updates the terrain levels of the instances `env_ids` and moves their
/// origins.
///
/// Levels past the last row are reassigned at random; levels never go below
/// zero.
pub fn update_terrain_curriculum<R: Rng + ?Sized>(batch: &mut EnvironmentBatch, env_ids: &[usize], rng: &mut R) {
    if !batch.init_done {
        return;
    }
    let Some(hf) = batch.height_field.as_ref() else {
        return;
    };
    let env_length = hf.env_length;
    let max_level = batch.max_terrain_level as i64;

    let mut moves = Vec::with_capacity(env_ids.len());
    for &i in env_ids {
        let dx = batch.root_states[[i, 0]] - batch.env_origins[[i, 0]];
        let dy = batch.root_states[[i, 1]] - batch.env_origins[[i, 1]];
        let distance = (dx * dx + dy * dy).sqrt();
        let change = level_change(distance, lin_command_norm(batch, i), env_length, batch.max_episode_length_s);
        moves.push((i, batch.terrain_levels[i] as i64 + change));
    }

    for (i, level) in moves {
        let level = if level >= max_level {
            rng.gen_range(0..max_level.max(1))
        } else {
            level.max(0)
        };
        batch.terrain_levels[i] = level as usize;
    }

    if let Some(hf) = batch.height_field.as_ref() {
        for &i in env_ids {
            let origin = hf.env_origins.slice(s![batch.terrain_levels[i], batch.terrain_types[i], ..]);
            batch.env_origins.row_mut(i).assign(&origin);
        }
    }
    debug!("Mean terrain level {}", mean_level(batch));
}

/// Mean terrain level over all instances.
pub fn mean_level(batch: &EnvironmentBatch) -> f32 {
    batch.terrain_levels.iter().sum::<usize>() as f32 / batch.num_envs.max(1) as f32
}

/// Terrain heights under the height samples of the instances `env_ids`, or
/// of every instance for `None`, `[len, P]`.
pub fn measure_heights(batch: &EnvironmentBatch, cfg: &TerrainConfig, env_ids: Option<&[usize]>) -> Result<Array2<f32>> {
    let all: Vec<usize>;
    let ids = match env_ids {
        Some(ids) => ids,
        None => {
            all = (0..batch.num_envs).collect();
            &all
        }
    };
    let num_points = batch.height_points.nrows();

    match cfg.mesh_type {
        MeshType::None => return Err(EnvError::HeightQueryUnsupported.into()),
        MeshType::Plane => return Ok(Array2::zeros((ids.len(), num_points))),
        MeshType::Heightfield | MeshType::Trimesh => {}
    }
    let hf = batch
        .height_field
        .as_ref()
        .ok_or_else(|| EnvError::MissingHeightField(cfg.mesh_type.to_string()))?;
    let samples = &hf.height_samples;
    let (rows, cols) = samples.dim();
    let max_x = rows.saturating_sub(2) as i64;
    let max_y = cols.saturating_sub(2) as i64;

    let mut heights = Array2::zeros((ids.len(), num_points));
    for (k, &i) in ids.iter().enumerate() {
        let q = quat_from_xyzw(batch.base_quat.row(i));
        for p in 0..num_points {
            let offset = quat_apply_yaw(&q, [batch.height_points[[p, 0]], batch.height_points[[p, 1]], 0.0]);
            let x = offset[0] + batch.root_states[[i, 0]] + cfg.border_size;
            let y = offset[1] + batch.root_states[[i, 1]] + cfg.border_size;
            let px = ((x / cfg.horizontal_scale) as i64).clamp(0, max_x) as usize;
            let py = ((y / cfg.horizontal_scale) as i64).clamp(0, max_y) as usize;
            let h = samples[[px, py]].min(samples[[px + 1, py]]).min(samples[[px, py + 1]]);
            heights[[k, p]] = h * cfg.vertical_scale;
        }
    }
    Ok(heights)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::CommandRanges,
        sim::{AssetInfo, DofProperties},
    };
    use approx::assert_relative_eq;
    use ndarray::Array3;
    use rand::{rngs::StdRng, SeedableRng};

    fn batch(n: usize, cfg: &TerrainConfig) -> EnvironmentBatch {
        let asset = AssetInfo {
            dof_names: vec!["a".into()],
            body_names: vec!["base".into()],
            dof_props: DofProperties::default(),
            body_masses: vec![1.0],
        };
        let mut b = EnvironmentBatch::new(n, &asset, height_points(cfg), 1, CommandRanges::default());
        b.base_quat.column_mut(3).fill(1.0);
        b.max_episode_length_s = 20.0;
        b
    }

    fn rough(num_rows: usize, num_cols: usize) -> TerrainConfig {
        TerrainConfig {
            mesh_type: MeshType::Heightfield,
            num_rows,
            num_cols,
            border_size: 1.0,
            ..Default::default()
        }
    }

    fn height_field(cfg: &TerrainConfig) -> HeightField {
        // 1 m border, 8 m tiles, 0.1 m cells
        let rows = cfg.num_rows * 80 + 20;
        let cols = cfg.num_cols * 80 + 20;
        let samples = Array2::from_shape_fn((rows, cols), |(r, _)| r as f32);
        let origins = Array3::from_shape_fn((cfg.num_rows, cfg.num_cols, 3), |(r, c, k)| match k {
            0 => (r as f32 + 0.5) * 8.0,
            1 => (c as f32 + 0.5) * 8.0,
            _ => 0.0,
        });
        HeightField {
            height_samples: samples,
            env_origins: origins,
            env_length: 8.0,
        }
    }

    #[test]
    fn test_grid_origins() {
        let cfg = TerrainConfig::default();
        let mut b = batch(5, &cfg);
        init_origins(&mut b, &cfg, 3.0, &mut StdRng::seed_from_u64(0));
        assert!(!b.custom_origins);
        // two columns
        assert_eq!(b.env_origins.row(3).to_vec(), vec![3.0, 3.0, 0.0]);
        assert_eq!(b.env_origins.row(4).to_vec(), vec![6.0, 0.0, 0.0]);
    }

    #[test]
    fn test_rough_origins() {
        let cfg = rough(4, 2);
        let mut b = batch(6, &cfg);
        b.height_field = Some(height_field(&cfg));
        init_origins(&mut b, &cfg, 3.0, &mut StdRng::seed_from_u64(0));
        assert!(b.custom_origins);
        assert_eq!(b.max_terrain_level, 4);
        assert_eq!(b.terrain_types.to_vec(), vec![0, 0, 0, 1, 1, 1]);
        for i in 0..6 {
            assert!(b.terrain_levels[i] < 4);
            assert_eq!(b.env_origins[[i, 0]], (b.terrain_levels[i] as f32 + 0.5) * 8.0);
        }
    }

    #[test]
    fn test_level_change_is_unit_step() {
        let mut rng = StdRng::seed_from_u64(2);
        for _ in 0..1000 {
            let d = rng.gen_range(0.0..10.0);
            let c = rng.gen_range(0.0..1.5);
            let change = level_change(d, c, 8.0, 20.0);
            assert!([-1, 0, 1].contains(&change));
        }
        assert_eq!(level_change(5.0, 0.0, 8.0, 20.0), 1);
        assert_eq!(level_change(1.0, 1.0, 8.0, 20.0), -1);
        assert_eq!(level_change(1.0, 0.0, 8.0, 20.0), 0);
    }

    #[test]
    fn test_curriculum_moves_levels() {
        let cfg = rough(4, 1);
        let mut b = batch(3, &cfg);
        b.height_field = Some(height_field(&cfg));
        init_origins(&mut b, &cfg, 3.0, &mut StdRng::seed_from_u64(0));
        b.init_done = true;
        b.terrain_levels.assign(&ndarray::arr1(&[0, 2, 3]));
        for i in 0..3 {
            let level = b.terrain_levels[i];
            b.env_origins[[i, 0]] = (level as f32 + 0.5) * 8.0;
            b.root_states[[i, 0]] = b.env_origins[[i, 0]];
        }
        // instance 0 walked 5 m, instance 1 stood still under a command,
        // instance 2 walked far on the last level
        b.root_states[[0, 0]] += 5.0;
        b.commands[[1, 0]] = 1.0;
        b.root_states[[2, 0]] += 6.0;

        update_terrain_curriculum(&mut b, &[0, 1, 2], &mut StdRng::seed_from_u64(0));
        assert_eq!(b.terrain_levels[0], 1);
        assert_eq!(b.terrain_levels[1], 1);
        assert!(b.terrain_levels[2] < 4);
        assert_eq!(b.env_origins[[0, 0]], 12.0);
    }

    #[test]
    fn test_measure_heights() -> Result<()> {
        let cfg = TerrainConfig {
            measured_points_x: vec![0.0, 0.5],
            measured_points_y: vec![0.0],
            ..rough(2, 2)
        };
        let mut b = batch(2, &cfg);
        b.height_field = Some(height_field(&cfg));
        b.root_states[[1, 0]] = 2.0;

        let h = measure_heights(&b, &cfg, None)?;
        assert_eq!(h.dim(), (2, 2));
        // cell x = (0 + 1) / 0.1
        assert_relative_eq!(h[[0, 0]], 10.0 * 0.005, epsilon = 1e-5);
        assert_relative_eq!(h[[1, 1]], 35.0 * 0.005, epsilon = 1e-5);

        let h = measure_heights(&b, &cfg, Some(&[]))?;
        assert_eq!(h.dim(), (0, 2));
        Ok(())
    }

    #[test]
    fn test_measure_heights_on_plane_and_none() {
        let mut cfg = TerrainConfig::default();
        let b = batch(3, &cfg);
        let h = measure_heights(&b, &cfg, Some(&[1])).unwrap();
        assert_eq!(h.dim(), (1, 187));
        assert!(h.iter().all(|&v| v == 0.0));

        cfg.mesh_type = MeshType::None;
        let err = measure_heights(&b, &cfg, None).unwrap_err();
        assert_eq!(err.downcast_ref::<EnvError>(), Some(&EnvError::HeightQueryUnsupported));
    }

    #[test]
    fn test_degenerate_height_fields() {
        let cfg = rough(1, 1);
        assert_eq!(check_height_field(&height_field(&cfg)), Ok(()));

        let mut hf = height_field(&cfg);
        hf.height_samples = Array2::zeros((1, 40));
        assert_eq!(
            check_height_field(&hf),
            Err(EnvError::DegenerateHeightField { rows: 1, cols: 40 })
        );

        let hf = height_field(&rough(0, 2));
        assert_eq!(
            check_height_field(&hf),
            Err(EnvError::EmptyTerrainGrid { levels: 0, types: 2 })
        );
    }
}
