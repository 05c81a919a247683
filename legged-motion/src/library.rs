//! In-memory motion library.
use crate::{FrameLayout, MotionError, MotionProvider};
use anyhow::{Context, Result};
use log::info;
use nalgebra::{Quaternion, UnitQuaternion};
use ndarray::{aview1, s, Array2, ArrayView1, ArrayViewMut1};
use rand::{distributions::WeightedIndex, prelude::Distribution, Rng};
use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::PathBuf};

/// Configuration of [`MotionLibrary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionLibraryConfig {
    /// Paths of JSON trajectory files.
    pub files: Vec<PathBuf>,

    /// Frame layout shared by all files.
    pub layout: FrameLayout,

    /// Overrides the frame duration declared in the files.
    pub frame_duration: Option<f32>,
}

impl Default for MotionLibraryConfig {
    fn default() -> Self {
        Self {
            files: vec![],
            layout: FrameLayout::default(),
            frame_duration: None,
        }
    }
}

impl MotionLibraryConfig {
    /// Adds a trajectory file.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Sets the frame layout.
    pub fn layout(mut self, layout: FrameLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Overrides the frame duration of every file.
    pub fn frame_duration(mut self, v: f32) -> Self {
        self.frame_duration = Some(v);
        self
    }
}

/// On-disk representation of a trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrajectoryFile {
    /// Name of the trajectory. Defaults to the file stem.
    #[serde(default)]
    pub name: Option<String>,

    /// Seconds between consecutive frames.
    pub frame_duration: f32,

    /// Sampling weight of the trajectory in [`MotionProvider::random_frames`].
    #[serde(default = "default_weight")]
    pub weight: f32,

    /// Frames, one row per time step.
    pub frames: Vec<Vec<f32>>,
}

fn default_weight() -> f32 {
    1.0
}

/// A trajectory of reference frames.
#[derive(Debug, Clone)]
pub struct Trajectory {
    /// Name used to select the trajectory.
    pub name: String,
    /// Seconds between consecutive frames.
    pub frame_duration: f32,
    /// Sampling weight.
    pub weight: f32,
    /// Frames, one row per keyframe.
    pub frames: Array2<f32>,
}

impl Trajectory {
    /// Duration in seconds, `(n_frames - 1) * frame_duration`.
    pub fn duration(&self) -> f32 {
        (self.frames.nrows().saturating_sub(1)) as f32 * self.frame_duration
    }

    fn from_file(file: TrajectoryFile, default_name: String) -> Result<Self> {
        let name = file.name.unwrap_or(default_name);
        let n_cols = file.frames.first().map(|f| f.len()).unwrap_or(0);
        let n_rows = file.frames.len();
        let data: Vec<f32> = file.frames.into_iter().flatten().collect();
        if data.len() != n_rows * n_cols {
            anyhow::bail!("Trajectory {}: frames have different lengths", name);
        }
        Ok(Self {
            frames: Array2::from_shape_vec((n_rows, n_cols), data)?,
            name,
            frame_duration: file.frame_duration,
            weight: file.weight,
        })
    }
}

/// Reference motions held in memory.
///
/// Frames between keyframes are linearly interpolated, except the root
/// rotation which is spherically interpolated.
#[derive(Debug, Clone)]
pub struct MotionLibrary {
    layout: FrameLayout,
    names: Vec<String>,
    trajectories: Vec<Trajectory>,
    sampler: WeightedIndex<f32>,
}

impl MotionLibrary {
    /// Creates a library from trajectories.
    pub fn from_trajectories(layout: FrameLayout, trajectories: Vec<Trajectory>) -> Result<Self> {
        if trajectories.is_empty() {
            return Err(MotionError::NoTrajectories.into());
        }
        for traj in trajectories.iter() {
            if traj.frames.nrows() == 0 {
                return Err(MotionError::EmptyTrajectory(traj.name.clone()).into());
            }
            if traj.frame_duration <= 0.0 {
                return Err(MotionError::FrameDuration(traj.name.clone()).into());
            }
            if traj.frames.ncols() != layout.width() {
                return Err(MotionError::FrameWidth {
                    name: traj.name.clone(),
                    actual: traj.frames.ncols(),
                    expected: layout.width(),
                }
                .into());
            }
        }
        let sampler = WeightedIndex::new(trajectories.iter().map(|t| t.weight))
            .context("Invalid trajectory weights")?;

        Ok(Self {
            layout,
            names: trajectories.iter().map(|t| t.name.clone()).collect(),
            trajectories,
            sampler,
        })
    }

    fn trajectory(&self, traj_id: usize) -> Result<&Trajectory> {
        self.trajectories
            .get(traj_id)
            .ok_or_else(|| MotionError::TrajectoryIndex(traj_id).into())
    }

    /// Writes the frame of `traj` at time `t` into `out`.
    fn interpolate(&self, traj: &Trajectory, t: f32, mut out: ArrayViewMut1<f32>) {
        let n = traj.frames.nrows();
        let t = t.clamp(0.0, traj.duration());
        let idx0 = ((t / traj.frame_duration).floor() as usize).min(n - 1);
        let idx1 = (idx0 + 1).min(n - 1);
        let blend = if idx0 == idx1 {
            0.0
        } else {
            ((t - idx0 as f32 * traj.frame_duration) / traj.frame_duration).clamp(0.0, 1.0)
        };

        let f0 = traj.frames.row(idx0);
        let f1 = traj.frames.row(idx1);
        out.assign(&(&f0 * (1.0 - blend) + &f1 * blend));

        let rot = self.layout.root_rot();
        let q = slerp(
            f0.slice(s![rot.clone()]),
            f1.slice(s![rot.clone()]),
            blend,
        );
        out.slice_mut(s![rot]).assign(&aview1(&q));
    }
}

/// Spherical interpolation of two xyzw quaternions along the shortest arc.
fn slerp(q0: ArrayView1<f32>, q1: ArrayView1<f32>, t: f32) -> [f32; 4] {
    let a = UnitQuaternion::from_quaternion(Quaternion::new(q0[3], q0[0], q0[1], q0[2]));
    let mut b = UnitQuaternion::from_quaternion(Quaternion::new(q1[3], q1[0], q1[1], q1[2]));
    if a.coords.dot(&b.coords) < 0.0 {
        b = UnitQuaternion::new_unchecked(-b.into_inner());
    }
    let q = a.try_slerp(&b, t, 1.0e-6).unwrap_or_else(|| a.nlerp(&b, t));
    [q.i, q.j, q.k, q.w]
}

impl MotionProvider for MotionLibrary {
    type Config = MotionLibraryConfig;

    fn build(config: &Self::Config) -> Result<Self> {
        let mut trajectories = vec![];
        for path in config.files.iter() {
            let file = File::open(path)
                .with_context(|| format!("Failed to open motion file {:?}", path))?;
            let traj_file: TrajectoryFile = serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("Failed to parse motion file {:?}", path))?;
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut traj = Trajectory::from_file(traj_file, stem)?;
            if let Some(fd) = config.frame_duration {
                traj.frame_duration = fd;
            }
            info!(
                "Loaded trajectory {} ({} frames, {:.3} s)",
                traj.name,
                traj.frames.nrows(),
                traj.duration()
            );
            trajectories.push(traj);
        }
        Self::from_trajectories(config.layout, trajectories)
    }

    fn layout(&self) -> FrameLayout {
        self.layout
    }

    fn trajectory_names(&self) -> &[String] {
        &self.names
    }

    fn trajectory_duration(&self, traj_id: usize) -> Result<f32> {
        Ok(self.trajectory(traj_id)?.duration())
    }

    fn frames_at_time(&self, traj_ids: &[usize], times: &[f32]) -> Result<Array2<f32>> {
        if traj_ids.len() != times.len() {
            return Err(MotionError::QueryLength {
                ids: traj_ids.len(),
                times: times.len(),
            }
            .into());
        }
        let mut frames = Array2::zeros((traj_ids.len(), self.layout.width()));
        for (i, (&id, &t)) in traj_ids.iter().zip(times.iter()).enumerate() {
            let traj = self.trajectory(id)?;
            self.interpolate(traj, t, frames.row_mut(i));
        }
        Ok(frames)
    }

    fn random_frames<R: Rng + ?Sized>(&self, count: usize, rng: &mut R) -> Result<Array2<f32>> {
        let mut ids = Vec::with_capacity(count);
        let mut times = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.sampler.sample(rng);
            ids.push(id);
            times.push(rng.gen::<f32>() * self.trajectories[id].duration());
        }
        self.frames_at_time(&ids, &times)
    }
}
