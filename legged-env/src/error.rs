//! Errors in the environment.
use thiserror::Error;

/// Errors raised by [`LeggedEnv`](crate::LeggedEnv) and its components.
///
/// All of them are fatal: the environment is misconfigured or the batch is in
/// an inconsistent state, and the caller of `build`/`step`/`reset` receives
/// the error without any recovery attempt.
#[derive(Error, Debug, PartialEq)]
pub enum EnvError {
    /// Controller mode other than `P`, `V` or `T`.
    #[error("Unknown controller type: {0}")]
    UnknownControlMode(String),

    /// Terrain mesh type other than `none`, `plane`, `heightfield` or `trimesh`.
    #[error("Unknown terrain mesh type: {0}")]
    UnknownMeshType(String),

    /// Height measurement requested on a scene without terrain.
    #[error("Can't measure height with terrain mesh type 'none'")]
    HeightQueryUnsupported,

    /// The heightfield terrain was not provided by the simulator.
    #[error("Terrain mesh type {0} requires a heightfield from the simulator")]
    MissingHeightField(String),

    /// A joint without a default angle.
    #[error("Default angle of joint {0} is not defined")]
    MissingDefaultJointAngle(String),

    /// More than one trajectory matches the motion name.
    #[error("Motion name {name} matches {count} trajectories")]
    AmbiguousTrajectory {
        /// Configured motion name.
        name: String,
        /// Number of matching trajectories.
        count: usize,
    },

    /// No trajectory matches the motion name.
    #[error("Motion name {0} matches no trajectory")]
    NoMatchingTrajectory(String),

    /// A feature that needs reference motion is enabled without one.
    #[error("{0} requires a reference motion")]
    MotionRequired(String),

    /// The command curriculum needs the linear velocity tracking term.
    #[error("Command curriculum requires a non-zero tracking_lin_vel reward scale")]
    CurriculumWithoutTracking,

    /// Per-joint ranges do not cover every joint.
    #[error("{name} has {actual} ranges for {expected} joints")]
    JointRangeCount {
        /// Name of the option.
        name: &'static str,
        /// Number of ranges.
        actual: usize,
        /// Number of joints.
        expected: usize,
    },

    /// The reference motion does not match the robot.
    #[error("Reference motion has {motion} {what}, the robot has {robot}")]
    MotionLayoutMismatch {
        /// Quantity compared.
        what: &'static str,
        /// Value of the motion.
        motion: usize,
        /// Value of the robot.
        robot: usize,
    },

    /// A heightfield too small to interpolate heights on.
    #[error("Heightfield of {rows}x{cols} samples, at least 2x2 required")]
    DegenerateHeightField {
        /// Samples along x.
        rows: usize,
        /// Samples along y.
        cols: usize,
    },

    /// A heightfield without terrain tiles to spawn on.
    #[error("Heightfield has {levels} levels and {types} types of terrain")]
    EmptyTerrainGrid {
        /// Number of levels (rows).
        levels: usize,
        /// Number of types (columns).
        types: usize,
    },

    /// An action batch of unexpected shape.
    #[error("Expected actions of shape ({0}, {1}), got ({2}, {3})")]
    ActionShape(usize, usize, usize, usize),
}
