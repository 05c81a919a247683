use thiserror::Error;

/// Errors raised while loading or querying reference motions.
#[derive(Error, Debug, PartialEq)]
pub enum MotionError {
    /// A frame does not have the number of columns the layout requires.
    #[error("Trajectory {name}: frames have {actual} columns, expected {expected}")]
    FrameWidth {
        /// Trajectory name.
        name: String,
        /// Columns in the frame.
        actual: usize,
        /// Columns required by the layout.
        expected: usize,
    },

    /// A trajectory without frames.
    #[error("Trajectory {0} has no frames")]
    EmptyTrajectory(String),

    /// Non-positive frame duration.
    #[error("Trajectory {0} has a non-positive frame duration")]
    FrameDuration(String),

    /// No trajectory was loaded.
    #[error("Motion library has no trajectories")]
    NoTrajectories,

    /// A trajectory index outside the library.
    #[error("Trajectory index {0} is out of range")]
    TrajectoryIndex(usize),

    /// Mismatched lengths of the trajectory index and time arguments.
    #[error("Got {ids} trajectory indices and {times} times")]
    QueryLength {
        /// Number of trajectory indices.
        ids: usize,
        /// Number of times.
        times: usize,
    },
}
