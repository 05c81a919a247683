#![warn(missing_docs)]
//! Reference motions for legged-robot environments.
//!
//! A reference motion is a set of trajectories of fixed-layout frames
//! (see [`FrameLayout`]). Environments query frames through the
//! [`MotionProvider`] trait, either at given times of given trajectories
//! or as random samples for reference state initialization.
//! [`MotionLibrary`] is an in-memory provider loading trajectories from JSON
//! files.
mod error;
mod layout;
mod library;
mod provider;

pub use error::MotionError;
pub use layout::FrameLayout;
pub use library::{MotionLibrary, MotionLibraryConfig, Trajectory, TrajectoryFile};
pub use provider::MotionProvider;
