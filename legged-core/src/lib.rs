#![warn(missing_docs)]
//! Core interfaces of vectorized environments.
//!
//! An environment built on this crate simulates a batch of independent
//! instances and is driven through [`Env::step`]. Instances whose episode ends
//! are reset inside the step, so a learner never calls [`Env::reset`] after the
//! first observation.
pub mod error;
pub mod record;
pub mod util;

mod base;
pub use base::{Act, Env, Info, Obs, Policy, Step};
