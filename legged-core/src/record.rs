//! Records of environment statistics.
//!
//! A vectorized environment reports per-episode statistics (reward term sums,
//! curriculum levels, timeout flags) in a [`Record`] returned from every step.
//! Records are written to a [`Recorder`], which may keep them
//! ([`BufferedRecorder`]) or discard them ([`NullRecorder`]).
//! [`RecordStorage`] aggregates stored scalars into min/max/mean/median.
//!
//! ```rust
//! use legged_core::record::{Record, RecordValue};
//!
//! let mut record = Record::empty();
//! record.insert("rew_tracking_lin_vel", RecordValue::Scalar(0.8));
//! record.insert("time_outs", RecordValue::Array1(vec![0.0, 1.0]));
//! assert_eq!(record.get_scalar("rew_tracking_lin_vel").unwrap(), 0.8);
//! ```
mod base;
mod buffered_recorder;
mod null_recorder;
mod recorder;
mod storage;

pub use base::{Record, RecordValue};
pub use buffered_recorder::BufferedRecorder;
pub use null_recorder::NullRecorder;
pub use recorder::Recorder;
pub use storage::RecordStorage;
