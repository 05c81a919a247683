//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug, PartialEq)]
pub enum LeggedError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: expected {expected} for key {key}")]
    RecordValueTypeError {
        /// Key of the value.
        key: String,
        /// Name of the expected variant.
        expected: &'static str,
    },
}
