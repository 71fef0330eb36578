//! Error kinds shared by every component of the core.
//!
//! Structurally invalid inputs (bad capacity, bad index, rewinds) surface
//! immediately. Empty windows and flat inputs are not errors; the queries
//! return NaN or a carried-forward price instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{what} index {index} out of range (len {len})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("computation failed: {0}")]
    ComputationFailure(String),

    #[error("cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },
}

impl StatError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self::ComputationFailure(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, StatError>;
