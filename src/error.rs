//! Errors raised while simulating or reading records.
//!
//! Configuration loading has its own error type in [`crate::config`].

use thiserror::Error;

use crate::signal::BlockColor;
use crate::types::{BlockId, Position};

/// Errors that can occur inside the simulation core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("Path index {index} out of range for a path of {len} segments")]
    PathIndex { index: usize, len: usize },

    #[error("Path is empty")]
    EmptyPath,

    #[error("Malformed path segment {index}: {reason}")]
    MalformedSegment { index: usize, reason: String },

    #[error("No track from {from} to {to}")]
    MissingTrack { from: Position, to: Position },

    #[error("Record field `{0}` has an unexpected type")]
    RecordField(String),

    #[error("Signal blocks {first} and {second} of color {color:?} are adjacent")]
    AdjacentBlocks {
        color: BlockColor,
        first: BlockId,
        second: BlockId,
    },
}

/// Result type for simulation operations.
pub type SimResult<T> = Result<T, SimError>;
