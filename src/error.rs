//! Interpreter errors

use thiserror::Error;

use crate::interpreter::State;

/// Interpreter result type
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The operation is not valid in the current lifecycle state.
    Lifecycle,
    /// A memory or loop-table limit was hit.
    Resource,
    /// The caller supplied an unusable tape buffer or chunk.
    Input,
    /// The program's brackets do not match.
    Syntax,
    /// The chunk source did not supply instructions when they were needed.
    Collaborator,
}

/// Interpreter errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("{operation} is not allowed while {state:?}")]
    Invalid {
        operation: &'static str,
        state: State,
    },

    #[error("interpreter is already processing")]
    WouldBlock,

    #[error("could not allocate {bytes} bytes")]
    Allocation { bytes: usize },

    #[error("tape length must be non-zero")]
    ZeroLengthTape,

    #[error("tape buffer holds {len} bytes, {required} required")]
    BufferTooShort { len: usize, required: usize },

    #[error("empty chunk at instruction {start}")]
    EmptyChunk { start: usize },

    #[error("loop at instruction {position} exceeds loop table capacity {capacity}")]
    LoopCapacityExceeded { position: usize, capacity: usize },

    #[error("unmatched '{bracket}' at instruction {position}")]
    UnmatchedBracket { position: usize, bracket: char },

    #[error("bracket at instruction {position} has no loop table entry")]
    LoopNotIndexed { position: usize },

    #[error("no chunk available for instruction {position}")]
    UnknownChunk { position: usize },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Invalid { .. } | Error::WouldBlock => ErrorKind::Lifecycle,
            Error::Allocation { .. } | Error::LoopCapacityExceeded { .. } => ErrorKind::Resource,
            Error::ZeroLengthTape | Error::BufferTooShort { .. } | Error::EmptyChunk { .. } => {
                ErrorKind::Input
            }
            Error::UnmatchedBracket { .. } => ErrorKind::Syntax,
            Error::UnknownChunk { .. } | Error::LoopNotIndexed { .. } => ErrorKind::Collaborator,
        }
    }
}
