use core::fmt;

use crate::arena::ArenaError;

/// An error returned by the allocator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocError {
    /// The heap couldn't be extended enough to satisfy a request.
    OutOfMemory {
        /// The amount of bytes the failed request needed.
        requested: usize,
        /// The amount of bytes the arena could still hand out.
        available: usize,
    },
    /// The given [`HeapConfig`](crate::HeapConfig) can't be used.
    InvalidConfig { reason: &'static str },
    /// `init` was called on an allocator that was already initialized.
    AlreadyInitialized,
    /// The allocator was used before `init` was called.
    Uninitialized,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory {
                requested,
                available,
            } => write!(
                f,
                "out of memory: requested {} bytes, but only {} are available",
                requested, available
            ),
            Self::InvalidConfig { reason } => write!(f, "invalid heap config: {}", reason),
            Self::AlreadyInitialized => write!(f, "the heap was already initialized"),
            Self::Uninitialized => write!(f, "the heap was not initialized"),
        }
    }
}

impl core::error::Error for AllocError {}

impl From<ArenaError> for AllocError {
    fn from(err: ArenaError) -> Self {
        match err {
            ArenaError::Exhausted {
                requested,
                available,
            } => Self::OutOfMemory {
                requested,
                available,
            },
        }
    }
}
