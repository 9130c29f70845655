//! Error types for cache and file operations.

use std::fmt;
use std::io;

/// Errors that can occur in the cache pool and filesystem factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// The refill unit is not a multiple of 4096 bytes.
    InvalidRefillUnit,

    /// The store is not present in the pool registry.
    NotRegistered,

    /// A refill loop made no progress against the store.
    RefillStalled,

    /// Operation not supported by this file implementation.
    Unsupported,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRefillUnit => write!(f, "refill unit must be a multiple of 4096 bytes"),
            Self::NotRegistered => write!(f, "store not registered in pool"),
            Self::RefillStalled => write!(f, "refill made no progress"),
            Self::Unsupported => write!(f, "operation not supported"),
        }
    }
}

impl std::error::Error for CacheError {}

impl From<CacheError> for io::Error {
    fn from(err: CacheError) -> Self {
        let kind = match err {
            CacheError::InvalidRefillUnit => io::ErrorKind::InvalidInput,
            CacheError::NotRegistered => io::ErrorKind::NotFound,
            CacheError::RefillStalled => io::ErrorKind::TimedOut,
            CacheError::Unsupported => io::ErrorKind::Unsupported,
        };
        io::Error::new(kind, err)
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
