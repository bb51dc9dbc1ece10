//! Error types for the resilience engine.
//!
//! Almost nothing here reaches a caller: storage failures degrade to cache
//! misses, lock failures degrade to unprotected execution and bloom-filter
//! failures fail open. The variants exist so adapters can report *what* went
//! wrong and so the pipeline can log it before choosing the fallback path.

use thiserror::Error;

/// Result type alias for shield operations.
pub type Result<T> = core::result::Result<T, ShieldError>;

/// Error produced by a value loader (the source-of-truth call).
pub type LoaderError = Box<dyn std::error::Error + Send + Sync>;

/// Crate-level error.
#[derive(Debug, Error)]
pub enum ShieldError {
    /// The storage adapter failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A lock manager failed.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),

    /// A cached value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The loader itself failed. This is the caller's own error and is
    /// returned unchanged.
    #[error("loader failed: {0}")]
    Loader(LoaderError),

    /// Invalid configuration or missing wiring, reported at construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// The cache key failed validation.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyViolation),

    /// A background thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

impl ShieldError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns `true` if this error came from the loader.
    pub fn is_loader(&self) -> bool {
        matches!(self, Self::Loader(_))
    }
}

/// Errors raised by [`Storage`](crate::storage::Storage) adapters.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Connection could not be established or was lost.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The backend rejected or failed a command.
    #[error("command `{command}` failed: {message}")]
    Command {
        /// Command name (GET, SET, DEL, ...).
        command: &'static str,
        /// Backend message.
        message: String,
    },
}

impl StorageError {
    /// Creates a command error.
    pub fn command(command: &'static str, message: impl Into<String>) -> Self {
        Self::Command {
            command,
            message: message.into(),
        }
    }
}

/// Errors raised while acquiring or releasing locks.
#[derive(Debug, Error)]
pub enum LockError {
    /// The wait was interrupted before the lock could be taken.
    #[error("lock wait interrupted for key `{0}`")]
    Interrupted(String),

    /// The lock backend failed.
    #[error("lock backend `{backend}` failed: {message}")]
    Backend {
        /// Name of the lock manager.
        backend: String,
        /// Backend message.
        message: String,
    },
}

impl LockError {
    /// Creates a backend error.
    pub fn backend(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Backend {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// Reasons a cache key is refused before it reaches storage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyViolation {
    /// Empty or whitespace-only key.
    #[error("key is empty")]
    Empty,

    /// Key longer than the configured limit.
    #[error("key length {len} exceeds {max}")]
    TooLong {
        /// Actual length in bytes.
        len: usize,
        /// Configured limit.
        max: usize,
    },

    /// Key contains a control character.
    #[error("key contains control character {0:?}")]
    ControlCharacter(char),

    /// Glob metacharacter in a single-key operation.
    #[error("key contains wildcard {0:?}")]
    Wildcard(char),

    /// Key matches a blocked pattern.
    #[error("key matches blocked pattern `{0}`")]
    BlockedPattern(String),
}

/// Errors raised by value codecs.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Encoding failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Decoding failed.
    #[error("decode failed: {0}")]
    Decode(String),
}
