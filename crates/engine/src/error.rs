//! Error taxonomy for the engine facade.
//!
//! Internal plumbing (recovery, flush, compaction) works in `anyhow::Result`
//! so call sites can freely add context; errors are converted to a typed
//! [`EngineError`] only at the public boundary.

use thiserror::Error;

/// Errors returned by every public [`crate::Engine`] operation.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested key does not exist. Only returned by operations that
    /// distinguish "absent" from "empty value" — `get`/`has` return `Ok(None)`
    /// / `Ok(false)` instead.
    #[error("key not found")]
    NotFound,

    /// An underlying I/O failure (disk full, permission denied, file
    /// vanished between open and read, ...).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A WAL frame or sorted-run record failed validation (bad CRC, bad
    /// magic, truncated length-prefixed field).
    #[error("corrupt record: {0}")]
    CorruptRecord(String),

    /// The engine is in `Closing` or `Closed` state; the operation was
    /// rejected without touching disk.
    #[error("engine is closed")]
    Closed,

    /// A caller-supplied argument violates a documented constraint (key/value
    /// too large, empty key, invalid options).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// `incr`/`decr` could not parse the existing value as a number.
    #[error("numeric format error: {0}")]
    NumericFormat(String),

    /// The engine could not make room to satisfy the request (e.g. a
    /// background worker is wedged and memtables keep piling up).
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(e: anyhow::Error) -> Self {
        if let Some(io_err) = e.downcast_ref::<std::io::Error>() {
            return EngineError::Io(std::io::Error::new(io_err.kind(), io_err.to_string()));
        }
        if let Some(wal_err) = e.downcast_ref::<wal::WalError>() {
            return match wal_err {
                wal::WalError::Io(io_err) => {
                    EngineError::Io(std::io::Error::new(io_err.kind(), io_err.to_string()))
                }
                wal::WalError::Corrupt => {
                    EngineError::CorruptRecord("wal frame failed crc validation".into())
                }
            };
        }
        EngineError::CorruptRecord(e.to_string())
    }
}

impl From<wal::WalError> for EngineError {
    fn from(e: wal::WalError) -> Self {
        match e {
            wal::WalError::Io(io_err) => EngineError::Io(io_err),
            wal::WalError::Corrupt => {
                EngineError::CorruptRecord("wal frame failed crc validation".into())
            }
        }
    }
}
