//! The abstract error taxonomy from spec §6/§7.

use serde::{Deserialize, Serialize};

/// Closed set of exit conditions the public APIs return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    Ok,
    InvalidArg,
    NoMem,
    NotSupported,
    /// Output buffer too small / not enough data yet.
    NotEnough,
    BadData,
    Internal,
    WrongState,
    Timeout,
}

/// The error type returned by fallible `device-core` operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid argument: {0}")]
    InvalidArg(String),
    #[error("allocation failed: {0}")]
    NoMem(String),
    #[error("not supported: {0}")]
    NotSupported(String),
    #[error("not enough data/space: {0}")]
    NotEnough(String),
    #[error("bad data: {0}")]
    BadData(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("wrong state: {0}")]
    WrongState(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
}

impl CoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::InvalidArg(_) => ErrorCode::InvalidArg,
            CoreError::NoMem(_) => ErrorCode::NoMem,
            CoreError::NotSupported(_) => ErrorCode::NotSupported,
            CoreError::NotEnough(_) => ErrorCode::NotEnough,
            CoreError::BadData(_) => ErrorCode::BadData,
            CoreError::Internal(_) => ErrorCode::Internal,
            CoreError::WrongState(_) => ErrorCode::WrongState,
            CoreError::Timeout(_) => ErrorCode::Timeout,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_maps_back_to_variant() {
        let e = CoreError::WrongState("path already added".into());
        assert_eq!(e.code(), ErrorCode::WrongState);
    }
}
