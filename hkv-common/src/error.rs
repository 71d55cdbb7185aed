//! # Error Taxonomy
//!
//! The errors a Store or Router can surface to a caller, shared by every
//! crate in the workspace so a forwarded request can carry the owning
//! node's error back to the originator without translation.

use thiserror::Error;

/// Result alias used throughout the workspace.
pub type HkvResult<T> = Result<T, HkvError>;

/// Errors surfaced by the Store and the Router.
///
/// Store errors are returned verbatim through any forwarding hop; only the
/// Router introduces `Unavailable` (on a failed forward) and `Unimplemented`
/// (for the reserved `CompareAndSwap` RPC).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HkvError {
    /// Key is absent or its expiration has elapsed.
    #[error("key not found")]
    NotFound,

    /// `Add` was called on a key that is already live.
    #[error("key already exists")]
    AlreadyExists,

    /// Entry cannot fit in `max_bytes` even after evicting every other entry.
    #[error("entry does not fit in cache")]
    TooLarge,

    /// `Increment`/`Decrement` target does not decode as a varint integer.
    #[error("value is not numeric")]
    NotNumeric,

    /// Owner peer was unreachable even after one membership-refresh retry.
    #[error("owner peer unavailable")]
    Unavailable,

    /// `CompareAndSwap` has no implemented versioning protocol.
    #[error("operation not implemented")]
    Unimplemented,

    /// An invariant was violated. Should never occur in a correct build.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HkvError {
    /// Stable wire code for this error, used by the binary frame codec.
    pub const fn code(&self) -> u8 {
        match self {
            HkvError::NotFound => 1,
            HkvError::AlreadyExists => 2,
            HkvError::TooLarge => 3,
            HkvError::NotNumeric => 4,
            HkvError::Unavailable => 5,
            HkvError::Unimplemented => 6,
            HkvError::Internal(_) => 7,
        }
    }

    /// Reconstructs an error from a wire code and message.
    ///
    /// Falls back to `Internal` for unrecognized codes so a newer peer talking
    /// to an older one degrades gracefully instead of panicking.
    pub fn from_code(code: u8, message: String) -> Self {
        match code {
            1 => HkvError::NotFound,
            2 => HkvError::AlreadyExists,
            3 => HkvError::TooLarge,
            4 => HkvError::NotNumeric,
            5 => HkvError::Unavailable,
            6 => HkvError::Unimplemented,
            _ => HkvError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_roundtrip() {
        let errors = [
            HkvError::NotFound,
            HkvError::AlreadyExists,
            HkvError::TooLarge,
            HkvError::NotNumeric,
            HkvError::Unavailable,
            HkvError::Unimplemented,
        ];
        for err in errors {
            let code = err.code();
            let back = HkvError::from_code(code, err.to_string());
            assert_eq!(back, err);
        }
    }

    #[test]
    fn unknown_code_becomes_internal() {
        let err = HkvError::from_code(99, "mystery".to_string());
        assert_eq!(err, HkvError::Internal("mystery".to_string()));
    }
}
