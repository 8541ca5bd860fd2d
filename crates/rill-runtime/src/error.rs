//! Runtime error types

use thiserror::Error;

use crate::quota::QuotaKind;

/// A runtime execution error
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RtError {
    /// An operation was applied to values of the wrong type
    #[error("type error: {0}")]
    Type(String),

    /// A value had the right type but an unacceptable shape
    #[error("value error: {0}")]
    Value(String),

    /// A closure was invoked before all of its upvalues were filled
    #[error("closure not ready: {filled} of {expected} upvalues filled")]
    ClosureNotReady {
        /// Upvalues filled so far
        filled: usize,
        /// Upvalues the code template declares
        expected: usize,
    },

    /// A resource budget was exhausted.
    ///
    /// `level` identifies the quota frame whose limit broke, so the
    /// call-context boundary that installed it can recognize its own
    /// signal and convert it to a normal return; every other boundary
    /// must let it pass.
    #[error("quota exceeded: {kind} at level {level}")]
    QuotaExceeded {
        /// Which budget broke
        kind: QuotaKind,
        /// Index of the violated frame in the thread's quota stack
        level: usize,
    },

    /// An invariant of the execution engine was violated
    #[error("internal error: {0}")]
    Internal(String),
}

impl RtError {
    /// Type mismatch in an operation
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    /// Malformed value passed to a runtime entry point
    pub fn value_error(msg: impl Into<String>) -> Self {
        Self::Value(msg.into())
    }

    /// Engine invariant violation
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Convenience alias for runtime results
pub type RtResult<T> = Result<T, RtError>;
