//! Compilation errors

use thiserror::Error;

/// Compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    /// Function body needs more registers than the encoding allows
    #[error("Too many registers (max {})", rill_code::reg::MAX_LOCALS)]
    TooManyRegisters,

    /// Function captures more upvalues than the encoding allows
    #[error("Too many upvalues (max {})", rill_code::reg::MAX_UPVALUES)]
    TooManyUpvalues,

    /// Constant pool index does not fit the instruction word
    #[error("Too many constants (max 65536)")]
    TooManyConstants,

    /// Jump distance does not fit the instruction word
    #[error("Jump too far")]
    JumpTooFar,

    /// Internal compiler error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CompileError {
    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<rill_code::CodeError> for CompileError {
    fn from(err: rill_code::CodeError) -> Self {
        use rill_code::CodeError;
        match err {
            CodeError::RegisterOverflow(_) => Self::TooManyRegisters,
            CodeError::ConstantOverflow(_) => Self::TooManyConstants,
        }
    }
}

/// Result type for compilation
pub type CompileResult<T> = Result<T, CompileError>;
