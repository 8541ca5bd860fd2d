//! Code format errors

use thiserror::Error;

/// Errors that can occur while building or decoding instruction words
#[derive(Debug, Error)]
pub enum CodeError {
    /// Register index does not fit the 8-bit operand field
    #[error("Register out of range: {0}")]
    RegisterOverflow(i16),

    /// Constant index does not fit the 16-bit operand field
    #[error("Constant index out of range: {0}")]
    ConstantOverflow(u32),
}

/// Result type for code operations
pub type Result<T> = std::result::Result<T, CodeError>;
