//! Register operands

use serde::{Deserialize, Serialize};

use crate::error::{CodeError, Result};

/// Maximum number of local registers per function
pub const MAX_LOCALS: u16 = 128;

/// Maximum number of captured upvalues per function
pub const MAX_UPVALUES: u16 = 128;

/// A register address.
///
/// Non-negative values address a slot in the frame's own register array;
/// negative values address a slot in the frame's captured-upvalue array,
/// where upvalue `k` is encoded as `-(k + 1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Reg(i16);

impl Reg {
    /// Create a local register
    #[inline]
    pub const fn local(index: u16) -> Self {
        Self(index as i16)
    }

    /// Create an upvalue register for capture slot `index`
    #[inline]
    pub const fn upvalue(index: u16) -> Self {
        Self(-(index as i16) - 1)
    }

    /// Is this an upvalue address
    #[inline]
    pub const fn is_upvalue(self) -> bool {
        self.0 < 0
    }

    /// Index into the local register array.
    ///
    /// Only meaningful when `!is_upvalue()`.
    #[inline]
    pub const fn local_index(self) -> usize {
        self.0 as usize
    }

    /// Index into the captured-upvalue array.
    ///
    /// Only meaningful when `is_upvalue()`.
    #[inline]
    pub const fn upvalue_index(self) -> usize {
        (-self.0 - 1) as usize
    }

    /// Pack into the 8-bit instruction field (1 tag bit + 7 index bits)
    pub(crate) fn encode(self) -> Result<u32> {
        if self.is_upvalue() {
            let idx = self.upvalue_index();
            if idx >= MAX_UPVALUES as usize {
                return Err(CodeError::RegisterOverflow(self.0));
            }
            Ok(0x80 | idx as u32)
        } else {
            let idx = self.local_index();
            if idx >= MAX_LOCALS as usize {
                return Err(CodeError::RegisterOverflow(self.0));
            }
            Ok(idx as u32)
        }
    }

    /// Unpack from the 8-bit instruction field
    pub(crate) fn decode(bits: u32) -> Self {
        let bits = bits & 0xFF;
        if bits & 0x80 != 0 {
            Self::upvalue((bits & 0x7F) as u16)
        } else {
            Self::local(bits as u16)
        }
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_upvalue() {
            write!(f, "u{}", self.upvalue_index())
        } else {
            write!(f, "r{}", self.local_index())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_addressing() {
        let r = Reg::local(5);
        assert!(!r.is_upvalue());
        assert_eq!(r.local_index(), 5);
        assert_eq!(r.to_string(), "r5");
    }

    #[test]
    fn test_upvalue_addressing() {
        let r = Reg::upvalue(0);
        assert!(r.is_upvalue());
        assert_eq!(r.upvalue_index(), 0);
        let r = Reg::upvalue(3);
        assert_eq!(r.upvalue_index(), 3);
        assert_eq!(r.to_string(), "u3");
    }

    #[test]
    fn test_encode_decode_round_trip() {
        for i in 0..MAX_LOCALS {
            let r = Reg::local(i);
            assert_eq!(Reg::decode(r.encode().unwrap()), r);
        }
        for i in 0..MAX_UPVALUES {
            let r = Reg::upvalue(i);
            assert_eq!(Reg::decode(r.encode().unwrap()), r);
        }
    }

    #[test]
    fn test_encode_overflow() {
        assert!(Reg::local(MAX_LOCALS).encode().is_err());
        assert!(Reg::upvalue(MAX_UPVALUES).encode().is_err());
    }
}
