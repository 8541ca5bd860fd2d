//! Constants embedded in compiled units

use serde::{Deserialize, Serialize};

/// A constant in a unit's constant pool.
///
/// Pools are deduplicated by structural equality; float constants compare
/// by bit pattern so that `NaN` dedups and `-0.0` stays distinct from `0.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Constant {
    /// Nil
    Nil,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// String
    Str(String),
    /// A nested code template for closures created within this unit
    Code {
        /// Start offset into the unit's instruction stream
        start: usize,
        /// End offset (exclusive)
        end: usize,
        /// Number of upvalue slots a closure of this code captures
        upvalue_count: u16,
        /// Number of local registers a frame of this code needs
        reg_count: u16,
    },
}

impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Nil, Self::Nil) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Str(a), Self::Str(b)) => a == b,
            (
                Self::Code {
                    start: s1,
                    end: e1,
                    upvalue_count: u1,
                    reg_count: r1,
                },
                Self::Code {
                    start: s2,
                    end: e2,
                    upvalue_count: u2,
                    reg_count: r2,
                },
            ) => s1 == s2 && e1 == e2 && u1 == u2 && r1 == r2,
            _ => false,
        }
    }
}

impl Eq for Constant {}

impl Constant {
    /// Short rendering for disassembly listings
    pub fn short_string(&self) -> String {
        match self {
            Self::Nil => "nil".to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Int(n) => n.to_string(),
            Self::Float(x) => format!("{x:?}"),
            Self::Str(s) => {
                if s.chars().count() <= 16 {
                    format!("{s:?}")
                } else {
                    let head: String = s.chars().take(16).collect();
                    format!("{head:?}...")
                }
            }
            Self::Code { start, end, .. } => format!("code[{start}:{end}]"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_float_equality_by_bits() {
        assert_eq!(Constant::Float(f64::NAN), Constant::Float(f64::NAN));
        assert_ne!(Constant::Float(0.0), Constant::Float(-0.0));
        assert_eq!(Constant::Float(1.5), Constant::Float(1.5));
    }

    #[test]
    fn test_short_string_truncates() {
        let k = Constant::Str("a very long string constant".to_string());
        assert!(k.short_string().ends_with("..."));
        assert_eq!(Constant::Str("hi".to_string()).short_string(), "\"hi\"");
    }
}
