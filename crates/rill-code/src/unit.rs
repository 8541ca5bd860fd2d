//! Compiled units

use serde::{Deserialize, Serialize};

use crate::constant::Constant;
use crate::instr::Instr;

/// An immutable compiled artifact: one flat instruction stream plus the
/// constant pool shared by every function compiled into it.
///
/// Nested functions live as [`Constant::Code`] entries recording their
/// `[start, end)` span of the shared stream together with their upvalue
/// and register counts. Constant index 0 is, by convention, the root code
/// object a loader instantiates first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    code: Vec<Instr>,
    constants: Vec<Constant>,
}

impl Unit {
    /// Create a unit from its instruction stream and constant pool
    pub fn new(code: Vec<Instr>, constants: Vec<Constant>) -> Self {
        Self { code, constants }
    }

    /// The instruction stream
    #[inline]
    pub fn code(&self) -> &[Instr] {
        &self.code
    }

    /// The constant pool
    #[inline]
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reg::Reg;

    #[test]
    fn test_unit_accessors() {
        let code = vec![Instr::recv(Reg::local(0)).unwrap()];
        let constants = vec![Constant::Int(1)];
        let unit = Unit::new(code.clone(), constants.clone());
        assert_eq!(unit.code(), code.as_slice());
        assert_eq!(unit.constants(), constants.as_slice());
    }
}
