//! Code objects and closures

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use rill_code::Instr;

use crate::error::{RtError, RtResult};
use crate::value::{UpvalueCell, Value};

/// The loaded form of one unit: the instruction stream plus the
/// materialized constant array shared by every code object in the unit.
///
/// Constants are installed in a second phase after the image exists,
/// because code constants hold an `Arc` back to the image itself. That
/// reference cycle keeps a loaded unit alive for as long as any of its
/// values are reachable, which is the intended lifetime.
#[derive(Debug)]
pub struct UnitImage {
    code: Vec<Instr>,
    constants: OnceLock<Vec<Value>>,
}

impl UnitImage {
    pub(crate) fn new(code: Vec<Instr>) -> Self {
        Self {
            code,
            constants: OnceLock::new(),
        }
    }

    pub(crate) fn install_constants(&self, constants: Vec<Value>) {
        if self.constants.set(constants).is_err() {
            panic!("unit constants installed twice");
        }
    }

    fn constants(&self) -> RtResult<&[Value]> {
        self.constants
            .get()
            .map(Vec::as_slice)
            .ok_or_else(|| RtError::internal("unit constants not installed"))
    }
}

/// A runtime code object: a span of a loaded unit's instruction stream
/// plus the frame dimensions a continuation needs.
#[derive(Debug)]
pub struct Code {
    image: Arc<UnitImage>,
    start: usize,
    end: usize,
    upvalue_count: usize,
    reg_count: usize,
}

impl Code {
    pub(crate) fn new(
        image: Arc<UnitImage>,
        start: usize,
        end: usize,
        upvalue_count: usize,
        reg_count: usize,
    ) -> Self {
        Self {
            image,
            start,
            end,
            upvalue_count,
            reg_count,
        }
    }

    /// Number of upvalues a closure over this code must fill
    #[inline]
    pub fn upvalue_count(&self) -> usize {
        self.upvalue_count
    }

    /// Registers a frame running this code needs
    #[inline]
    pub fn reg_count(&self) -> usize {
        self.reg_count
    }

    /// First instruction offset
    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    /// The instruction at absolute offset `pc`, when still inside this
    /// code object's span.
    #[inline]
    pub fn instr(&self, pc: usize) -> Option<Instr> {
        if pc >= self.start && pc < self.end {
            Some(self.image.code[pc])
        } else {
            None
        }
    }

    /// Look a constant up in the unit's shared pool
    pub fn constant(&self, kidx: u32) -> RtResult<Value> {
        let constants = self.image.constants()?;
        constants
            .get(kidx as usize)
            .cloned()
            .ok_or_else(|| RtError::internal(format!("constant index {kidx} out of range")))
    }
}

/// A closure: code plus captured upvalue cells.
///
/// Cells are appended write-once in capture order by the fill-upvalue
/// instruction; the closure is callable only once every declared slot is
/// filled.
#[derive(Debug)]
pub struct Closure {
    code: Arc<Code>,
    upvalues: Mutex<Vec<UpvalueCell>>,
}

impl Closure {
    /// Create a closure with no upvalues filled yet
    pub fn new(code: Arc<Code>) -> Self {
        Self {
            upvalues: Mutex::new(Vec::with_capacity(code.upvalue_count())),
            code,
        }
    }

    /// The closure's code template
    #[inline]
    pub fn code(&self) -> &Arc<Code> {
        &self.code
    }

    /// Fill the next upvalue slot with a fresh cell holding `value`
    pub fn fill_upvalue(&self, value: Value) -> RtResult<()> {
        let mut upvalues = self.upvalues.lock();
        if upvalues.len() >= self.code.upvalue_count() {
            return Err(RtError::internal("closure upvalues already filled"));
        }
        upvalues.push(UpvalueCell::new(value));
        Ok(())
    }

    /// Snapshot the cells for a new continuation; errors when slots are
    /// still missing.
    pub fn ready_upvalues(&self) -> RtResult<Vec<UpvalueCell>> {
        let upvalues = self.upvalues.lock();
        if upvalues.len() != self.code.upvalue_count() {
            return Err(RtError::ClosureNotReady {
                filled: upvalues.len(),
                expected: self.code.upvalue_count(),
            });
        }
        Ok(upvalues.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_code(upvalue_count: usize) -> Arc<Code> {
        let image = Arc::new(UnitImage::new(vec![]));
        image.install_constants(vec![]);
        Arc::new(Code::new(image, 0, 0, upvalue_count, 4))
    }

    #[test]
    fn test_closure_not_ready_until_filled() {
        let clos = Closure::new(test_code(2));
        assert!(matches!(
            clos.ready_upvalues(),
            Err(RtError::ClosureNotReady {
                filled: 0,
                expected: 2
            })
        ));

        clos.fill_upvalue(Value::Int(1)).unwrap();
        clos.fill_upvalue(Value::Int(2)).unwrap();
        let cells = clos.ready_upvalues().unwrap();
        assert_eq!(cells.len(), 2);
        assert!(cells[0].get().rill_eq(&Value::Int(1)));
        assert!(cells[1].get().rill_eq(&Value::Int(2)));
    }

    #[test]
    fn test_overfilling_is_an_internal_error() {
        let clos = Closure::new(test_code(1));
        clos.fill_upvalue(Value::Nil).unwrap();
        assert!(clos.fill_upvalue(Value::Nil).is_err());
    }
}
