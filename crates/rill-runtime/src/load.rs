//! Unit loading
//!
//! Turns a compiled [`Unit`] into live runtime values: constants are
//! materialized once into a shared array, code constants become
//! [`Code`] objects over the shared instruction stream, and the root
//! code object (constant 0) runs once with the global environment as
//! its single argument to produce the program's top-level closure.

use std::sync::Arc;

use rill_code::{Constant, Unit};

use crate::closure::{Closure, Code, UnitImage};
use crate::error::{RtError, RtResult};
use crate::thread::Thread;
use crate::value::Value;

/// Materialize a unit and run its bootstrap, returning the top-level
/// closure. `env` is the global environment the chunk captures.
pub fn load_unit(thread: &mut Thread, unit: &Unit, env: Value) -> RtResult<Value> {
    let image = Arc::new(UnitImage::new(unit.code().to_vec()));

    let mut root_code = None;
    let constants: Vec<Value> = unit
        .constants()
        .iter()
        .enumerate()
        .map(|(i, k)| match k {
            Constant::Nil => Value::Nil,
            Constant::Bool(b) => Value::Bool(*b),
            Constant::Int(n) => Value::Int(*n),
            Constant::Float(x) => Value::Float(*x),
            Constant::Str(s) => Value::str(s),
            Constant::Code {
                start,
                end,
                upvalue_count,
                reg_count,
            } => {
                let code = Arc::new(Code::new(
                    image.clone(),
                    *start,
                    *end,
                    *upvalue_count as usize,
                    *reg_count as usize,
                ));
                if i == 0 {
                    root_code = Some(code.clone());
                }
                Value::Code(code)
            }
        })
        .collect();
    image.install_constants(constants);

    let root_code =
        root_code.ok_or_else(|| RtError::internal("unit constant 0 is not a code object"))?;
    if root_code.upvalue_count() != 0 {
        return Err(RtError::internal("root code object captures upvalues"));
    }

    // The bootstrap receives the environment and returns the chunk's
    // closure as its single result.
    let bootstrap = Value::Closure(Arc::new(Closure::new(root_code)));
    let mut results = thread.call(&bootstrap, vec![env])?;
    Ok(results.drain(..).next().unwrap_or(Value::Nil))
}
