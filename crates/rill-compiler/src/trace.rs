//! Emission tracing
//!
//! The compiler reports every emitted instruction to an injected sink,
//! defaulting to a no-op. Useful for compiler debugging and golden tests
//! without any global state.

use rill_code::Instr;

/// Receives every instruction the compiler emits
pub trait EmitSink {
    /// Called once per emitted instruction.
    ///
    /// `func` is the nesting depth of the function being compiled (0 for
    /// the root), `pc` the instruction's offset within that function.
    fn instruction(&mut self, func: usize, pc: usize, instr: Instr);
}

/// A sink that discards everything
#[derive(Debug, Default)]
pub struct NoopSink;

impl EmitSink for NoopSink {
    fn instruction(&mut self, _func: usize, _pc: usize, _instr: Instr) {}
}

/// A sink that records every emission, for tests and diagnostics
#[derive(Debug, Default)]
pub struct CollectSink {
    /// Recorded `(func, pc, instr)` triples in emission order
    pub emitted: Vec<(usize, usize, Instr)>,
}

impl EmitSink for CollectSink {
    fn instruction(&mut self, func: usize, pc: usize, instr: Instr) {
        self.emitted.push((func, pc, instr));
    }
}
