//! Register file and lexical scope stack for one function body

use rustc_hash::FxHashMap;

use rill_code::Reg;
use rill_code::reg::MAX_LOCALS;

use crate::error::{CompileError, CompileResult};

/// Use-counted local register slots.
///
/// The count is reference counting over register *identifiers*, not over
/// values: it only tells the allocator when a slot is free for reuse.
/// Releasing a slot with a zero count is a compiler bug, not a user error.
#[derive(Debug, Default)]
pub struct RegisterFile {
    counts: Vec<u32>,
}

impl RegisterFile {
    /// Create an empty register file
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a free register: the first zero-count slot, or a fresh one
    pub fn get_free(&mut self) -> CompileResult<Reg> {
        for (i, n) in self.counts.iter_mut().enumerate() {
            if *n == 0 {
                *n = 1;
                return Ok(Reg::local(i as u16));
            }
        }
        if self.counts.len() >= MAX_LOCALS as usize {
            return Err(CompileError::TooManyRegisters);
        }
        self.counts.push(1);
        Ok(Reg::local((self.counts.len() - 1) as u16))
    }

    /// Add a reference to a slot. Upvalue addresses are ignored.
    pub fn take(&mut self, reg: Reg) {
        if !reg.is_upvalue() {
            self.counts[reg.local_index()] += 1;
        }
    }

    /// Drop a reference to a slot. Upvalue addresses are ignored.
    ///
    /// # Panics
    ///
    /// Panics if the slot is unreferenced; that is a compiler bug.
    pub fn release(&mut self, reg: Reg) {
        if reg.is_upvalue() {
            return;
        }
        let count = &mut self.counts[reg.local_index()];
        if *count == 0 {
            panic!("register {reg} cannot be released");
        }
        *count -= 1;
    }

    /// Current use count of a slot (for diagnostics and tests)
    pub fn count(&self, reg: Reg) -> u32 {
        self.counts[reg.local_index()]
    }

    /// Number of slots ever allocated
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// True if no slot was ever allocated
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// LIFO stack of name → register scopes, one per syntactic block.
///
/// Lookup walks innermost to outermost. The stack always holds at least
/// the function's root scope.
#[derive(Debug)]
pub struct LexicalScopes {
    scopes: Vec<FxHashMap<String, Reg>>,
}

impl LexicalScopes {
    /// Create a scope stack holding the root scope
    pub fn new() -> Self {
        Self {
            scopes: vec![FxHashMap::default()],
        }
    }

    /// Start a fresh empty scope
    pub fn push(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    /// Discard the top scope, returning its bindings so the caller can
    /// release their registers.
    ///
    /// # Panics
    ///
    /// Panics when called with only the root scope left; that is a
    /// compiler bug.
    pub fn pop(&mut self) -> FxHashMap<String, Reg> {
        if self.scopes.len() <= 1 {
            panic!("cannot pop the root scope");
        }
        self.scopes.pop().expect("scope stack is never empty")
    }

    /// Look a name up, innermost scope first
    pub fn lookup(&self, name: &str) -> Option<Reg> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    /// Bind a name in the top scope
    pub fn bind_top(&mut self, name: &str, reg: Reg) {
        self.scopes
            .last_mut()
            .expect("scope stack is never empty")
            .insert(name.to_string(), reg);
    }

    /// Bind a name in the root scope (upvalue memoization)
    pub fn bind_root(&mut self, name: &str, reg: Reg) {
        self.scopes[0].insert(name.to_string(), reg);
    }
}

impl Default for LexicalScopes {
    fn default() -> Self {
        Self::new()
    }
}
