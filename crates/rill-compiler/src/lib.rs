//! # Rill Compiler
//!
//! Compiles Rill syntax trees into executable [`rill_code::Unit`]s.
//!
//! ## Design Principles
//!
//! - **Single pass**: the tree is walked once, emitting instructions
//!   directly; jumps are backpatched in place
//! - **Use-counted registers**: expression temporaries are released the
//!   moment their last consumer is emitted, so register files stay small
//! - **Lexical capture**: free variables resolve through enclosing
//!   function bodies into upvalue slots, memoized per function so a name
//!   is captured at most once
//! - **Continuation-passing calls**: calls push the caller continuation
//!   and arguments into the callee, and returns are calls back into the
//!   received continuation
//!
//! The parser is an external collaborator; [`ast`] is the interchange
//! surface it targets.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

mod assemble;

pub mod ast;
pub mod compiler;
pub mod error;
pub mod scope;
pub mod trace;

pub use compiler::{Compiler, ENV_NAME, compile_chunk};
pub use error::{CompileError, CompileResult};
pub use trace::{CollectSink, EmitSink, NoopSink};
