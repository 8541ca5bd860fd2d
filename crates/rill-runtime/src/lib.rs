//! # Rill Runtime
//!
//! The execution engine for compiled Rill units.
//!
//! ## Design Principles
//!
//! - **Continuation-passing**: a call frame is a continuation value;
//!   calls and returns are both a transfer into one, driven by a
//!   trampoline with O(1) host stack depth
//! - **Shared capture**: upvalues live in reference-counted mutable
//!   cells, so every continuation of a closure observes the same
//!   captured variables
//! - **Quota-aware**: a per-thread stack of CPU/memory budgets is
//!   charged as instructions execute and values allocate; violations
//!   unwind as a tagged error to exactly the boundary that installed
//!   the broken budget
//!
//! Loading a [`rill_code::Unit`] with [`load_unit`] yields the program's
//! top-level closure; [`Thread::call`] runs it.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod arith;
pub mod closure;
pub mod cont;
pub mod error;
pub mod load;
pub mod quota;
pub mod table;
pub mod thread;
pub mod value;

pub use closure::{Closure, Code};
pub use cont::{Cont, ContRef, ScriptCont, Termination};
pub use error::{RtError, RtResult};
pub use load::load_unit;
pub use quota::{ContextSnapshot, QuotaFrame, QuotaKind, QuotaStack};
pub use table::Table;
pub use thread::{ContextCall, Thread};
pub use value::{UpvalueCell, Value};
