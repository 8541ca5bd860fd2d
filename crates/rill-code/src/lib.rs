//! # Rill Code
//!
//! This crate defines the compiled code format for the Rill VM.
//!
//! ## Design Principles
//!
//! - **Register-based**: instructions address virtual registers, not a stack
//! - **Packed**: every instruction is one fixed-width 32-bit word, shape-tagged
//!   by a 3-bit type prefix
//! - **Continuation-passing**: calls and returns are both a `call` transfer
//!   into a continuation value; there is no return opcode
//! - **Serializable**: units can be cached to disk for fast startup
//!
//! The word layout is an internal detail of this crate, not a compatibility
//! surface.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod constant;
pub mod disasm;
pub mod error;
pub mod instr;
pub mod reg;
pub mod unit;

pub use constant::Constant;
pub use disasm::UnitDisassembler;
pub use error::CodeError;
pub use instr::{BinOp, ConstOp, Instr, JumpOp, NiladicOp, Shape, UnOp};
pub use reg::Reg;
pub use unit::Unit;
