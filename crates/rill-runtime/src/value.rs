//! Runtime values
//!
//! Values are cheap to clone: scalars copy, everything heap-allocated is
//! behind an `Arc`. Identity-sensitive comparisons (tables, closures,
//! continuations) go through pointer equality on the shared allocation.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::closure::{Closure, Code};
use crate::cont::ContRef;
use crate::table::Table;

/// A tagged runtime value
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// The absence of a value
    #[default]
    Nil,
    /// A boolean
    Bool(bool),
    /// A 64-bit signed integer
    Int(i64),
    /// A 64-bit float
    Float(f64),
    /// An immutable string
    Str(Arc<str>),
    /// A mutable table, shared by reference
    Table(Arc<Table>),
    /// A compiled code template
    Code(Arc<Code>),
    /// A closure: code plus captured upvalue cells
    Closure(Arc<Closure>),
    /// A continuation handle
    Cont(ContRef),
    /// Multiple values travelling as one (etc collection).
    ///
    /// Runtime-internal: guest code cannot construct a tuple, it only
    /// arises from etc-receives, and pushing one splats its elements.
    Tuple(Vec<Value>),
}

impl Value {
    /// Coerce to a boolean: only `nil` and `false` are falsy
    #[inline]
    pub fn truth(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// The value's type name, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Int(_) | Value::Float(_) => "number",
            Value::Str(_) => "string",
            Value::Table(_) => "table",
            Value::Code(_) => "code",
            Value::Closure(_) => "function",
            Value::Cont(_) => "continuation",
            Value::Tuple(_) => "tuple",
        }
    }

    /// Build a string value
    pub fn str(s: impl AsRef<str>) -> Self {
        Value::Str(Arc::from(s.as_ref()))
    }

    /// Value equality: scalars by value (ints and floats cross-compare),
    /// strings by content, everything shared by identity.
    pub fn rill_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => Arc::ptr_eq(a, b),
            (Value::Code(a), Value::Code(b)) => Arc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::Cont(a), Value::Cont(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Table(t) => write!(f, "table: {:p}", Arc::as_ptr(t)),
            Value::Code(c) => write!(f, "code: {:p}", Arc::as_ptr(c)),
            Value::Closure(c) => write!(f, "function: {:p}", Arc::as_ptr(c)),
            Value::Cont(c) => write!(f, "continuation: {:p}", Arc::as_ptr(c)),
            Value::Tuple(vs) => {
                write!(f, "(")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
        }
    }
}

/// A shared, mutable cell holding one captured variable.
///
/// Every continuation instantiated from the same closure reads and
/// writes the captured variable through the same cell, which is what
/// makes capture by-reference rather than by-copy.
#[derive(Debug, Clone)]
pub struct UpvalueCell(Arc<Mutex<Value>>);

impl UpvalueCell {
    /// Create a cell holding `value`
    pub fn new(value: Value) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    /// Read the current value
    pub fn get(&self) -> Value {
        self.0.lock().clone()
    }

    /// Replace the value
    pub fn set(&self, value: Value) {
        *self.0.lock() = value;
    }
}
