//! Tables
//!
//! The one guest-visible mutable container. Keys are normalized scalars;
//! a float key with an exact integral value folds to the integer key, so
//! `t[1]` and `t[1.0]` address the same slot.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::error::{RtError, RtResult};
use crate::value::Value;

/// A normalized table key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Boolean key
    Bool(bool),
    /// Integer key (integral floats normalize here)
    Int(i64),
    /// Float key bits (non-integral floats only)
    FloatBits(u64),
    /// String key
    Str(Arc<str>),
}

impl Key {
    /// Normalize a value into a key. Nil and NaN keys are errors;
    /// container values key by identity through their pointer.
    pub fn from_value(v: &Value) -> RtResult<Self> {
        match v {
            Value::Nil => Err(RtError::value_error("table key is nil")),
            Value::Bool(b) => Ok(Key::Bool(*b)),
            Value::Int(n) => Ok(Key::Int(*n)),
            Value::Float(x) => {
                if x.is_nan() {
                    return Err(RtError::value_error("table key is NaN"));
                }
                if x.fract() == 0.0 && *x >= i64::MIN as f64 && *x <= i64::MAX as f64 {
                    Ok(Key::Int(*x as i64))
                } else {
                    Ok(Key::FloatBits(x.to_bits()))
                }
            }
            Value::Str(s) => Ok(Key::Str(s.clone())),
            other => Err(RtError::type_error(format!(
                "cannot index with a {} key",
                other.type_name()
            ))),
        }
    }
}

/// A mutable hash table shared by reference
#[derive(Debug, Default)]
pub struct Table {
    entries: Mutex<FxHashMap<Key, Value>>,
}

impl Table {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `self[key]`, nil when absent
    pub fn get(&self, key: &Value) -> RtResult<Value> {
        let key = Key::from_value(key)?;
        Ok(self.entries.lock().get(&key).cloned().unwrap_or_default())
    }

    /// Write `self[key] = value`; assigning nil removes the entry
    pub fn set(&self, key: &Value, value: Value) -> RtResult<()> {
        let key = Key::from_value(key)?;
        let mut entries = self.entries.lock();
        if matches!(value, Value::Nil) {
            entries.remove(&key);
        } else {
            entries.insert(key, value);
        }
        Ok(())
    }

    /// Sequence length: the count of consecutive integer keys from 1
    pub fn len(&self) -> i64 {
        let entries = self.entries.lock();
        let mut n = 0i64;
        while entries.contains_key(&Key::Int(n + 1)) {
            n += 1;
        }
        n
    }

    /// True when the table holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_and_remove() {
        let t = Table::new();
        t.set(&Value::str("x"), Value::Int(1)).unwrap();
        assert!(t.get(&Value::str("x")).unwrap().rill_eq(&Value::Int(1)));

        t.set(&Value::str("x"), Value::Nil).unwrap();
        assert!(matches!(t.get(&Value::str("x")).unwrap(), Value::Nil));
        assert!(t.is_empty());
    }

    #[test]
    fn test_integral_float_key_folds_to_int() {
        let t = Table::new();
        t.set(&Value::Float(2.0), Value::str("two")).unwrap();
        assert!(
            t.get(&Value::Int(2))
                .unwrap()
                .rill_eq(&Value::str("two"))
        );
    }

    #[test]
    fn test_nil_key_errors() {
        let t = Table::new();
        assert!(t.set(&Value::Nil, Value::Int(1)).is_err());
        assert!(t.get(&Value::Nil).is_err());
    }

    #[test]
    fn test_sequence_length() {
        let t = Table::new();
        for i in 1..=4 {
            t.set(&Value::Int(i), Value::Int(i * 10)).unwrap();
        }
        t.set(&Value::Int(9), Value::Int(90)).unwrap();
        assert_eq!(t.len(), 4);
    }
}
