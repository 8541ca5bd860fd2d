//! The execution thread
//!
//! One `Thread` drives one logical line of execution: a trampoline loop
//! over continuations plus the thread's quota stack. Continuations never
//! call each other on the host stack, so call depth is O(1) regardless
//! of guest recursion.

use std::sync::Arc;

use crate::closure::Closure;
use crate::cont::{Cont, ContRef, ScriptCont, Termination};
use crate::error::{RtError, RtResult};
use crate::quota::{ContextSnapshot, QuotaFrame, QuotaStack};
use crate::value::Value;

/// Outcome of a quota-bounded call
#[derive(Debug)]
pub struct ContextCall {
    /// The call's results, or `None` when the budget killed it
    pub results: Option<Vec<Value>>,
    /// Resource usage of the bounded frame
    pub snapshot: ContextSnapshot,
}

/// A logical execution thread
#[derive(Debug, Default)]
pub struct Thread {
    quotas: QuotaStack,
}

impl Thread {
    /// Create a thread with an unrestricted base budget
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn quotas_mut(&mut self) -> &mut QuotaStack {
        &mut self.quotas
    }

    /// Instantiate a continuation for a ready closure, charging its
    /// memory cost.
    pub fn continuation(&mut self, closure: Arc<Closure>) -> RtResult<ContRef> {
        let frame = ScriptCont::new(closure)?;
        self.quotas.charge_mem(frame.memory_cost())?;
        Ok(Cont::Script(frame).into_ref())
    }

    /// Drive `cont` to completion: run it, then whatever it hands back,
    /// until a termination is reached.
    pub fn run_continuation(&mut self, mut cont: ContRef) -> RtResult<()> {
        loop {
            let next = {
                let mut guard = cont.lock();
                guard.run(self, &cont)?
            };
            match next {
                Some(n) => cont = n,
                None => return Ok(()),
            }
        }
    }

    /// Call a closure value with `args`, returning every result it
    /// pushes back.
    pub fn call(&mut self, f: &Value, args: Vec<Value>) -> RtResult<Vec<Value>> {
        let Value::Closure(closure) = f else {
            return Err(RtError::type_error(format!(
                "attempt to call a {} value",
                f.type_name()
            )));
        };
        let term = Cont::Termination(Termination::default()).into_ref();
        let cont = self.continuation(closure.clone())?;
        {
            let mut guard = cont.lock();
            // The caller continuation always arrives first.
            guard.push(Value::Cont(term.clone()));
            for arg in args {
                guard.push(arg);
            }
        }
        self.run_continuation(cont)?;

        let mut guard = term.lock();
        match &mut *guard {
            Cont::Termination(t) => Ok(std::mem::take(t).into_values()),
            Cont::Script(_) => Err(RtError::internal("termination handle was replaced")),
        }
    }

    // ==================== Quota interface ====================

    /// Push a budget frame, returning its level
    pub fn push_quota(&mut self, frame: QuotaFrame) -> usize {
        self.quotas.push(frame)
    }

    /// Pop the innermost budget frame, returning its final usage
    pub fn pop_context(&mut self) -> QuotaFrame {
        self.quotas.pop()
    }

    /// Usage snapshot of the innermost budget frame
    pub fn context(&self) -> ContextSnapshot {
        self.quotas.snapshot(false)
    }

    /// Number of active budget frames, including the base frame
    pub fn quota_depth(&self) -> usize {
        self.quotas.depth()
    }

    /// Whether I/O is currently permitted (every frame must allow it)
    pub fn io_allowed(&self) -> bool {
        self.quotas.io_allowed()
    }

    /// Call `f` under a budget described by a quota table.
    ///
    /// The table accepts `memlimit` and `cpulimit` (optional positive
    /// integers) and `io` (exactly `"on"` or `"off"`); any other shape
    /// fails with a value error before `f` is invoked. The frame pushed
    /// here is popped whatever happens. A quota violation belonging to
    /// this frame converts into a normal `ContextCall` with no results;
    /// every other error, including a deeper frame's violation,
    /// propagates unchanged.
    pub fn call_context(
        &mut self,
        quotas: &Value,
        f: &Value,
        args: Vec<Value>,
    ) -> RtResult<ContextCall> {
        let frame = parse_quota_table(quotas)?;
        let level = self.quotas.push(frame);
        let outcome = self.call(f, args);
        match outcome {
            Ok(results) => {
                let snapshot = self.quotas.snapshot(false);
                self.quotas.pop();
                Ok(ContextCall {
                    results: Some(results),
                    snapshot,
                })
            }
            Err(RtError::QuotaExceeded { level: l, .. }) if l == level => {
                let snapshot = self.quotas.snapshot(true);
                self.quotas.pop();
                Ok(ContextCall {
                    results: None,
                    snapshot,
                })
            }
            Err(err) => {
                self.quotas.pop();
                Err(err)
            }
        }
    }
}

/// Validate a quota table into a budget frame
fn parse_quota_table(quotas: &Value) -> RtResult<QuotaFrame> {
    let Value::Table(table) = quotas else {
        return Err(RtError::value_error(format!(
            "quota spec must be a table, got {}",
            quotas.type_name()
        )));
    };

    let limit = |key: &str| -> RtResult<Option<u64>> {
        match table.get(&Value::str(key))? {
            Value::Nil => Ok(None),
            Value::Int(n) if n > 0 => Ok(Some(n as u64)),
            other => Err(RtError::value_error(format!(
                "{key} must be a positive integer, got {other}"
            ))),
        }
    };

    let cpu_limit = limit("cpulimit")?;
    let mem_limit = limit("memlimit")?;
    let io_enabled = match table.get(&Value::str("io"))? {
        Value::Nil => true,
        Value::Str(s) if &*s == "on" => true,
        Value::Str(s) if &*s == "off" => false,
        other => {
            return Err(RtError::value_error(format!(
                "io must be \"on\" or \"off\", got {other}"
            )));
        }
    };

    Ok(QuotaFrame {
        cpu_limit,
        mem_limit,
        io_enabled,
        ..QuotaFrame::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Table;

    fn quota_table(entries: &[(&str, Value)]) -> Value {
        let t = Table::new();
        for (k, v) in entries {
            t.set(&Value::str(k), v.clone()).unwrap();
        }
        Value::Table(Arc::new(t))
    }

    #[test]
    fn test_quota_table_validation() {
        assert!(parse_quota_table(&quota_table(&[("memlimit", Value::Int(1000))])).is_ok());

        // Non-positive limits are rejected.
        assert!(parse_quota_table(&quota_table(&[("cpulimit", Value::Int(-1))])).is_err());
        assert!(parse_quota_table(&quota_table(&[("cpulimit", Value::Int(0))])).is_err());
        // Floats are not accepted as limits.
        assert!(parse_quota_table(&quota_table(&[("memlimit", Value::Float(10.0))])).is_err());
        // Not a table at all.
        assert!(parse_quota_table(&Value::Int(3)).is_err());
    }

    #[test]
    fn test_io_flag_shapes() {
        let on = parse_quota_table(&quota_table(&[("io", Value::str("on"))])).unwrap();
        assert!(on.io_enabled);
        let off = parse_quota_table(&quota_table(&[("io", Value::str("off"))])).unwrap();
        assert!(!off.io_enabled);
        assert!(parse_quota_table(&quota_table(&[("io", Value::str("maybe"))])).is_err());
        assert!(parse_quota_table(&quota_table(&[("io", Value::Bool(true))])).is_err());
    }

    #[test]
    fn test_call_context_bad_spec_fails_before_push() {
        let mut thread = Thread::new();
        let depth = thread.quotas.depth();
        let err = thread.call_context(
            &quota_table(&[("cpulimit", Value::Int(-1))]),
            // Would fail if invoked, proving validation comes first.
            &Value::Nil,
            vec![],
        );
        assert!(matches!(err, Err(RtError::Value(_))));
        assert_eq!(thread.quotas.depth(), depth);
    }

    #[test]
    fn test_calling_a_non_callable_pops_the_frame() {
        let mut thread = Thread::new();
        let depth = thread.quotas.depth();
        let err = thread.call_context(&quota_table(&[]), &Value::Int(1), vec![]);
        assert!(matches!(err, Err(RtError::Type(_))));
        assert_eq!(thread.quotas.depth(), depth);
    }
}
