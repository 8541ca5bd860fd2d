//! Continuations
//!
//! A continuation is the runtime frame: a closure, a register array
//! sized to the closure's code, and a program counter. Frames never
//! nest on the host stack; running one executes instructions until a
//! `call` transfer and hands the callee back to the thread's trampoline.
//!
//! Values enter a suspended continuation by being *pushed* into it. A
//! push inspects the instruction at the program counter: a receive
//! instruction consumes the value into its destination register (the
//! etc form collects values into a tuple without advancing); anything
//! else discards the value, which is how statement-position calls drop
//! their results and extra arguments fall away.

use std::sync::Arc;

use parking_lot::Mutex;
use rill_code::{ConstOp, Instr, JumpOp, NiladicOp, Reg, Shape, UnOp};
use smallvec::SmallVec;

use crate::arith;
use crate::closure::Closure;
use crate::error::{RtError, RtResult};
use crate::quota::{MEM_CLOSURE, MEM_CONT, MEM_REGISTER, MEM_TABLE, MEM_TABLE_ENTRY};
use crate::table::Table;
use crate::thread::Thread;
use crate::value::{UpvalueCell, Value};

/// Shared handle to a continuation
pub type ContRef = Arc<Mutex<Cont>>;

/// A runnable continuation: either a script frame or a termination
/// collecting final results.
#[derive(Debug)]
pub enum Cont {
    /// A frame executing compiled code
    Script(ScriptCont),
    /// A result collector that ends the trampoline when run
    Termination(Termination),
}

impl Cont {
    /// Wrap into a shared handle
    pub fn into_ref(self) -> ContRef {
        Arc::new(Mutex::new(self))
    }

    /// Deliver a value; tuples splat element-wise
    pub fn push(&mut self, value: Value) {
        match value {
            Value::Tuple(values) => {
                for v in values {
                    self.push_one(v);
                }
            }
            v => self.push_one(v),
        }
    }

    fn push_one(&mut self, value: Value) {
        match self {
            Cont::Script(frame) => frame.push_one(value),
            Cont::Termination(term) => term.values.push(value),
        }
    }

    /// Execute until the next suspension point.
    ///
    /// Returns the continuation to run next, or `None` when the
    /// trampoline should stop. `self_ref` is the handle the thread is
    /// driving; the frame needs it to materialize the current
    /// continuation as a value.
    pub fn run(&mut self, thread: &mut Thread, self_ref: &ContRef) -> RtResult<Option<ContRef>> {
        match self {
            Cont::Script(frame) => frame.run(thread, self_ref).map(Some),
            Cont::Termination(_) => Ok(None),
        }
    }
}

/// Collects pushed values and stops the trampoline
#[derive(Debug, Default)]
pub struct Termination {
    values: SmallVec<[Value; 8]>,
}

impl Termination {
    /// The values pushed so far, in push order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consume the collector, yielding its values
    pub fn into_values(self) -> Vec<Value> {
        self.values.into_vec()
    }
}

/// A script execution frame
#[derive(Debug)]
pub struct ScriptCont {
    closure: Arc<Closure>,
    upvalues: Vec<UpvalueCell>,
    registers: Vec<Value>,
    pc: usize,
    /// True while the etc-receive at pc has already collected at least
    /// one push, so resuming does not reset the tuple.
    etc_live: bool,
}

impl ScriptCont {
    /// Instantiate a frame for `closure`; fails when upvalue slots are
    /// still unfilled.
    pub fn new(closure: Arc<Closure>) -> RtResult<Self> {
        let upvalues = closure.ready_upvalues()?;
        let code = closure.code();
        Ok(Self {
            registers: vec![Value::Nil; code.reg_count()],
            pc: code.start(),
            upvalues,
            closure,
            etc_live: false,
        })
    }

    /// Memory charged when this frame was created
    pub fn memory_cost(&self) -> u64 {
        MEM_CONT + self.registers.len() as u64 * MEM_REGISTER
    }

    fn get(&self, reg: Reg) -> Value {
        if reg.is_upvalue() {
            self.upvalues[reg.upvalue_index()].get()
        } else {
            self.registers[reg.local_index()].clone()
        }
    }

    fn set(&mut self, reg: Reg, value: Value) {
        if reg.is_upvalue() {
            self.upvalues[reg.upvalue_index()].set(value);
        } else {
            self.registers[reg.local_index()] = value;
        }
    }

    fn push_one(&mut self, value: Value) {
        let Some(instr) = self.closure.code().instr(self.pc) else {
            return;
        };
        if !instr.is_receive() {
            // No receive waiting: the value is discarded.
            return;
        }
        let dst = instr.a();
        if instr.f() {
            // Etc: collect into a tuple without advancing, so further
            // pushes keep appending.
            if !self.etc_live {
                self.set(dst, Value::Tuple(Vec::new()));
                self.etc_live = true;
            }
            let mut tuple = match self.get(dst) {
                Value::Tuple(vs) => vs,
                _ => Vec::new(),
            };
            tuple.push(value);
            self.set(dst, Value::Tuple(tuple));
        } else {
            self.set(dst, value);
            self.pc += 1;
        }
    }

    /// Push `value` into the continuation held in register `target`
    fn push_into(&mut self, self_ref: &ContRef, target: Reg, value: Value) -> RtResult<()> {
        match self.get(target) {
            Value::Cont(cont) => {
                if Arc::ptr_eq(&cont, self_ref) {
                    return Err(RtError::internal(
                        "cannot push into the running continuation",
                    ));
                }
                cont.lock().push(value);
                Ok(())
            }
            other => Err(RtError::type_error(format!(
                "push target is a {}, not a continuation",
                other.type_name()
            ))),
        }
    }

    /// Write a produced value to register A, or push it when the
    /// instruction's flag redirects into the continuation held there.
    fn produce(
        &mut self,
        self_ref: &ContRef,
        instr: Instr,
        value: Value,
    ) -> RtResult<()> {
        if instr.f() {
            self.push_into(self_ref, instr.a(), value)
        } else {
            self.set(instr.a(), value);
            Ok(())
        }
    }

    fn run(&mut self, thread: &mut Thread, self_ref: &ContRef) -> RtResult<ContRef> {
        loop {
            thread.quotas_mut().charge_cpu(1)?;
            let instr = self
                .closure
                .code()
                .instr(self.pc)
                .ok_or_else(|| RtError::internal(format!("invalid pc {}", self.pc)))?;

            match instr.shape() {
                Shape::Receive => {
                    // Reached in normal flow: nothing was pushed for it.
                    if instr.f() {
                        if self.etc_live {
                            self.etc_live = false;
                        } else {
                            self.set(instr.a(), Value::Tuple(Vec::new()));
                        }
                    } else {
                        self.set(instr.a(), Value::Nil);
                    }
                    self.pc += 1;
                }

                Shape::Binary => {
                    let lhs = self.get(instr.b());
                    let rhs = self.get(instr.c());
                    let value = arith::bin(instr.bin_op(), &lhs, &rhs)?;
                    if let Value::Str(s) = &value {
                        thread.quotas_mut().charge_mem(s.len() as u64)?;
                    }
                    self.set(instr.a(), value);
                    self.pc += 1;
                }

                Shape::Index => {
                    let container = self.get(instr.b());
                    let Value::Table(table) = &container else {
                        return Err(RtError::type_error(format!(
                            "attempt to index a {} value",
                            container.type_name()
                        )));
                    };
                    let key = self.get(instr.c());
                    if instr.f() {
                        table.set(&key, self.get(instr.a()))?;
                        thread.quotas_mut().charge_mem(MEM_TABLE_ENTRY)?;
                    } else {
                        let value = table.get(&key)?;
                        self.set(instr.a(), value);
                    }
                    self.pc += 1;
                }

                Shape::Constant => {
                    let constant = self.closure.code().constant(instr.kidx())?;
                    let value = match instr.const_op() {
                        ConstOp::Load => constant,
                        ConstOp::Closure => {
                            let Value::Code(code) = constant else {
                                return Err(RtError::internal(
                                    "closure constant is not a code object",
                                ));
                            };
                            thread.quotas_mut().charge_mem(MEM_CLOSURE)?;
                            Value::Closure(Arc::new(Closure::new(code)))
                        }
                    };
                    self.produce(self_ref, instr, value)?;
                    self.pc += 1;
                }

                Shape::Unary if instr.is_niladic() => {
                    let op = instr.niladic_op().ok_or_else(|| {
                        RtError::internal(format!("bad niladic op in {:08x}", instr.word()))
                    })?;
                    let value = match op {
                        NiladicOp::Table => {
                            thread.quotas_mut().charge_mem(MEM_TABLE)?;
                            Value::Table(Arc::new(Table::new()))
                        }
                        NiladicOp::CurrentCont => Value::Cont(self_ref.clone()),
                    };
                    self.produce(self_ref, instr, value)?;
                    self.pc += 1;
                }

                Shape::Unary => {
                    let op = instr.un_op().ok_or_else(|| {
                        RtError::internal(format!("bad unary op in {:08x}", instr.word()))
                    })?;
                    match op {
                        UnOp::Id => {
                            let value = self.get(instr.b());
                            self.produce(self_ref, instr, value)?;
                        }
                        UnOp::Cont => {
                            let operand = self.get(instr.b());
                            let Value::Closure(closure) = operand else {
                                return Err(RtError::type_error(format!(
                                    "attempt to call a {} value",
                                    operand.type_name()
                                )));
                            };
                            let frame = ScriptCont::new(closure)?;
                            thread.quotas_mut().charge_mem(frame.memory_cost())?;
                            self.produce(
                                self_ref,
                                instr,
                                Value::Cont(Cont::Script(frame).into_ref()),
                            )?;
                        }
                        UnOp::FillUpvalue => {
                            let target = self.get(instr.a());
                            let Value::Closure(closure) = &target else {
                                return Err(RtError::internal(
                                    "fill-upvalue target is not a closure",
                                ));
                            };
                            let value = self.get(instr.b());
                            closure.fill_upvalue(value)?;
                        }
                        _ => {
                            let operand = self.get(instr.b());
                            let value = arith::un(op, &operand)?;
                            self.produce(self_ref, instr, value)?;
                        }
                    }
                    self.pc += 1;
                }

                Shape::Transfer => match instr.jump_op().ok_or_else(|| {
                    RtError::internal(format!("bad transfer op in {:08x}", instr.word()))
                })? {
                    JumpOp::Jump => {
                        self.pc = offset_pc(self.pc, instr.n())?;
                    }
                    JumpOp::JumpIf => {
                        if self.get(instr.a()).truth() == instr.f() {
                            self.pc = offset_pc(self.pc, instr.n())?;
                        } else {
                            self.pc += 1;
                        }
                    }
                    JumpOp::Call => {
                        let callee = self.get(instr.a());
                        let Value::Cont(next) = callee else {
                            return Err(RtError::type_error(format!(
                                "attempt to call a {} value",
                                callee.type_name()
                            )));
                        };
                        // Advance past the call: results the callee
                        // pushes back land on whatever follows, receive
                        // or not.
                        self.pc += 1;
                        return Ok(next);
                    }
                },
            }
        }
    }
}

/// Jump offsets are relative to the jump instruction's own index
fn offset_pc(pc: usize, n: i16) -> RtResult<usize> {
    let target = pc as isize + n as isize;
    usize::try_from(target)
        .map_err(|_| RtError::internal(format!("jump target {target} out of range")))
}
