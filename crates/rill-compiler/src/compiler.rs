//! Lexical compiler
//!
//! Walks the syntax tree and emits instruction words against a
//! use-counted register allocator, resolving free variables into upvalue
//! captures across nested function bodies.
//!
//! Calls are compiled in continuation-passing form: the callee is wrapped
//! into a continuation, the current continuation is pushed into it first
//! (so the callee knows where to return), then the arguments, and finally
//! control transfers with a `call` word. Returns are calls to the
//! received caller continuation; there is no return opcode.

use rill_code::{Constant, Instr, Reg, UnOp, Unit};

use crate::assemble::{CompiledFunction, Pool, PoolConstant, assemble};
use crate::ast::{
    AssignTarget, BinaryOp, Block, Exp, FunctionBody, FunctionCall, Stat, TableEntry, UnaryOp,
};
use crate::error::{CompileError, CompileResult};
use crate::scope::{LexicalScopes, RegisterFile};
use crate::trace::{EmitSink, NoopSink};

/// Name of the implicit environment binding threaded through every chunk
pub const ENV_NAME: &str = "_ENV";

/// Compilation state for one function body
struct FuncState {
    registers: RegisterFile,
    scopes: LexicalScopes,
    /// Captured source registers, in capture order. Entries address the
    /// *enclosing* function's frame.
    upvalues: Vec<Reg>,
    code: Vec<Instr>,
    pool: Pool,
    /// Register holding the caller continuation, received in the prologue
    cc: Reg,
}

impl FuncState {
    fn new() -> Self {
        Self {
            registers: RegisterFile::new(),
            scopes: LexicalScopes::new(),
            upvalues: Vec::new(),
            code: Vec::new(),
            pool: Pool::default(),
            cc: Reg::local(0),
        }
    }
}

/// The register an expression ended up in, plus whether the compiler owns
/// a temporary claim on it that must be released after use.
#[derive(Debug, Clone, Copy)]
struct ExpSlot {
    reg: Reg,
    temp: bool,
}

/// The lexical compiler.
///
/// One `Compiler` drives a whole chunk; nested function literals push
/// fresh [`FuncState`]s onto an internal stack, so enclosing-function
/// lookups walk indices instead of parent pointers.
pub struct Compiler<'a> {
    frames: Vec<FuncState>,
    funcs: Vec<CompiledFunction>,
    sink: &'a mut dyn EmitSink,
}

impl<'a> Compiler<'a> {
    /// Create a compiler reporting emissions to `sink`
    pub fn new(sink: &'a mut dyn EmitSink) -> Self {
        Self {
            frames: Vec::new(),
            funcs: Vec::new(),
            sink,
        }
    }

    /// Compile a chunk into a unit.
    ///
    /// The unit's root code object (constant 0) is a bootstrap that
    /// receives the global environment as its single argument and returns
    /// the chunk's closure; the chunk itself captures the environment as
    /// an upvalue.
    pub fn compile(mut self, chunk: &Block) -> CompileResult<Unit> {
        self.frames.push(FuncState::new());

        let cc = self.get_free_register()?;
        self.emit(Instr::recv(cc)?);
        self.frame().cc = cc;

        let env = self.get_free_register()?;
        self.emit(Instr::recv(env)?);
        self.declare_local(ENV_NAME, env);
        self.release_register(env);

        let dst = self.get_free_register()?;
        let main = FunctionBody {
            params: Vec::new(),
            body: chunk.clone(),
        };
        self.compile_closure(&main, dst)?;
        self.emit(Instr::push(cc, dst)?);
        self.emit(Instr::call(cc)?);
        self.release_register(dst);

        let root = self.finish_function();
        assemble(self.funcs, root)
    }

    // ==================== Frame plumbing ====================

    fn frame(&mut self) -> &mut FuncState {
        self.frames.last_mut().expect("no active function frame")
    }

    fn emit(&mut self, instr: Instr) {
        let depth = self.frames.len() - 1;
        let frame = self.frame();
        let pc = frame.code.len();
        frame.code.push(instr);
        #[cfg(feature = "compile_logging")]
        tracing::trace!(depth, pc, word = instr.word(), "emit");
        self.sink.instruction(depth, pc, instr);
    }

    fn here(&mut self) -> usize {
        self.frame().code.len()
    }

    /// Patch the jump at `index` to target the next emitted instruction
    fn patch_jump(&mut self, index: usize) -> CompileResult<()> {
        let target = self.here();
        let offset = target as isize - index as isize;
        let offset =
            i16::try_from(offset).map_err(|_| CompileError::JumpTooFar)?;
        let frame = self.frame();
        let instr = frame.code[index];
        if instr.jump_op().is_none() {
            panic!("not a jump instruction at {index}");
        }
        frame.code[index] = instr.with_n(offset);
        Ok(())
    }

    fn get_free_register(&mut self) -> CompileResult<Reg> {
        self.frame().registers.get_free()
    }

    fn take_register(&mut self, reg: Reg) {
        self.frame().registers.take(reg);
    }

    fn release_register(&mut self, reg: Reg) {
        self.frame().registers.release(reg);
    }

    fn push_scope(&mut self) {
        self.frame().scopes.push();
    }

    /// Pop the top scope, releasing every register bound in it
    fn pop_scope(&mut self) {
        let bindings = self.frame().scopes.pop();
        for reg in bindings.into_values() {
            self.release_register(reg);
        }
    }

    /// Bind a name in the top scope; the binding holds one reference
    fn declare_local(&mut self, name: &str, reg: Reg) {
        self.take_register(reg);
        self.frame().scopes.bind_top(name, reg);
    }

    fn get_constant(&mut self, k: PoolConstant) -> CompileResult<u32> {
        self.frame().pool.add(k)
    }

    fn str_constant(&mut self, s: &str) -> CompileResult<u32> {
        self.get_constant(PoolConstant::Value(Constant::Str(s.to_string())))
    }

    fn free_slot(&mut self, slot: ExpSlot) {
        if slot.temp {
            self.release_register(slot.reg);
        }
    }

    // ==================== Variable resolution ====================

    /// Resolve a name to a register, capturing upvalues through every
    /// intervening function body.
    ///
    /// A hit in an enclosing frame appends the enclosing register to each
    /// capturing frame's upvalue list and memoizes the synthesized
    /// negative address at that frame's root scope, so re-references
    /// reuse the slot. `None` means the name is free at the outermost
    /// frame (an environment lookup for the caller to compile).
    fn resolve(&mut self, name: &str) -> CompileResult<Option<Reg>> {
        let top = self.frames.len() - 1;
        let mut found = None;
        for fi in (0..=top).rev() {
            if let Some(reg) = self.frames[fi].scopes.lookup(name) {
                found = Some((fi, reg));
                break;
            }
        }
        let Some((fi, mut reg)) = found else {
            return Ok(None);
        };
        for child in fi + 1..=top {
            let frame = &mut self.frames[child];
            if frame.upvalues.len() >= rill_code::reg::MAX_UPVALUES as usize {
                return Err(CompileError::TooManyUpvalues);
            }
            frame.upvalues.push(reg);
            reg = Reg::upvalue((frame.upvalues.len() - 1) as u16);
            frame.scopes.bind_root(name, reg);
        }
        Ok(Some(reg))
    }

    fn resolve_env(&mut self) -> CompileResult<Reg> {
        self.resolve(ENV_NAME)?
            .ok_or_else(|| CompileError::internal("environment binding missing"))
    }

    // ==================== Expressions ====================

    /// Compile an expression into a fresh register. The returned slot may
    /// name an existing binding instead of the fresh register; callers
    /// must not assume identity.
    fn compile_exp(&mut self, exp: &Exp) -> CompileResult<ExpSlot> {
        let dst = self.get_free_register()?;
        let actual = self.compile_exp_into(exp, dst)?;
        if actual == dst {
            Ok(ExpSlot {
                reg: dst,
                temp: true,
            })
        } else {
            self.release_register(dst);
            Ok(ExpSlot {
                reg: actual,
                temp: false,
            })
        }
    }

    /// Compile an expression, forcing the result into `dst`
    fn compile_exp_to(&mut self, exp: &Exp, dst: Reg) -> CompileResult<()> {
        let actual = self.compile_exp_into(exp, dst)?;
        if actual != dst {
            self.emit(Instr::un(UnOp::Id, dst, actual)?);
        }
        Ok(())
    }

    /// Compile an expression with `dst` available as a destination,
    /// returning the register actually holding the value.
    fn compile_exp_into(&mut self, exp: &Exp, dst: Reg) -> CompileResult<Reg> {
        match exp {
            Exp::Nil => self.load_constant(Constant::Nil, dst),
            Exp::True => self.load_constant(Constant::Bool(true), dst),
            Exp::False => self.load_constant(Constant::Bool(false), dst),
            Exp::Int(n) => self.load_constant(Constant::Int(*n), dst),
            Exp::Float(x) => self.load_constant(Constant::Float(*x), dst),
            Exp::Str(s) => self.load_constant(Constant::Str(s.clone()), dst),

            Exp::Name(name) => match self.resolve(name)? {
                Some(reg) => Ok(reg),
                None => {
                    // Free name: environment lookup.
                    let env = self.resolve_env()?;
                    let key = self.get_free_register()?;
                    let kidx = self.str_constant(name)?;
                    self.emit(Instr::load_const(key, kidx)?);
                    self.emit(Instr::get_index(dst, env, key)?);
                    self.release_register(key);
                    Ok(dst)
                }
            },

            Exp::Unary(op, operand) => {
                let op = match op {
                    UnaryOp::Neg => UnOp::Neg,
                    UnaryOp::Not => UnOp::Not,
                    UnaryOp::Len => UnOp::Len,
                    UnaryOp::BitNot => UnOp::BitNot,
                };
                let slot = self.compile_exp(operand)?;
                self.emit(Instr::un(op, dst, slot.reg)?);
                self.free_slot(slot);
                Ok(dst)
            }

            Exp::Binary(op, lhs, rhs) => self.compile_binary(*op, lhs, rhs, dst),

            Exp::Index(obj, key) => {
                let oslot = self.compile_exp(obj)?;
                let kslot = self.compile_exp(key)?;
                self.emit(Instr::get_index(dst, oslot.reg, kslot.reg)?);
                self.free_slot(kslot);
                self.free_slot(oslot);
                Ok(dst)
            }

            Exp::Table(entries) => {
                self.emit(Instr::new_table(dst)?);
                let mut index = 0i64;
                for entry in entries {
                    match entry {
                        TableEntry::Item(value) => {
                            index += 1;
                            let key = self.get_free_register()?;
                            let kidx =
                                self.get_constant(PoolConstant::Value(Constant::Int(index)))?;
                            self.emit(Instr::load_const(key, kidx)?);
                            let vslot = self.compile_exp(value)?;
                            self.emit(Instr::set_index(vslot.reg, dst, key)?);
                            self.free_slot(vslot);
                            self.release_register(key);
                        }
                        TableEntry::Pair(key, value) => {
                            let kslot = self.compile_exp(key)?;
                            let vslot = self.compile_exp(value)?;
                            self.emit(Instr::set_index(vslot.reg, dst, kslot.reg)?);
                            self.free_slot(vslot);
                            self.free_slot(kslot);
                        }
                    }
                }
                Ok(dst)
            }

            Exp::Function(body) => {
                self.compile_closure(body, dst)?;
                Ok(dst)
            }

            Exp::Call(call) => {
                self.compile_call(call)?;
                self.emit(Instr::recv(dst)?);
                Ok(dst)
            }
        }
    }

    fn load_constant(&mut self, k: Constant, dst: Reg) -> CompileResult<Reg> {
        let kidx = self.get_constant(PoolConstant::Value(k))?;
        self.emit(Instr::load_const(dst, kidx)?);
        Ok(dst)
    }

    fn compile_binary(
        &mut self,
        op: BinaryOp,
        lhs: &Exp,
        rhs: &Exp,
        dst: Reg,
    ) -> CompileResult<Reg> {
        use rill_code::BinOp;

        // Short-circuit forms keep their result in dst across a branch.
        match op {
            BinaryOp::And | BinaryOp::Or => {
                self.compile_exp_to(lhs, dst)?;
                let skip = self.here();
                self.emit(Instr::jump_if(dst, 0, op == BinaryOp::Or)?);
                self.compile_exp_to(rhs, dst)?;
                self.patch_jump(skip)?;
                return Ok(dst);
            }
            _ => {}
        }

        let (code_op, swap, negate) = match op {
            BinaryOp::Add => (BinOp::Add, false, false),
            BinaryOp::Sub => (BinOp::Sub, false, false),
            BinaryOp::Mul => (BinOp::Mul, false, false),
            BinaryOp::Div => (BinOp::Div, false, false),
            BinaryOp::FloorDiv => (BinOp::FloorDiv, false, false),
            BinaryOp::Mod => (BinOp::Mod, false, false),
            BinaryOp::Pow => (BinOp::Pow, false, false),
            BinaryOp::BitAnd => (BinOp::BitAnd, false, false),
            BinaryOp::BitOr => (BinOp::BitOr, false, false),
            BinaryOp::BitXor => (BinOp::BitXor, false, false),
            BinaryOp::Shl => (BinOp::Shl, false, false),
            BinaryOp::Shr => (BinOp::Shr, false, false),
            BinaryOp::Concat => (BinOp::Concat, false, false),
            BinaryOp::Eq => (BinOp::Eq, false, false),
            BinaryOp::Ne => (BinOp::Eq, false, true),
            BinaryOp::Lt => (BinOp::Lt, false, false),
            BinaryOp::Le => (BinOp::Le, false, false),
            BinaryOp::Gt => (BinOp::Lt, true, false),
            BinaryOp::Ge => (BinOp::Le, true, false),
            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        };

        let lslot = self.compile_exp(lhs)?;
        let rslot = self.compile_exp(rhs)?;
        let (a, b) = if swap {
            (rslot.reg, lslot.reg)
        } else {
            (lslot.reg, rslot.reg)
        };
        self.emit(Instr::bin(code_op, dst, a, b)?);
        if negate {
            self.emit(Instr::un(UnOp::Not, dst, dst)?);
        }
        self.free_slot(rslot);
        self.free_slot(lslot);
        Ok(dst)
    }

    // ==================== Function literals ====================

    /// Compile a function literal: the body becomes a nested code
    /// constant, and the closure is materialized in `dst` with its
    /// upvalues filled in capture order.
    fn compile_closure(&mut self, body: &FunctionBody, dst: Reg) -> CompileResult<()> {
        let (func, captured) = self.compile_function(body)?;
        let kidx = self.get_constant(PoolConstant::Func(func))?;
        self.emit(Instr::make_closure(dst, kidx)?);
        for src in captured {
            self.emit(Instr::fill_upvalue(dst, src)?);
        }
        Ok(())
    }

    /// Compile one function body into its own [`CompiledFunction`],
    /// returning its index and captured source registers (addresses in
    /// the current frame).
    fn compile_function(&mut self, body: &FunctionBody) -> CompileResult<(usize, Vec<Reg>)> {
        self.frames.push(FuncState::new());

        // Prologue: the caller continuation arrives first, then the
        // declared parameters, in push order.
        let cc = self.get_free_register()?;
        self.emit(Instr::recv(cc)?);
        self.frame().cc = cc;
        for param in &body.params {
            let reg = self.get_free_register()?;
            self.emit(Instr::recv(reg)?);
            self.declare_local(param, reg);
            self.release_register(reg);
        }

        for stat in &body.body.stats {
            self.compile_stat(stat)?;
        }

        // Implicit empty return.
        self.emit(Instr::call(cc)?);

        let func = self.finish_function();
        let captured = self.funcs[func].captured.clone();
        Ok((func, captured))
    }

    /// Freeze the innermost frame into a compiled function
    fn finish_function(&mut self) -> usize {
        let frame = self.frames.pop().expect("no active function frame");
        self.funcs.push(CompiledFunction {
            code: frame.code,
            pool: frame.pool,
            upvalue_count: frame.upvalues.len() as u16,
            reg_count: frame.registers.len() as u16,
            captured: frame.upvalues,
        });
        self.funcs.len() - 1
    }

    // ==================== Calls ====================

    /// Compile a call in call position: no receive is emitted, so the
    /// caller decides how many results to keep.
    fn compile_call(&mut self, call: &FunctionCall) -> CompileResult<()> {
        let target = self.compile_exp(&call.target)?;

        let f_reg = if let Some(method) = &call.method {
            // Method call: look the method up on the receiver and push
            // the receiver as first argument.
            let receiver = target.reg;
            self.take_register(receiver);
            let f_reg = self.get_free_register()?;
            let key = self.get_free_register()?;
            let kidx = self.str_constant(method)?;
            self.emit(Instr::load_const(key, kidx)?);
            self.emit(Instr::get_index(f_reg, receiver, key)?);
            self.release_register(key);
            self.emit(Instr::mk_cont(f_reg, f_reg)?);
            self.emit(Instr::push_cc(f_reg)?);
            self.emit(Instr::push(f_reg, receiver)?);
            self.release_register(receiver);
            self.free_slot(target);
            f_reg
        } else if target.temp {
            self.emit(Instr::mk_cont(target.reg, target.reg)?);
            self.emit(Instr::push_cc(target.reg)?);
            target.reg
        } else {
            // The callee lives in a binding register; keep it intact.
            let f_reg = self.get_free_register()?;
            self.emit(Instr::mk_cont(f_reg, target.reg)?);
            self.emit(Instr::push_cc(f_reg)?);
            f_reg
        };

        self.compile_args(&call.args, f_reg)?;
        self.emit(Instr::call(f_reg)?);
        self.release_register(f_reg);
        Ok(())
    }

    /// Evaluate arguments left to right and push each into the callee.
    /// A trailing call argument is compiled in call mode and its results
    /// collected with an etc-receive, so all of them spread into the
    /// argument list.
    fn compile_args(&mut self, args: &[Exp], f_reg: Reg) -> CompileResult<()> {
        let last = args.len().wrapping_sub(1);
        for (i, arg) in args.iter().enumerate() {
            let slot = match arg {
                Exp::Call(inner) if i == last => {
                    self.compile_call(inner)?;
                    let etc = self.get_free_register()?;
                    self.emit(Instr::recv_etc(etc)?);
                    ExpSlot {
                        reg: etc,
                        temp: true,
                    }
                }
                _ => self.compile_exp(arg)?,
            };
            self.emit(Instr::push(f_reg, slot.reg)?);
            self.free_slot(slot);
        }
        Ok(())
    }

    // ==================== Statements ====================

    fn compile_stat(&mut self, stat: &Stat) -> CompileResult<()> {
        match stat {
            Stat::Local { name, value } => {
                let reg = self.get_free_register()?;
                match value {
                    Some(exp) => self.compile_exp_to(exp, reg)?,
                    None => {
                        self.load_constant(Constant::Nil, reg)?;
                    }
                }
                self.declare_local(name, reg);
                self.release_register(reg);
                Ok(())
            }

            Stat::Assign { target, value } => self.compile_assign(target, value),

            Stat::Call(call) => self.compile_call(call),

            Stat::Do(block) => {
                self.push_scope();
                for stat in &block.stats {
                    self.compile_stat(stat)?;
                }
                self.pop_scope();
                Ok(())
            }

            Stat::While { cond, body } => {
                let start = self.here();
                let cslot = self.compile_exp(cond)?;
                let exit = self.here();
                self.emit(Instr::jump_if(cslot.reg, 0, false)?);
                self.free_slot(cslot);
                self.push_scope();
                for stat in &body.stats {
                    self.compile_stat(stat)?;
                }
                self.pop_scope();
                let back = start as isize - self.here() as isize;
                let back = i16::try_from(back).map_err(|_| CompileError::JumpTooFar)?;
                self.emit(Instr::jump(back)?);
                self.patch_jump(exit)?;
                Ok(())
            }

            Stat::If {
                cond,
                then_body,
                else_body,
            } => {
                let cslot = self.compile_exp(cond)?;
                let to_else = self.here();
                self.emit(Instr::jump_if(cslot.reg, 0, false)?);
                self.free_slot(cslot);
                self.push_scope();
                for stat in &then_body.stats {
                    self.compile_stat(stat)?;
                }
                self.pop_scope();
                match else_body {
                    Some(block) => {
                        let to_end = self.here();
                        self.emit(Instr::jump(0)?);
                        self.patch_jump(to_else)?;
                        self.push_scope();
                        for stat in &block.stats {
                            self.compile_stat(stat)?;
                        }
                        self.pop_scope();
                        self.patch_jump(to_end)?;
                    }
                    None => self.patch_jump(to_else)?,
                }
                Ok(())
            }

            Stat::Return(exps) => {
                let cc = self.frame().cc;
                self.take_register(cc);
                self.compile_args(exps, cc)?;
                self.emit(Instr::call(cc)?);
                self.release_register(cc);
                Ok(())
            }
        }
    }

    fn compile_assign(&mut self, target: &AssignTarget, value: &Exp) -> CompileResult<()> {
        match target {
            AssignTarget::Name(name) => match self.resolve(name)? {
                Some(reg) => self.compile_exp_to(value, reg),
                None => {
                    // Free name: environment store.
                    let env = self.resolve_env()?;
                    let vslot = self.compile_exp(value)?;
                    let key = self.get_free_register()?;
                    let kidx = self.str_constant(name)?;
                    self.emit(Instr::load_const(key, kidx)?);
                    self.emit(Instr::set_index(vslot.reg, env, key)?);
                    self.release_register(key);
                    self.free_slot(vslot);
                    Ok(())
                }
            },
            AssignTarget::Index(obj, key) => {
                let oslot = self.compile_exp(obj)?;
                let kslot = self.compile_exp(key)?;
                let vslot = self.compile_exp(value)?;
                self.emit(Instr::set_index(vslot.reg, oslot.reg, kslot.reg)?);
                self.free_slot(vslot);
                self.free_slot(kslot);
                self.free_slot(oslot);
                Ok(())
            }
        }
    }
}

/// Compile a chunk with no emission tracing
pub fn compile_chunk(chunk: &Block) -> CompileResult<Unit> {
    let mut sink = NoopSink;
    Compiler::new(&mut sink).compile(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_code::{ConstOp, Shape};

    fn call_stat(target: &str, args: Vec<Exp>) -> Stat {
        Stat::Call(FunctionCall::new(Exp::name(target), args))
    }

    #[test]
    fn test_compile_empty_chunk() {
        let unit = compile_chunk(&Block::default()).unwrap();
        // Constant 0 is the bootstrap code object.
        assert!(matches!(
            unit.constants()[0],
            Constant::Code {
                upvalue_count: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_upvalue_capture_is_memoized() {
        // local n = 0
        // local f = function() n = n + 1; n = n + 2 end
        let chunk = Block::new(vec![
            Stat::Local {
                name: "n".to_string(),
                value: Some(Exp::Int(0)),
            },
            Stat::Local {
                name: "f".to_string(),
                value: Some(Exp::Function(FunctionBody {
                    params: vec![],
                    body: Block::new(vec![
                        Stat::Assign {
                            target: AssignTarget::Name("n".to_string()),
                            value: Exp::Binary(
                                BinaryOp::Add,
                                Box::new(Exp::name("n")),
                                Box::new(Exp::Int(1)),
                            ),
                        },
                        Stat::Assign {
                            target: AssignTarget::Name("n".to_string()),
                            value: Exp::Binary(
                                BinaryOp::Add,
                                Box::new(Exp::name("n")),
                                Box::new(Exp::Int(2)),
                            ),
                        },
                    ]),
                })),
            },
        ]);
        let unit = compile_chunk(&chunk).unwrap();

        // Exactly one inner code constant captures exactly one upvalue:
        // repeated references to `n` reuse the captured slot.
        let inner: Vec<_> = unit
            .constants()
            .iter()
            .filter_map(|k| match k {
                Constant::Code { upvalue_count, .. } => Some(*upvalue_count),
                _ => None,
            })
            .collect();
        assert!(inner.contains(&1));
        assert!(!inner.contains(&2));
    }

    #[test]
    fn test_trailing_call_argument_spreads() {
        // f(1, g()) — the trailing call is compiled in call mode and
        // collected with an etc-receive before being pushed.
        let chunk = Block::new(vec![call_stat(
            "f",
            vec![
                Exp::Int(1),
                Exp::Call(Box::new(FunctionCall::new(Exp::name("g"), vec![]))),
            ],
        )]);
        let unit = compile_chunk(&chunk).unwrap();
        let has_etc = unit
            .code()
            .iter()
            .any(|i| i.shape() == Shape::Receive && i.f());
        assert!(has_etc);
    }

    #[test]
    fn test_non_trailing_call_argument_keeps_one_result() {
        // f(g(), 1) — g is not trailing, so no etc-receive appears.
        let chunk = Block::new(vec![call_stat(
            "f",
            vec![
                Exp::Call(Box::new(FunctionCall::new(Exp::name("g"), vec![]))),
                Exp::Int(1),
            ],
        )]);
        let unit = compile_chunk(&chunk).unwrap();
        let has_etc = unit
            .code()
            .iter()
            .any(|i| i.shape() == Shape::Receive && i.f());
        assert!(!has_etc);
    }

    #[test]
    fn test_statement_call_emits_no_receive_after_call() {
        let chunk = Block::new(vec![call_stat("f", vec![])]);
        let unit = compile_chunk(&chunk).unwrap();

        // Find the call emitted for `f` inside the chunk function and
        // check the next word is not a receive. The chunk body ends with
        // the implicit return call, so look at the first call whose
        // successor exists within the same code object.
        let spans: Vec<(usize, usize)> = unit
            .constants()
            .iter()
            .filter_map(|k| match k {
                Constant::Code { start, end, .. } => Some((*start, *end)),
                _ => None,
            })
            .collect();
        let mut checked = false;
        for (start, end) in spans {
            for pc in start..end {
                let instr = unit.code()[pc];
                if instr.jump_op() == Some(rill_code::JumpOp::Call) && pc + 1 < end {
                    assert!(!unit.code()[pc + 1].is_receive());
                    checked = true;
                }
            }
        }
        assert!(checked);
    }

    #[test]
    fn test_expression_call_receives_one_result() {
        let chunk = Block::new(vec![Stat::Local {
            name: "x".to_string(),
            value: Some(Exp::Call(Box::new(FunctionCall::new(
                Exp::name("f"),
                vec![],
            )))),
        }]);
        let unit = compile_chunk(&chunk).unwrap();
        let mut found = false;
        for (pc, instr) in unit.code().iter().enumerate() {
            if instr.jump_op() == Some(rill_code::JumpOp::Call)
                && pc + 1 < unit.code().len()
                && unit.code()[pc + 1].is_receive()
                && !unit.code()[pc + 1].f()
            {
                found = true;
            }
        }
        assert!(found);
    }

    #[test]
    fn test_method_call_looks_up_string_key() {
        let chunk = Block::new(vec![Stat::Call(FunctionCall::method(
            Exp::name("t"),
            "m",
            vec![Exp::Int(5)],
        ))]);
        let unit = compile_chunk(&chunk).unwrap();
        assert!(
            unit.constants()
                .iter()
                .any(|k| matches!(k, Constant::Str(s) if s == "m"))
        );
        // The method lookup is an index get.
        assert!(
            unit.code()
                .iter()
                .any(|i| i.shape() == Shape::Index && !i.f())
        );
    }

    #[test]
    fn test_global_reference_compiles_to_env_lookup() {
        let chunk = Block::new(vec![Stat::Local {
            name: "p".to_string(),
            value: Some(Exp::name("print")),
        }]);
        let unit = compile_chunk(&chunk).unwrap();
        assert!(
            unit.constants()
                .iter()
                .any(|k| matches!(k, Constant::Str(s) if s == "print"))
        );
        // The chunk captures _ENV, so the lookup indexes an upvalue.
        let env_get = unit
            .code()
            .iter()
            .any(|i| i.shape() == Shape::Index && !i.f() && i.b().is_upvalue());
        assert!(env_get);
    }

    #[test]
    fn test_constants_are_deduplicated() {
        let chunk = Block::new(vec![
            Stat::Local {
                name: "a".to_string(),
                value: Some(Exp::Int(42)),
            },
            Stat::Local {
                name: "b".to_string(),
                value: Some(Exp::Int(42)),
            },
        ]);
        let unit = compile_chunk(&chunk).unwrap();
        let count = unit
            .constants()
            .iter()
            .filter(|k| matches!(k, Constant::Int(42)))
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_while_loop_jumps_backward() {
        let chunk = Block::new(vec![Stat::While {
            cond: Exp::True,
            body: Block::default(),
        }]);
        let unit = compile_chunk(&chunk).unwrap();
        let backward = unit
            .code()
            .iter()
            .any(|i| i.jump_op() == Some(rill_code::JumpOp::Jump) && i.n() < 0);
        assert!(backward);
    }

    #[test]
    fn test_emit_sink_sees_all_instructions() {
        use crate::trace::CollectSink;
        let chunk = Block::new(vec![Stat::Local {
            name: "x".to_string(),
            value: Some(Exp::Int(1)),
        }]);
        let mut sink = CollectSink::default();
        let unit = Compiler::new(&mut sink).compile(&chunk).unwrap();
        assert_eq!(sink.emitted.len(), unit.code().len());
    }

    #[test]
    fn test_load_const_indices_point_into_merged_pool() {
        let chunk = Block::new(vec![Stat::Local {
            name: "s".to_string(),
            value: Some(Exp::Str("hello".to_string())),
        }]);
        let unit = compile_chunk(&chunk).unwrap();
        for instr in unit.code() {
            if instr.shape() == Shape::Constant && instr.const_op() == ConstOp::Load {
                assert!((instr.kidx() as usize) < unit.constants().len());
            }
        }
    }
}
