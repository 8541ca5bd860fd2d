//! Unit assembly
//!
//! Each function body is compiled against its own instruction buffer and
//! constant pool. Assembly flattens them into one [`Unit`]: code buffers
//! are concatenated into a single stream, function placeholders become
//! [`Constant::Code`] entries with real offsets, and the per-function
//! pools are merged (deduplicated by value equality) with every shape-3
//! constant index patched to the merged pool.

use rill_code::{Constant, Instr, Shape, Unit};

use crate::error::{CompileError, CompileResult};

/// A pool entry during compilation: either a finished constant or a
/// placeholder for a not-yet-laid-out function.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PoolConstant {
    /// A plain constant
    Value(Constant),
    /// Function with this index in the compiler's function list
    Func(usize),
}

/// A per-function constant pool, deduplicated by structural equality
#[derive(Debug, Default)]
pub(crate) struct Pool {
    items: Vec<PoolConstant>,
}

impl Pool {
    /// Add a constant, returning its index; identical constants share one slot
    pub(crate) fn add(&mut self, k: PoolConstant) -> CompileResult<u32> {
        for (i, existing) in self.items.iter().enumerate() {
            if *existing == k {
                return Ok(i as u32);
            }
        }
        if self.items.len() >= u16::MAX as usize + 1 {
            return Err(CompileError::TooManyConstants);
        }
        self.items.push(k);
        Ok((self.items.len() - 1) as u32)
    }

    fn iter(&self) -> impl Iterator<Item = &PoolConstant> {
        self.items.iter()
    }
}

/// One fully compiled function body
#[derive(Debug)]
pub struct CompiledFunction {
    pub(crate) code: Vec<Instr>,
    pub(crate) pool: Pool,
    pub(crate) upvalue_count: u16,
    pub(crate) reg_count: u16,
    /// Registers of the *enclosing* frame captured as upvalues, in
    /// capture order; the compiler emits the fill sequence from these.
    pub(crate) captured: Vec<rill_code::Reg>,
}

/// Flatten compiled functions into a unit.
///
/// `root` names the function that becomes constant index 0, the code
/// object a loader instantiates first.
pub(crate) fn assemble(funcs: Vec<CompiledFunction>, root: usize) -> CompileResult<Unit> {
    // Lay the code out and compute each function's span.
    let mut spans = Vec::with_capacity(funcs.len());
    let mut offset = 0usize;
    for f in &funcs {
        spans.push((offset, offset + f.code.len()));
        offset += f.code.len();
    }

    let code_constant = |i: usize| -> Constant {
        let (start, end) = spans[i];
        Constant::Code {
            start,
            end,
            upvalue_count: funcs[i].upvalue_count,
            reg_count: funcs[i].reg_count,
        }
    };

    // Merge pools. The root code constant is seeded first so it lands at
    // index 0.
    let mut merged: Vec<Constant> = vec![code_constant(root)];
    let mut intern = |merged: &mut Vec<Constant>, k: Constant| -> CompileResult<u32> {
        for (i, existing) in merged.iter().enumerate() {
            if *existing == k {
                return Ok(i as u32);
            }
        }
        if merged.len() >= u16::MAX as usize + 1 {
            return Err(CompileError::TooManyConstants);
        }
        merged.push(k);
        Ok((merged.len() - 1) as u32)
    };

    let mut remaps: Vec<Vec<u32>> = Vec::with_capacity(funcs.len());
    for f in &funcs {
        let mut remap = Vec::new();
        for entry in f.pool.iter() {
            let k = match entry {
                PoolConstant::Value(k) => k.clone(),
                PoolConstant::Func(i) => code_constant(*i),
            };
            remap.push(intern(&mut merged, k)?);
        }
        remaps.push(remap);
    }

    // Concatenate code, patching constant indices to the merged pool.
    let mut code = Vec::with_capacity(offset);
    for (fi, f) in funcs.into_iter().enumerate() {
        for instr in f.code {
            if instr.shape() == Shape::Constant {
                let new_kidx = remaps[fi][instr.kidx() as usize];
                code.push(instr.with_kidx(new_kidx)?);
            } else {
                code.push(instr);
            }
        }
    }

    Ok(Unit::new(code, merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rill_code::Reg;

    #[test]
    fn test_pool_dedup() {
        let mut pool = Pool::default();
        let a = pool.add(PoolConstant::Value(Constant::Int(1))).unwrap();
        let b = pool.add(PoolConstant::Value(Constant::Int(2))).unwrap();
        let c = pool.add(PoolConstant::Value(Constant::Int(1))).unwrap();
        assert_eq!((a, b, c), (0, 1, 0));

        let f = pool.add(PoolConstant::Func(0)).unwrap();
        let g = pool.add(PoolConstant::Func(0)).unwrap();
        assert_eq!(f, g);
    }

    #[test]
    fn test_assemble_roots_constant_zero_and_remaps() {
        // func 0: one load of Int(7); func 1 (root): one load of Int(7)
        // plus a closure of func 0.
        let mut pool0 = Pool::default();
        let k0 = pool0.add(PoolConstant::Value(Constant::Int(7))).unwrap();
        let f0 = CompiledFunction {
            code: vec![Instr::load_const(Reg::local(0), k0).unwrap()],
            pool: pool0,
            upvalue_count: 0,
            reg_count: 1,
            captured: vec![],
        };

        let mut pool1 = Pool::default();
        let k1 = pool1.add(PoolConstant::Value(Constant::Int(7))).unwrap();
        let kf = pool1.add(PoolConstant::Func(0)).unwrap();
        let f1 = CompiledFunction {
            code: vec![
                Instr::load_const(Reg::local(0), k1).unwrap(),
                Instr::make_closure(Reg::local(1), kf).unwrap(),
            ],
            pool: pool1,
            upvalue_count: 0,
            reg_count: 2,
            captured: vec![],
        };

        let unit = assemble(vec![f0, f1], 1).unwrap();

        // Constant 0 is the root's code object spanning func 1's code.
        match unit.constants()[0] {
            Constant::Code { start, end, .. } => {
                assert_eq!((start, end), (1, 3));
            }
            ref other => panic!("expected code constant, got {other:?}"),
        }

        // Both Int(7) loads share one merged slot.
        assert_eq!(unit.code()[0].kidx(), unit.code()[1].kidx());

        // The closure instruction references func 0's code constant.
        let kidx = unit.code()[2].kidx() as usize;
        match unit.constants()[kidx] {
            Constant::Code { start, end, .. } => assert_eq!((start, end), (0, 1)),
            ref other => panic!("expected code constant, got {other:?}"),
        }
    }
}
