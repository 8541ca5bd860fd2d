//! Packed instruction words
//!
//! Every instruction is a single 32-bit word. The top 3 bits select a
//! *shape* (type prefix); the remaining bits are interpreted per shape:
//!
//! | Shape | Meaning | Fields |
//! |-------|---------|--------|
//! | 0 | receive a pushed value (etc-marker when `f`) | A, F |
//! | 1 | binary arithmetic / comparison / concat | A, B, C, X |
//! | 2 | table index get (`f` = 0) / set (`f` = 1) | A, B, C, F |
//! | 3 | load constant / make closure from constant | A, N, Y, F |
//! | 4a | unary op over B | A, B, Z, F |
//! | 4b | niladic construction | A, Z, F |
//! | 5 | jump / conditional jump / call | A, F, N, Y |
//!
//! For shapes 3 and 4, the `f` flag redirects the produced value: instead
//! of writing to register A, it is pushed into the continuation held in A.

use serde::{Deserialize, Serialize};

use crate::error::{CodeError, Result};
use crate::reg::Reg;

const TYPE_SHIFT: u32 = 29;
const A_SHIFT: u32 = 21;
const F_BIT: u32 = 1 << 20;
const B_SHIFT: u32 = 12;
const C_SHIFT: u32 = 4;
const Y_SHIFT: u32 = 16;
const NILADIC_BIT: u32 = 1 << 4;
const OP_MASK: u32 = 0xF;
const N_MASK: u32 = 0xFFFF;

/// Instruction shape, selected by the 3-bit type prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Receive a pushed value into A (etc-marker when `f`)
    Receive,
    /// Binary operation: A = B `x` C
    Binary,
    /// Table index get/set
    Index,
    /// Load constant / make closure from constant pool slot N
    Constant,
    /// Unary op over B (4a) or niladic construction (4b)
    Unary,
    /// Control transfer: jump, conditional jump, call
    Transfer,
}

/// Binary operation discriminant (the `X` field)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BinOp {
    /// Addition
    Add = 0,
    /// Subtraction
    Sub = 1,
    /// Multiplication
    Mul = 2,
    /// Float division
    Div = 3,
    /// Floor division
    FloorDiv = 4,
    /// Modulo (floor semantics)
    Mod = 5,
    /// Exponentiation
    Pow = 6,
    /// Bitwise and
    BitAnd = 7,
    /// Bitwise or
    BitOr = 8,
    /// Bitwise exclusive or
    BitXor = 9,
    /// Left shift
    Shl = 10,
    /// Right shift
    Shr = 11,
    /// Equality
    Eq = 12,
    /// Ordered less-than
    Lt = 13,
    /// Ordered less-or-equal
    Le = 14,
    /// String concatenation
    Concat = 15,
}

impl BinOp {
    /// Decode from the 4-bit `X` field
    pub fn from_bits(bits: u32) -> Self {
        // All 16 values of the field are defined.
        match bits & OP_MASK {
            0 => Self::Add,
            1 => Self::Sub,
            2 => Self::Mul,
            3 => Self::Div,
            4 => Self::FloorDiv,
            5 => Self::Mod,
            6 => Self::Pow,
            7 => Self::BitAnd,
            8 => Self::BitOr,
            9 => Self::BitXor,
            10 => Self::Shl,
            11 => Self::Shr,
            12 => Self::Eq,
            13 => Self::Lt,
            14 => Self::Le,
            _ => Self::Concat,
        }
    }

    /// Mnemonic name
    pub fn name(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::FloorDiv => "idiv",
            Self::Mod => "mod",
            Self::Pow => "pow",
            Self::BitAnd => "band",
            Self::BitOr => "bor",
            Self::BitXor => "bxor",
            Self::Shl => "shl",
            Self::Shr => "shr",
            Self::Eq => "eq",
            Self::Lt => "lt",
            Self::Le => "le",
            Self::Concat => "concat",
        }
    }
}

/// Constant-shape sub-operation (the `Y` field of shape 3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConstOp {
    /// Load constant N
    Load = 0,
    /// Make a closure from the code template in constant N
    Closure = 1,
}

/// Unary operation discriminant (the `Z` field of shape 4a)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum UnOp {
    /// Arithmetic negation
    Neg = 0,
    /// Logical not
    Not = 1,
    /// Length
    Len = 2,
    /// Bitwise not
    BitNot = 3,
    /// Coerce to boolean
    Truth = 4,
    /// Identity (register move / push)
    Id = 5,
    /// Wrap a closure into a fresh continuation
    Cont = 6,
    /// Append B to the upvalue array of the closure in A
    FillUpvalue = 7,
}

impl UnOp {
    /// Decode from the 4-bit `Z` field
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits & OP_MASK {
            0 => Some(Self::Neg),
            1 => Some(Self::Not),
            2 => Some(Self::Len),
            3 => Some(Self::BitNot),
            4 => Some(Self::Truth),
            5 => Some(Self::Id),
            6 => Some(Self::Cont),
            7 => Some(Self::FillUpvalue),
            _ => None,
        }
    }

    /// Mnemonic name
    pub fn name(self) -> &'static str {
        match self {
            Self::Neg => "neg",
            Self::Not => "not",
            Self::Len => "len",
            Self::BitNot => "bnot",
            Self::Truth => "truth",
            Self::Id => "id",
            Self::Cont => "cont",
            Self::FillUpvalue => "fillup",
        }
    }
}

/// Niladic construction discriminant (the `Z` field of shape 4b)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NiladicOp {
    /// Fresh empty table
    Table = 0,
    /// The currently running continuation
    CurrentCont = 1,
}

impl NiladicOp {
    /// Decode from the 4-bit `Z` field
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits & OP_MASK {
            0 => Some(Self::Table),
            1 => Some(Self::CurrentCont),
            _ => None,
        }
    }

    /// Mnemonic name
    pub fn name(self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::CurrentCont => "cc",
        }
    }
}

/// Control transfer sub-operation (the `Y` field of shape 5)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JumpOp {
    /// Unconditional relative jump
    Jump = 0,
    /// Conditional relative jump; `f` selects the branch polarity
    JumpIf = 1,
    /// Transfer control to the continuation in A
    Call = 2,
}

impl JumpOp {
    /// Decode from the `Y` field
    pub fn from_bits(bits: u32) -> Option<Self> {
        match bits & 0x3 {
            0 => Some(Self::Jump),
            1 => Some(Self::JumpIf),
            2 => Some(Self::Call),
            _ => None,
        }
    }
}

/// A packed 32-bit instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Instr(pub u32);

impl Instr {
    // ==================== Builders ====================

    /// Shape 0: receive one pushed value into `dst`
    pub fn recv(dst: Reg) -> Result<Self> {
        Ok(Self(dst.encode()? << A_SHIFT))
    }

    /// Shape 0 etc-marker: collect remaining pushed values into `dst`
    pub fn recv_etc(dst: Reg) -> Result<Self> {
        Ok(Self((dst.encode()? << A_SHIFT) | F_BIT))
    }

    /// Shape 1: `dst = lhs op rhs`
    pub fn bin(op: BinOp, dst: Reg, lhs: Reg, rhs: Reg) -> Result<Self> {
        Ok(Self(
            (1 << TYPE_SHIFT)
                | (dst.encode()? << A_SHIFT)
                | (lhs.encode()? << B_SHIFT)
                | (rhs.encode()? << C_SHIFT)
                | op as u32,
        ))
    }

    /// Shape 2 get: `dst = container[key]`
    pub fn get_index(dst: Reg, container: Reg, key: Reg) -> Result<Self> {
        Ok(Self(
            (2 << TYPE_SHIFT)
                | (dst.encode()? << A_SHIFT)
                | (container.encode()? << B_SHIFT)
                | (key.encode()? << C_SHIFT),
        ))
    }

    /// Shape 2 set: `container[key] = val`
    pub fn set_index(val: Reg, container: Reg, key: Reg) -> Result<Self> {
        Ok(Self(
            (2 << TYPE_SHIFT)
                | (val.encode()? << A_SHIFT)
                | (container.encode()? << B_SHIFT)
                | (key.encode()? << C_SHIFT)
                | F_BIT,
        ))
    }

    /// Shape 3: `dst = constants[kidx]`
    pub fn load_const(dst: Reg, kidx: u32) -> Result<Self> {
        Self::constant(ConstOp::Load, dst, kidx, false)
    }

    /// Shape 3: push `constants[kidx]` into the continuation in `cont`
    pub fn push_const(cont: Reg, kidx: u32) -> Result<Self> {
        Self::constant(ConstOp::Load, cont, kidx, true)
    }

    /// Shape 3: `dst = closure(constants[kidx])`
    pub fn make_closure(dst: Reg, kidx: u32) -> Result<Self> {
        Self::constant(ConstOp::Closure, dst, kidx, false)
    }

    fn constant(op: ConstOp, a: Reg, kidx: u32, push: bool) -> Result<Self> {
        if kidx > N_MASK {
            return Err(CodeError::ConstantOverflow(kidx));
        }
        let mut w = (3 << TYPE_SHIFT)
            | (a.encode()? << A_SHIFT)
            | ((op as u32) << Y_SHIFT)
            | kidx;
        if push {
            w |= F_BIT;
        }
        Ok(Self(w))
    }

    /// Shape 4a: `dst = op operand`
    pub fn un(op: UnOp, dst: Reg, operand: Reg) -> Result<Self> {
        Ok(Self(
            (4 << TYPE_SHIFT)
                | (dst.encode()? << A_SHIFT)
                | (operand.encode()? << B_SHIFT)
                | op as u32,
        ))
    }

    /// Shape 4a push: push `item` into the continuation in `cont`
    pub fn push(cont: Reg, item: Reg) -> Result<Self> {
        Ok(Self(Self::un(UnOp::Id, cont, item)?.0 | F_BIT))
    }

    /// Shape 4a: wrap the closure in `clos` into a continuation in `dst`
    pub fn mk_cont(dst: Reg, clos: Reg) -> Result<Self> {
        Self::un(UnOp::Cont, dst, clos)
    }

    /// Shape 4a: append the value in `src` to the upvalues of the closure in `clos`
    pub fn fill_upvalue(clos: Reg, src: Reg) -> Result<Self> {
        Self::un(UnOp::FillUpvalue, clos, src)
    }

    /// Shape 4b: `dst = {}` (fresh table)
    pub fn new_table(dst: Reg) -> Result<Self> {
        Ok(Self(
            (4 << TYPE_SHIFT)
                | (dst.encode()? << A_SHIFT)
                | NILADIC_BIT
                | NiladicOp::Table as u32,
        ))
    }

    /// Shape 4b push: push the current continuation into the continuation in `cont`
    pub fn push_cc(cont: Reg) -> Result<Self> {
        Ok(Self(
            (4 << TYPE_SHIFT)
                | (cont.encode()? << A_SHIFT)
                | NILADIC_BIT
                | F_BIT
                | NiladicOp::CurrentCont as u32,
        ))
    }

    /// Shape 5: unconditional relative jump
    pub fn jump(offset: i16) -> Result<Self> {
        Ok(Self(
            (5 << TYPE_SHIFT)
                | ((JumpOp::Jump as u32) << Y_SHIFT)
                | (offset as u16 as u32),
        ))
    }

    /// Shape 5: jump by `offset` when `truth(cond) == polarity`
    pub fn jump_if(cond: Reg, offset: i16, polarity: bool) -> Result<Self> {
        let mut w = (5 << TYPE_SHIFT)
            | (cond.encode()? << A_SHIFT)
            | ((JumpOp::JumpIf as u32) << Y_SHIFT)
            | (offset as u16 as u32);
        if polarity {
            w |= F_BIT;
        }
        Ok(Self(w))
    }

    /// Shape 5: transfer control to the continuation in `callee`
    pub fn call(callee: Reg) -> Result<Self> {
        Ok(Self(
            (5 << TYPE_SHIFT)
                | (callee.encode()? << A_SHIFT)
                | ((JumpOp::Call as u32) << Y_SHIFT),
        ))
    }

    // ==================== Accessors ====================

    /// The instruction shape
    #[inline]
    pub fn shape(self) -> Shape {
        match self.0 >> TYPE_SHIFT {
            0 => Shape::Receive,
            1 => Shape::Binary,
            2 => Shape::Index,
            3 => Shape::Constant,
            4 => Shape::Unary,
            _ => Shape::Transfer,
        }
    }

    /// Is this a shape-0 receive instruction
    #[inline]
    pub fn is_receive(self) -> bool {
        self.shape() == Shape::Receive
    }

    /// The A register field
    #[inline]
    pub fn a(self) -> Reg {
        Reg::decode(self.0 >> A_SHIFT)
    }

    /// The B register field
    #[inline]
    pub fn b(self) -> Reg {
        Reg::decode(self.0 >> B_SHIFT)
    }

    /// The C register field
    #[inline]
    pub fn c(self) -> Reg {
        Reg::decode(self.0 >> C_SHIFT)
    }

    /// The boolean flag
    #[inline]
    pub fn f(self) -> bool {
        self.0 & F_BIT != 0
    }

    /// The signed 16-bit immediate (jump offsets)
    #[inline]
    pub fn n(self) -> i16 {
        (self.0 & N_MASK) as u16 as i16
    }

    /// The 16-bit constant pool index (shape 3)
    #[inline]
    pub fn kidx(self) -> u32 {
        self.0 & N_MASK
    }

    /// The binary sub-op (shape 1)
    #[inline]
    pub fn bin_op(self) -> BinOp {
        BinOp::from_bits(self.0)
    }

    /// The constant sub-op (shape 3)
    #[inline]
    pub fn const_op(self) -> ConstOp {
        if (self.0 >> Y_SHIFT) & 0x3 == ConstOp::Closure as u32 {
            ConstOp::Closure
        } else {
            ConstOp::Load
        }
    }

    /// Is this a niladic (4b) unary-shape instruction
    #[inline]
    pub fn is_niladic(self) -> bool {
        self.0 & NILADIC_BIT != 0
    }

    /// The unary sub-op (shape 4a)
    #[inline]
    pub fn un_op(self) -> Option<UnOp> {
        UnOp::from_bits(self.0)
    }

    /// The niladic sub-op (shape 4b)
    #[inline]
    pub fn niladic_op(self) -> Option<NiladicOp> {
        NiladicOp::from_bits(self.0)
    }

    /// The transfer sub-op (shape 5)
    #[inline]
    pub fn jump_op(self) -> Option<JumpOp> {
        JumpOp::from_bits(self.0 >> Y_SHIFT)
    }

    /// Rewrite the signed immediate field (jump backpatching)
    #[inline]
    pub fn with_n(self, n: i16) -> Self {
        Self((self.0 & !N_MASK) | (n as u16 as u32))
    }

    /// Rewrite the constant index field (pool merging)
    pub fn with_kidx(self, kidx: u32) -> Result<Self> {
        if kidx > N_MASK {
            return Err(CodeError::ConstantOverflow(kidx));
        }
        Ok(Self((self.0 & !N_MASK) | kidx))
    }

    /// Raw word
    #[inline]
    pub fn word(self) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recv_fields() {
        let i = Instr::recv(Reg::local(3)).unwrap();
        assert_eq!(i.shape(), Shape::Receive);
        assert_eq!(i.a(), Reg::local(3));
        assert!(!i.f());

        let i = Instr::recv_etc(Reg::local(7)).unwrap();
        assert!(i.is_receive());
        assert!(i.f());
    }

    #[test]
    fn test_bin_fields() {
        let i = Instr::bin(BinOp::Mod, Reg::local(1), Reg::upvalue(2), Reg::local(9)).unwrap();
        assert_eq!(i.shape(), Shape::Binary);
        assert_eq!(i.bin_op(), BinOp::Mod);
        assert_eq!(i.a(), Reg::local(1));
        assert_eq!(i.b(), Reg::upvalue(2));
        assert_eq!(i.c(), Reg::local(9));
    }

    #[test]
    fn test_index_fields() {
        let get = Instr::get_index(Reg::local(0), Reg::local(1), Reg::local(2)).unwrap();
        assert_eq!(get.shape(), Shape::Index);
        assert!(!get.f());

        let set = Instr::set_index(Reg::local(0), Reg::local(1), Reg::upvalue(0)).unwrap();
        assert!(set.f());
        assert_eq!(set.c(), Reg::upvalue(0));
    }

    #[test]
    fn test_const_fields() {
        let i = Instr::load_const(Reg::local(4), 513).unwrap();
        assert_eq!(i.shape(), Shape::Constant);
        assert_eq!(i.const_op(), ConstOp::Load);
        assert_eq!(i.kidx(), 513);
        assert!(!i.f());

        let i = Instr::push_const(Reg::local(4), 2).unwrap();
        assert!(i.f());

        let i = Instr::make_closure(Reg::local(4), 9).unwrap();
        assert_eq!(i.const_op(), ConstOp::Closure);
    }

    #[test]
    fn test_const_overflow() {
        assert!(Instr::load_const(Reg::local(0), 0x1_0000).is_err());
    }

    #[test]
    fn test_unary_fields() {
        let i = Instr::un(UnOp::Len, Reg::local(1), Reg::local(2)).unwrap();
        assert_eq!(i.shape(), Shape::Unary);
        assert!(!i.is_niladic());
        assert_eq!(i.un_op(), Some(UnOp::Len));

        let i = Instr::push(Reg::local(1), Reg::local(2)).unwrap();
        assert_eq!(i.un_op(), Some(UnOp::Id));
        assert!(i.f());

        let i = Instr::new_table(Reg::local(6)).unwrap();
        assert!(i.is_niladic());
        assert_eq!(i.niladic_op(), Some(NiladicOp::Table));

        let i = Instr::push_cc(Reg::local(6)).unwrap();
        assert!(i.is_niladic());
        assert!(i.f());
        assert_eq!(i.niladic_op(), Some(NiladicOp::CurrentCont));
    }

    #[test]
    fn test_transfer_fields() {
        let i = Instr::jump(-5).unwrap();
        assert_eq!(i.shape(), Shape::Transfer);
        assert_eq!(i.jump_op(), Some(JumpOp::Jump));
        assert_eq!(i.n(), -5);

        let i = Instr::jump_if(Reg::local(2), 12, false).unwrap();
        assert_eq!(i.jump_op(), Some(JumpOp::JumpIf));
        assert_eq!(i.n(), 12);
        assert!(!i.f());

        let i = Instr::call(Reg::local(3)).unwrap();
        assert_eq!(i.jump_op(), Some(JumpOp::Call));
        assert_eq!(i.a(), Reg::local(3));
    }

    #[test]
    fn test_patch_offset() {
        let i = Instr::jump(0).unwrap().with_n(-42);
        assert_eq!(i.n(), -42);
        assert_eq!(i.jump_op(), Some(JumpOp::Jump));
    }
}
