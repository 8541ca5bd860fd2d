//! Syntax tree surface
//!
//! The tokenizer and parser are external collaborators; this module is the
//! node shape they are expected to produce. Every expression node compiles
//! into a register, every statement node compiles for effect.

/// A sequence of statements
#[derive(Debug, Clone, Default)]
pub struct Block {
    /// Statements in source order
    pub stats: Vec<Stat>,
}

impl Block {
    /// Create a block from statements
    pub fn new(stats: Vec<Stat>) -> Self {
        Self { stats }
    }
}

/// An expression node
#[derive(Debug, Clone)]
pub enum Exp {
    /// `nil`
    Nil,
    /// `true`
    True,
    /// `false`
    False,
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
    /// String literal
    Str(String),
    /// Variable reference
    Name(String),
    /// Unary operation
    Unary(UnaryOp, Box<Exp>),
    /// Binary operation
    Binary(BinaryOp, Box<Exp>, Box<Exp>),
    /// Index expression: `obj[key]`
    Index(Box<Exp>, Box<Exp>),
    /// Table constructor
    Table(Vec<TableEntry>),
    /// Function literal
    Function(FunctionBody),
    /// Function call in expression position (keeps the first result)
    Call(Box<FunctionCall>),
}

impl Exp {
    /// `obj.field` sugar
    pub fn field(obj: Exp, name: &str) -> Exp {
        Exp::Index(Box::new(obj), Box::new(Exp::Str(name.to_string())))
    }

    /// Variable reference
    pub fn name(n: &str) -> Exp {
        Exp::Name(n.to_string())
    }
}

/// One entry of a table constructor
#[derive(Debug, Clone)]
pub enum TableEntry {
    /// Positional item, keyed 1, 2, ... in order
    Item(Exp),
    /// Explicit `[key] = value` pair
    Pair(Exp, Exp),
}

/// A function literal body
#[derive(Debug, Clone)]
pub struct FunctionBody {
    /// Parameter names, in declaration order
    pub params: Vec<String>,
    /// The body
    pub body: Block,
}

/// A function call: target, optional method name, ordered arguments.
///
/// A method call `t:m(...)` looks `m` up by string key on the target and
/// prepends the target as the first argument.
#[derive(Debug, Clone)]
pub struct FunctionCall {
    /// Callee expression
    pub target: Exp,
    /// Method name for `target:method(...)` calls
    pub method: Option<String>,
    /// Argument expressions, left to right
    pub args: Vec<Exp>,
}

impl FunctionCall {
    /// Plain call `target(args...)`
    pub fn new(target: Exp, args: Vec<Exp>) -> Self {
        Self {
            target,
            method: None,
            args,
        }
    }

    /// Method call `target:method(args...)`
    pub fn method(target: Exp, method: &str, args: Vec<Exp>) -> Self {
        Self {
            target,
            method: Some(method.to_string()),
            args,
        }
    }
}

/// A statement node
#[derive(Debug, Clone)]
pub enum Stat {
    /// `local name = value`
    Local {
        /// Variable name
        name: String,
        /// Initializer; `nil` when absent
        value: Option<Exp>,
    },
    /// Assignment to a name or an index expression
    Assign {
        /// Assignment target
        target: AssignTarget,
        /// Value expression
        value: Exp,
    },
    /// Function call in statement position (discards all results)
    Call(FunctionCall),
    /// `do ... end` block scope
    Do(Block),
    /// `while cond do ... end`
    While {
        /// Loop condition
        cond: Exp,
        /// Loop body
        body: Block,
    },
    /// `if cond then ... else ... end`
    If {
        /// Branch condition
        cond: Exp,
        /// Taken when the condition is truthy
        then_body: Block,
        /// Taken otherwise
        else_body: Option<Block>,
    },
    /// `return exp, ...`
    Return(Vec<Exp>),
}

/// The left-hand side of an assignment
#[derive(Debug, Clone)]
pub enum AssignTarget {
    /// A variable name
    Name(String),
    /// An index expression `obj[key]`
    Index(Exp, Exp),
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation
    Neg,
    /// Logical not
    Not,
    /// Length
    Len,
    /// Bitwise not
    BitNot,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `//`
    FloorDiv,
    /// `%`
    Mod,
    /// `^`
    Pow,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `~`
    BitXor,
    /// `<<`
    Shl,
    /// `>>`
    Shr,
    /// `..`
    Concat,
    /// `==`
    Eq,
    /// `~=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `and` (short-circuit)
    And,
    /// `or` (short-circuit)
    Or,
}
