//! Abstract Syntax Tree definitions for IPE
//!
//! The AST is what the parser hands to the compiler driver. Types are kept
//! as written (`TypeExpr`); they are resolved against the unit tables later.

use std::fmt;

use crate::lexer::Span;

/// A parsed source file
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub header: Header,
    pub items: Vec<Item>,
}

/// `programa X;` or `unidade X;`
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub kind: UnitKind,
    /// None when the file has no header
    pub name: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Program,
    Unit,
}

/// Top-level items
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    /// `importe a, b;`
    Import { names: Vec<(String, Span)>, span: Span },

    /// `estrutura Nome { campo: tipo; ... }`
    Struct { name: String, fields: Vec<FieldDecl>, span: Span },

    /// `tipo Nome = tipo;`
    TypeAlias { name: String, ty: TypeExpr, span: Span },

    /// Global variable
    Var(VarDecl),

    /// Function definition or `externa` declaration
    Function(FunctionDecl),

    /// Module-level statement, part of the unit entry point
    Stmt(Stmt),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub span: Span,
}

/// `var a, b: tipo = valor`
#[derive(Debug, Clone, PartialEq)]
pub struct VarDecl {
    pub names: Vec<(String, Span)>,
    pub ty: TypeExpr,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub ret: Option<TypeExpr>,
    /// None for `externa` functions
    pub body: Option<Vec<Stmt>>,
    pub is_extern: bool,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub by_ref: bool,
    pub span: Span,
}

// ===== Types =====

/// Type as written in source
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub base: TypeBase,
    pub suffixes: Vec<TypeSuffix>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeBase {
    Primitive(PrimitiveType),
    Named(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveType {
    Void,
    Bool,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

/// `*` or a run of `[N]` groups
#[derive(Debug, Clone, PartialEq)]
pub enum TypeSuffix {
    Pointer,
    Array(Vec<u32>),
}

// ===== Statements =====

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `{ ... }`
    Block(Vec<Stmt>),

    /// Local variable declaration
    Var(VarDecl),

    /// `se (c) s senão s`
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },

    /// `enquanto (c) s`
    While { condition: Expr, body: Box<Stmt> },

    /// `faça s enquanto (c);`
    DoWhile { body: Box<Stmt>, condition: Expr },

    /// `para (init; cond; update) s`
    For {
        init: Vec<ForInit>,
        condition: Option<Expr>,
        update: Vec<Expr>,
        body: Box<Stmt>,
    },

    /// `pare;`
    Break,

    /// `retorne e;`
    Return(Option<Expr>),

    /// `leia a, b;`
    Read(Vec<Expr>),

    /// `escreva a, b;` / `escrevaln a, b;`
    Print { args: Vec<Expr>, newline: bool },

    /// `e;`
    Expr(Expr),

    /// `;`
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ForInit {
    Var(VarDecl),
    Expr(Expr),
}

// ===== Expressions =====

/// Expression with source span
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// `42`, `0x7F`, `9L`
    Int { value: i64, long: bool },
    /// `1.5`, `1.5f`
    Float { value: f64, single: bool },
    Char(u16),
    Str(String),
    Bool(bool),
    /// `nulo`
    Null,

    Ident(String),

    Unary { op: UnaryOp, expr: Box<Expr> },

    /// `++x`, `x--`
    IncDec { increment: bool, prefix: bool, expr: Box<Expr> },

    Binary { left: Box<Expr>, op: BinOp, right: Box<Expr> },

    /// `target = value` or `target op= value`
    Assign { op: Option<BinOp>, target: Box<Expr>, value: Box<Expr> },

    Call { name: String, args: Vec<Expr> },

    /// `a[i, j]` and `a[i][j]` both collect into one index list
    Index { base: Box<Expr>, indices: Vec<Expr> },

    Field { base: Box<Expr>, name: String },

    /// `cast<T>(e)`
    Cast { ty: TypeExpr, expr: Box<Expr> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,    // -
    BitNot, // ~
    Not,    // !
    AddrOf, // &
    Deref,  // *
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    // Arithmetic
    Add, // +
    Sub, // -
    Mul, // *
    Div, // /
    Mod, // %

    // Bitwise
    BitAnd, // &
    BitOr,  // |
    BitXor, // ^
    Shl,    // <<
    Shr,    // >>
    Ushr,   // >>>

    // Comparison
    Eq, // ==
    Ne, // !=
    Lt, // <
    Le, // <=
    Gt, // >
    Ge, // >=

    // Logical
    And, // &&
    Or,  // ||
}

impl BinOp {
    pub fn is_comparison(self) -> bool {
        matches!(self, BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge)
    }

    pub fn is_shift(self) -> bool {
        matches!(self, BinOp::Shl | BinOp::Shr | BinOp::Ushr)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(self, BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor)
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Ushr => ">>>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "&&",
            BinOp::Or => "||",
        };
        f.write_str(s)
    }
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnaryOp::Neg => "-",
            UnaryOp::BitNot => "~",
            UnaryOp::Not => "!",
            UnaryOp::AddrOf => "&",
            UnaryOp::Deref => "*",
        };
        f.write_str(s)
    }
}
