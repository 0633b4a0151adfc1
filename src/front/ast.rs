//! The abstract syntax tree.

use crate::common::Id;

#[derive(Debug)]
pub struct Program {
    pub funcs: Vec<FuncDecl>,
}

#[derive(Debug)]
pub struct FuncDecl {
    pub name: Id,
    pub params: Vec<Param>,
    pub ret_type: DataType,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: Id,
    pub ty: DataType,
}

#[derive(Debug)]
pub enum Stmt {
    VarDecl {
        name: Id,
        ty: DataType,
        init: Expr,
    },
    Block(Vec<Stmt>),
    ExprStmt(Expr),
    If {
        cond: Expr,
        tt: Vec<Stmt>,
        ff: Option<Vec<Stmt>>,
    },
    Return(Expr),
}

#[derive(Debug)]
pub enum Expr {
    Var(Id),
    IntLit(i64),
    Assign(Box<Expr>, Box<Expr>),
    Unary {
        op: UnOp,
        inner: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: Id,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
}

/// Binary operator tags, named to mirror the `AST_OP_*` tables
/// (`OP_MULT`, `OP_EQUALITY`, `OP_LOGIC_AND`, ...) they're modeled on, so
/// the mapping in `middle::ir` reads as a direct transliteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Mul,
    Div,
    Add,
    Sub,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    LogicAnd,
    LogicOr,
}

/// A scalar data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum DataType {
    Char,
    Int,
    Void,
    Unknown,
}

impl DataType {
    pub fn size(self) -> u32 {
        match self {
            DataType::Char => 1,
            DataType::Int => 4,
            DataType::Void | DataType::Unknown => 0,
        }
    }
}
