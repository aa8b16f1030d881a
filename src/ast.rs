//! The annotated tree handed over by the front-end.
//!
//! Every name is already resolved to a [`SymbolId`] and every expression carries the
//! type the checker inferred for it, so lowering never looks anything up by name.

use crate::symbol::{SymbolId, SymbolTable, Type};

#[derive(Debug, Clone)]
pub struct Program {
    pub symbols: SymbolTable,
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decl {
    Func(FuncDecl),
    Global { symbol: SymbolId, init: Option<Expr> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuncDecl {
    pub symbol: SymbolId,
    pub params: Vec<SymbolId>,
    pub body: Block,
}

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    Local(SymbolId, Option<Expr>),
    Assign(LValue, Expr),
    Expr(Expr),
    /// `if` with any number of `else if` arms, in source order.
    If {
        branches: Vec<(Expr, Block)>,
        els: Option<Block>,
    },
    While(Expr, Block),
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        update: Option<Box<Stmt>>,
        body: Block,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Block(Block),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LValue {
    Var(SymbolId),
    Index(SymbolId, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprKind {
    Int(i64),
    Bool(bool),
    Char(u8),
    Name(SymbolId),
    Binary(Operator, Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Call(SymbolId, Vec<Expr>),
    Index(SymbolId, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Plus,
    Minus,
    Mul,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: Type) -> Self {
        Self { kind, ty }
    }

    pub fn int(value: i64) -> Self {
        Self::new(ExprKind::Int(value), Type::Int)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(ExprKind::Bool(value), Type::Bool)
    }

    pub fn char(value: u8) -> Self {
        Self::new(ExprKind::Char(value), Type::Char)
    }

    pub fn name(symbol: SymbolId, ty: Type) -> Self {
        Self::new(ExprKind::Name(symbol), ty)
    }

    pub fn binary(op: Operator, lhs: Expr, rhs: Expr, ty: Type) -> Self {
        Self::new(ExprKind::Binary(op, Box::new(lhs), Box::new(rhs)), ty)
    }

    pub fn unary(op: UnaryOp, operand: Expr, ty: Type) -> Self {
        Self::new(ExprKind::Unary(op, Box::new(operand)), ty)
    }

    pub fn call(func: SymbolId, args: Vec<Expr>, ty: Type) -> Self {
        Self::new(ExprKind::Call(func, args), ty)
    }

    pub fn index(array: SymbolId, index: Expr, ty: Type) -> Self {
        Self::new(ExprKind::Index(array, Box::new(index)), ty)
    }

    /// Value of a literal expression, used for global initializers.
    pub fn literal(&self) -> Option<i64> {
        match self.kind {
            ExprKind::Int(v) => Some(v),
            ExprKind::Bool(b) => Some(b as i64),
            ExprKind::Char(c) => Some(c as i64),
            _ => None,
        }
    }
}
