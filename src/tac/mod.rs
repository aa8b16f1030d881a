//! Three-address code: the operand and instruction vocabulary shared by every stage.

mod builder;
mod listing;

use std::{
    collections::{HashMap, HashSet},
    fmt::Display,
    ops::{Index, IndexMut},
};

use strum::Display as StrumDisplay;
use thiserror::Error;

use crate::{
    ast::{Operator, UnaryOp},
    common::{Label, Temp},
    frame::Register,
    symbol::{Symbol, SymbolId},
};

pub use builder::{Global, Tac, TacBuilder};
pub use listing::Listing;

pub type LiveSet = HashSet<OperandId>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("no operand produced for {0}")]
    MissingOperand(&'static str),

    #[error("`{0}` outside of a loop")]
    LoopControlOutsideLoop(&'static str),

    #[error("global `{0}` has a non-literal initializer")]
    NonLiteralGlobal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OperandId(usize);

impl OperandId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for OperandId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// What a compiler-generated temporary holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Binary(BinOp),
    Relational(RelOp),
    Logical(LogicOp),
    Unary(UnOp),
    Copy,
    Offset,
    Address,
    Load,
    /// Where a callee leaves its result.
    CallResult,
    /// The n-th outgoing argument of a call.
    Arg(usize),
    /// The n-th incoming parameter of the current function.
    Param(usize),
    /// The current function's return value.
    ReturnValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperandKind {
    Symbol(SymbolId),
    Temp { temp: Temp, tag: Tag },
    Label(Label),
    Int(i64),
}

/// Where an operand ended up after allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    Register(Register),
    Frame,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    kind: OperandKind,
    /// Whether the operand holds a value that needs storage of its own.
    value: bool,
    reg: Option<Register>,
    frame_resident: bool,
    restricted: Vec<Register>,
}

impl Operand {
    fn new(kind: OperandKind, value: bool) -> Self {
        Self {
            kind,
            value,
            reg: None,
            frame_resident: false,
            restricted: Vec::new(),
        }
    }

    pub fn kind(&self) -> &OperandKind {
        &self.kind
    }

    pub fn is_value(&self) -> bool {
        self.value
    }

    pub fn tag(&self) -> Option<Tag> {
        match self.kind {
            OperandKind::Temp { tag, .. } => Some(tag),
            _ => None,
        }
    }

    pub fn symbol(&self) -> Option<SymbolId> {
        match self.kind {
            OperandKind::Symbol(symbol) => Some(symbol),
            _ => None,
        }
    }

    pub fn register(&self) -> Option<Register> {
        self.reg
    }

    pub fn is_frame_resident(&self) -> bool {
        self.frame_resident
    }

    pub fn location(&self) -> Option<Location> {
        match (self.reg, self.frame_resident) {
            (Some(reg), false) => Some(Location::Register(reg)),
            (None, true) => Some(Location::Frame),
            (None, false) => None,
            (Some(_), true) => unreachable!("operand both colored and spilled"),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.location().is_some()
    }

    pub fn assign(&mut self, reg: Register) {
        assert!(!self.frame_resident, "assigning a register to a spilled operand");
        self.reg = Some(reg);
    }

    pub fn spill(&mut self) {
        self.reg = None;
        self.frame_resident = true;
    }

    /// Registers this operand must stay out of.
    pub fn restricted(&self) -> &[Register] {
        &self.restricted
    }

    pub fn restrict(&mut self, regs: &[Register]) {
        for reg in regs {
            if !self.restricted.contains(reg) {
                self.restricted.push(*reg);
            }
        }
    }
}

/// Arena of every operand of a compilation unit.
///
/// Symbol operands are interned, so two references to one declaration are the same
/// operand and compare equal in dataflow sets.
#[derive(Debug, Clone, Default)]
pub struct Operands {
    operands: Vec<Operand>,
    symbols: HashMap<SymbolId, OperandId>,
}

impl Operands {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, operand: Operand) -> OperandId {
        let id = OperandId(self.operands.len());
        self.operands.push(operand);
        id
    }

    pub fn symbol(&mut self, id: SymbolId, symbol: &Symbol) -> OperandId {
        if let Some(&operand) = self.symbols.get(&id) {
            return operand;
        }
        let operand = self.push(Operand::new(
            OperandKind::Symbol(id),
            symbol.is_register_candidate(),
        ));
        self.symbols.insert(id, operand);
        operand
    }

    pub fn temp(&mut self, temp: Temp, tag: Tag) -> OperandId {
        self.push(Operand::new(OperandKind::Temp { temp, tag }, true))
    }

    pub fn label(&mut self, label: Label) -> OperandId {
        self.push(Operand::new(OperandKind::Label(label), false))
    }

    pub fn int(&mut self, value: i64) -> OperandId {
        self.push(Operand::new(OperandKind::Int(value), false))
    }

    pub fn get(&self, id: OperandId) -> Option<&Operand> {
        self.operands.get(id.0)
    }

    pub fn is_value(&self, id: OperandId) -> bool {
        self.operands[id.0].value
    }

    pub fn len(&self) -> usize {
        self.operands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operands.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (OperandId, &Operand)> {
        self.operands
            .iter()
            .enumerate()
            .map(|(i, operand)| (OperandId(i), operand))
    }
}

impl Index<OperandId> for Operands {
    type Output = Operand;

    fn index(&self, id: OperandId) -> &Self::Output {
        &self.operands[id.0]
    }
}

impl IndexMut<OperandId> for Operands {
    fn index_mut(&mut self, id: OperandId) -> &mut Self::Output {
        &mut self.operands[id.0]
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, StrumDisplay)]
pub enum BinOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Mod,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, StrumDisplay)]
pub enum RelOp {
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, StrumDisplay)]
pub enum LogicOp {
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, StrumDisplay)]
pub enum UnOp {
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "!")]
    Not,
}

impl From<UnaryOp> for UnOp {
    fn from(op: UnaryOp) -> Self {
        match op {
            UnaryOp::Neg => UnOp::Neg,
            UnaryOp::Not => UnOp::Not,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum OpCode {
    /// `result = left op right`
    Binary(BinOp),
    /// `result = left op right`, producing a boolean
    Relational(RelOp),
    /// `result = left op right`, both sides already evaluated
    Logical(LogicOp),
    /// `result = op left`
    Unary(UnOp),
    /// Function header: `result` is the function's symbol.
    Name,
    /// `result = left`
    Assign,
    /// `result = call left(args)`; `result` is absent for void callees.
    Call,
    /// `result = left`, marshaling the n-th argument.
    Arg(usize),
    /// `result = left`, receiving the n-th parameter.
    Param(usize),
    /// `result = &left + right`
    Address,
    /// `*left = right`
    Store,
    /// `result = *left`
    Deref,
    /// `left:`
    Label,
    /// `if !left goto right`
    BranchIfFalse,
    /// `goto left`
    Jump,
    /// `return left`
    Return,
}

impl OpCode {
    /// The instruction a binary source operator lowers to, with the tag of its result.
    pub fn binary(op: Operator) -> (Self, Tag) {
        let (op, tag) = match op {
            Operator::Plus => (Self::Binary(BinOp::Add), Tag::Binary(BinOp::Add)),
            Operator::Minus => (Self::Binary(BinOp::Sub), Tag::Binary(BinOp::Sub)),
            Operator::Mul => (Self::Binary(BinOp::Mul), Tag::Binary(BinOp::Mul)),
            Operator::Div => (Self::Binary(BinOp::Div), Tag::Binary(BinOp::Div)),
            Operator::Mod => (Self::Binary(BinOp::Mod), Tag::Binary(BinOp::Mod)),
            Operator::Eq => (Self::Relational(RelOp::Eq), Tag::Relational(RelOp::Eq)),
            Operator::Neq => (Self::Relational(RelOp::Ne), Tag::Relational(RelOp::Ne)),
            Operator::Lt => (Self::Relational(RelOp::Lt), Tag::Relational(RelOp::Lt)),
            Operator::Le => (Self::Relational(RelOp::Le), Tag::Relational(RelOp::Le)),
            Operator::Gt => (Self::Relational(RelOp::Gt), Tag::Relational(RelOp::Gt)),
            Operator::Ge => (Self::Relational(RelOp::Ge), Tag::Relational(RelOp::Ge)),
            Operator::And => (Self::Logical(LogicOp::And), Tag::Logical(LogicOp::And)),
            Operator::Or => (Self::Logical(LogicOp::Or), Tag::Logical(LogicOp::Or)),
        };
        (op, tag)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub id: usize,
    pub op: OpCode,
    pub result: Option<OperandId>,
    pub left: Option<OperandId>,
    pub right: Option<OperandId>,
    /// Marshaled arguments, only set for [`OpCode::Call`].
    pub args: Vec<OperandId>,
    /// Values that must survive this instruction, filled in by liveness.
    pub live_out: LiveSet,
}

impl Instruction {
    pub fn new(
        id: usize,
        op: OpCode,
        result: Option<OperandId>,
        left: Option<OperandId>,
        right: Option<OperandId>,
    ) -> Self {
        Self {
            id,
            op,
            result,
            left,
            right,
            args: Vec::new(),
            live_out: LiveSet::new(),
        }
    }

    /// Operands this instruction reads.
    pub fn sources(&self) -> impl Iterator<Item = OperandId> + '_ {
        let slots = match self.op {
            // labels are not read
            OpCode::Label | OpCode::Jump => [None, None],
            OpCode::BranchIfFalse => [self.left, None],
            _ => [self.left, self.right],
        };
        slots.into_iter().flatten().chain(self.args.iter().copied())
    }

    /// Operand this instruction writes.
    pub fn def(&self) -> Option<OperandId> {
        match self.op {
            OpCode::Name => None,
            _ => self.result,
        }
    }

    /// Label operand this instruction may transfer control to.
    pub fn target(&self) -> Option<OperandId> {
        match self.op {
            OpCode::Jump => self.left,
            OpCode::BranchIfFalse => self.right,
            _ => None,
        }
    }

    pub fn is_transfer(&self) -> bool {
        matches!(self.op, OpCode::Jump | OpCode::Return)
    }
}
