use std::{fmt::Display, ops::Index};

use strum::Display as StrumDisplay;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SymbolId(u32);

impl SymbolId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum SymbolKind {
    Local,
    Param,
    Global,
    Function,
}

/// Types as inferred by the front-end.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum Type {
    Int,
    Bool,
    Char,
    Void,
    Array(Box<Type>, usize),
    Function { params: Vec<Type>, ret: Box<Type> },
}

impl Type {
    pub const WORD_SIZE: u64 = 8;

    pub fn function(params: Vec<Type>, ret: Type) -> Self {
        Self::Function {
            params,
            ret: Box::new(ret),
        }
    }

    pub fn array(elem: Type, len: usize) -> Self {
        Self::Array(Box::new(elem), len)
    }

    /// Size in bytes of a value of this type.
    pub fn size(&self) -> u64 {
        match self {
            Type::Int | Type::Function { .. } => Self::WORD_SIZE,
            Type::Bool | Type::Char => 1,
            Type::Void => 0,
            Type::Array(elem, len) => elem.size() * (*len as u64),
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Type::Function { .. })
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Int | Type::Bool | Type::Char)
    }

    pub fn element(&self) -> Option<&Type> {
        match self {
            Type::Array(elem, _) => Some(elem),
            _ => None,
        }
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Bool => write!(f, "bool"),
            Type::Char => write!(f, "char"),
            Type::Void => write!(f, "void"),
            Type::Array(elem, len) => write!(f, "{}[{}]", elem, len),
            Type::Function { params, ret } => {
                write!(f, "fn(")?;
                for (i, param) in params.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", param)?;
                }
                write!(f, ") -> {}", ret)
            }
        }
    }
}

/// A declaration resolved by the front-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Type,
    /// Frame offset assigned by the front-end, if the symbol lives in a frame.
    pub offset: Option<i64>,
}

impl Symbol {
    /// Whether the symbol's value can live in a register.
    pub fn is_register_candidate(&self) -> bool {
        matches!(self.kind, SymbolKind::Local | SymbolKind::Param) && self.ty.is_scalar()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, kind: SymbolKind, ty: Type) -> SymbolId {
        self.insert(Symbol {
            name: name.into(),
            kind,
            ty,
            offset: None,
        })
    }

    pub fn declare_at(
        &mut self,
        name: impl Into<String>,
        kind: SymbolKind,
        ty: Type,
        offset: i64,
    ) -> SymbolId {
        self.insert(Symbol {
            name: name.into(),
            kind,
            ty,
            offset: Some(offset),
        })
    }

    pub fn insert(&mut self, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(symbol);
        id
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.index())
    }

    /// First symbol declared under `name`.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.symbols
            .iter()
            .position(|symbol| symbol.name == name)
            .map(|index| SymbolId(index as u32))
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

impl Index<SymbolId> for SymbolTable {
    type Output = Symbol;

    fn index(&self, id: SymbolId) -> &Self::Output {
        &self.symbols[id.index()]
    }
}
