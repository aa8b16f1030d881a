//! Compiler middle-end: lowers a checked syntax tree to three-address code, splits it
//! into control flow graphs, runs liveness and assigns registers for a target calling
//! convention.

pub mod ast;
pub mod codegen;
pub mod common;
pub mod frame;
pub mod symbol;
pub mod tac;

use std::marker::PhantomData;

use log::debug;
use thiserror::Error;

use crate::{
    ast::Program,
    codegen::{flow, reg_alloc, FunctionInfo},
    frame::{Aarch64, Convention, X86_64},
    symbol::{SymbolId, SymbolTable},
    tac::{Global, Instruction, Listing, Operands, Tac, TacBuilder},
};

pub const X86_64_SYSV: PhantomData<X86_64> = PhantomData;
pub const AARCH64: PhantomData<Aarch64> = PhantomData;

/// The decorated instruction stream handed to a back-end.
#[derive(Debug, Clone)]
pub struct Unit {
    pub instrs: Vec<Instruction>,
    pub operands: Operands,
    pub globals: Vec<Global>,
    pub functions: Vec<FunctionInfo>,
}

impl Unit {
    pub fn function(&self, symbol: SymbolId) -> Option<&FunctionInfo> {
        self.functions.iter().find(|function| function.symbol == symbol)
    }

    pub fn listing<'a>(&'a self, symbols: &'a SymbolTable) -> Listing<'a> {
        Listing::new(&self.instrs, &self.operands, symbols)
    }
}

pub fn compile<C: Convention>(
    program: &Program,
    #[allow(unused)] arch: PhantomData<C>,
) -> Result<Unit, Error> {
    let Tac {
        mut instrs,
        mut operands,
        globals,
    } = TacBuilder::new(&program.symbols).build(program)?;

    let mut functions = flow::build(&instrs, &operands, &program.symbols)?;
    for function in &mut functions {
        reg_alloc::alloc::<C>(function, &mut instrs, &mut operands);
    }

    debug!(
        "{}: {} functions, {} instructions, {} spills",
        C::NAME,
        functions.len(),
        instrs.len(),
        functions
            .iter()
            .map(|function| function.spilled.len())
            .sum::<usize>()
    );

    Ok(Unit {
        instrs,
        operands,
        globals,
        functions,
    })
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    LowerError(#[from] tac::Error),

    #[error("malformed instruction stream: {0}")]
    FlowError(#[from] flow::Error),
}
