use std::fmt::{self, Display};

use itertools::Itertools;

use crate::symbol::SymbolTable;

use super::{Instruction, Location, OpCode, OperandId, OperandKind, Operands};

/// Human readable dump of an instruction table, with allocation results once known.
pub struct Listing<'a> {
    instrs: &'a [Instruction],
    operands: &'a Operands,
    symbols: &'a SymbolTable,
}

impl<'a> Listing<'a> {
    pub fn new(instrs: &'a [Instruction], operands: &'a Operands, symbols: &'a SymbolTable) -> Self {
        Self {
            instrs,
            operands,
            symbols,
        }
    }

    fn operand(&self, id: OperandId) -> String {
        let operand = &self.operands[id];
        let name = match operand.kind() {
            OperandKind::Symbol(symbol) => self.symbols[*symbol].name.clone(),
            OperandKind::Temp { temp, .. } => temp.to_string(),
            OperandKind::Label(label) => label.to_string(),
            OperandKind::Int(value) => value.to_string(),
        };
        match operand.location() {
            Some(Location::Register(reg)) => format!("{}<{}>", name, reg),
            Some(Location::Frame) => format!("{}<frame>", name),
            None => name,
        }
    }

    fn slot(&self, id: Option<OperandId>) -> String {
        id.map_or_else(|| "_".to_string(), |id| self.operand(id))
    }

    fn instruction(&self, instr: &Instruction) -> String {
        let result = self.slot(instr.result);
        let left = self.slot(instr.left);
        let right = self.slot(instr.right);
        match instr.op {
            OpCode::Binary(op) => format!("{} = {} {} {}", result, left, op, right),
            OpCode::Relational(op) => format!("{} = {} {} {}", result, left, op, right),
            OpCode::Logical(op) => format!("{} = {} {} {}", result, left, op, right),
            OpCode::Unary(op) => format!("{} = {}{}", result, op, left),
            OpCode::Name => format!("func {}:", result),
            OpCode::Assign => format!("{} = {}", result, left),
            OpCode::Call => {
                let args = instr.args.iter().map(|&arg| self.operand(arg)).join(", ");
                match instr.result {
                    Some(_) => format!("{} = call {}({})", result, left, args),
                    None => format!("call {}({})", left, args),
                }
            }
            OpCode::Arg(index) => format!("arg{} {} = {}", index, result, left),
            OpCode::Param(index) => format!("param{} {} = {}", index, result, left),
            OpCode::Address => format!("{} = &{} + {}", result, left, right),
            OpCode::Store => format!("*{} = {}", left, right),
            OpCode::Deref => format!("{} = *{}", result, left),
            OpCode::Label => format!("{}:", left),
            OpCode::BranchIfFalse => format!("if !{} goto {}", left, right),
            OpCode::Jump => format!("goto {}", left),
            OpCode::Return => match instr.left {
                Some(_) => format!("return {}", left),
                None => "return".to_string(),
            },
        }
    }
}

impl Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for instr in self.instrs {
            let text = self.instruction(instr);
            match instr.op {
                OpCode::Name | OpCode::Label => writeln!(f, "{:>4}  {}", instr.id, text)?,
                _ => {
                    write!(f, "{:>4}      {}", instr.id, text)?;
                    if !instr.live_out.is_empty() {
                        let live = instr
                            .live_out
                            .iter()
                            .sorted()
                            .map(|&id| self.operand(id))
                            .join(", ");
                        write!(f, "    ; live: {}", live)?;
                    }
                    writeln!(f)?;
                }
            }
        }
        Ok(())
    }
}
