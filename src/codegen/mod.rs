pub mod color;
pub mod flow;
pub mod graph;
pub mod interference;
pub mod liveness;
pub mod reg_alloc;

use crate::{symbol::SymbolId, tac::OperandId};

use self::{flow::Cfg, interference::InterferenceGraph};

/// Everything the middle-end knows about one function.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub symbol: SymbolId,
    /// Index of the function header in the instruction table.
    pub start: usize,
    /// Index of the last instruction, inclusive.
    pub end: usize,
    pub cfg: Cfg,
    pub interference: InterferenceGraph,
    /// Operands the colorer had to put in the frame.
    pub spilled: Vec<OperandId>,
}

impl FunctionInfo {
    pub fn range(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}
