use std::collections::{BTreeSet, HashMap};

use log::debug;
use thiserror::Error;

use crate::{
    symbol::{SymbolId, SymbolTable},
    tac::{Instruction, LiveSet, OpCode, OperandId, Operands},
};

use super::{
    graph::{Graph, ID},
    interference::InterferenceGraph,
    liveness::NextUseTable,
    FunctionInfo,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("instruction {0} is not inside any function")]
    OrphanInstruction(usize),

    #[error("branch at {instr} in `{function}` targets a label that is never placed")]
    UnresolvedLabel { function: String, instr: usize },

    #[error("branch at {0} has no target")]
    MissingTarget(usize),
}

/// A maximal straight-line run `start..=end` of the instruction table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasicBlock {
    pub start: usize,
    pub end: usize,
    /// Values read before any local definition.
    pub uses: LiveSet,
    pub defs: LiveSet,
    pub live_in: LiveSet,
    pub live_out: LiveSet,
    pub next_use: NextUseTable,
}

impl BasicBlock {
    fn new(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            ..Default::default()
        }
    }

    pub fn range(&self) -> std::ops::RangeInclusive<usize> {
        self.start..=self.end
    }
}

#[derive(Debug, Clone)]
pub struct Cfg {
    pub graph: Graph<BasicBlock>,
    pub head: ID,
}

impl Cfg {
    pub fn block(&self, id: ID) -> &BasicBlock {
        self.graph.get(id).val()
    }

    pub fn block_mut(&mut self, id: ID) -> &mut BasicBlock {
        self.graph.get_mut(id).val_mut()
    }

    pub fn blocks(&self) -> impl DoubleEndedIterator<Item = (ID, &BasicBlock)> {
        self.graph.nodes().iter().map(|node| (node.id(), node.val()))
    }

    pub fn len(&self) -> usize {
        self.graph.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Block holding instruction `instr`, if it belongs to this function.
    pub fn block_of(&self, instr: usize) -> Option<ID> {
        let nodes = self.graph.nodes();
        // blocks are laid out in instruction order
        let after = nodes.partition_point(|node| node.val().start <= instr);
        let node = nodes.get(after.checked_sub(1)?)?;
        node.val().range().contains(&instr).then(|| node.id())
    }
}

fn is_header(instr: &Instruction, operands: &Operands, symbols: &SymbolTable) -> Option<SymbolId> {
    if instr.op != OpCode::Name {
        return None;
    }
    let symbol = operands[instr.result?].symbol()?;
    symbols[symbol].ty.is_function().then(|| symbol)
}

/// Splits the instruction table into functions and builds the control flow graph of
/// each one.
pub fn build(
    instrs: &[Instruction],
    operands: &Operands,
    symbols: &SymbolTable,
) -> Result<Vec<FunctionInfo>, Error> {
    let mut functions = Vec::new();

    let mut index = 0;
    while index < instrs.len() {
        let symbol = is_header(&instrs[index], operands, symbols)
            .ok_or(Error::OrphanInstruction(index))?;

        let start = index;
        index += 1;
        while index < instrs.len() && is_header(&instrs[index], operands, symbols).is_none() {
            index += 1;
        }
        let end = index - 1;

        let cfg = convert(instrs, start, end, &symbols[symbol].name)?;
        debug!(
            "function `{}`: instructions {}..={}, {} blocks",
            symbols[symbol].name,
            start,
            end,
            cfg.len()
        );

        functions.push(FunctionInfo {
            symbol,
            start,
            end,
            cfg,
            interference: InterferenceGraph::default(),
            spilled: Vec::new(),
        });
    }

    Ok(functions)
}

fn convert(instrs: &[Instruction], start: usize, end: usize, name: &str) -> Result<Cfg, Error> {
    let mut labels: HashMap<OperandId, usize> = HashMap::new();
    let mut jumps = Vec::new();

    for instr in &instrs[start..=end] {
        match instr.op {
            OpCode::Label => {
                if let Some(label) = instr.left {
                    labels.insert(label, instr.id);
                }
            }
            OpCode::Jump | OpCode::BranchIfFalse => {
                let target = instr.target().ok_or(Error::MissingTarget(instr.id))?;
                jumps.push((instr.id, target));
            }
            _ => {}
        }
    }

    let mut targets = HashMap::new();
    for (from, label) in jumps {
        let to = labels
            .get(&label)
            .copied()
            .ok_or_else(|| Error::UnresolvedLabel {
                function: name.to_string(),
                instr: from,
            })?;
        targets.insert(from, to);
    }

    let leaders = leaders(instrs, start, end, &targets);

    let mut graph = Graph::with_capacity(leaders.len());
    let mut block_starts = HashMap::new();
    let mut iter = leaders.iter().copied().peekable();
    while let Some(leader) = iter.next() {
        let last = iter.peek().map_or(end, |next| next - 1);
        let id = graph.insert(BasicBlock::new(leader, last));
        block_starts.insert(leader, id);
    }

    let ids: Vec<ID> = graph.ids().collect();
    for (position, &id) in ids.iter().enumerate() {
        let last = graph.get(id).val().end;
        let fallthrough = ids.get(position + 1).copied();
        let target = targets.get(&last).map(|to| block_starts[to]);

        match instrs[last].op {
            OpCode::Jump => {
                if let Some(target) = target {
                    graph.link(id, target);
                }
            }
            OpCode::BranchIfFalse => {
                if let Some(fallthrough) = fallthrough {
                    graph.link(id, fallthrough);
                }
                if let Some(target) = target {
                    graph.link(id, target);
                }
            }
            OpCode::Return => {}
            _ => {
                if let Some(fallthrough) = fallthrough {
                    graph.link(id, fallthrough);
                }
            }
        }
    }

    Ok(Cfg {
        head: block_starts[&start],
        graph,
    })
}

fn leaders(
    instrs: &[Instruction],
    start: usize,
    end: usize,
    targets: &HashMap<usize, usize>,
) -> BTreeSet<usize> {
    let mut leaders = BTreeSet::from([start]);

    for instr in &instrs[start..=end] {
        let next = instr.id + 1;
        let has_next = next <= end;
        match instr.op {
            OpCode::Label => {
                leaders.insert(instr.id);
            }
            OpCode::BranchIfFalse | OpCode::Jump => {
                if has_next {
                    leaders.insert(next);
                }
            }
            OpCode::Return => {
                if has_next && instrs[next].op != OpCode::Jump {
                    leaders.insert(next);
                }
            }
            _ => {}
        }
    }
    leaders.extend(targets.values().copied());

    leaders
}
