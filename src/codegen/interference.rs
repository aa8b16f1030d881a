use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use log::trace;

use crate::tac::{Instruction, LiveSet, OpCode, OperandId, Operands};

use super::{flow::Cfg, graph::ID};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId(usize);

impl BundleId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One definition and everything alive right after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub defined: OperandId,
    pub block: ID,
    pub instr: usize,
    /// Operands that may not share storage with `defined`.
    pub interferes: LiveSet,
    /// Set on a comparison whose result only feeds the branch right after it, so a
    /// back-end can fuse the two instead of materializing the boolean.
    pub precedes_conditional: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InterferenceGraph {
    bundles: Vec<Bundle>,
    by_operand: HashMap<OperandId, Vec<BundleId>>,
    adjacency: HashMap<OperandId, HashSet<OperandId>>,
    // first-seen order, so coloring is reproducible
    nodes: Vec<OperandId>,
}

impl InterferenceGraph {
    pub fn build(cfg: &Cfg, instrs: &[Instruction], operands: &Operands) -> Self {
        let mut graph = Self::default();
        let mut seen = HashSet::new();

        for (block_id, block) in cfg.blocks() {
            for index in block.range() {
                let instr = &instrs[index];

                let def = instr.def().filter(|&def| operands.is_value(def));
                let touched = def
                    .into_iter()
                    .chain(instr.sources().filter(|&src| operands.is_value(src)))
                    .chain(instr.live_out.iter().copied().sorted());
                for operand in touched {
                    if seen.insert(operand) {
                        graph.nodes.push(operand);
                    }
                }

                // everything live on entry arrives at once
                if instr.op == OpCode::Name {
                    for (a, b) in instr.live_out.iter().copied().tuple_combinations() {
                        graph.double_link(a, b);
                    }
                }

                let def = match def {
                    Some(def) => def,
                    None => continue,
                };

                let interferes: LiveSet = instr
                    .live_out
                    .iter()
                    .copied()
                    .filter(|&live| live != def)
                    .collect();
                for &other in &interferes {
                    graph.double_link(def, other);
                }

                let precedes_conditional = matches!(instr.op, OpCode::Relational(_))
                    && index < block.end
                    && instrs[index + 1].op == OpCode::BranchIfFalse
                    && instrs[index + 1].left == Some(def);

                let id = BundleId(graph.bundles.len());
                trace!(
                    "bundle {} for {} at {}: {} interferences",
                    id.0,
                    def,
                    index,
                    interferes.len()
                );
                graph.bundles.push(Bundle {
                    defined: def,
                    block: block_id,
                    instr: index,
                    interferes,
                    precedes_conditional,
                });
                graph.by_operand.entry(def).or_default().push(id);
            }
        }

        graph
    }

    fn double_link(&mut self, a: OperandId, b: OperandId) {
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    pub fn bundle(&self, id: BundleId) -> &Bundle {
        &self.bundles[id.0]
    }

    /// Bundles of every definition of `operand`.
    pub fn bundles_of(&self, operand: OperandId) -> impl Iterator<Item = &Bundle> {
        self.by_operand
            .get(&operand)
            .into_iter()
            .flatten()
            .map(|&id| self.bundle(id))
    }

    pub fn neighbors(&self, operand: OperandId) -> impl Iterator<Item = OperandId> + '_ {
        self.adjacency.get(&operand).into_iter().flatten().copied()
    }

    pub fn interferes(&self, a: OperandId, b: OperandId) -> bool {
        self.adjacency
            .get(&a)
            .map_or(false, |neighbors| neighbors.contains(&b))
    }

    /// Every value the function touches.
    pub fn nodes(&self) -> &[OperandId] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
