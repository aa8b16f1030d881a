use std::collections::HashMap;

use log::{debug, trace};

use crate::tac::{Instruction, LiveSet, OperandId, Operands};

use super::{flow::Cfg, graph::ID, FunctionInfo};

/// Liveness of an operand at a program point and the index of its nearest use after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UseInfo {
    pub live: bool,
    pub next_use: Option<usize>,
}

/// Next-use information at block entry, keyed by operand.
pub type NextUseTable = HashMap<OperandId, UseInfo>;

/// Fills in the dataflow sets of every block and the live-out set of every
/// instruction of `function`.
pub fn analyze(function: &mut FunctionInfo, instrs: &mut [Instruction], operands: &Operands) {
    let cfg = &mut function.cfg;

    local_sets(cfg, instrs, operands);
    let passes = solve(cfg);
    debug!("liveness converged after {} passes", passes);

    annotate(cfg, instrs, operands);
}

fn local_sets(cfg: &mut Cfg, instrs: &[Instruction], operands: &Operands) {
    let ids: Vec<ID> = cfg.graph.ids().collect();
    for id in ids {
        let block = cfg.block_mut(id);
        let mut uses = LiveSet::new();
        let mut defs = LiveSet::new();

        for instr in &instrs[block.range()] {
            for src in instr.sources().filter(|&src| operands.is_value(src)) {
                if !defs.contains(&src) {
                    uses.insert(src);
                }
            }
            if let Some(def) = instr.def().filter(|&def| operands.is_value(def)) {
                defs.insert(def);
            }
        }

        block.uses = uses;
        block.defs = defs;
    }
}

/// Iterates `out = U in[succ]`, `in = use U (out - def)` over the blocks, last block
/// first, until a whole pass changes nothing. Returns the number of passes.
pub fn solve(cfg: &mut Cfg) -> usize {
    let ids: Vec<ID> = cfg.graph.ids().collect();

    let mut passes = 0;
    let mut has_change = true;
    while has_change {
        has_change = false;
        passes += 1;

        for &id in ids.iter().rev() {
            let mut new_out = LiveSet::new();
            for succ in cfg.graph.succ(id) {
                new_out.extend(cfg.block(succ).live_in.iter().copied());
            }

            let block = cfg.block(id);
            let mut new_in: LiveSet = new_out.difference(&block.defs).copied().collect();
            new_in.extend(block.uses.iter().copied());

            has_change |= block.live_in != new_in;
            has_change |= block.live_out != new_out;

            let block = cfg.block_mut(id);
            block.live_in = new_in;
            block.live_out = new_out;
        }
    }

    passes
}

fn annotate(cfg: &mut Cfg, instrs: &mut [Instruction], operands: &Operands) {
    let ids: Vec<ID> = cfg.graph.ids().collect();
    for id in ids {
        let block = cfg.block_mut(id);

        let mut live = block.live_out.clone();
        let mut table: NextUseTable = live
            .iter()
            .map(|&operand| {
                (
                    operand,
                    UseInfo {
                        live: true,
                        next_use: None,
                    },
                )
            })
            .collect();

        for index in block.range().rev() {
            let instr = &mut instrs[index];
            instr.live_out = live.clone();

            if let Some(def) = instr.def().filter(|&def| operands.is_value(def)) {
                live.remove(&def);
                table.insert(
                    def,
                    UseInfo {
                        live: false,
                        next_use: None,
                    },
                );
            }
            for src in instr.sources().filter(|&src| operands.is_value(src)) {
                live.insert(src);
                table.insert(
                    src,
                    UseInfo {
                        live: true,
                        next_use: Some(index),
                    },
                );
            }
        }

        trace!("{}: live in {:?}", id, live);
        debug_assert_eq!(live, block.live_in);
        block.next_use = table;
    }
}
