use std::collections::HashSet;

use log::trace;

use crate::{
    frame::Register,
    tac::{OperandId, Operands},
};

use super::interference::InterferenceGraph;

type Registers<'a> = &'a [Register];
type SpilledNodes = Vec<OperandId>;

/// Greedily colors every unresolved node of `graph` with `registers`, tried in order.
/// Operands that fit nowhere are put in the frame and returned.
pub fn color(
    graph: &InterferenceGraph,
    operands: &mut Operands,
    registers: Registers,
) -> SpilledNodes {
    let mut spilled = SpilledNodes::new();

    // Definitions first, then whatever is only ever read.
    let order = graph
        .bundles()
        .iter()
        .map(|bundle| bundle.defined)
        .chain(graph.nodes().iter().copied());

    for operand in order {
        if operands[operand].is_resolved() {
            continue;
        }

        match select(graph, operands, operand, registers) {
            Some(reg) => {
                trace!("{} -> {}", operand, reg);
                operands[operand].assign(reg);
            }
            None => {
                trace!("{} -> frame", operand);
                operands[operand].spill();
                spilled.push(operand);
            }
        }
    }

    spilled
}

fn select(
    graph: &InterferenceGraph,
    operands: &Operands,
    operand: OperandId,
    registers: Registers,
) -> Option<Register> {
    // frame-resident neighbors hold no register
    let taken: HashSet<Register> = graph
        .neighbors(operand)
        .filter_map(|neighbor| operands[neighbor].register())
        .collect();
    let usable = |reg: &&Register| !taken.contains(*reg);

    let restricted = operands[operand].restricted();
    match registers.iter().find(usable) {
        Some(reg) if restricted.contains(reg) => registers
            .iter()
            .filter(|reg| !restricted.contains(reg))
            .find(usable)
            .copied(),
        reg => reg.copied(),
    }
}
