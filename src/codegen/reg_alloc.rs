use log::debug;

use crate::{
    frame::Convention,
    tac::{BinOp, Instruction, OpCode, OperandId, Operands, Tag},
};

use super::{color, interference::InterferenceGraph, liveness, FunctionInfo};

/// Runs liveness, interference and coloring over `function`, leaving every value it
/// touches either in a register or in the frame.
pub fn alloc<C: Convention>(
    function: &mut FunctionInfo,
    instrs: &mut [Instruction],
    operands: &mut Operands,
) {
    liveness::analyze(function, instrs, operands);

    function.interference = InterferenceGraph::build(&function.cfg, instrs, operands);

    let instrs = &instrs[function.range()];

    precolor::<C>(instrs, operands);
    restrict::<C>(instrs, operands);

    let spilled = color::color(&function.interference, operands, C::registers());
    debug!(
        "{}: {} values, {} spilled",
        C::NAME,
        function.interference.nodes().len(),
        spilled.len()
    );
    function.spilled = spilled;
}

fn slots(instr: &Instruction) -> impl Iterator<Item = OperandId> + '_ {
    [instr.result, instr.left, instr.right]
        .into_iter()
        .flatten()
        .chain(instr.args.iter().copied())
}

/// Pins the operands the calling convention places.
fn precolor<C: Convention>(instrs: &[Instruction], operands: &mut Operands) {
    let arg_regs = C::arg_regs();

    for instr in instrs {
        for operand in slots(instr) {
            if operands[operand].is_resolved() {
                continue;
            }
            match operands[operand].tag() {
                Some(Tag::Arg(index)) | Some(Tag::Param(index)) => match arg_regs.get(index) {
                    Some(&reg) => operands[operand].assign(reg),
                    // passed on the stack
                    None => operands[operand].spill(),
                },
                Some(Tag::ReturnValue) | Some(Tag::CallResult) => {
                    operands[operand].assign(C::rv())
                }
                _ => {}
            }
        }

        // A parameter past the register limit never sees a register either.
        if let (OpCode::Param(index), Some(param)) = (instr.op, instr.result) {
            if index >= arg_regs.len() && operands.is_value(param) {
                operands[param].spill();
            }
        }
    }
}

/// Keeps values away from registers an instruction overwrites behind their back.
fn restrict<C: Convention>(instrs: &[Instruction], operands: &mut Operands) {
    for instr in instrs {
        let clobbers = match instr.op {
            OpCode::Call => C::caller_save_regs(),
            OpCode::Binary(BinOp::Div) | OpCode::Binary(BinOp::Mod) => {
                if let Some(divisor) = instr.right.filter(|&right| operands.is_value(right)) {
                    operands[divisor].restrict(C::division_clobbers());
                }
                C::division_clobbers()
            }
            _ => continue,
        };
        if clobbers.is_empty() {
            continue;
        }

        for &live in &instr.live_out {
            if Some(live) != instr.def() {
                operands[live].restrict(clobbers);
            }
        }
    }
}
