use once_cell::sync::Lazy;
use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};

use super::{Convention, Register};

/// AAPCS64.
/// https://developer.arm.com/documentation/102374/0100/Procedure-Call-Standard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aarch64;

// x16-x18 (intra-procedure-call scratch, platform), x29 (fp), x30 (lr), sp and xzr
// are reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
enum Reg {
    X0,
    X1,
    X2,
    X3,
    X4,
    X5,
    X6,
    X7,
    X8,
    X9,
    X10,
    X11,
    X12,
    X13,
    X14,
    X15,
    X19,
    X20,
    X21,
    X22,
    X23,
    X24,
    X25,
    X26,
    X27,
    X28,
}

impl From<Reg> for Register {
    fn from(reg: Reg) -> Self {
        let name: &'static str = reg.into();
        // the name is the encoding
        let num = name[1..].parse().unwrap_or_default();
        Register::new(num, name)
    }
}

static REGISTERS: Lazy<Vec<Register>> = Lazy::new(|| Reg::iter().map(Register::from).collect());

static ARG_REGS: Lazy<Vec<Register>> = Lazy::new(|| {
    [
        Reg::X0,
        Reg::X1,
        Reg::X2,
        Reg::X3,
        Reg::X4,
        Reg::X5,
        Reg::X6,
        Reg::X7,
    ]
    .into_iter()
    .map(Register::from)
    .collect()
});

static CALLER_SAVE_REGS: Lazy<Vec<Register>> = Lazy::new(|| {
    Reg::iter()
        .take_while(|reg| *reg != Reg::X19)
        .map(Register::from)
        .collect()
});

impl Convention for Aarch64 {
    const NAME: &'static str = "aarch64-aapcs64";

    fn registers() -> &'static [Register] {
        REGISTERS.as_ref()
    }

    fn arg_regs() -> &'static [Register] {
        ARG_REGS.as_ref()
    }

    fn rv() -> Register {
        Reg::X0.into()
    }

    fn caller_save_regs() -> &'static [Register] {
        CALLER_SAVE_REGS.as_ref()
    }

    // sdiv writes only its destination.
    fn division_clobbers() -> &'static [Register] {
        &[]
    }
}
