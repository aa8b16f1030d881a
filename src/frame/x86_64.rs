use once_cell::sync::Lazy;
use strum::{EnumIter, IntoEnumIterator, IntoStaticStr};

use super::{Convention, Register};

/// System V AMD64.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct X86_64;

// rsp and rbp are never handed out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
enum Reg {
    Rax,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    Rbx,
    R12,
    R13,
    R14,
    R15,
}

impl Reg {
    fn num(self) -> u8 {
        match self {
            Reg::Rax => 0,
            Reg::Rcx => 1,
            Reg::Rdx => 2,
            Reg::Rbx => 3,
            Reg::Rsi => 6,
            Reg::Rdi => 7,
            Reg::R8 => 8,
            Reg::R9 => 9,
            Reg::R10 => 10,
            Reg::R11 => 11,
            Reg::R12 => 12,
            Reg::R13 => 13,
            Reg::R14 => 14,
            Reg::R15 => 15,
        }
    }
}

impl From<Reg> for Register {
    fn from(reg: Reg) -> Self {
        Register::new(reg.num(), reg.into())
    }
}

static REGISTERS: Lazy<Vec<Register>> = Lazy::new(|| Reg::iter().map(Register::from).collect());

static ARG_REGS: Lazy<Vec<Register>> = Lazy::new(|| {
    [Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx, Reg::R8, Reg::R9]
        .into_iter()
        .map(Register::from)
        .collect()
});

static CALLER_SAVE_REGS: Lazy<Vec<Register>> = Lazy::new(|| {
    [
        Reg::Rax,
        Reg::Rcx,
        Reg::Rdx,
        Reg::Rsi,
        Reg::Rdi,
        Reg::R8,
        Reg::R9,
        Reg::R10,
        Reg::R11,
    ]
    .into_iter()
    .map(Register::from)
    .collect()
});

// idiv takes its dividend in rdx:rax and leaves quotient and remainder there.
static DIVISION_CLOBBERS: Lazy<Vec<Register>> =
    Lazy::new(|| vec![Reg::Rax.into(), Reg::Rdx.into()]);

impl Convention for X86_64 {
    const NAME: &'static str = "x86_64-sysv";

    fn registers() -> &'static [Register] {
        REGISTERS.as_ref()
    }

    fn arg_regs() -> &'static [Register] {
        ARG_REGS.as_ref()
    }

    fn rv() -> Register {
        Reg::Rax.into()
    }

    fn caller_save_regs() -> &'static [Register] {
        CALLER_SAVE_REGS.as_ref()
    }

    fn division_clobbers() -> &'static [Register] {
        DIVISION_CLOBBERS.as_ref()
    }
}
