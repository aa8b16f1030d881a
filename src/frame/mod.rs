mod arm64;
mod x86_64;

use std::fmt::Display;

pub use arm64::Aarch64;
pub use x86_64::X86_64;

/// A physical register of some target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Register {
    num: u8,
    name: &'static str,
}

impl Register {
    pub const fn new(num: u8, name: &'static str) -> Self {
        Self { num, name }
    }

    /// Hardware encoding number.
    pub fn num(&self) -> u8 {
        self.num
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// The calling convention the allocator honors.
pub trait Convention {
    /// Target name, used in logs.
    const NAME: &'static str;

    /// Allocatable registers in the canonical order the colorer tries them.
    fn registers() -> &'static [Register];

    /// Argument registers.
    /// Must be in the same order as the arguments in the function.
    fn arg_regs() -> &'static [Register];

    /// Represents return value register.
    fn rv() -> Register;

    /// Registers a call may overwrite.
    fn caller_save_regs() -> &'static [Register];

    /// Registers overwritten by the division instruction.
    fn division_clobbers() -> &'static [Register];
}
