use std::fmt::Display;

#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct Temp {
    num: u32,
}

impl Temp {
    pub fn new_with(num: u32) -> Self {
        Temp { num }
    }
}

impl Display for Temp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.num)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label {
    num: u32,
}

impl Label {
    pub fn with_num(num: u32) -> Self {
        Self { num }
    }
}

impl Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.num)
    }
}

/// Hands out fresh temporaries and labels for one compilation unit.
///
/// A new generator starts numbering from zero, so two units never share counters.
#[derive(Debug, Default)]
pub struct NameGen {
    temps: u32,
    labels: u32,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temp(&mut self) -> Temp {
        let temp = Temp::new_with(self.temps);
        self.temps += 1;
        temp
    }

    pub fn label(&mut self) -> Label {
        let label = Label::with_num(self.labels);
        self.labels += 1;
        label
    }
}
