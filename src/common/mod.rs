mod temp;

pub use temp::{Label, NameGen, Temp};
