mod accumulator;
mod read_limit;

pub(crate) use accumulator::*;
pub use read_limit::*;
