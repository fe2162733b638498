mod properties;
mod raw_message;

pub use properties::*;
pub use raw_message::*;
