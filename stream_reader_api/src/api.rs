mod converters;
mod dto;
mod handlers;
mod router;

pub use dto::*;
pub use router::*;
