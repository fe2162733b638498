mod convert;
mod factory;
mod session;
mod subscription;

pub use convert::*;
pub use factory::*;
pub use session::*;
pub use subscription::*;
