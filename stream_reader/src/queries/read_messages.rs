mod handler;
mod models;
mod request;
mod response;

pub use handler::*;
pub use models::*;
pub use request::*;
pub use response::*;
