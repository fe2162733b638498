pub mod connection;
pub mod connection_settings;
pub mod consumer;
pub mod error;
pub mod manager;
pub mod metadata;
pub mod queries;
pub mod session;
mod utils;
