pub mod cache;
pub mod config;
pub mod logging;
pub mod message;
pub mod proto;
pub mod queue;
pub mod resolver;
pub mod server;
