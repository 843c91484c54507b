//! HTTP and WebSocket surface of the chat server.

mod config;
mod error;
mod handler;
mod runner;
mod signal;
pub mod state;

pub use config::ServerArgs;
pub use error::ServerError;
pub use runner::{create_router, run, serve};
pub use signal::shutdown_signal;
