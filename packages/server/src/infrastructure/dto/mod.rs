//! Data transfer objects of the HTTP and WebSocket surfaces.

pub mod http;
pub mod websocket;
