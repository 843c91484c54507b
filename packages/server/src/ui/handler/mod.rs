//! Handler modules for HTTP and WebSocket endpoints.

pub mod http;
pub mod websocket;

// Re-export HTTP handlers
pub use http::{
    get_presence, get_room_detail, get_rooms, get_users, health_check, login, logout, post_notify,
};

// Re-export WebSocket handlers
pub use websocket::{presence_websocket_handler, room_websocket_handler};
