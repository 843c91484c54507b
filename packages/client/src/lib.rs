//! Hiroba client library.
//!
//! A reconnecting session over the room and presence channels, with a local
//! message cache, typing indicators and presence roster.

pub mod backoff;
pub mod cache;
pub mod error;
pub mod roster;
pub mod session;
pub mod typing;
pub mod view;

pub use error::ClientError;
pub use session::{ClientSession, SessionConfig};
pub use view::{ChannelKey, ChannelState, ClientEvent};
