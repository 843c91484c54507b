//! Shared building blocks for Hiroba.
//!
//! The server and the client speak the same JSON frame protocol and share the
//! logger bootstrap and time helpers defined here.

pub mod logger;
pub mod protocol;
pub mod time;

pub use protocol::{DeliveryStatus, Frame, FrameType, ParticipantInfo, PresenceStatus};
