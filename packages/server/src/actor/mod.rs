//! Actors owning live connections.
//!
//! A [`room::RoomActor`] runs as one tokio task per room key and the
//! [`presence::PresenceActor`] as a single global task. Each actor owns its
//! state exclusively and is driven through an unbounded command channel;
//! replies travel back on oneshot channels.

pub mod presence;
pub mod registry;
pub mod room;

use std::{collections::HashMap, time::Duration};

use hiroba_shared::{Frame, ParticipantInfo};
use thiserror::Error;
use tokio::{sync::mpsc, time::Instant};

use crate::domain::{ConnectionId, ConnectionMetadata, UserId};

pub use presence::{PresenceActor, PresenceHandle, PresenceSettings};
pub use registry::RoomRegistry;
pub use room::{RoomActor, RoomHandle, RoomServices, RoomSettings, RoomSnapshot};

/// Close code sent to connections that stopped heartbeating
pub const HEARTBEAT_CLOSE_CODE: u16 = 1011;

/// Close reason sent to connections that stopped heartbeating
pub const HEARTBEAT_CLOSE_REASON: &str = "Heartbeat timeout";

/// Item written to one socket by its writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

pub type OutboundSender = mpsc::UnboundedSender<Outbound>;
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

/// The actor behind a handle has stopped
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("actor is no longer running")]
pub struct ActorGone;

/// One roster entry per user among connections seen within `grace`.
///
/// When a user holds several connections, the one with the latest status
/// change wins. Entries are sorted by user id.
pub(crate) fn roster<'a>(
    connections: impl Iterator<Item = &'a ConnectionMetadata>,
    now: Instant,
    grace: Duration,
) -> Vec<ParticipantInfo> {
    let mut latest: HashMap<&UserId, &ConnectionMetadata> = HashMap::new();
    for meta in connections.filter(|m| now.duration_since(m.last_seen) <= grace) {
        latest
            .entry(&meta.user_id)
            .and_modify(|current| {
                if meta.status_updated_at > current.status_updated_at {
                    *current = meta;
                }
            })
            .or_insert(meta);
    }
    let mut users: Vec<ParticipantInfo> = latest
        .into_values()
        .map(ConnectionMetadata::participant_info)
        .collect();
    users.sort_by(|a, b| a.id.cmp(&b.id));
    users
}

/// A live connection as seen by its owning actor
#[derive(Debug)]
pub(crate) struct Connection {
    pub meta: ConnectionMetadata,
    outbound: OutboundSender,
}

impl Connection {
    pub fn new(meta: ConnectionMetadata, outbound: OutboundSender) -> Self {
        Self { meta, outbound }
    }

    pub fn id(&self) -> ConnectionId {
        self.meta.connection_id
    }

    /// Queue pre-encoded text; a closed socket is ignored.
    pub fn send_text(&self, text: &str) {
        if self.outbound.send(Outbound::Text(text.to_string())).is_err() {
            tracing::debug!(
                connection = %self.meta.connection_id,
                "send to closed connection ignored"
            );
        }
    }

    pub fn send(&self, frame: &Frame) {
        match frame.encode() {
            Ok(text) => self.send_text(&text),
            Err(e) => tracing::error!(error = %e, "failed to encode frame"),
        }
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.outbound.send(Outbound::Close {
            code,
            reason: reason.to_string(),
        });
    }
}
