//! Domain factories for creating domain entities and value objects.

use super::value_object::MessageId;

/// Factory for generating MessageId instances.
///
/// Clients may supply their own message id; when they do not, the server
/// generates one here.
pub struct MessageIdFactory;

impl MessageIdFactory {
    /// Generate a new MessageId with a random UUID v4.
    pub fn generate() -> MessageId {
        MessageId::from_uuid(uuid::Uuid::new_v4())
    }

    /// Use the client-supplied id when it is valid, otherwise generate one.
    pub fn from_client(id: Option<&str>) -> MessageId {
        id.and_then(|id| MessageId::new(id.to_string()).ok())
            .unwrap_or_else(Self::generate)
    }
}
