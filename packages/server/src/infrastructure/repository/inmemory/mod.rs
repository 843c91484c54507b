mod kv;
mod message;

pub use kv::InMemoryKeyValueStore;
pub use message::InMemoryMessageRepository;
