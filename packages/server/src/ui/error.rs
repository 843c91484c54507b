//! Errors of the server runner.

use thiserror::Error;

use crate::domain::{ReplyError, ValueObjectError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(std::io::Error),

    /// The built-in directory holds an invalid entry
    #[error("invalid user directory: {0}")]
    Directory(#[from] ValueObjectError),

    #[error("invalid reply generator configuration: {0}")]
    Reply(#[from] ReplyError),
}
