use std::io;
use thiserror::Error;

/// Reasons an inbound frame could not be turned into a [`ClientMessage`].
///
/// [`ClientMessage`]: crate::signal::ClientMessage
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no `type` field")]
    MissingType,

    #[error("`{kind}` message has a missing or empty `{field}`")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },

    #[error("binary frame is not valid UTF-8")]
    NotUtf8,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("connection {0} is closed")]
    ConnectionClosed(String),
}
