use std::time::Duration;

use thiserror::Error;

/// Errors raised by the message channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The caller-supplied deadline elapsed before a response arrived.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The registry was shut down while the request was pending.
    #[error("channel closed")]
    ChannelClosed,

    /// The target window no longer accepts messages.
    #[error("target window closed")]
    WindowClosed,

    /// Envelope could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
