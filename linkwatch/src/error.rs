//! Error types for link monitoring.

use std::io;
use std::time::Duration;

use linkwatch_codec::CodecError;
use linkwatch_types::DescriptorError;
use thiserror::Error;

/// Errors raised while opening, running or stopping a link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The connection descriptor could not be parsed.
    #[error("Invalid connection descriptor: {0}")]
    Descriptor(#[from] DescriptorError),

    /// The socket or device could not be opened.
    #[error("Failed to open {descriptor}: {source}")]
    Open {
        descriptor: String,
        #[source]
        source: io::Error,
    },

    /// Opening the socket or device took too long.
    #[error("Timed out opening {descriptor} after {timeout:?}")]
    OpenTimeout { descriptor: String, timeout: Duration },

    /// The target never announced itself.
    #[error(
        "Timeout waiting for heartbeat from system {system_id}, component {component_id}"
    )]
    HandshakeTimeout { system_id: u8, component_id: u8 },

    /// The transport went away.
    #[error("Connection closed: {0}")]
    Closed(String),

    /// Outbound queue is full; the message was dropped.
    #[error("Outbound queue full")]
    QueueFull,

    /// An outgoing message could not be encoded.
    #[error("Encoding failed: {0}")]
    Codec(#[from] CodecError),

    /// Writing an output artifact failed.
    #[error("Output error: {0}")]
    Io(#[from] io::Error),

    /// Shutdown was requested before the link came up.
    #[error("Cancelled")]
    Cancelled,

    /// `start` was called twice.
    #[error("Monitor was already started")]
    AlreadyStarted,

    /// `stop` was called on a monitor that is not running.
    #[error("Monitor is not running")]
    NotRunning,

    /// A monitor task panicked or was aborted.
    #[error("Monitor task failed: {0}")]
    Join(String),

    /// No configured link could be started.
    #[error("No monitors started successfully")]
    NoActiveLinks,
}

impl From<tokio::task::JoinError> for LinkError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            LinkError::Join("task was cancelled".to_string())
        } else {
            LinkError::Join(err.to_string())
        }
    }
}
