//! # linkwatch-codec
//!
//! MAVLink framing for the linkwatch link tester.
//!
//! The link monitor never looks at raw bytes; it hands whatever a transport
//! delivered to a [`ProtocolCodec`] and gets back an ordered list of decoded
//! [`Message`]s. Corrupted or unverifiable frames are absorbed here and never
//! reach the monitor; they only show up there as sequence gaps.
//!
//! [`MavlinkCodec`] implements the trait for MAVLink 1 and 2:
//!
//! - resynchronising stream parser (frames may span reads)
//! - X.25 checksum with CRC_EXTRA for the common and ardupilotmega
//!   dialects; frames with any other message id are dropped
//! - MAVLink 2 payload truncation on encode, zero-extension on decode
//! - optional MAVLink 2 signing of outgoing frames and verification of
//!   incoming ones, with per-stream replay protection
//!
//! ## Example
//!
//! ```rust
//! use linkwatch_codec::{MavlinkCodec, ProtocolCodec};
//! use linkwatch_types::{Heartbeat, MessageKind};
//!
//! let mut vehicle = MavlinkCodec::new(1, 1);
//! let bytes = vehicle
//!     .encode(&MessageKind::Heartbeat(Heartbeat::default()))
//!     .unwrap();
//!
//! let mut ground = MavlinkCodec::new(255, 0);
//! let messages = ground.decode(&bytes);
//! assert_eq!(messages.len(), 1);
//! assert!(messages[0].is_from(1, 1));
//! ```

mod crc;
mod frame;
mod payload;
mod signing;

use linkwatch_types::{Message, MessageKind};
use thiserror::Error;

pub use crc::{checksum, crc_extra, Crc};
pub use frame::{MavlinkCodec, DecodeStats};
pub use signing::{SigningConfig, SigningKey, SIGNATURE_LEN};

/// Errors raised while encoding outgoing messages.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The message kind has no known payload layout.
    #[error("cannot encode message id {0}")]
    Unsupported(u32),

    /// The message id has no CRC_EXTRA seed.
    #[error("no checksum seed for message id {0}")]
    UnknownChecksum(u32),
}

/// Boundary between raw transport bytes and decoded messages.
///
/// Implementations are stateful: a frame split across two `decode` calls is
/// returned once the second half arrives.
pub trait ProtocolCodec: Send + std::fmt::Debug {
    /// Feed inbound bytes and return every complete, valid message in order.
    fn decode(&mut self, bytes: &[u8]) -> Vec<Message>;

    /// Encode an outgoing message with this side's identity and the next
    /// outgoing sequence number.
    fn encode(&mut self, kind: &MessageKind) -> Result<Vec<u8>, CodecError>;
}
