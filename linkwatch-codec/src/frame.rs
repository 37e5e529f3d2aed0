//! Stream parser and encoder for MAVLink 1 and 2 frames.

use linkwatch_types::{Message, MessageKind};
use tracing::trace;

use crate::crc::{checksum, crc_extra};
use crate::payload;
use crate::signing::{Rejection, Signer, SigningConfig, SIGNATURE_LEN};
use crate::{CodecError, ProtocolCodec};

const STX_V1: u8 = 0xFE;
const STX_V2: u8 = 0xFD;
const V1_HEADER_LEN: usize = 6;
const V2_HEADER_LEN: usize = 10;
const CHECKSUM_LEN: usize = 2;
const IFLAG_SIGNED: u8 = 0x01;

/// Counters describing what the parser threw away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Frames returned as messages.
    pub frames: u64,
    /// Frames dropped because the checksum did not match.
    pub checksum_errors: u64,
    /// Frames dropped because their message id has no checksum seed.
    pub unknown_ids: u64,
    /// Frames dropped because they were unsigned or wrongly signed.
    pub signature_errors: u64,
    /// Signed frames dropped because their timestamp did not advance.
    pub replayed: u64,
    /// Bytes skipped while hunting for a start marker.
    pub discarded_bytes: u64,
}

enum Parsed {
    Incomplete,
    /// Not a frame at this offset; skip one byte and resynchronise.
    Invalid,
    /// A well-formed frame that must not be delivered; skip all of it.
    Rejected(usize),
    Frame(Message, usize),
}

/// MAVLink codec with a fixed local identity.
///
/// Outgoing frames are always MAVLink 2. Incoming MAVLink 1 and 2 frames are
/// both understood. When signing is configured, outgoing frames are signed
/// and incoming frames without a valid signature are dropped.
#[derive(Debug)]
pub struct MavlinkCodec {
    system_id: u8,
    component_id: u8,
    sequence: u8,
    signer: Option<Signer>,
    buffer: Vec<u8>,
    stats: DecodeStats,
}

impl MavlinkCodec {
    /// Create a codec that sends as `system_id`/`component_id`.
    pub fn new(system_id: u8, component_id: u8) -> Self {
        Self {
            system_id,
            component_id,
            sequence: 0,
            signer: None,
            buffer: Vec::with_capacity(512),
            stats: DecodeStats::default(),
        }
    }

    /// Enable MAVLink 2 signing.
    pub fn with_signing(mut self, config: SigningConfig) -> Self {
        self.signer = Some(Signer::new(config));
        self
    }

    /// Override the sequence number used for the next outgoing frame.
    pub fn set_sequence(&mut self, sequence: u8) {
        self.sequence = sequence;
    }

    /// Parser statistics so far.
    pub fn stats(&self) -> &DecodeStats {
        &self.stats
    }

    /// Bytes buffered while waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    fn parse_one(&mut self) -> Parsed {
        let buf = &self.buffer;
        if buf.len() < 2 {
            return Parsed::Incomplete;
        }

        let v2 = buf[0] == STX_V2;
        let header_len = if v2 { V2_HEADER_LEN } else { V1_HEADER_LEN };
        if buf.len() < header_len {
            return Parsed::Incomplete;
        }

        let payload_len = buf[1] as usize;
        let incompat = if v2 { buf[2] } else { 0 };
        if incompat & !IFLAG_SIGNED != 0 {
            return Parsed::Invalid;
        }
        let signed = incompat & IFLAG_SIGNED != 0;

        let crc_end = header_len + payload_len;
        let total = crc_end + CHECKSUM_LEN + if signed { SIGNATURE_LEN } else { 0 };
        if buf.len() < total {
            return Parsed::Incomplete;
        }

        let (sequence, system_id, component_id, message_id) = if v2 {
            (
                buf[4],
                buf[5],
                buf[6],
                u32::from_le_bytes([buf[7], buf[8], buf[9], 0]),
            )
        } else {
            (buf[2], buf[3], buf[4], buf[5] as u32)
        };

        let Some(extra) = crc_extra(message_id) else {
            self.stats.unknown_ids += 1;
            return Parsed::Invalid;
        };
        let received = u16::from_le_bytes([buf[crc_end], buf[crc_end + 1]]);
        if checksum(&buf[1..crc_end], extra) != received {
            self.stats.checksum_errors += 1;
            return Parsed::Invalid;
        }

        if let Some(signer) = self.signer.as_mut() {
            let verdict = if signed {
                signer.accept(
                    &buf[..crc_end + CHECKSUM_LEN],
                    &buf[crc_end + CHECKSUM_LEN..total],
                    system_id,
                    component_id,
                )
            } else {
                Err(Rejection::BadSignature)
            };
            match verdict {
                Ok(()) => {}
                Err(Rejection::BadSignature) => {
                    self.stats.signature_errors += 1;
                    return Parsed::Rejected(total);
                }
                Err(Rejection::Replayed) => {
                    self.stats.replayed += 1;
                    return Parsed::Rejected(total);
                }
            }
        }

        let kind = payload::decode(message_id, &buf[header_len..crc_end]);
        let message = Message {
            kind,
            system_id,
            component_id,
            sequence,
            len: total,
        };
        Parsed::Frame(message, total)
    }
}

impl ProtocolCodec for MavlinkCodec {
    fn decode(&mut self, bytes: &[u8]) -> Vec<Message> {
        self.buffer.extend_from_slice(bytes);
        let mut messages = Vec::new();

        loop {
            match self
                .buffer
                .iter()
                .position(|b| *b == STX_V1 || *b == STX_V2)
            {
                None => {
                    self.stats.discarded_bytes += self.buffer.len() as u64;
                    self.buffer.clear();
                    break;
                }
                Some(0) => {}
                Some(offset) => {
                    self.stats.discarded_bytes += offset as u64;
                    self.buffer.drain(..offset);
                }
            }

            match self.parse_one() {
                Parsed::Incomplete => break,
                Parsed::Invalid => {
                    self.stats.discarded_bytes += 1;
                    self.buffer.drain(..1);
                }
                Parsed::Rejected(len) => {
                    self.buffer.drain(..len);
                }
                Parsed::Frame(message, len) => {
                    trace!(
                        "decoded {} seq={} from {}/{}",
                        message.kind.name(),
                        message.sequence,
                        message.system_id,
                        message.component_id
                    );
                    self.stats.frames += 1;
                    self.buffer.drain(..len);
                    messages.push(message);
                }
            }
        }

        messages
    }

    fn encode(&mut self, kind: &MessageKind) -> Result<Vec<u8>, CodecError> {
        let message_id = kind.message_id();
        let extra = crc_extra(message_id).ok_or(CodecError::UnknownChecksum(message_id))?;

        let mut body = payload::encode(kind)?;
        while body.len() > 1 && body.last() == Some(&0) {
            body.pop();
        }

        let incompat = if self.signer.is_some() { IFLAG_SIGNED } else { 0 };
        let mut frame =
            Vec::with_capacity(V2_HEADER_LEN + body.len() + CHECKSUM_LEN + SIGNATURE_LEN);
        frame.extend_from_slice(&[
            STX_V2,
            body.len() as u8,
            incompat,
            0,
            self.sequence,
            self.system_id,
            self.component_id,
        ]);
        frame.extend_from_slice(&message_id.to_le_bytes()[..3]);
        frame.extend_from_slice(&body);

        let crc = checksum(&frame[1..], extra);
        frame.extend_from_slice(&crc.to_le_bytes());

        if let Some(signer) = self.signer.as_mut() {
            let trailer = signer.sign(&frame);
            frame.extend_from_slice(&trailer);
        }

        self.sequence = self.sequence.wrapping_add(1);
        Ok(frame)
    }
}
