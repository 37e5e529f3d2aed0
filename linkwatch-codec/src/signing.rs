//! MAVLink 2 message signing.
//!
//! A signed frame carries a 13 byte trailer: link id (1), timestamp (6,
//! units of 10µs since 2015-01-01 UTC) and the first 6 bytes of
//! `SHA-256(key || frame || link_id || timestamp)`.
//!
//! Inbound timestamps must strictly increase per (link id, system,
//! component) stream, so a captured frame cannot be replayed.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use sha2::{Digest, Sha256};

/// Length of the signature trailer.
pub const SIGNATURE_LEN: usize = 13;

/// Seconds between the Unix epoch and 2015-01-01T00:00:00Z.
const SIGNING_EPOCH_OFFSET_SECS: i64 = 1_420_070_400;

/// How far behind our clock a stream's first timestamp may be (60 s).
const MAX_INITIAL_LAG: u64 = 60 * 100_000;

/// A 32 byte pre-shared signing key.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey([u8; 32]);

impl SigningKey {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a key from a passphrase by hashing it with SHA-256, the way
    /// common ground station software does.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let digest = Sha256::digest(passphrase.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}

/// Key plus link id used to sign outgoing frames.
#[derive(Debug, Clone)]
pub struct SigningConfig {
    pub key: SigningKey,
    pub link_id: u8,
}

/// Why a signed frame was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rejection {
    /// Missing trailer or wrong signature.
    BadSignature,
    /// Timestamp not newer than the last one seen on the same stream.
    Replayed,
}

/// Signs outgoing frames, keeping timestamps strictly increasing, and
/// verifies incoming ones.
#[derive(Debug)]
pub(crate) struct Signer {
    config: SigningConfig,
    last_timestamp: u64,
    streams: HashMap<(u8, u8, u8), u64>,
}

impl Signer {
    pub(crate) fn new(config: SigningConfig) -> Self {
        Self {
            config,
            last_timestamp: 0,
            streams: HashMap::new(),
        }
    }

    /// Build the trailer for `frame` (STX through checksum).
    pub(crate) fn sign(&mut self, frame: &[u8]) -> [u8; SIGNATURE_LEN] {
        let timestamp = now_timestamp().max(self.last_timestamp + 1);
        self.last_timestamp = timestamp;
        trailer(&self.config.key, self.config.link_id, timestamp, frame)
    }

    /// Verify a received frame from `system_id`/`component_id` and record
    /// its timestamp.
    pub(crate) fn accept(
        &mut self,
        frame: &[u8],
        trailer: &[u8],
        system_id: u8,
        component_id: u8,
    ) -> Result<(), Rejection> {
        if !verify(&self.config.key, frame, trailer) {
            return Err(Rejection::BadSignature);
        }

        let link_id = trailer[0];
        let timestamp = read_timestamp(trailer);
        let stream = (link_id, system_id, component_id);
        match self.streams.get(&stream) {
            Some(last) if timestamp <= *last => return Err(Rejection::Replayed),
            Some(_) => {}
            None => {
                let reference = self.last_timestamp.max(now_timestamp());
                if timestamp + MAX_INITIAL_LAG < reference {
                    return Err(Rejection::Replayed);
                }
            }
        }

        self.streams.insert(stream, timestamp);
        self.last_timestamp = self.last_timestamp.max(timestamp);
        Ok(())
    }
}

/// Check the trailer of a received frame.
fn verify(key: &SigningKey, frame: &[u8], trailer: &[u8]) -> bool {
    if trailer.len() != SIGNATURE_LEN {
        return false;
    }
    signature(key, frame, &trailer[..7]) == trailer[7..]
}

fn trailer(key: &SigningKey, link_id: u8, timestamp: u64, frame: &[u8]) -> [u8; SIGNATURE_LEN] {
    let mut trailer = [0u8; SIGNATURE_LEN];
    trailer[0] = link_id;
    trailer[1..7].copy_from_slice(&timestamp.to_le_bytes()[..6]);
    let sig = signature(key, frame, &trailer[..7]);
    trailer[7..].copy_from_slice(&sig);
    trailer
}

fn read_timestamp(trailer: &[u8]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes[..6].copy_from_slice(&trailer[1..7]);
    u64::from_le_bytes(bytes)
}

fn signature(key: &SigningKey, frame: &[u8], link_and_timestamp: &[u8]) -> [u8; 6] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.update(frame);
    hasher.update(link_and_timestamp);
    let digest = hasher.finalize();
    let mut out = [0u8; 6];
    out.copy_from_slice(&digest[..6]);
    out
}

/// Current time in 10µs units since the signing epoch.
fn now_timestamp() -> u64 {
    let micros = Utc::now().timestamp_micros() - SIGNING_EPOCH_OFFSET_SECS * 1_000_000;
    (micros.max(0) / 10) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passphrase_key_is_sha256() {
        let key = SigningKey::from_passphrase("abc");
        // SHA-256("abc")
        assert_eq!(key.as_bytes()[..4], [0xba, 0x78, 0x16, 0xbf]);
    }

    #[test]
    fn signed_trailer_verifies() {
        let key = SigningKey::from_passphrase("secret");
        let mut signer = Signer::new(SigningConfig {
            key: key.clone(),
            link_id: 7,
        });
        let frame = [0xFD, 1, 1, 0, 0, 255, 0, 0, 0, 0, 42, 0x12, 0x34];
        let trailer = signer.sign(&frame);
        assert_eq!(trailer[0], 7);
        assert!(verify(&key, &frame, &trailer));

        let other = SigningKey::from_passphrase("other");
        assert!(!verify(&other, &frame, &trailer));

        let mut tampered = frame;
        tampered[10] = 43;
        assert!(!verify(&key, &tampered, &trailer));
    }

    #[test]
    fn timestamps_strictly_increase() {
        let mut signer = Signer::new(SigningConfig {
            key: SigningKey::new([1; 32]),
            link_id: 0,
        });
        let a = signer.sign(&[0xFD]);
        let b = signer.sign(&[0xFD]);
        assert!(read_timestamp(&b) > read_timestamp(&a));
    }

    #[test]
    fn timestamp_is_close_to_wall_clock() {
        // 2024-01-01 is about 284 million seconds after the signing epoch.
        assert!(now_timestamp() > 284_000_000 * 100_000);
    }

    fn receiver(key: &SigningKey) -> Signer {
        Signer::new(SigningConfig {
            key: key.clone(),
            link_id: 0,
        })
    }

    #[test]
    fn replayed_frames_are_rejected() {
        let key = SigningKey::from_passphrase("secret");
        let mut vehicle = receiver(&key);
        let mut ground = receiver(&key);
        let frame = [0xFD, 1, 1, 0, 0, 1, 1, 0, 0, 0, 42, 0x12, 0x34];

        let first = vehicle.sign(&frame);
        let second = vehicle.sign(&frame);
        assert_eq!(ground.accept(&frame, &first, 1, 1), Ok(()));
        assert_eq!(ground.accept(&frame, &second, 1, 1), Ok(()));
        assert_eq!(
            ground.accept(&frame, &first, 1, 1),
            Err(Rejection::Replayed)
        );
        assert_eq!(
            ground.accept(&frame, &second, 1, 1),
            Err(Rejection::Replayed)
        );

        // Streams are tracked separately per link, system and component.
        assert_eq!(ground.accept(&frame, &first, 1, 2), Ok(()));
    }

    #[test]
    fn stale_first_timestamp_is_rejected() {
        let key = SigningKey::from_passphrase("secret");
        let mut ground = receiver(&key);
        let frame = [0xFD, 1, 1, 0, 0, 1, 1, 0, 0, 0, 42, 0x12, 0x34];

        let stale = trailer(&key, 2, now_timestamp() - 2 * MAX_INITIAL_LAG, &frame);
        assert_eq!(
            ground.accept(&frame, &stale, 1, 1),
            Err(Rejection::Replayed)
        );

        let recent = trailer(&key, 2, now_timestamp() - MAX_INITIAL_LAG / 2, &frame);
        assert_eq!(ground.accept(&frame, &recent, 1, 1), Ok(()));
    }

    #[test]
    fn bad_signature_is_not_a_replay() {
        let key = SigningKey::from_passphrase("secret");
        let mut ground = receiver(&key);
        let frame = [0xFD, 1, 1, 0, 0, 1, 1, 0, 0, 0, 42, 0x12, 0x34];
        let forged = receiver(&SigningKey::from_passphrase("other")).sign(&frame);
        assert_eq!(
            ground.accept(&frame, &forged, 1, 1),
            Err(Rejection::BadSignature)
        );
        assert_eq!(
            ground.accept(&frame, &forged[..5], 1, 1),
            Err(Rejection::BadSignature)
        );
    }

    #[test]
    fn debug_hides_key_material() {
        let key = SigningKey::new([0xAB; 32]);
        assert_eq!(format!("{:?}", key), "SigningKey(..)");
    }
}
