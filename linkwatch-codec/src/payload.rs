//! Payload layouts for the message kinds the monitor understands.
//!
//! Fields are little-endian and ordered by size, largest first, as the
//! MAVLink wire format requires.

use linkwatch_types::{
    Heartbeat, MessageKind, RequestDataStream, Timesync, HEARTBEAT_ID, REQUEST_DATA_STREAM_ID,
    TIMESYNC_ID,
};

use crate::CodecError;

const HEARTBEAT_LEN: usize = 9;
const REQUEST_DATA_STREAM_LEN: usize = 6;
// 16 bytes of base fields plus target_system/target_component extensions.
const TIMESYNC_LEN: usize = 18;

/// Serialize a payload into its full (untruncated) wire form.
pub(crate) fn encode(kind: &MessageKind) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(TIMESYNC_LEN);
    match kind {
        MessageKind::Heartbeat(hb) => {
            out.extend_from_slice(&hb.custom_mode.to_le_bytes());
            out.push(hb.mav_type);
            out.push(hb.autopilot);
            out.push(hb.base_mode);
            out.push(hb.system_status);
            out.push(hb.mavlink_version);
        }
        MessageKind::Timesync(ts) => {
            out.extend_from_slice(&ts.tc1.to_le_bytes());
            out.extend_from_slice(&ts.ts1.to_le_bytes());
            out.push(0);
            out.push(0);
        }
        MessageKind::RequestDataStream(req) => {
            out.extend_from_slice(&req.rate_hz.to_le_bytes());
            out.push(req.target_system);
            out.push(req.target_component);
            out.push(req.stream_id);
            out.push(req.start_stop);
        }
        MessageKind::Other { id } => return Err(CodecError::Unsupported(*id)),
    }
    Ok(out)
}

/// Interpret a received payload. Truncated MAVLink 2 payloads are
/// zero-extended first.
pub(crate) fn decode(message_id: u32, payload: &[u8]) -> MessageKind {
    match message_id {
        HEARTBEAT_ID => {
            let p = padded::<HEARTBEAT_LEN>(payload);
            MessageKind::Heartbeat(Heartbeat {
                custom_mode: u32::from_le_bytes([p[0], p[1], p[2], p[3]]),
                mav_type: p[4],
                autopilot: p[5],
                base_mode: p[6],
                system_status: p[7],
                mavlink_version: p[8],
            })
        }
        TIMESYNC_ID => {
            let p = padded::<TIMESYNC_LEN>(payload);
            let mut tc1 = [0u8; 8];
            let mut ts1 = [0u8; 8];
            tc1.copy_from_slice(&p[0..8]);
            ts1.copy_from_slice(&p[8..16]);
            MessageKind::Timesync(Timesync {
                tc1: i64::from_le_bytes(tc1),
                ts1: i64::from_le_bytes(ts1),
            })
        }
        REQUEST_DATA_STREAM_ID => {
            let p = padded::<REQUEST_DATA_STREAM_LEN>(payload);
            MessageKind::RequestDataStream(RequestDataStream {
                rate_hz: u16::from_le_bytes([p[0], p[1]]),
                target_system: p[2],
                target_component: p[3],
                stream_id: p[4],
                start_stop: p[5],
            })
        }
        id => MessageKind::Other { id },
    }
}

fn padded<const N: usize>(payload: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    let n = payload.len().min(N);
    out[..n].copy_from_slice(&payload[..n]);
    out
}
