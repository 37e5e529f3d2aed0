//! Decoded protocol messages.
//!
//! The monitor only understands a handful of message kinds. Everything else
//! is carried as [`MessageKind::Other`] so that it still counts towards
//! packet, byte and sequence statistics.

/// MAVLink message id of HEARTBEAT.
pub const HEARTBEAT_ID: u32 = 0;
/// MAVLink message id of REQUEST_DATA_STREAM.
pub const REQUEST_DATA_STREAM_ID: u32 = 66;
/// MAVLink message id of TIMESYNC.
pub const TIMESYNC_ID: u32 = 111;

/// A single decoded message.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Message {
    /// Type tag and type-specific payload.
    pub kind: MessageKind,
    /// Source system id.
    pub system_id: u8,
    /// Source component id.
    pub component_id: u8,
    /// Sequence number, wraps at 256.
    pub sequence: u8,
    /// Length of the raw frame in bytes, header and checksum included.
    pub len: usize,
}

impl Message {
    /// Create a message with zero sequence and length. The codec fills both
    /// in when it encodes or decodes a frame.
    pub fn new(kind: MessageKind, system_id: u8, component_id: u8) -> Self {
        Self {
            kind,
            system_id,
            component_id,
            sequence: 0,
            len: 0,
        }
    }

    /// Set the sequence number.
    pub fn with_sequence(mut self, sequence: u8) -> Self {
        self.sequence = sequence;
        self
    }

    /// Set the raw length.
    pub fn with_len(mut self, len: usize) -> Self {
        self.len = len;
        self
    }

    /// Protocol message id.
    pub fn message_id(&self) -> u32 {
        self.kind.message_id()
    }

    /// Whether the message came from the given system/component pair.
    pub fn is_from(&self, system_id: u8, component_id: u8) -> bool {
        self.system_id == system_id && self.component_id == component_id
    }
}

/// Message type with its payload.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageKind {
    /// Liveness announcement.
    Heartbeat(Heartbeat),
    /// Echo probe used for round-trip measurement.
    Timesync(Timesync),
    /// Telemetry rate request.
    RequestDataStream(RequestDataStream),
    /// Any other message; only the id is kept.
    Other { id: u32 },
}

impl MessageKind {
    /// Protocol message id.
    pub fn message_id(&self) -> u32 {
        match self {
            MessageKind::Heartbeat(_) => HEARTBEAT_ID,
            MessageKind::Timesync(_) => TIMESYNC_ID,
            MessageKind::RequestDataStream(_) => REQUEST_DATA_STREAM_ID,
            MessageKind::Other { id } => *id,
        }
    }

    /// Upper-case protocol name, for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::Heartbeat(_) => "HEARTBEAT",
            MessageKind::Timesync(_) => "TIMESYNC",
            MessageKind::RequestDataStream(_) => "REQUEST_DATA_STREAM",
            MessageKind::Other { .. } => "OTHER",
        }
    }
}

/// HEARTBEAT payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Heartbeat {
    pub custom_mode: u32,
    pub mav_type: u8,
    pub autopilot: u8,
    pub base_mode: u8,
    pub system_status: u8,
    pub mavlink_version: u8,
}

impl Heartbeat {
    /// MAV_TYPE_GCS
    pub const TYPE_GCS: u8 = 6;
    /// MAV_AUTOPILOT_INVALID
    pub const AUTOPILOT_INVALID: u8 = 8;
    /// MAV_STATE_ACTIVE
    pub const STATE_ACTIVE: u8 = 4;

    /// The heartbeat a ground station announces itself with.
    pub fn ground_station() -> Self {
        Self {
            custom_mode: 0,
            mav_type: Self::TYPE_GCS,
            autopilot: Self::AUTOPILOT_INVALID,
            base_mode: 0,
            system_status: Self::STATE_ACTIVE,
            mavlink_version: 3,
        }
    }
}

/// TIMESYNC payload.
///
/// A request carries `tc1 == 0` and the sender's clock in `ts1`; the reply
/// echoes `ts1` unchanged and fills `tc1` with the responder's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timesync {
    pub tc1: i64,
    pub ts1: i64,
}

impl Timesync {
    /// A probe stamped with `ts1`.
    pub fn request(ts1: i64) -> Self {
        Self { tc1: 0, ts1 }
    }
}

/// REQUEST_DATA_STREAM payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RequestDataStream {
    pub target_system: u8,
    pub target_component: u8,
    pub stream_id: u8,
    pub rate_hz: u16,
    pub start_stop: u8,
}

/// Telemetry stream categories that can be rate-configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StreamCategory {
    RawSensors,
    ExtendedStatus,
    RcChannels,
    Position,
    Extra1,
    Extra2,
    Extra3,
}

impl StreamCategory {
    /// All categories in request order.
    pub const ALL: [StreamCategory; 7] = [
        StreamCategory::RawSensors,
        StreamCategory::ExtendedStatus,
        StreamCategory::RcChannels,
        StreamCategory::Position,
        StreamCategory::Extra1,
        StreamCategory::Extra2,
        StreamCategory::Extra3,
    ];

    /// MAV_DATA_STREAM id.
    pub fn stream_id(&self) -> u8 {
        match self {
            StreamCategory::RawSensors => 1,
            StreamCategory::ExtendedStatus => 2,
            StreamCategory::RcChannels => 3,
            StreamCategory::Position => 6,
            StreamCategory::Extra1 => 10,
            StreamCategory::Extra2 => 11,
            StreamCategory::Extra3 => 12,
        }
    }

    /// Upper-case name as used in ground station tooling.
    pub fn name(&self) -> &'static str {
        match self {
            StreamCategory::RawSensors => "RAW_SENSORS",
            StreamCategory::ExtendedStatus => "EXTENDED_STATUS",
            StreamCategory::RcChannels => "RC_CHANNELS",
            StreamCategory::Position => "POSITION",
            StreamCategory::Extra1 => "EXTRA1",
            StreamCategory::Extra2 => "EXTRA2",
            StreamCategory::Extra3 => "EXTRA3",
        }
    }
}
