// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// DDS-XRCE v1.0 payload structs and their wire (de)serializers.
//
// All parsing is safe: malformed input returns Err, never panics. The byte
// layouts follow the XRCE specification (XCDR with CDR alignment); a
// conforming agent must be able to decode every struct emitted here.

use crate::codec::{Endianness, Reader, Writer};
use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

// Submessage IDs
pub const SUBMESSAGE_ID_CREATE_CLIENT: u8 = 0;
pub const SUBMESSAGE_ID_CREATE: u8 = 1;
pub const SUBMESSAGE_ID_GET_INFO: u8 = 2;
pub const SUBMESSAGE_ID_DELETE: u8 = 3;
pub const SUBMESSAGE_ID_STATUS_AGENT: u8 = 4;
pub const SUBMESSAGE_ID_STATUS: u8 = 5;
pub const SUBMESSAGE_ID_INFO: u8 = 6;
pub const SUBMESSAGE_ID_WRITE_DATA: u8 = 7;
pub const SUBMESSAGE_ID_READ_DATA: u8 = 8;
pub const SUBMESSAGE_ID_DATA: u8 = 9;
pub const SUBMESSAGE_ID_ACKNACK: u8 = 10;
pub const SUBMESSAGE_ID_HEARTBEAT: u8 = 11;
pub const SUBMESSAGE_ID_RESET: u8 = 12;
pub const SUBMESSAGE_ID_FRAGMENT: u8 = 13;
pub const SUBMESSAGE_ID_TIMESTAMP: u8 = 14;
pub const SUBMESSAGE_ID_TIMESTAMP_REPLY: u8 = 15;
/// Extension id; raw payload handed to the performance callback.
pub const SUBMESSAGE_ID_PERFORMANCE: u8 = 16;

// Submessage flags
pub const FLAG_ENDIANNESS: u8 = 0x01;
/// FRAGMENT submessages: set on the final part of a chain.
pub const FLAG_LAST_FRAGMENT: u8 = 0x02;
/// CREATE submessages: reuse a matching existing entity.
pub const FLAG_REUSE: u8 = 0x02;
/// CREATE submessages: replace a mismatching existing entity.
pub const FLAG_REPLACE: u8 = 0x04;

// DATA / WRITE_DATA format field (flags bits 1..3)
pub const FORMAT_DATA: u8 = 0x00;
pub const FORMAT_SAMPLE: u8 = 0x02;
pub const FORMAT_DATA_SEQ: u8 = 0x08;
pub const FORMAT_SAMPLE_SEQ: u8 = 0x0A;
pub const FORMAT_PACKED_SAMPLES: u8 = 0x0E;
pub const FORMAT_MASK: u8 = 0x0E;

// Protocol identity carried in the handshake.
pub const XRCE_COOKIE: [u8; 4] = *b"XRCE";
pub const XRCE_VERSION: [u8; 2] = [0x01, 0x00];
pub const XRCE_VENDOR_ID: [u8; 2] = [0x0F, 0x01];

// Status codes
pub const STATUS_OK: u8 = 0x00;
pub const STATUS_OK_MATCHED: u8 = 0x01;
pub const STATUS_ERR_DDS_ERROR: u8 = 0x80;
pub const STATUS_ERR_MISMATCH: u8 = 0x81;
pub const STATUS_ERR_ALREADY_EXISTS: u8 = 0x82;
pub const STATUS_ERR_DENIED: u8 = 0x83;
pub const STATUS_ERR_UNKNOWN_REFERENCE: u8 = 0x84;
pub const STATUS_ERR_INVALID_DATA: u8 = 0x85;
pub const STATUS_ERR_INCOMPATIBLE: u8 = 0x86;
pub const STATUS_ERR_RESOURCES: u8 = 0x87;
/// Local sentinel for "no reply yet"; never appears on the wire.
pub const STATUS_NONE: u8 = 0xFF;

/// Request id 0 is reserved as the invalid/flow-control sentinel.
pub const INVALID_REQUEST_ID: u16 = 0;

/// True for the two agent-side success codes.
pub const fn status_is_ok(status: u8) -> bool {
    matches!(status, STATUS_OK | STATUS_OK_MATCHED)
}

// Payload sizes for fixed-layout submessages.
pub const CREATE_CLIENT_PAYLOAD_SIZE: usize = 22;
pub const STATUS_AGENT_PAYLOAD_SIZE: usize = 16;
pub const STATUS_PAYLOAD_SIZE: usize = 6;
pub const DELETE_PAYLOAD_SIZE: usize = 4;
pub const HEARTBEAT_PAYLOAD_SIZE: usize = 5;
pub const ACKNACK_PAYLOAD_SIZE: usize = 5;
pub const TIMESTAMP_PAYLOAD_SIZE: usize = 8;
pub const TIMESTAMP_REPLY_PAYLOAD_SIZE: usize = 24;

// ---------------------------------------------------------------------------
// Object ids
// ---------------------------------------------------------------------------

/// Kind of DDS entity an object id refers to (low nibble of the kind byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ObjectKind {
    Participant = 0x01,
    Topic = 0x02,
    Publisher = 0x03,
    Subscriber = 0x04,
    DataWriter = 0x05,
    DataReader = 0x06,
    Domain = 0x07,
    Type = 0x0A,
    QosProfile = 0x0B,
    Application = 0x0C,
    Agent = 0x0D,
    Client = 0x0E,
}

impl ObjectKind {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0x01 => Ok(Self::Participant),
            0x02 => Ok(Self::Topic),
            0x03 => Ok(Self::Publisher),
            0x04 => Ok(Self::Subscriber),
            0x05 => Ok(Self::DataWriter),
            0x06 => Ok(Self::DataReader),
            0x07 => Ok(Self::Domain),
            0x0A => Ok(Self::Type),
            0x0B => Ok(Self::QosProfile),
            0x0C => Ok(Self::Application),
            0x0D => Ok(Self::Agent),
            0x0E => Ok(Self::Client),
            _ => Err(Error::DecodingError),
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Two-byte entity id: application-chosen prefix plus a kind byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectId {
    pub prefix: u8,
    pub kind: u8,
}

/// The well-known id of the client itself, used in the DELETE handshake.
pub const CLIENT_OBJECT_ID: ObjectId = ObjectId { prefix: 0xFF, kind: 0xFE };

impl ObjectId {
    pub const fn new(prefix: u8, kind: ObjectKind) -> Self {
        Self { prefix, kind: kind.as_u8() }
    }

    /// Entity kind, decoded from the low nibble of the kind byte.
    pub fn object_kind(self) -> Result<ObjectKind> {
        ObjectKind::from_u8(self.kind & 0x0F)
    }

    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let bytes = r.read_bytes(2)?;
        Ok(Self { prefix: bytes[0], kind: bytes[1] })
    }

    pub fn write(self, w: &mut Writer<'_>) -> Result<()> {
        w.write_bytes(&[self.prefix, self.kind])
    }
}

// ---------------------------------------------------------------------------
// Submessage header
// ---------------------------------------------------------------------------

/// Submessage header: id, flags, payload length. 4-byte aligned within the
/// message; the length field is encoded in the endianness its flags declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmessageHeader {
    pub id: u8,
    pub flags: u8,
    pub length: u16,
}

impl SubmessageHeader {
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        r.align(4)?;
        let id = r.read_u8()?;
        let flags = r.read_u8()?;
        r.set_endianness(Endianness::from_flags(flags));
        let length = r.read_u16()?;
        Ok(Self { id, flags, length })
    }
}

/// Write a submessage header. The writer's own endianness bit is folded into
/// the flags so the length field and the announcement always agree.
pub fn write_submessage_header(w: &mut Writer<'_>, id: u8, flags: u8, length: u16) -> Result<()> {
    w.align(4)?;
    w.write_u8(id)?;
    w.write_u8(flags | w.endianness().flag())?;
    w.write_u16(length)
}

// ---------------------------------------------------------------------------
// Request / reply bases
// ---------------------------------------------------------------------------

/// Correlation base carried by every request submessage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseObjectRequest {
    pub request_id: u16,
    pub object_id: ObjectId,
}

impl BaseObjectRequest {
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let request_id = r.read_u16()?;
        let object_id = ObjectId::read(r)?;
        Ok(Self { request_id, object_id })
    }

    pub fn write(&self, w: &mut Writer<'_>) -> Result<()> {
        w.write_u16(self.request_id)?;
        self.object_id.write(w)
    }
}

/// Outcome of an agent-side operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultStatus {
    pub status: u8,
    pub implementation_status: u8,
}

impl ResultStatus {
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self { status: r.read_u8()?, implementation_status: r.read_u8()? })
    }

    pub fn write(&self, w: &mut Writer<'_>) -> Result<()> {
        w.write_u8(self.status)?;
        w.write_u8(self.implementation_status)
    }
}

/// STATUS payload: the request it answers plus the outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaseObjectReply {
    pub base: BaseObjectRequest,
    pub result: ResultStatus,
}

impl BaseObjectReply {
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self { base: BaseObjectRequest::read(r)?, result: ResultStatus::read(r)? })
    }

    pub fn write(&self, w: &mut Writer<'_>) -> Result<()> {
        self.base.write(w)?;
        self.result.write(w)
    }
}

// ---------------------------------------------------------------------------
// Session handshake payloads
// ---------------------------------------------------------------------------

/// CREATE_CLIENT payload: protocol identity, the client's wall-clock
/// transmit time, its key and the session id it wants.
///
/// The client key travels as its big-endian byte representation, matching
/// the key bytes of the long session header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreateClientPayload {
    pub cookie: [u8; 4],
    pub version: [u8; 2],
    pub vendor_id: [u8; 2],
    pub timestamp: Time,
    pub client_key: u32,
    pub session_id: u8,
    pub has_properties: bool,
}

impl CreateClientPayload {
    pub fn new(client_key: u32, session_id: u8, timestamp: Time) -> Self {
        Self {
            cookie: XRCE_COOKIE,
            version: XRCE_VERSION,
            vendor_id: XRCE_VENDOR_ID,
            timestamp,
            client_key,
            session_id,
            has_properties: false,
        }
    }

    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let mut cookie = [0u8; 4];
        cookie.copy_from_slice(r.read_bytes(4)?);
        let mut version = [0u8; 2];
        version.copy_from_slice(r.read_bytes(2)?);
        let mut vendor_id = [0u8; 2];
        vendor_id.copy_from_slice(r.read_bytes(2)?);
        let timestamp = Time::read(r)?;
        let mut key = [0u8; 4];
        key.copy_from_slice(r.read_bytes(4)?);
        Ok(Self {
            cookie,
            version,
            vendor_id,
            timestamp,
            client_key: u32::from_be_bytes(key),
            session_id: r.read_u8()?,
            has_properties: r.read_bool()?,
        })
    }

    pub fn write(&self, w: &mut Writer<'_>) -> Result<()> {
        w.write_bytes(&self.cookie)?;
        w.write_bytes(&self.version)?;
        w.write_bytes(&self.vendor_id)?;
        self.timestamp.write(w)?;
        w.write_bytes(&self.client_key.to_be_bytes())?;
        w.write_u8(self.session_id)?;
        w.write_bool(self.has_properties)
    }
}

/// STATUS_AGENT payload: handshake outcome plus the agent's identity, the
/// echoed client key and the message size the agent negotiated. The client
/// checks identity and key before trusting the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusAgentPayload {
    pub result: ResultStatus,
    pub cookie: [u8; 4],
    pub version: [u8; 2],
    pub vendor_id: [u8; 2],
    pub client_key: u32,
    pub mtu: u16,
}

impl StatusAgentPayload {
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let result = ResultStatus::read(r)?;
        let mut cookie = [0u8; 4];
        cookie.copy_from_slice(r.read_bytes(4)?);
        let mut version = [0u8; 2];
        version.copy_from_slice(r.read_bytes(2)?);
        let mut vendor_id = [0u8; 2];
        vendor_id.copy_from_slice(r.read_bytes(2)?);
        let mut key = [0u8; 4];
        key.copy_from_slice(r.read_bytes(4)?);
        Ok(Self {
            result,
            cookie,
            version,
            vendor_id,
            client_key: u32::from_be_bytes(key),
            mtu: r.read_u16()?,
        })
    }

    pub fn write(&self, w: &mut Writer<'_>) -> Result<()> {
        self.result.write(w)?;
        w.write_bytes(&self.cookie)?;
        w.write_bytes(&self.version)?;
        w.write_bytes(&self.vendor_id)?;
        w.write_bytes(&self.client_key.to_be_bytes())?;
        w.write_u16(self.mtu)
    }
}

// ---------------------------------------------------------------------------
// Entity creation / deletion payloads
// ---------------------------------------------------------------------------

/// Entity description carried by a CREATE submessage. Entities other than
/// participants name their parent; all carry an XML representation string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Representation {
    Participant { domain_id: i16, xml: String },
    Topic { participant: ObjectId, xml: String },
    Publisher { participant: ObjectId, xml: String },
    Subscriber { participant: ObjectId, xml: String },
    DataWriter { publisher: ObjectId, xml: String },
    DataReader { subscriber: ObjectId, xml: String },
}

impl Representation {
    pub const fn kind(&self) -> ObjectKind {
        match self {
            Self::Participant { .. } => ObjectKind::Participant,
            Self::Topic { .. } => ObjectKind::Topic,
            Self::Publisher { .. } => ObjectKind::Publisher,
            Self::Subscriber { .. } => ObjectKind::Subscriber,
            Self::DataWriter { .. } => ObjectKind::DataWriter,
            Self::DataReader { .. } => ObjectKind::DataReader,
        }
    }

    fn xml(&self) -> &str {
        match self {
            Self::Participant { xml, .. }
            | Self::Topic { xml, .. }
            | Self::Publisher { xml, .. }
            | Self::Subscriber { xml, .. }
            | Self::DataWriter { xml, .. }
            | Self::DataReader { xml, .. } => xml,
        }
    }
}

/// CREATE payload: correlation base plus the entity representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePayload {
    pub base: BaseObjectRequest,
    pub representation: Representation,
}

impl CreatePayload {
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let base = BaseObjectRequest::read(r)?;
        let kind = ObjectKind::from_u8(r.read_u8()?)?;
        let representation = match kind {
            ObjectKind::Participant => {
                let domain_id = r.read_i16()?;
                let xml = r.read_string()?.to_owned();
                Representation::Participant { domain_id, xml }
            }
            ObjectKind::Topic => {
                let participant = ObjectId::read(r)?;
                let xml = r.read_string()?.to_owned();
                Representation::Topic { participant, xml }
            }
            ObjectKind::Publisher => {
                let participant = ObjectId::read(r)?;
                let xml = r.read_string()?.to_owned();
                Representation::Publisher { participant, xml }
            }
            ObjectKind::Subscriber => {
                let participant = ObjectId::read(r)?;
                let xml = r.read_string()?.to_owned();
                Representation::Subscriber { participant, xml }
            }
            ObjectKind::DataWriter => {
                let publisher = ObjectId::read(r)?;
                let xml = r.read_string()?.to_owned();
                Representation::DataWriter { publisher, xml }
            }
            ObjectKind::DataReader => {
                let subscriber = ObjectId::read(r)?;
                let xml = r.read_string()?.to_owned();
                Representation::DataReader { subscriber, xml }
            }
            _ => return Err(Error::DecodingError),
        };
        Ok(Self { base, representation })
    }

    pub fn write(&self, w: &mut Writer<'_>) -> Result<()> {
        self.base.write(w)?;
        w.write_u8(self.representation.kind().as_u8())?;
        match &self.representation {
            Representation::Participant { domain_id, .. } => w.write_i16(*domain_id)?,
            Representation::Topic { participant, .. }
            | Representation::Publisher { participant, .. }
            | Representation::Subscriber { participant, .. } => participant.write(w)?,
            Representation::DataWriter { publisher, .. } => publisher.write(w)?,
            Representation::DataReader { subscriber, .. } => subscriber.write(w)?,
        }
        w.write_string(self.representation.xml())
    }
}

/// DELETE payload: just the correlation base naming the doomed object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeletePayload {
    pub base: BaseObjectRequest,
}

impl DeletePayload {
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self { base: BaseObjectRequest::read(r)? })
    }

    pub fn write(&self, w: &mut Writer<'_>) -> Result<()> {
        self.base.write(w)
    }
}

// ---------------------------------------------------------------------------
// Data access payloads
// ---------------------------------------------------------------------------

/// Sample-rate limits for a READ_DATA subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryControl {
    pub max_samples: u16,
    pub max_elapsed_time: u16,
    pub max_bytes_per_second: u16,
    pub min_pace_period: u16,
}

/// READ_DATA payload: which reader, where replies should flow, how fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDataPayload {
    pub base: BaseObjectRequest,
    /// Raw id of the stream the agent should deliver DATA on.
    pub data_stream_id: u8,
    pub data_format: u8,
    pub delivery_control: Option<DeliveryControl>,
}

impl ReadDataPayload {
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        let base = BaseObjectRequest::read(r)?;
        let data_stream_id = r.read_u8()?;
        let data_format = r.read_u8()?;
        let delivery_control = if r.read_bool()? {
            Some(DeliveryControl {
                max_samples: r.read_u16()?,
                max_elapsed_time: r.read_u16()?,
                max_bytes_per_second: r.read_u16()?,
                min_pace_period: r.read_u16()?,
            })
        } else {
            None
        };
        Ok(Self { base, data_stream_id, data_format, delivery_control })
    }

    pub fn write(&self, w: &mut Writer<'_>) -> Result<()> {
        self.base.write(w)?;
        w.write_u8(self.data_stream_id)?;
        w.write_u8(self.data_format)?;
        w.write_bool(self.delivery_control.is_some())?;
        if let Some(dc) = &self.delivery_control {
            w.write_u16(dc.max_samples)?;
            w.write_u16(dc.max_elapsed_time)?;
            w.write_u16(dc.max_bytes_per_second)?;
            w.write_u16(dc.min_pace_period)?;
        }
        Ok(())
    }

    /// Serialized size, needed to reserve stream space up front.
    pub fn size(&self) -> usize {
        // base(4) + stream(1) + format(1) + optional flag(1) [+ pad(1) + 4*u16]
        7 + if self.delivery_control.is_some() { 9 } else { 0 }
    }
}

// ---------------------------------------------------------------------------
// Reliability control payloads
// ---------------------------------------------------------------------------

/// HEARTBEAT payload, sent on the none stream and routed by its stream id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatPayload {
    pub first_unacked: u16,
    pub last_unacked: u16,
    pub stream_id: u8,
}

impl HeartbeatPayload {
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            first_unacked: r.read_u16()?,
            last_unacked: r.read_u16()?,
            stream_id: r.read_u8()?,
        })
    }

    pub fn write(&self, w: &mut Writer<'_>) -> Result<()> {
        w.write_u16(self.first_unacked)?;
        w.write_u16(self.last_unacked)?;
        w.write_u8(self.stream_id)
    }
}

/// ACKNACK payload. Bit k of the bitmap set means `first_unacked + k` is
/// missing and must be retransmitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcknackPayload {
    pub first_unacked: u16,
    pub nack_bitmap: u16,
    pub stream_id: u8,
}

impl AcknackPayload {
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            first_unacked: r.read_u16()?,
            nack_bitmap: r.read_u16()?,
            stream_id: r.read_u8()?,
        })
    }

    pub fn write(&self, w: &mut Writer<'_>) -> Result<()> {
        w.write_u16(self.first_unacked)?;
        w.write_u16(self.nack_bitmap)?;
        w.write_u8(self.stream_id)
    }
}

// ---------------------------------------------------------------------------
// Time sync payloads
// ---------------------------------------------------------------------------

/// Wall-clock instant: seconds since the epoch plus a nanosecond remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Time {
    pub seconds: i32,
    pub nanoseconds: u32,
}

impl Time {
    pub const fn from_nanos(nanos: i64) -> Self {
        Self {
            seconds: (nanos / 1_000_000_000) as i32,
            nanoseconds: (nanos % 1_000_000_000) as u32,
        }
    }

    pub const fn to_nanos(self) -> i64 {
        self.seconds as i64 * 1_000_000_000 + self.nanoseconds as i64
    }

    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self { seconds: r.read_i32()?, nanoseconds: r.read_u32()? })
    }

    pub fn write(&self, w: &mut Writer<'_>) -> Result<()> {
        w.write_i32(self.seconds)?;
        w.write_u32(self.nanoseconds)
    }
}

/// TIMESTAMP payload: the client's transmit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampPayload {
    pub transmit: Time,
}

impl TimestampPayload {
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self { transmit: Time::read(r)? })
    }

    pub fn write(&self, w: &mut Writer<'_>) -> Result<()> {
        self.transmit.write(w)
    }
}

/// TIMESTAMP_REPLY payload: agent transmit/receive times plus the echoed
/// client originate time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampReplyPayload {
    pub transmit: Time,
    pub receive: Time,
    pub originate: Time,
}

impl TimestampReplyPayload {
    pub fn read(r: &mut Reader<'_>) -> Result<Self> {
        Ok(Self {
            transmit: Time::read(r)?,
            receive: Time::read(r)?,
            originate: Time::read(r)?,
        })
    }

    pub fn write(&self, w: &mut Writer<'_>) -> Result<()> {
        self.transmit.write(w)?;
        self.receive.write(w)?;
        self.originate.write(w)
    }
}
