// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Session identity, handshake payload building and session-header stamping.
//
// Two header forms exist. Session ids at or above 0x80 imply the agent
// already knows the client key, so the short 4-byte header is used:
//
//   session_id(1) | stream_id(1) | seq_num(2, little-endian)
//
// Ids below 0x80 carry the key inline, appending client_key(4) big-endian
// for an 8-byte header. The handshake itself travels under the matching
// "none" session id (0x80 or 0x00).

use crate::codec::{Reader, Writer};
use crate::config::{MAX_HEADER_SIZE, MIN_HEADER_SIZE};
use crate::error::{Error, Result};
use crate::protocol::{
    write_submessage_header, BaseObjectRequest, CreateClientPayload, DeletePayload,
    StatusAgentPayload, Time, CLIENT_OBJECT_ID, CREATE_CLIENT_PAYLOAD_SIZE, DELETE_PAYLOAD_SIZE,
    INVALID_REQUEST_ID, STATUS_ERR_INCOMPATIBLE, STATUS_NONE, SUBMESSAGE_ID_CREATE_CLIENT,
    SUBMESSAGE_ID_DELETE, XRCE_COOKIE,
};
use crate::seq_num::SeqNum;

/// Session id marking "no session, key carried inline".
pub const SESSION_ID_NONE_WITH_CLIENT_KEY: u8 = 0x00;

/// Session id marking "no session, key implicit".
pub const SESSION_ID_NONE_WITHOUT_CLIENT_KEY: u8 = 0x80;

/// Identity and handshake state of a session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub(crate) id: u8,
    pub(crate) key: u32,
    pub(crate) last_request_id: u16,
    pub(crate) last_requested_status: u8,
    /// Message size the agent announced during the handshake; 0 before.
    pub(crate) agent_mtu: u16,
}

impl SessionInfo {
    pub fn new(id: u8, key: u32) -> Self {
        Self {
            id,
            key,
            last_request_id: INVALID_REQUEST_ID,
            last_requested_status: STATUS_NONE,
            agent_mtu: 0,
        }
    }

    /// Bytes every outgoing message reserves for the session header.
    pub fn header_offset(&self) -> usize {
        if self.id >= SESSION_ID_NONE_WITHOUT_CLIENT_KEY {
            MIN_HEADER_SIZE
        } else {
            MAX_HEADER_SIZE
        }
    }

    fn handshake_id(&self) -> u8 {
        if self.id >= SESSION_ID_NONE_WITHOUT_CLIENT_KEY {
            SESSION_ID_NONE_WITHOUT_CLIENT_KEY
        } else {
            SESSION_ID_NONE_WITH_CLIENT_KEY
        }
    }

    /// Allocate the next request id, skipping the invalid sentinel on wrap.
    pub(crate) fn next_request_id(&mut self) -> u16 {
        self.last_request_id = self.last_request_id.wrapping_add(1);
        if self.last_request_id == INVALID_REQUEST_ID {
            self.last_request_id = 1;
        }
        self.last_request_id
    }

    fn stamp_header(&self, id_byte: u8, stream_raw: u8, seq: SeqNum, header: &mut [u8]) {
        header[0] = id_byte;
        header[1] = stream_raw;
        header[2..4].copy_from_slice(&seq.raw().to_le_bytes());
        if header.len() == MAX_HEADER_SIZE {
            header[4..8].copy_from_slice(&self.key.to_be_bytes());
        }
    }

    /// Stamp a regular message header; `header` must be `header_offset`
    /// bytes long.
    pub(crate) fn stamp_session_header(&self, stream_raw: u8, seq: SeqNum, header: &mut [u8]) {
        self.stamp_header(self.id, stream_raw, seq, header);
    }

    /// Parse and validate an incoming session header, returning the raw
    /// stream id and sequence number.
    pub(crate) fn read_session_header(&self, r: &mut Reader<'_>) -> Result<(u8, SeqNum)> {
        let id_byte = r.read_u8()?;
        let stream_raw = r.read_u8()?;
        let seq_bytes = r.read_bytes(2)?;
        let seq = SeqNum::new(u16::from_le_bytes([seq_bytes[0], seq_bytes[1]]));
        if id_byte < SESSION_ID_NONE_WITHOUT_CLIENT_KEY {
            let key_bytes = r.read_bytes(4)?;
            let key = u32::from_be_bytes([key_bytes[0], key_bytes[1], key_bytes[2], key_bytes[3]]);
            if key != self.key {
                return Err(Error::InvalidHeader);
            }
        }
        if id_byte != self.id && id_byte != self.handshake_id() {
            return Err(Error::InvalidHeader);
        }
        Ok((stream_raw, seq))
    }

    /// Build the complete CREATE_CLIENT handshake message into `buf`,
    /// returning its length.
    pub(crate) fn write_create_session(&self, buf: &mut [u8], timestamp_ns: i64) -> Result<usize> {
        let offset = self.header_offset();
        if buf.len() < offset {
            return Err(Error::BufferTooSmall);
        }
        let (header, body) = buf.split_at_mut(offset);
        self.stamp_header(self.handshake_id(), 0, SeqNum::new(0), header);

        let mut w = Writer::new(body);
        write_submessage_header(
            &mut w,
            SUBMESSAGE_ID_CREATE_CLIENT,
            0,
            CREATE_CLIENT_PAYLOAD_SIZE as u16,
        )?;
        let payload = CreateClientPayload::new(self.key, self.id, Time::from_nanos(timestamp_ns));
        payload.write(&mut w)?;
        Ok(offset + w.position())
    }

    /// Build the DELETE handshake message naming the client object.
    pub(crate) fn write_delete_session(&mut self, buf: &mut [u8]) -> Result<usize> {
        let offset = self.header_offset();
        if buf.len() < offset {
            return Err(Error::BufferTooSmall);
        }
        let request_id = self.next_request_id();
        let (header, body) = buf.split_at_mut(offset);
        self.stamp_header(self.handshake_id(), 0, SeqNum::new(0), header);

        let mut w = Writer::new(body);
        write_submessage_header(&mut w, SUBMESSAGE_ID_DELETE, 0, DELETE_PAYLOAD_SIZE as u16)?;
        let payload = DeletePayload {
            base: BaseObjectRequest { request_id, object_id: CLIENT_OBJECT_ID },
        };
        payload.write(&mut w)?;
        Ok(offset + w.position())
    }

    /// Digest a STATUS_AGENT handshake reply. A reply from an incompatible
    /// peer (wrong cookie or key) fails the handshake regardless of the
    /// carried status.
    pub(crate) fn read_session_status(&mut self, payload: &StatusAgentPayload) {
        if payload.cookie != XRCE_COOKIE || payload.client_key != self.key {
            self.last_requested_status = STATUS_ERR_INCOMPATIBLE;
            return;
        }
        self.agent_mtu = payload.mtu;
        self.last_requested_status = payload.result.status;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ResultStatus, STATUS_OK, XRCE_VENDOR_ID, XRCE_VERSION};

    #[test]
    fn test_header_offset_by_id_class() {
        assert_eq!(SessionInfo::new(0x81, 1).header_offset(), MIN_HEADER_SIZE);
        assert_eq!(SessionInfo::new(0x01, 1).header_offset(), MAX_HEADER_SIZE);
    }

    #[test]
    fn test_stamp_and_read_short_header() {
        let info = SessionInfo::new(0x81, 0xAABB_CCDD);
        let mut header = [0u8; MIN_HEADER_SIZE];
        info.stamp_session_header(0x01, SeqNum::new(0x0201), &mut header);
        assert_eq!(header, [0x81, 0x01, 0x01, 0x02]);

        let mut r = Reader::new(&header);
        let (stream, seq) = info.read_session_header(&mut r).unwrap();
        assert_eq!(stream, 0x01);
        assert_eq!(seq, SeqNum::new(0x0201));
    }

    #[test]
    fn test_stamp_and_read_long_header() {
        let info = SessionInfo::new(0x01, 0xAABB_CCDD);
        let mut header = [0u8; MAX_HEADER_SIZE];
        info.stamp_session_header(0x80, SeqNum::new(3), &mut header);
        assert_eq!(&header[4..8], &[0xAA, 0xBB, 0xCC, 0xDD]);

        let mut r = Reader::new(&header);
        let (stream, seq) = info.read_session_header(&mut r).unwrap();
        assert_eq!(stream, 0x80);
        assert_eq!(seq, SeqNum::new(3));

        // A mismatched key is rejected.
        let other = SessionInfo::new(0x01, 0x1111_1111);
        let mut r = Reader::new(&header);
        assert!(other.read_session_header(&mut r).is_err());
    }

    #[test]
    fn test_rejects_foreign_session_id() {
        let info = SessionInfo::new(0x81, 1);
        let mut r = Reader::new(&[0x82, 0x00, 0x00, 0x00]);
        assert!(info.read_session_header(&mut r).is_err());
        // The handshake "none" id is accepted.
        let mut r = Reader::new(&[0x80, 0x00, 0x00, 0x00]);
        assert!(info.read_session_header(&mut r).is_ok());
    }

    #[test]
    fn test_create_session_message_layout() {
        let info = SessionInfo::new(0x81, 0xDEAD_BEEF);
        let mut buf = [0u8; 64];
        let len = info.write_create_session(&mut buf, 1_700_000_000_000_000_000).unwrap();
        // Short header + subheader + 22-byte payload.
        assert_eq!(len, MIN_HEADER_SIZE + 4 + CREATE_CLIENT_PAYLOAD_SIZE);
        assert_eq!(buf[0], SESSION_ID_NONE_WITHOUT_CLIENT_KEY);
        assert_eq!(buf[4], SUBMESSAGE_ID_CREATE_CLIENT);
        assert_eq!(&buf[8..12], b"XRCE");
    }

    #[test]
    fn test_request_id_skips_invalid_on_wrap() {
        let mut info = SessionInfo::new(0x81, 1);
        info.last_request_id = u16::MAX;
        assert_eq!(info.next_request_id(), 1);
        assert_eq!(info.next_request_id(), 2);
    }

    #[test]
    fn test_session_status_checks_identity() {
        let mut info = SessionInfo::new(0x81, 42);
        let good = StatusAgentPayload {
            result: ResultStatus { status: STATUS_OK, implementation_status: 0 },
            cookie: XRCE_COOKIE,
            version: XRCE_VERSION,
            vendor_id: XRCE_VENDOR_ID,
            client_key: 42,
            mtu: 512,
        };
        info.read_session_status(&good);
        assert_eq!(info.last_requested_status, STATUS_OK);
        assert_eq!(info.agent_mtu, 512);

        let bad_key = StatusAgentPayload { client_key: 43, ..good };
        info.read_session_status(&bad_key);
        assert_eq!(info.last_requested_status, STATUS_ERR_INCOMPATIBLE);
    }
}
