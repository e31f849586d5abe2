// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DDS-XRCE v1.0 client session runtime.
//!
//! Lets a resource-constrained device participate in a DDS network through
//! a remote XRCE agent: the client speaks a compact session protocol to the
//! agent, which proxies the actual DDS operations.
//!
//! # Architecture
//!
//! ```text
//! XRCE Client (this crate)         XRCE Agent                 DDS Network
//!   MCU / embedded Linux            Linux / Windows
//!        |                              |                          |
//!        |--- CREATE_CLIENT ----------->|                          |
//!        |--- CREATE(participant..) --->|--- create DDS entity --->|
//!        |--- WRITE_DATA(topic) ------->|--- DDS write ----------->|
//!        |<-- DATA(topic) --------------|<-- DDS sample -----------|
//!        |<-> HEARTBEAT / ACKNACK <---->|                          |
//!        |--- DELETE ------------------>|--- cleanup ------------->|
//! ```
//!
//! # Key pieces
//!
//! - **Streams**: best-effort (at-most-once, monotone) and reliable
//!   (exactly-once, ordered) in both directions, multiplexed in one
//!   session. Reliable streams run a sliding window with HEARTBEAT/ACKNACK
//!   driven retransmission and fragment large samples across window slots.
//! - **Session loop**: [`Session::run_until_timeout`] and friends drive
//!   transport I/O, dispatch submessages and fire the [`SessionListener`]
//!   callbacks. Single-threaded, no internal tasks.
//! - **Entities**: `buffer_create_*` / [`Session::buffer_topic`] /
//!   [`Session::buffer_request_data`] queue operations; request ids
//!   correlate the agent's STATUS replies.
//! - **Transports**: UDP, TCP and framed serial, behind the small
//!   [`Transport`] trait.
//!
//! # Example
//!
//! ```no_run
//! use xrce_client::{NullListener, ObjectId, ObjectKind, Session, UdpTransport};
//!
//! let transport = UdpTransport::connect("127.0.0.1:2019".parse().unwrap()).unwrap();
//! let mut session = Session::new(transport, NullListener, 0x81, 0xAABBCCDD);
//!
//! let reliable_out = session
//!     .create_output_reliable_stream(vec![0u8; 4 * 512], 0, 4)
//!     .unwrap();
//! assert!(session.create_session());
//!
//! let participant = ObjectId::new(0x01, ObjectKind::Participant);
//! let request = session.buffer_create_participant(
//!     reliable_out, participant, 0, "<dds/>", 0,
//! );
//! let mut status = [0u8; 1];
//! session.run_until_all_status(1000, &[request], &mut status);
//! ```

pub mod codec;
pub mod config;
mod entities;
pub mod error;
pub mod protocol;
pub mod seq_num;
pub mod session;
pub mod session_info;
pub mod stream;
pub mod transport;

// Re-exports for convenience.
pub use codec::{Endianness, Reader, Writer};
pub use error::{Error, Result};
pub use protocol::{
    status_is_ok, DeliveryControl, ObjectId, ObjectKind, INVALID_REQUEST_ID, STATUS_NONE,
    STATUS_OK, STATUS_OK_MATCHED,
};
pub use seq_num::SeqNum;
pub use session::{NullListener, Session, SessionListener};
pub use session_info::SessionInfo;
pub use stream::{StreamDirection, StreamId, StreamType};
pub use transport::{SerialTransport, TcpTransport, Transport, UdpTransport};

#[cfg(test)]
mod tests;
