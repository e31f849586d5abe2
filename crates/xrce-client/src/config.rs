// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Compile-time configuration knobs.
//
// All tuning happens here; there is no env/flag surface.

/// Size of the long session header: session_id + stream_id + seq_num + client_key.
pub const MAX_HEADER_SIZE: usize = 8;

/// Size of the short session header (client key implicit in the session id).
pub const MIN_HEADER_SIZE: usize = 4;

/// Size of a submessage header: id + flags + length.
pub const SUBHEADER_SIZE: usize = 4;

/// Period between HEARTBEAT emissions while a reliable output stream has
/// unacknowledged data.
pub const HEARTBEAT_PERIOD_MS: i64 = 200;

/// Heartbeats sent without acknowledgement progress before a reliable output
/// stream latches into its send-lost mode.
pub const MAX_HEARTBEAT_TRIES: u8 = 10;

/// Attempts for the CREATE_CLIENT / DELETE_CLIENT handshake.
pub const MAX_SESSION_CONNECTION_ATTEMPTS: usize = 10;

/// Initial wait for a handshake reply; doubled after every silent attempt.
pub const MIN_SESSION_CONNECTION_INTERVAL_MS: i64 = 1000;

/// Capacity of each of the four stream tables (indexes 0..=63 are encodable,
/// but a client rarely needs more than a handful).
pub const MAX_OUTPUT_BEST_EFFORT_STREAMS: usize = 8;
pub const MAX_OUTPUT_RELIABLE_STREAMS: usize = 8;
pub const MAX_INPUT_BEST_EFFORT_STREAMS: usize = 8;
pub const MAX_INPUT_RELIABLE_STREAMS: usize = 8;

/// Largest reliable-stream history; slot index arithmetic requires a power
/// of two below this.
pub const MAX_STREAM_HISTORY: u16 = 256;

/// Datagram payload limit for the UDP transport.
pub const UDP_TRANSPORT_MTU: usize = 512;

/// Message limit for the length-prefixed TCP transport.
pub const TCP_TRANSPORT_MTU: usize = 512;

/// Frame payload limit for the serial transport.
pub const SERIAL_TRANSPORT_MTU: usize = 256;
