// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// End-to-end tests for the session layer, driven through a scripted mock
// transport: handshake, best-effort publish, reliable retransmission,
// reordering and reassembly, status waits, heartbeat exhaustion, time sync.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::codec::{Reader, Writer};
use crate::config::{HEARTBEAT_PERIOD_MS, MAX_HEARTBEAT_TRIES, SUBHEADER_SIZE};
use crate::protocol::*;
use crate::session::{Session, SessionListener};
use crate::seq_num::SeqNum;
use crate::stream::StreamId;
use crate::transport::Transport;

const SESSION_ID: u8 = 0x81;
const CLIENT_KEY: u32 = 0xAABB_CCDD;

const PARTICIPANT: ObjectId = ObjectId { prefix: 0x01, kind: 0x01 };
const TOPIC: ObjectId = ObjectId { prefix: 0x02, kind: 0x02 };
const SUBSCRIBER: ObjectId = ObjectId { prefix: 0x04, kind: 0x04 };
const DATAWRITER: ObjectId = ObjectId { prefix: 0x05, kind: 0x05 };
const DATAREADER: ObjectId = ObjectId { prefix: 0x06, kind: 0x06 };

// -----------------------------------------------------------------------
// 1. Handshake: CREATE_CLIENT out, STATUS_AGENT OK back
// -----------------------------------------------------------------------
#[test]
fn test_create_session_handshake() {
    let (mut session, wires) = make_session();
    wires.queue_inbound(agent_message(
        0,
        0,
        &[(SUBMESSAGE_ID_STATUS_AGENT, 0, status_agent_payload(STATUS_OK, CLIENT_KEY))],
    ));

    assert!(session.create_session());
    assert_eq!(session.last_requested_status(), STATUS_OK);
    assert_eq!(session.agent_mtu(), 512);

    let out = wires.outbound();
    assert_eq!(out.len(), 1);
    let msg = &out[0];
    // Short header + subheader + 22-byte CREATE_CLIENT payload.
    assert_eq!(msg.len(), 4 + 4 + CREATE_CLIENT_PAYLOAD_SIZE);
    assert_eq!(msg[0], 0x80);
    assert_eq!(msg[1], 0x00);
    assert_eq!(msg[4], SUBMESSAGE_ID_CREATE_CLIENT);
    assert_eq!(u16::from_le_bytes([msg[6], msg[7]]), CREATE_CLIENT_PAYLOAD_SIZE as u16);
    assert_eq!(&msg[8..12], b"XRCE");

    let mut r = Reader::new(&msg[8..]);
    let payload = CreateClientPayload::read(&mut r).unwrap();
    assert_eq!(payload.client_key, CLIENT_KEY);
    assert_eq!(payload.session_id, SESSION_ID);
}

// -----------------------------------------------------------------------
// 2. Handshake: agent refusal and incompatible peer both fail
// -----------------------------------------------------------------------
#[test]
fn test_create_session_rejected() {
    let (mut session, wires) = make_session();
    wires.queue_inbound(agent_message(
        0,
        0,
        &[(SUBMESSAGE_ID_STATUS_AGENT, 0, status_agent_payload(STATUS_ERR_RESOURCES, CLIENT_KEY))],
    ));
    assert!(!session.create_session());
    assert_eq!(session.last_requested_status(), STATUS_ERR_RESOURCES);

    // A reply echoing the wrong client key fails even with status OK.
    let (mut session, wires) = make_session();
    wires.queue_inbound(agent_message(
        0,
        0,
        &[(SUBMESSAGE_ID_STATUS_AGENT, 0, status_agent_payload(STATUS_OK, 0x1111_1111))],
    ));
    assert!(!session.create_session());
    assert_eq!(session.last_requested_status(), STATUS_ERR_INCOMPATIBLE);
}

// -----------------------------------------------------------------------
// 3. Handshake: DELETE out, STATUS_AGENT OK back
// -----------------------------------------------------------------------
#[test]
fn test_delete_session_handshake() {
    let (mut session, wires) = make_session();
    wires.queue_inbound(agent_message(
        0,
        0,
        &[(SUBMESSAGE_ID_STATUS_AGENT, 0, status_agent_payload(STATUS_OK, CLIENT_KEY))],
    ));
    assert!(session.delete_session());

    let out = wires.outbound();
    let msg = &out[0];
    assert_eq!(msg[4], SUBMESSAGE_ID_DELETE);
    // DELETE names the client object.
    let mut r = Reader::new(&msg[8..]);
    let payload = DeletePayload::read(&mut r).unwrap();
    assert_eq!(payload.base.object_id, CLIENT_OBJECT_ID);
}

// -----------------------------------------------------------------------
// 4. Best-effort publish: exact wire bytes, monotone sequence numbers
// -----------------------------------------------------------------------
#[test]
fn test_best_effort_publish_wire_format() {
    let (mut session, wires) = make_session();
    let stream = session.create_output_best_effort_stream(vec![0u8; 128]).unwrap();
    assert_eq!(stream.raw, 0x01);

    let topic: Vec<u8> = (0..22u8).collect();
    let request = session.buffer_topic(stream, DATAWRITER, &topic);
    assert_ne!(request, INVALID_REQUEST_ID);
    session.flush_output_streams();

    let out = wires.outbound();
    assert_eq!(out.len(), 1);
    let msg = &out[0];
    // Session header: id, stream, seq 0.
    assert_eq!(&msg[..4], &[SESSION_ID, 0x01, 0x00, 0x00]);
    // WRITE_DATA submessage, FORMAT_DATA, little-endian flag.
    assert_eq!(msg[4], SUBMESSAGE_ID_WRITE_DATA);
    assert_eq!(msg[5] & FORMAT_MASK, FORMAT_DATA);
    assert_eq!(u16::from_le_bytes([msg[6], msg[7]]), 4 + 22);
    // Correlation base, then the exact topic bytes.
    assert_eq!(u16::from_le_bytes([msg[8], msg[9]]), request);
    assert_eq!(&msg[10..12], &[DATAWRITER.prefix, DATAWRITER.kind]);
    assert_eq!(&msg[12..], &topic[..]);

    // A second write goes out with seq 1.
    session.buffer_topic(stream, DATAWRITER, &topic);
    session.flush_output_streams();
    let out = wires.outbound();
    assert_eq!(out.len(), 2);
    assert_eq!(&out[1][..4], &[SESSION_ID, 0x01, 0x01, 0x00]);
}

// -----------------------------------------------------------------------
// 5. Best-effort: a full buffer flushes implicitly on the next write
// -----------------------------------------------------------------------
#[test]
fn test_best_effort_implicit_flush() {
    let (mut session, wires) = make_session();
    let stream = session.create_output_best_effort_stream(vec![0u8; 48]).unwrap();

    // 4 header + 4 subheader + 4 base + 20 topic = 32 bytes: a second one
    // cannot fit in 48.
    assert_ne!(session.buffer_topic(stream, DATAWRITER, &[1u8; 20]), INVALID_REQUEST_ID);
    assert_ne!(session.buffer_topic(stream, DATAWRITER, &[2u8; 20]), INVALID_REQUEST_ID);
    // The first buffer already went out.
    assert_eq!(wires.outbound().len(), 1);

    session.flush_output_streams();
    assert_eq!(wires.outbound().len(), 2);
}

// -----------------------------------------------------------------------
// 6. Reliable retransmit: NACKed slot resent byte-for-byte
// -----------------------------------------------------------------------
#[test]
fn test_reliable_retransmit_on_acknack() {
    let (mut session, wires) = make_session();
    let stream = session.create_output_reliable_stream(vec![0u8; 4 * 64], 0, 4).unwrap();
    assert_eq!(stream.raw, 0x80);

    for tag in 0..4u8 {
        let request = session.buffer_topic(stream, DATAWRITER, &[tag; 8]);
        assert_ne!(request, INVALID_REQUEST_ID);
        session.flush_output_streams();
    }
    let out = wires.outbound();
    assert_eq!(out.len(), 4);
    for (i, msg) in out.iter().enumerate() {
        assert_eq!(&msg[..4], &[SESSION_ID, 0x80, i as u8, 0x00]);
    }
    let seq2_message = out[2].clone();

    // The agent acknowledges seq 0 and reports seq 2 missing.
    wires.queue_inbound(agent_message(
        0,
        0,
        &[(SUBMESSAGE_ID_ACKNACK, 0, acknack_payload(1, 0b0010, 0x80))],
    ));
    assert!(session.run_until_timeout(100));

    let out = wires.outbound();
    assert_eq!(out.len(), 5);
    assert_eq!(out[4], seq2_message);
    assert_eq!(session.streams.output_reliable[0].last_acknown, SeqNum::new(0));
}

// -----------------------------------------------------------------------
// 7. Reliable window refuses writes past `history` unacked slots
// -----------------------------------------------------------------------
#[test]
fn test_reliable_window_flow_control() {
    let (mut session, wires) = make_session();
    let stream = session.create_output_reliable_stream(vec![0u8; 4 * 64], 0, 4).unwrap();

    for tag in 0..4u8 {
        assert_ne!(session.buffer_topic(stream, DATAWRITER, &[tag; 40]), INVALID_REQUEST_ID);
        session.flush_output_streams();
    }
    // Window full, nothing acknowledged.
    assert_eq!(session.buffer_topic(stream, DATAWRITER, &[9u8; 40]), INVALID_REQUEST_ID);

    // An acknowledgement for everything reopens it.
    wires.queue_inbound(agent_message(
        0,
        0,
        &[(SUBMESSAGE_ID_ACKNACK, 0, acknack_payload(4, 0, 0x80))],
    ));
    assert!(session.run_until_timeout(100));
    assert_ne!(session.buffer_topic(stream, DATAWRITER, &[9u8; 40]), INVALID_REQUEST_ID);
}

// -----------------------------------------------------------------------
// 8. Reliable input: reorder, heartbeat, NACK, recovery (end to end)
// -----------------------------------------------------------------------
#[test]
fn test_reliable_input_reorder_and_recovery() {
    let (mut session, wires) = make_session();
    let recording = wires.recording.clone();
    session.create_input_reliable_stream(vec![0u8; 8 * 64], 8).unwrap();

    // In-order head delivers immediately.
    wires.queue_inbound(data_message(0x80, 0, 0));
    assert!(session.run_until_timeout(50));
    for (seq, tag) in [(1u16, 1u8), (2, 2), (4, 4), (5, 5)] {
        wires.queue_inbound(data_message(0x80, seq, tag));
        assert!(session.run_until_timeout(50));
    }
    assert_eq!(topic_tags(&recording), vec![0, 1, 2]);
    // Nothing announced yet, so no ACKNACK went out.
    assert!(wires.outbound().is_empty());

    // The agent announces up to seq 5; the session reports seq 3 missing.
    wires.queue_inbound(agent_message(
        0,
        0,
        &[(SUBMESSAGE_ID_HEARTBEAT, 0, heartbeat_payload(1, 5, 0x80))],
    ));
    assert!(session.run_until_timeout(50));
    let out = wires.outbound();
    assert_eq!(out.len(), 1);
    let acknack = parse_acknack(&out[0]);
    assert_eq!(acknack.first_unacked, 3);
    assert_eq!(acknack.nack_bitmap, 0b0001);
    assert_eq!(acknack.stream_id, 0x80);

    // The retransmitted seq 3 unlocks 4 and 5 in order.
    wires.queue_inbound(data_message(0x80, 3, 3));
    assert!(session.run_until_timeout(50));
    assert_eq!(topic_tags(&recording), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(session.streams.input_reliable[0].last_handled, SeqNum::new(5));
}

// -----------------------------------------------------------------------
// 9. Reliable input: duplicates deliver exactly once
// -----------------------------------------------------------------------
#[test]
fn test_reliable_input_exactly_once() {
    let (mut session, wires) = make_session();
    let recording = wires.recording.clone();
    session.create_input_reliable_stream(vec![0u8; 8 * 64], 8).unwrap();

    wires.queue_inbound(data_message(0x80, 0, 7));
    assert!(session.run_until_timeout(50));
    wires.queue_inbound(data_message(0x80, 0, 7));
    assert!(session.run_until_timeout(50));
    assert_eq!(topic_tags(&recording), vec![7]);
}

// -----------------------------------------------------------------------
// 10. run_until_all_status gathers every reply
// -----------------------------------------------------------------------
#[test]
fn test_run_until_all_status() {
    let (mut session, wires) = make_session();
    let stream = session.create_output_reliable_stream(vec![0u8; 4 * 512], 0, 4).unwrap();

    let r1 = session.buffer_create_participant(stream, PARTICIPANT, 0, "<participant/>", 0);
    let r2 = session.buffer_create_topic(stream, TOPIC, PARTICIPANT, "<topic/>", 0);
    let r3 = session.buffer_create_subscriber(stream, SUBSCRIBER, PARTICIPANT, "", 0);
    let r4 = session.buffer_create_datareader(stream, DATAREADER, SUBSCRIBER, "<reader/>", 0);
    for request in [r1, r2, r3, r4] {
        assert_ne!(request, INVALID_REQUEST_ID);
    }

    for (request, object) in [(r1, PARTICIPANT), (r2, TOPIC), (r3, SUBSCRIBER), (r4, DATAREADER)] {
        wires.queue_inbound(agent_message(
            0,
            0,
            &[(SUBMESSAGE_ID_STATUS, 0, status_payload(request, object, STATUS_OK))],
        ));
    }

    let mut statuses = [STATUS_NONE; 4];
    assert!(session.run_until_all_status(1000, &[r1, r2, r3, r4], &mut statuses));
    assert_eq!(statuses, [STATUS_OK; 4]);
}

// -----------------------------------------------------------------------
// 11. run_until_one_status returns on the first reply
// -----------------------------------------------------------------------
#[test]
fn test_run_until_one_status() {
    let (mut session, wires) = make_session();
    let stream = session.create_output_reliable_stream(vec![0u8; 4 * 512], 0, 4).unwrap();
    let r1 = session.buffer_create_participant(stream, PARTICIPANT, 0, "<participant/>", 0);
    let r2 = session.buffer_delete_entity(stream, TOPIC);

    wires.queue_inbound(agent_message(
        0,
        0,
        &[(SUBMESSAGE_ID_STATUS, 0, status_payload(r2, TOPIC, STATUS_OK))],
    ));

    let mut statuses = [STATUS_NONE; 2];
    assert!(session.run_until_one_status(500, &[r1, r2], &mut statuses));
    assert_eq!(statuses[0], STATUS_NONE);
    assert_eq!(statuses[1], STATUS_OK);

    // An invalid request id refuses the wait outright.
    let mut statuses = [STATUS_NONE; 2];
    assert!(!session.run_until_one_status(10, &[INVALID_REQUEST_ID, r1], &mut statuses));
}

// -----------------------------------------------------------------------
// 12. Heartbeat exhaustion against a silent peer (runs ~4s)
// -----------------------------------------------------------------------
#[test]
fn test_heartbeat_exhaustion_enters_send_lost() {
    let (mut session, wires) = make_session();
    let stream = session.create_output_reliable_stream(vec![0u8; 4 * 64], 0, 4).unwrap();

    assert_ne!(session.buffer_topic(stream, DATAWRITER, &[1u8; 8]), INVALID_REQUEST_ID);
    session.flush_output_streams();

    let wait_ms = 2 * i32::from(MAX_HEARTBEAT_TRIES) * HEARTBEAT_PERIOD_MS as i32;
    assert!(!session.run_until_confirm_delivery(wait_ms));
    assert!(session.streams.output_reliable[0].send_lost);

    let heartbeats = wires
        .outbound()
        .iter()
        .filter(|m| m.len() > 4 && m[4] == SUBMESSAGE_ID_HEARTBEAT)
        .count();
    assert_eq!(heartbeats, MAX_HEARTBEAT_TRIES as usize);

    // The session stays usable for new writes.
    assert_ne!(session.buffer_topic(stream, DATAWRITER, &[2u8; 8]), INVALID_REQUEST_ID);
    session.flush_output_streams();
    let out = wires.outbound();
    // The new data message went out with seq 1...
    assert!(out.iter().any(|m| m[..4] == [SESSION_ID, 0x80, 0x01, 0x00]));
    // ...and the lost stream piggy-backed one more heartbeat on it.
    assert_eq!(out.last().unwrap()[4], SUBMESSAGE_ID_HEARTBEAT);
}

// -----------------------------------------------------------------------
// 13. Fragmentation: large writes split across slots on the way out
// -----------------------------------------------------------------------
#[test]
fn test_fragmented_write_spans_slots() {
    let (mut publisher, wires) = make_session();
    let stream = publisher.create_output_reliable_stream(vec![0u8; 8 * 32], 8, 8).unwrap();

    let topic: Vec<u8> = (0..100u8).collect();
    let request = publisher.buffer_topic(stream, DATAWRITER, &topic);
    assert_ne!(request, INVALID_REQUEST_ID);
    publisher.flush_output_streams();

    let fragments = wires.outbound();
    assert!(fragments.len() > 1, "expected a fragment chain, got {}", fragments.len());
    for (i, fragment) in fragments.iter().enumerate() {
        assert_eq!(&fragment[..2], &[SESSION_ID, 0x80]);
        assert_eq!(u16::from_le_bytes([fragment[2], fragment[3]]), i as u16);
        assert_eq!(fragment[4], SUBMESSAGE_ID_FRAGMENT);
        let is_last = i == fragments.len() - 1;
        assert_eq!(fragment[5] & FLAG_LAST_FRAGMENT != 0, is_last);
    }

    // Concatenated chunks reproduce the original WRITE_DATA submessage.
    let mut reassembled = Vec::new();
    for fragment in &fragments {
        reassembled.extend_from_slice(&fragment[4 + SUBHEADER_SIZE..]);
    }
    assert_eq!(reassembled[0], SUBMESSAGE_ID_WRITE_DATA);
    assert_eq!(&reassembled[SUBHEADER_SIZE + 4..], &topic[..]);
}

// -----------------------------------------------------------------------
// 14. Reassembly: fragmented DATA from the agent delivers one sample
// -----------------------------------------------------------------------
#[test]
fn test_fragmented_data_reassembles() {
    let (mut session, wires) = make_session();
    let recording = wires.recording.clone();
    session.create_input_reliable_stream(vec![0u8; 8 * 64], 8).unwrap();

    // The whole DATA submessage an agent would have sent unfragmented.
    let topic: Vec<u8> = (0..90u8).collect();
    let mut inner = vec![0u8; SUBHEADER_SIZE + 4 + topic.len()];
    let mut w = Writer::new(&mut inner);
    write_submessage_header(&mut w, SUBMESSAGE_ID_DATA, FORMAT_DATA, (4 + topic.len()) as u16)
        .unwrap();
    BaseObjectRequest { request_id: 1, object_id: DATAREADER }.write(&mut w).unwrap();
    w.write_bytes(&topic).unwrap();

    // Split into 40-byte FRAGMENT parts, delivered out of order.
    let chunks: Vec<&[u8]> = inner.chunks(40).collect();
    let mut messages: Vec<Vec<u8>> = chunks
        .iter()
        .enumerate()
        .map(|(i, chunk)| {
            let flags = if i == chunks.len() - 1 { FLAG_LAST_FRAGMENT } else { 0 };
            agent_message(0x80, i as u16, &[(SUBMESSAGE_ID_FRAGMENT, flags, chunk.to_vec())])
        })
        .collect();
    messages.swap(0, 1);

    for message in messages {
        wires.queue_inbound(message);
        assert!(session.run_until_timeout(50));
    }

    let topics = recording.lock().unwrap().topics.clone();
    assert_eq!(topics.len(), 1);
    assert_eq!(&topics[0], &topic);
    assert_eq!(
        session.streams.input_reliable[0].last_handled,
        SeqNum::new(chunks.len() as u16 - 1)
    );
}

// -----------------------------------------------------------------------
// 15. Time sync computes an offset and marks the session synchronized
// -----------------------------------------------------------------------
#[test]
fn test_sync_session() {
    let (mut session, wires) = make_session();
    let recording = wires.recording.clone();
    assert!(!session.is_synchronized());

    // An agent running one hour ahead.
    let skew_ns: i64 = 3600 * 1_000_000_000;
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos() as i64;
    let reply = TimestampReplyPayload {
        transmit: Time::from_nanos(now + skew_ns),
        receive: Time::from_nanos(now + skew_ns),
        originate: Time::from_nanos(now),
    };
    let mut payload = vec![0u8; TIMESTAMP_REPLY_PAYLOAD_SIZE];
    let mut w = Writer::new(&mut payload);
    reply.write(&mut w).unwrap();
    wires.queue_inbound(agent_message(0, 0, &[(SUBMESSAGE_ID_TIMESTAMP_REPLY, 0, payload)]));

    assert!(session.sync_session(500));
    assert!(session.is_synchronized());
    // Offset is about -skew (the agent is ahead), far from zero.
    assert!(session.time_offset_ns() < -(skew_ns / 2));
    assert_eq!(recording.lock().unwrap().time_offsets.len(), 1);

    let outbound = wires.outbound();
    assert_eq!(outbound[0][4], SUBMESSAGE_ID_TIMESTAMP);
}

// -----------------------------------------------------------------------
// 16. Unknown submessages are skipped without derailing the walker
// -----------------------------------------------------------------------
#[test]
fn test_unknown_submessage_skipped() {
    let (mut session, wires) = make_session();
    let recording = wires.recording.clone();
    session.create_input_reliable_stream(vec![0u8; 8 * 64], 8).unwrap();

    // RESET (unhandled) followed by DATA in one message.
    let mut submessages = vec![(SUBMESSAGE_ID_RESET, 0u8, vec![0u8; 6])];
    submessages.push((SUBMESSAGE_ID_DATA, FORMAT_DATA, data_payload(9, DATAREADER, 42)));
    wires.queue_inbound(agent_message(0x80, 0, &submessages));

    assert!(session.run_until_timeout(50));
    assert_eq!(topic_tags(&recording), vec![42]);
}

// -----------------------------------------------------------------------
// Test doubles and wire builders
// -----------------------------------------------------------------------

#[derive(Default)]
struct Recording {
    statuses: Vec<(u16, u8)>,
    topics: Vec<Vec<u8>>,
    time_offsets: Vec<i64>,
}

struct RecordingListener {
    recording: Arc<Mutex<Recording>>,
}

impl SessionListener for RecordingListener {
    fn on_status(&mut self, _object_id: ObjectId, request_id: u16, status: u8) {
        self.recording.lock().unwrap().statuses.push((request_id, status));
    }

    fn on_topic(
        &mut self,
        _object_id: ObjectId,
        _request_id: u16,
        _stream_id: StreamId,
        topic: &mut Reader<'_>,
    ) {
        self.recording.lock().unwrap().topics.push(topic.remaining_bytes().to_vec());
    }

    fn on_time(&mut self, offset_ns: i64) {
        self.recording.lock().unwrap().time_offsets.push(offset_ns);
    }
}

/// Transport scripted from the test: queued inbound messages, recorded
/// outbound messages, no real I/O.
struct MockTransport {
    inbound: Arc<Mutex<VecDeque<Vec<u8>>>>,
    outbound: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl Transport for MockTransport {
    fn send_msg(&mut self, data: &[u8]) -> bool {
        self.outbound.lock().unwrap().push(data.to_vec());
        true
    }

    fn recv_msg(&mut self, buf: &mut [u8], timeout_ms: i32) -> Option<usize> {
        if let Some(message) = self.inbound.lock().unwrap().pop_front() {
            let len = message.len().min(buf.len());
            buf[..len].copy_from_slice(&message[..len]);
            return Some(len);
        }
        // Nothing scripted: burn (part of) the timeout like a real socket.
        std::thread::sleep(Duration::from_millis(timeout_ms.clamp(0, 50) as u64));
        None
    }

    fn mtu(&self) -> usize {
        512
    }
}

/// Shared handles to a mock transport's queues and the listener recording.
#[derive(Clone)]
struct Wires {
    inbound: Arc<Mutex<VecDeque<Vec<u8>>>>,
    outbound: Arc<Mutex<Vec<Vec<u8>>>>,
    recording: Arc<Mutex<Recording>>,
}

impl Wires {
    fn queue_inbound(&self, message: Vec<u8>) {
        self.inbound.lock().unwrap().push_back(message);
    }

    fn outbound(&self) -> Vec<Vec<u8>> {
        self.outbound.lock().unwrap().clone()
    }
}

fn make_session() -> (Session<MockTransport, RecordingListener>, Wires) {
    let inbound = Arc::new(Mutex::new(VecDeque::new()));
    let outbound = Arc::new(Mutex::new(Vec::new()));
    let recording = Arc::new(Mutex::new(Recording::default()));
    let transport = MockTransport { inbound: inbound.clone(), outbound: outbound.clone() };
    let listener = RecordingListener { recording: recording.clone() };
    let session = Session::new(transport, listener, SESSION_ID, CLIENT_KEY);
    (session, Wires { inbound, outbound, recording })
}

fn topic_tags(recording: &Arc<Mutex<Recording>>) -> Vec<u8> {
    // data_payload puts the tag right after the 4-byte correlation base.
    recording.lock().unwrap().topics.iter().map(|t| t[0]).collect()
}

/// Build an agent-side message: short session header plus submessages,
/// each 4-byte aligned.
fn agent_message(stream_raw: u8, seq: u16, submessages: &[(u8, u8, Vec<u8>)]) -> Vec<u8> {
    let mut buf = vec![SESSION_ID, stream_raw];
    buf.extend_from_slice(&seq.to_le_bytes());
    for (id, flags, payload) in submessages {
        while (buf.len() - 4) % 4 != 0 {
            buf.push(0);
        }
        buf.push(*id);
        buf.push(*flags | FLAG_ENDIANNESS);
        buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        buf.extend_from_slice(payload);
    }
    buf
}

fn status_agent_payload(status: u8, client_key: u32) -> Vec<u8> {
    let payload = StatusAgentPayload {
        result: ResultStatus { status, implementation_status: 0 },
        cookie: XRCE_COOKIE,
        version: XRCE_VERSION,
        vendor_id: XRCE_VENDOR_ID,
        client_key,
        mtu: 512,
    };
    let mut buf = vec![0u8; STATUS_AGENT_PAYLOAD_SIZE];
    let mut w = Writer::new(&mut buf);
    payload.write(&mut w).unwrap();
    buf
}

fn status_payload(request_id: u16, object_id: ObjectId, status: u8) -> Vec<u8> {
    let payload = BaseObjectReply {
        base: BaseObjectRequest { request_id, object_id },
        result: ResultStatus { status, implementation_status: 0 },
    };
    let mut buf = vec![0u8; STATUS_PAYLOAD_SIZE];
    let mut w = Writer::new(&mut buf);
    payload.write(&mut w).unwrap();
    buf
}

fn heartbeat_payload(first_unacked: u16, last_unacked: u16, stream_id: u8) -> Vec<u8> {
    let payload = HeartbeatPayload { first_unacked, last_unacked, stream_id };
    let mut buf = vec![0u8; HEARTBEAT_PAYLOAD_SIZE];
    let mut w = Writer::new(&mut buf);
    payload.write(&mut w).unwrap();
    buf
}

fn acknack_payload(first_unacked: u16, nack_bitmap: u16, stream_id: u8) -> Vec<u8> {
    let payload = AcknackPayload { first_unacked, nack_bitmap, stream_id };
    let mut buf = vec![0u8; ACKNACK_PAYLOAD_SIZE];
    let mut w = Writer::new(&mut buf);
    payload.write(&mut w).unwrap();
    buf
}

fn data_payload(request_id: u16, object_id: ObjectId, tag: u8) -> Vec<u8> {
    let mut buf = vec![0u8; 5];
    let mut w = Writer::new(&mut buf);
    BaseObjectRequest { request_id, object_id }.write(&mut w).unwrap();
    w.write_u8(tag).unwrap();
    buf
}

/// A one-sample DATA message on the given reliable stream.
fn data_message(stream_raw: u8, seq: u16, tag: u8) -> Vec<u8> {
    agent_message(stream_raw, seq, &[(SUBMESSAGE_ID_DATA, FORMAT_DATA, data_payload(1, DATAREADER, tag))])
}

fn parse_acknack(message: &[u8]) -> AcknackPayload {
    assert_eq!(message[4], SUBMESSAGE_ID_ACKNACK);
    let mut r = Reader::new(&message[8..]);
    AcknackPayload::read(&mut r).unwrap()
}
