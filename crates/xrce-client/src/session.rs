// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Session loop: transport I/O, submessage dispatch, reliability bookkeeping
// and the blocking run_until_* entry points.
//
// Single-threaded and cooperative. The only suspension points are the
// transport's receive-with-timeout calls inside create_session,
// delete_session, sync_session and run_until_*; everything else returns
// immediately. Callbacks run on the caller's task and must not re-enter
// run_until_* on the same session.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crate::codec::{Endianness, Reader, Writer};
use crate::config::{
    MAX_HEADER_SIZE, MAX_SESSION_CONNECTION_ATTEMPTS, MIN_SESSION_CONNECTION_INTERVAL_MS,
    SUBHEADER_SIZE,
};
use crate::error::Result;
use crate::protocol::{
    status_is_ok, write_submessage_header, AcknackPayload, BaseObjectReply, BaseObjectRequest,
    HeartbeatPayload, ObjectId, StatusAgentPayload, SubmessageHeader, Time, TimestampPayload,
    TimestampReplyPayload, ACKNACK_PAYLOAD_SIZE, CREATE_CLIENT_PAYLOAD_SIZE, DELETE_PAYLOAD_SIZE,
    FORMAT_DATA, FORMAT_MASK, HEARTBEAT_PAYLOAD_SIZE, INVALID_REQUEST_ID, STATUS_NONE, STATUS_OK,
    SUBMESSAGE_ID_ACKNACK, SUBMESSAGE_ID_DATA, SUBMESSAGE_ID_HEARTBEAT, SUBMESSAGE_ID_PERFORMANCE,
    SUBMESSAGE_ID_STATUS, SUBMESSAGE_ID_STATUS_AGENT, SUBMESSAGE_ID_TIMESTAMP,
    SUBMESSAGE_ID_TIMESTAMP_REPLY, TIMESTAMP_PAYLOAD_SIZE,
};
use crate::session_info::SessionInfo;
use crate::seq_num::SeqNum;
use crate::stream::{
    InputBestEffortStream, InputReliableStream, OutputBestEffortStream, OutputReliableStream,
    ReceiveAction, StreamDirection, StreamId, StreamStorage, StreamType,
};
use crate::transport::Transport;

/// Callbacks a session fires while its loop runs. All default to no-ops;
/// applications implement what they need.
pub trait SessionListener {
    /// An agent STATUS answered request `request_id` on `object_id`.
    fn on_status(&mut self, object_id: ObjectId, request_id: u16, status: u8) {
        let _ = (object_id, request_id, status);
    }

    /// A topic sample arrived; `topic` is positioned at the serialized
    /// sample bytes.
    fn on_topic(
        &mut self,
        object_id: ObjectId,
        request_id: u16,
        stream_id: StreamId,
        topic: &mut Reader<'_>,
    ) {
        let _ = (object_id, request_id, stream_id, topic);
    }

    /// Time synchronization produced a new offset against the agent clock.
    fn on_time(&mut self, offset_ns: i64) {
        let _ = offset_ns;
    }

    /// Raw payload of a PERFORMANCE submessage.
    fn on_performance(&mut self, payload: &[u8]) {
        let _ = payload;
    }
}

/// Listener that ignores everything.
pub struct NullListener;

impl SessionListener for NullListener {}

/// Wall-clock nanoseconds since the Unix epoch.
fn wall_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// An XRCE client session: identity, streams, one transport, one listener.
pub struct Session<T: Transport, L: SessionListener> {
    pub(crate) info: SessionInfo,
    pub(crate) streams: StreamStorage,
    pub(crate) transport: T,
    pub(crate) listener: L,
    /// Request ids installed by run_until_*_status, with gathered statuses.
    pub(crate) pending: Vec<(u16, u8)>,
    pub(crate) time_offset_ns: i64,
    pub(crate) synchronized: bool,
    clock: Instant,
}

impl<T: Transport, L: SessionListener> Session<T, L> {
    /// Initialize session bookkeeping. Does not touch the wire.
    pub fn new(transport: T, listener: L, session_id: u8, key: u32) -> Self {
        Self {
            info: SessionInfo::new(session_id, key),
            streams: StreamStorage::new(),
            transport,
            listener,
            pending: Vec::new(),
            time_offset_ns: 0,
            synchronized: false,
            clock: Instant::now(),
        }
    }

    pub fn session_id(&self) -> u8 {
        self.info.id
    }

    pub fn client_key(&self) -> u32 {
        self.info.key
    }

    /// Outcome of the last CREATE/DELETE handshake exchange.
    pub fn last_requested_status(&self) -> u8 {
        self.info.last_requested_status
    }

    /// Message size the agent announced, 0 before a successful handshake.
    pub fn agent_mtu(&self) -> u16 {
        self.info.agent_mtu
    }

    pub fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    pub fn time_offset_ns(&self) -> i64 {
        self.time_offset_ns
    }

    /// Agent-aligned wall-clock nanoseconds.
    pub fn epoch_nanos(&self) -> i64 {
        wall_nanos() - self.time_offset_ns
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn now_ms(&self) -> i64 {
        self.clock.elapsed().as_millis() as i64
    }

    // -----------------------------------------------------------------------
    // Stream creation
    // -----------------------------------------------------------------------

    /// Add a best-effort output stream backed by `buffer`. The first
    /// header-offset bytes stay reserved for the session header.
    pub fn create_output_best_effort_stream(&mut self, buffer: Vec<u8>) -> Result<StreamId> {
        let stream = OutputBestEffortStream::new(buffer, self.info.header_offset())?;
        self.streams.add_output_best_effort(stream)
    }

    /// Add a reliable output stream: `buffer` is split into `history`
    /// equally sized slots. `max_fragments` bounds how many slots a single
    /// oversized submessage may span; 0 disables fragmentation.
    pub fn create_output_reliable_stream(
        &mut self,
        buffer: Vec<u8>,
        max_fragments: u16,
        history: u16,
    ) -> Result<StreamId> {
        let stream =
            OutputReliableStream::new(buffer, self.info.header_offset(), max_fragments, history)?;
        self.streams.add_output_reliable(stream)
    }

    pub fn create_input_best_effort_stream(&mut self) -> Result<StreamId> {
        self.streams.add_input_best_effort(InputBestEffortStream::new())
    }

    /// Add a reliable input stream; `buffer` becomes its reorder and
    /// reassembly area, split into `history` slots.
    pub fn create_input_reliable_stream(&mut self, buffer: Vec<u8>, history: u16) -> Result<StreamId> {
        self.streams.add_input_reliable(InputReliableStream::new(buffer, history)?)
    }

    // -----------------------------------------------------------------------
    // Writing
    // -----------------------------------------------------------------------

    /// Reserve room for one submessage on an output stream and write its
    /// header. The returned writer has exactly `payload_size` bytes left;
    /// the caller must fill them all. None means flow control: the stream
    /// cannot take the submessage right now.
    pub fn prepare_stream_to_write_submessage(
        &mut self,
        stream_id: StreamId,
        payload_size: usize,
        submessage_id: u8,
        flags: u8,
    ) -> Option<Writer<'_>> {
        if stream_id.direction != StreamDirection::Output || payload_size > u16::MAX as usize {
            return None;
        }
        let total = SUBHEADER_SIZE + payload_size;

        match stream_id.stream_type {
            StreamType::BestEffort => {
                let needs_flush = {
                    let stream = self.streams.output_best_effort_mut(stream_id.index)?;
                    stream.has_pending() && !stream.fits(total)
                };
                if needs_flush {
                    self.flush_output_best_effort(stream_id.index);
                }
                let stream = self.streams.output_best_effort_mut(stream_id.index)?;
                let slot = stream.reserve(total)?;
                let mut w = Writer::new(slot);
                write_submessage_header(&mut w, submessage_id, flags, payload_size as u16).ok()?;
                Some(w)
            }
            StreamType::Reliable => {
                let stream = self.streams.output_reliable_mut(stream_id.index)?;
                let slot = stream.reserve(total)?;
                let mut w = Writer::new(slot);
                write_submessage_header(&mut w, submessage_id, flags, payload_size as u16).ok()?;
                Some(w)
            }
            StreamType::None => None,
        }
    }

    // -----------------------------------------------------------------------
    // Flushing
    // -----------------------------------------------------------------------

    /// Put every pending output buffer on the wire. Send failures are
    /// logged and left to the heartbeat/NACK cycle to repair.
    pub fn flush_output_streams(&mut self) {
        for index in 0..self.streams.output_best_effort.len() {
            self.flush_output_best_effort(index as u8);
        }
        for index in 0..self.streams.output_reliable.len() {
            self.flush_output_reliable(index as u8);
        }
    }

    fn flush_output_best_effort(&mut self, index: u8) {
        let raw = StreamId::new(index, StreamType::BestEffort, StreamDirection::Output).raw;
        let Some(stream) = self.streams.output_best_effort_mut(index) else {
            return;
        };
        if !stream.has_pending() {
            return;
        }
        let seq = stream.next_seq();
        self.info.stamp_session_header(raw, seq, stream.header_mut());
        if !self.transport.send_msg(stream.message_bytes()) {
            log::warn!("send failed on best-effort stream 0x{:02x}, seq {}", raw, seq);
        }
        stream.mark_flushed();
    }

    fn flush_output_reliable(&mut self, index: u8) {
        let now = self.now_ms();
        let raw = StreamId::new(index, StreamType::Reliable, StreamDirection::Output).raw;
        let offset = self.info.header_offset();
        let piggyback_heartbeat = {
            let Some(stream) = self.streams.output_reliable_mut(index) else {
                return;
            };
            if !stream.has_unflushed() {
                return;
            }
            let mut seq = stream.last_sent;
            while seq.precedes(stream.last_written) {
                seq = seq.next();
                if let Some(message) = stream.message_bytes_mut(seq) {
                    self.info.stamp_session_header(raw, seq, &mut message[..offset]);
                    if !self.transport.send_msg(message) {
                        log::warn!("send failed on reliable stream 0x{:02x}, seq {}", raw, seq);
                    }
                }
            }
            stream.mark_flushed(now);
            // A stream that gave up heartbeating still advertises its window
            // on any outbound opportunity.
            stream.send_lost && stream.in_flight()
        };
        if piggyback_heartbeat {
            self.write_submessage_heartbeat(index);
        }
    }

    // -----------------------------------------------------------------------
    // Reliability control emission
    // -----------------------------------------------------------------------

    fn write_submessage_heartbeat(&mut self, index: u8) {
        let now = self.now_ms();
        let offset = self.info.header_offset();
        let payload = {
            let Some(stream) = self.streams.output_reliable_mut(index) else {
                return;
            };
            HeartbeatPayload {
                first_unacked: stream.last_acknown.next().raw(),
                last_unacked: stream.last_sent.raw(),
                stream_id: StreamId::new(index, StreamType::Reliable, StreamDirection::Output).raw,
            }
        };

        let mut buf = [0u8; MAX_HEADER_SIZE + SUBHEADER_SIZE + HEARTBEAT_PAYLOAD_SIZE];
        let (header, body) = buf.split_at_mut(offset);
        self.info.stamp_session_header(0, SeqNum::new(0), header);
        let mut w = Writer::new(body);
        let written = write_submessage_header(
            &mut w,
            SUBMESSAGE_ID_HEARTBEAT,
            0,
            HEARTBEAT_PAYLOAD_SIZE as u16,
        )
        .and_then(|_| payload.write(&mut w));
        if written.is_err() {
            return;
        }
        let len = offset + w.position();
        if !self.transport.send_msg(&buf[..len]) {
            log::warn!("heartbeat send failed on stream 0x{:02x}", payload.stream_id);
        }
        if let Some(stream) = self.streams.output_reliable_mut(index) {
            stream.on_heartbeat_sent(now);
        }
    }

    fn write_submessage_acknack(&mut self, index: u8, first_unacked: SeqNum, nack_bitmap: u16) {
        let offset = self.info.header_offset();
        let payload = AcknackPayload {
            first_unacked: first_unacked.raw(),
            nack_bitmap,
            stream_id: StreamId::new(index, StreamType::Reliable, StreamDirection::Input).raw,
        };

        let mut buf = [0u8; MAX_HEADER_SIZE + SUBHEADER_SIZE + ACKNACK_PAYLOAD_SIZE];
        let (header, body) = buf.split_at_mut(offset);
        self.info.stamp_session_header(0, SeqNum::new(0), header);
        let mut w = Writer::new(body);
        let written =
            write_submessage_header(&mut w, SUBMESSAGE_ID_ACKNACK, 0, ACKNACK_PAYLOAD_SIZE as u16)
                .and_then(|_| payload.write(&mut w));
        if written.is_err() {
            return;
        }
        let len = offset + w.position();
        if !self.transport.send_msg(&buf[..len]) {
            log::warn!("acknack send failed on stream 0x{:02x}", payload.stream_id);
        }
    }

    fn next_heartbeat_deadline(&self) -> Option<i64> {
        self.streams.output_reliable.iter().filter_map(|s| s.heartbeat_deadline()).min()
    }

    fn fire_due_heartbeats(&mut self, now: i64) {
        for index in 0..self.streams.output_reliable.len() {
            if self.streams.output_reliable[index].heartbeat_due(now) {
                self.write_submessage_heartbeat(index as u8);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Session lifecycle
    // -----------------------------------------------------------------------

    /// Perform the CREATE_CLIENT handshake. Retries with exponential
    /// back-off; true when the agent answered OK.
    pub fn create_session(&mut self) -> bool {
        self.info.last_requested_status = STATUS_NONE;
        let mut buf = [0u8; MAX_HEADER_SIZE + SUBHEADER_SIZE + CREATE_CLIENT_PAYLOAD_SIZE];
        let len = match self.info.write_create_session(&mut buf, wall_nanos()) {
            Ok(len) => len,
            Err(e) => {
                log::warn!("cannot build CREATE_CLIENT: {}", e);
                return false;
            }
        };
        self.wait_session_status(&buf[..len]);
        let ok = status_is_ok(self.info.last_requested_status);
        if ok {
            log::info!("session 0x{:02x} established", self.info.id);
        }
        ok
    }

    /// Perform the DELETE handshake, tearing the session down on the agent.
    pub fn delete_session(&mut self) -> bool {
        self.info.last_requested_status = STATUS_NONE;
        let mut buf = [0u8; MAX_HEADER_SIZE + SUBHEADER_SIZE + DELETE_PAYLOAD_SIZE];
        let len = match self.info.write_delete_session(&mut buf) {
            Ok(len) => len,
            Err(e) => {
                log::warn!("cannot build DELETE: {}", e);
                return false;
            }
        };
        self.wait_session_status(&buf[..len]);
        let ok = self.info.last_requested_status == STATUS_OK;
        if ok {
            log::info!("session 0x{:02x} deleted", self.info.id);
        }
        ok
    }

    /// Send `message` and listen until a handshake status lands, doubling
    /// the wait after every silent attempt.
    fn wait_session_status(&mut self, message: &[u8]) {
        let mut interval = MIN_SESSION_CONNECTION_INTERVAL_MS;
        let mut buf = vec![0u8; self.transport.mtu().max(message.len())];

        for _ in 0..MAX_SESSION_CONNECTION_ATTEMPTS {
            if !self.transport.send_msg(message) {
                log::warn!("handshake send failed");
            }
            let deadline = self.now_ms() + interval;
            loop {
                let now = self.now_ms();
                if now >= deadline {
                    break;
                }
                let poll = (deadline - now) as i32;
                if let Some(len) = self.transport.recv_msg(&mut buf, poll) {
                    self.process_message(&buf[..len]);
                }
                if self.info.last_requested_status != STATUS_NONE {
                    return;
                }
            }
            interval *= 2;
        }
    }

    // -----------------------------------------------------------------------
    // Blocking waits
    // -----------------------------------------------------------------------

    /// Flush, then wait for one incoming message, serving heartbeat timers
    /// while waiting. True iff a message was received before the deadline.
    pub fn run_until_timeout(&mut self, timeout_ms: i32) -> bool {
        self.flush_output_streams();
        let deadline = self.now_ms() + i64::from(timeout_ms.max(0));
        let mut buf = vec![0u8; self.transport.mtu().max(MAX_HEADER_SIZE + SUBHEADER_SIZE)];
        loop {
            let now = self.now_ms();
            let poll_until = match self.next_heartbeat_deadline() {
                Some(hb) => hb.min(deadline),
                None => deadline,
            };
            let poll = (poll_until - now).max(0) as i32;
            if let Some(len) = self.transport.recv_msg(&mut buf, poll) {
                self.process_message(&buf[..len]);
                return true;
            }
            let now = self.now_ms();
            self.fire_due_heartbeats(now);
            if now >= deadline {
                return false;
            }
        }
    }

    /// Loop until every reliable output stream is fully acknowledged or the
    /// deadline passes. True iff everything was confirmed.
    pub fn run_until_confirm_delivery(&mut self, timeout_ms: i32) -> bool {
        self.flush_output_streams();
        let deadline = self.now_ms() + i64::from(timeout_ms.max(0));
        while !self.streams.outputs_confirmed() {
            let now = self.now_ms();
            if now >= deadline {
                return false;
            }
            self.run_until_timeout((deadline - now) as i32);
        }
        true
    }

    /// Wait until every request in `request_ids` has a status (written into
    /// `status_out`) or the deadline passes. True iff all requests
    /// succeeded.
    pub fn run_until_all_status(
        &mut self,
        timeout_ms: i32,
        request_ids: &[u16],
        status_out: &mut [u8],
    ) -> bool {
        self.run_status_wait(timeout_ms, request_ids, status_out, false)
    }

    /// Like run_until_all_status but returns as soon as any single request
    /// has an answer. True iff that answer was a success.
    pub fn run_until_one_status(
        &mut self,
        timeout_ms: i32,
        request_ids: &[u16],
        status_out: &mut [u8],
    ) -> bool {
        self.run_status_wait(timeout_ms, request_ids, status_out, true)
    }

    fn run_status_wait(
        &mut self,
        timeout_ms: i32,
        request_ids: &[u16],
        status_out: &mut [u8],
        any: bool,
    ) -> bool {
        debug_assert_eq!(request_ids.len(), status_out.len());
        status_out.fill(STATUS_NONE);
        if request_ids.is_empty() || request_ids.contains(&INVALID_REQUEST_ID) {
            return false;
        }

        self.pending.clear();
        self.pending.extend(request_ids.iter().map(|&id| (id, STATUS_NONE)));
        let deadline = self.now_ms() + i64::from(timeout_ms.max(0));
        loop {
            let done = if any {
                self.pending.iter().any(|&(_, s)| s != STATUS_NONE)
            } else {
                self.pending.iter().all(|&(_, s)| s != STATUS_NONE)
            };
            if done {
                break;
            }
            let now = self.now_ms();
            if now >= deadline {
                break;
            }
            self.run_until_timeout((deadline - now) as i32);
        }

        for (out, &(_, status)) in status_out.iter_mut().zip(self.pending.iter()) {
            *out = status;
        }
        self.pending.clear();
        if any {
            status_out.iter().any(|&s| status_is_ok(s))
        } else {
            status_out.iter().all(|&s| status_is_ok(s))
        }
    }

    /// Exchange TIMESTAMP/TIMESTAMP_REPLY with the agent to compute the
    /// clock offset used by [`Self::epoch_nanos`].
    pub fn sync_session(&mut self, timeout_ms: i32) -> bool {
        self.synchronized = false;
        let offset = self.info.header_offset();
        let mut buf = [0u8; MAX_HEADER_SIZE + SUBHEADER_SIZE + TIMESTAMP_PAYLOAD_SIZE];
        let (header, body) = buf.split_at_mut(offset);
        self.info.stamp_session_header(0, SeqNum::new(0), header);
        let mut w = Writer::new(body);
        let written = write_submessage_header(
            &mut w,
            SUBMESSAGE_ID_TIMESTAMP,
            0,
            TIMESTAMP_PAYLOAD_SIZE as u16,
        )
        .and_then(|_| TimestampPayload { transmit: Time::from_nanos(wall_nanos()) }.write(&mut w));
        if written.is_err() {
            return false;
        }
        let len = offset + w.position();
        if !self.transport.send_msg(&buf[..len]) {
            log::warn!("timestamp send failed");
        }

        let deadline = self.now_ms() + i64::from(timeout_ms.max(0));
        while !self.synchronized {
            let now = self.now_ms();
            if now >= deadline {
                return false;
            }
            self.run_until_timeout((deadline - now) as i32);
        }
        true
    }

    // -----------------------------------------------------------------------
    // Inbound path
    // -----------------------------------------------------------------------

    fn process_message(&mut self, message: &[u8]) {
        let mut r = Reader::new(message);
        let (stream_raw, seq) = match self.info.read_session_header(&mut r) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("discarding message: {}", e);
                return;
            }
        };
        let area = &message[r.position()..];
        self.read_stream(area, stream_raw, seq);
    }

    fn read_stream(&mut self, area: &[u8], stream_raw: u8, seq: SeqNum) {
        let id = StreamId::from_raw(stream_raw, StreamDirection::Input);
        match id.stream_type {
            StreamType::None => self.read_submessage_list(area, id),
            StreamType::BestEffort => {
                let accept = match self.streams.input_best_effort_mut(id.index) {
                    Some(stream) => stream.accept(seq),
                    None => false,
                };
                if accept {
                    self.read_submessage_list(area, id);
                }
            }
            StreamType::Reliable => {
                let action = match self.streams.input_reliable_mut(id.index) {
                    Some(stream) => stream.receive(seq, area),
                    None => return,
                };
                if action == ReceiveAction::Deliver {
                    self.read_submessage_list(area, id);
                }
                self.drain_input_reliable(id);
                self.confirm_input_reliable(id.index);
            }
        }
    }

    fn drain_input_reliable(&mut self, id: StreamId) {
        while let Some(message) =
            self.streams.input_reliable_mut(id.index).and_then(|s| s.pop_deliverable())
        {
            self.read_submessage_list(&message, id);
        }
    }

    fn confirm_input_reliable(&mut self, index: u8) {
        let confirm = self.streams.input_reliable_mut(index).and_then(|s| s.acknack());
        if let Some((first_unacked, bitmap)) = confirm {
            self.write_submessage_acknack(index, first_unacked, bitmap);
        }
    }

    /// Walk a delivered message as 4-byte aligned (header, payload) pairs.
    fn read_submessage_list(&mut self, area: &[u8], stream_id: StreamId) {
        let mut pos = 0usize;
        loop {
            pos = (pos + 3) & !3;
            if pos + SUBHEADER_SIZE > area.len() {
                break;
            }
            let mut r = Reader::new(&area[pos..]);
            let header = match SubmessageHeader::read(&mut r) {
                Ok(h) => h,
                Err(_) => {
                    log::warn!("malformed submessage header, abandoning message");
                    break;
                }
            };
            let payload_start = pos + SUBHEADER_SIZE;
            let payload_end = payload_start + header.length as usize;
            if payload_end > area.len() {
                log::warn!("truncated submessage {}, abandoning message", header.id);
                break;
            }
            self.read_submessage(&area[payload_start..payload_end], &header, stream_id);
            pos = payload_end;
        }
    }

    fn read_submessage(&mut self, payload: &[u8], header: &SubmessageHeader, stream_id: StreamId) {
        let endianness = Endianness::from_flags(header.flags);
        match header.id {
            SUBMESSAGE_ID_STATUS_AGENT => {
                if stream_id.is_none_stream() {
                    self.read_submessage_status_agent(payload, endianness);
                }
            }
            SUBMESSAGE_ID_STATUS => self.read_submessage_status(payload, endianness),
            SUBMESSAGE_ID_DATA => {
                self.read_submessage_data(payload, header.flags, stream_id, endianness)
            }
            SUBMESSAGE_ID_HEARTBEAT => self.read_submessage_heartbeat(payload, endianness),
            SUBMESSAGE_ID_ACKNACK => self.read_submessage_acknack(payload, endianness),
            SUBMESSAGE_ID_TIMESTAMP_REPLY => {
                self.read_submessage_timestamp_reply(payload, endianness)
            }
            SUBMESSAGE_ID_PERFORMANCE => self.listener.on_performance(payload),
            other => log::trace!("skipping submessage id {} ({} bytes)", other, payload.len()),
        }
    }

    fn read_submessage_status_agent(&mut self, payload: &[u8], endianness: Endianness) {
        let mut r = Reader::with_endianness(payload, endianness);
        match StatusAgentPayload::read(&mut r) {
            Ok(p) => self.info.read_session_status(&p),
            Err(_) => log::warn!("malformed STATUS_AGENT payload"),
        }
    }

    fn read_submessage_status(&mut self, payload: &[u8], endianness: Endianness) {
        let mut r = Reader::with_endianness(payload, endianness);
        let reply = match BaseObjectReply::read(&mut r) {
            Ok(p) => p,
            Err(_) => {
                log::warn!("malformed STATUS payload");
                return;
            }
        };
        for slot in self.pending.iter_mut() {
            if slot.0 == reply.base.request_id && slot.1 == STATUS_NONE {
                slot.1 = reply.result.status;
            }
        }
        self.listener.on_status(reply.base.object_id, reply.base.request_id, reply.result.status);
    }

    fn read_submessage_data(
        &mut self,
        payload: &[u8],
        flags: u8,
        stream_id: StreamId,
        endianness: Endianness,
    ) {
        let mut r = Reader::with_endianness(payload, endianness);
        let base = match BaseObjectRequest::read(&mut r) {
            Ok(b) => b,
            Err(_) => {
                log::warn!("malformed DATA payload");
                return;
            }
        };
        match flags & FORMAT_MASK {
            FORMAT_DATA => {
                let mut topic = Reader::with_endianness(r.remaining_bytes(), endianness);
                self.listener.on_topic(base.object_id, base.request_id, stream_id, &mut topic);
            }
            // Sample/sequence formats are reserved; honor the length and
            // keep the walker aligned.
            other => log::trace!("unhandled DATA format 0x{:02x}", other),
        }
    }

    fn read_submessage_heartbeat(&mut self, payload: &[u8], endianness: Endianness) {
        let mut r = Reader::with_endianness(payload, endianness);
        let Ok(p) = HeartbeatPayload::read(&mut r) else {
            log::warn!("malformed HEARTBEAT payload");
            return;
        };
        let id = StreamId::from_raw(p.stream_id, StreamDirection::Input);
        if !id.is_reliable() {
            return;
        }
        if let Some(stream) = self.streams.input_reliable_mut(id.index) {
            stream.update_from_heartbeat(SeqNum::new(p.first_unacked), SeqNum::new(p.last_unacked));
        } else {
            return;
        }
        self.drain_input_reliable(id);
        self.confirm_input_reliable(id.index);
    }

    fn read_submessage_acknack(&mut self, payload: &[u8], endianness: Endianness) {
        let mut r = Reader::with_endianness(payload, endianness);
        let Ok(p) = AcknackPayload::read(&mut r) else {
            log::warn!("malformed ACKNACK payload");
            return;
        };
        let id = StreamId::from_raw(p.stream_id, StreamDirection::Output);
        if !id.is_reliable() {
            return;
        }
        let now = self.now_ms();
        let retransmit = match self.streams.output_reliable_mut(id.index) {
            Some(stream) => stream.process_acknack(SeqNum::new(p.first_unacked), p.nack_bitmap, now),
            None => return,
        };
        for seq in retransmit {
            let Some(stream) = self.streams.output_reliable(id.index) else {
                break;
            };
            if let Some(message) = stream.message_bytes(seq) {
                if !self.transport.send_msg(message) {
                    log::warn!("retransmit send failed on stream 0x{:02x}, seq {}", p.stream_id, seq);
                }
            }
        }
    }

    fn read_submessage_timestamp_reply(&mut self, payload: &[u8], endianness: Endianness) {
        let mut r = Reader::with_endianness(payload, endianness);
        let Ok(p) = TimestampReplyPayload::read(&mut r) else {
            log::warn!("malformed TIMESTAMP_REPLY payload");
            return;
        };
        let t0 = p.originate.to_nanos();
        let t1 = p.receive.to_nanos();
        let t2 = p.transmit.to_nanos();
        let t3 = wall_nanos();
        self.time_offset_ns = ((t0 + t3) - (t1 + t2)) / 2;
        self.synchronized = true;
        self.listener.on_time(self.time_offset_ns);
    }
}
