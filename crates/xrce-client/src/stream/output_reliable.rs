// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Reliable output: a sliding window over `history` equally sized slots.
//
// Three cursors drive the state machine, always ordered
// `last_acknown <= last_sent <= last_written` in the modular sense:
//
//   (last_acknown, last_sent]     sent, retained for NACK retransmission
//   (last_sent, last_written]     written, waiting for the next flush
//
// Slot index for sequence number S is `S % history`.

use crate::codec::Writer;
use crate::config::{HEARTBEAT_PERIOD_MS, MAX_HEARTBEAT_TRIES, MAX_STREAM_HISTORY, SUBHEADER_SIZE};
use crate::error::{Error, Result};
use crate::protocol::{write_submessage_header, FLAG_LAST_FRAGMENT, SUBMESSAGE_ID_FRAGMENT};
use crate::seq_num::SeqNum;

#[derive(Debug)]
pub struct OutputReliableStream {
    pub(crate) buffer: Vec<u8>,
    pub(crate) offset: usize,
    pub(crate) history: u16,
    /// Per-slot fill in bytes; 0 means the slot holds nothing.
    pub(crate) lengths: Vec<usize>,
    /// Upper bound on the parts a single submessage may be split into;
    /// 0 disables fragmentation.
    pub(crate) max_fragments: u16,

    pub(crate) last_written: SeqNum,
    pub(crate) last_sent: SeqNum,
    pub(crate) last_acknown: SeqNum,

    pub(crate) next_heartbeat_ms: i64,
    pub(crate) heartbeat_tries: u8,
    pub(crate) send_lost: bool,
}

impl OutputReliableStream {
    pub(crate) fn new(
        buffer: Vec<u8>,
        offset: usize,
        max_fragments: u16,
        history: u16,
    ) -> Result<Self> {
        if history == 0 || !history.is_power_of_two() || history >= MAX_STREAM_HISTORY {
            return Err(Error::InvalidParameter);
        }
        let block = buffer.len() / history as usize;
        if block < offset + SUBHEADER_SIZE + 1 {
            return Err(Error::InvalidParameter);
        }
        Ok(Self {
            buffer,
            offset,
            history,
            lengths: vec![0; history as usize],
            max_fragments,
            last_written: SeqNum::BEFORE_FIRST,
            last_sent: SeqNum::BEFORE_FIRST,
            last_acknown: SeqNum::BEFORE_FIRST,
            next_heartbeat_ms: 0,
            heartbeat_tries: 0,
            send_lost: false,
        })
    }

    pub(crate) fn block_size(&self) -> usize {
        self.buffer.len() / self.history as usize
    }

    fn slot_of(&self, seq: SeqNum) -> usize {
        (seq.raw() & (self.history - 1)) as usize
    }

    /// Sent data not yet acknowledged.
    pub(crate) fn in_flight(&self) -> bool {
        self.last_acknown != self.last_sent
    }

    /// Written data not yet flushed.
    pub(crate) fn has_unflushed(&self) -> bool {
        self.last_sent.precedes(self.last_written)
    }

    /// Everything written has been acknowledged.
    pub(crate) fn confirmed(&self) -> bool {
        self.last_acknown == self.last_written
    }

    /// Reserve `total` bytes for one submessage, appending to the open
    /// (unflushed) slot when it has room, opening the next slot otherwise.
    /// Returns None when the window or the slot cannot take it.
    pub(crate) fn reserve(&mut self, total: usize) -> Option<&mut [u8]> {
        let block = self.block_size();
        if self.has_unflushed() {
            let slot = self.slot_of(self.last_written);
            let start = align4(self.lengths[slot]);
            if start + total <= block {
                let base = slot * block;
                for b in &mut self.buffer[base + self.lengths[slot]..base + start] {
                    *b = 0;
                }
                self.lengths[slot] = start + total;
                return Some(&mut self.buffer[base + start..base + start + total]);
            }
        }

        if self.offset + total > block {
            return None;
        }
        let seq = self.last_written.next();
        if self.last_acknown.distance(seq) > self.history {
            return None;
        }
        let slot = self.slot_of(seq);
        self.last_written = seq;
        self.lengths[slot] = self.offset + total;
        let base = slot * block;
        Some(&mut self.buffer[base + self.offset..base + self.offset + total])
    }

    /// Split a fully serialized submessage into FRAGMENT parts across
    /// consecutive slots, one slot per part. Each part gets its own
    /// submessage header here; the final one carries the last-fragment flag.
    pub(crate) fn write_fragmented(&mut self, submessage: &[u8]) -> bool {
        if self.max_fragments == 0 || submessage.is_empty() {
            return false;
        }
        let block = self.block_size();
        let chunk_capacity = block - self.offset - SUBHEADER_SIZE;
        let parts = submessage.len().div_ceil(chunk_capacity);
        if parts > self.max_fragments as usize || parts > u16::MAX as usize {
            return false;
        }
        let last_seq = self.last_written.add(parts as u16);
        if self.last_acknown.distance(last_seq) > self.history {
            return false;
        }

        for (i, chunk) in submessage.chunks(chunk_capacity).enumerate() {
            let seq = self.last_written.next();
            let slot = self.slot_of(seq);
            let base = slot * block;
            let mut w = Writer::new(&mut self.buffer[base + self.offset..base + block]);
            let flags = if i == parts - 1 { FLAG_LAST_FRAGMENT } else { 0 };
            let written = write_submessage_header(&mut w, SUBMESSAGE_ID_FRAGMENT, flags, chunk.len() as u16)
                .and_then(|_| w.write_bytes(chunk));
            if written.is_err() {
                return false;
            }
            self.lengths[slot] = self.offset + w.position();
            self.last_written = seq;
        }
        true
    }

    /// Full slot message (header area + submessages) for a retained seq.
    pub(crate) fn message_bytes(&self, seq: SeqNum) -> Option<&[u8]> {
        if !self.retains(seq) {
            return None;
        }
        let slot = self.slot_of(seq);
        let base = slot * self.block_size();
        Some(&self.buffer[base..base + self.lengths[slot]])
    }

    /// Mutable variant used by the flush path to stamp the session header.
    pub(crate) fn message_bytes_mut(&mut self, seq: SeqNum) -> Option<&mut [u8]> {
        if !self.retains(seq) {
            return None;
        }
        let slot = self.slot_of(seq);
        let base = slot * self.block_size();
        let len = self.lengths[slot];
        Some(&mut self.buffer[base..base + len])
    }

    fn retains(&self, seq: SeqNum) -> bool {
        self.last_acknown.precedes(seq)
            && !self.last_written.precedes(seq)
            && self.lengths[self.slot_of(seq)] != 0
    }

    /// All written slots are on the wire; rearm the heartbeat timer.
    pub(crate) fn mark_flushed(&mut self, now_ms: i64) {
        self.last_sent = self.last_written;
        self.next_heartbeat_ms = now_ms + HEARTBEAT_PERIOD_MS;
    }

    /// Apply an ACKNACK: advance the acknowledged cursor and return the
    /// sequence numbers whose slots must be retransmitted.
    pub(crate) fn process_acknack(
        &mut self,
        first_unacked: SeqNum,
        nack_bitmap: u16,
        now_ms: i64,
    ) -> Vec<SeqNum> {
        let new_acknown = first_unacked.sub(1);
        if self.last_acknown.precedes(new_acknown) && !self.last_sent.precedes(new_acknown) {
            self.last_acknown = new_acknown;
            self.heartbeat_tries = 0;
            self.send_lost = false;
        }

        let mut retransmit = Vec::new();
        for bit in 0..16u16 {
            if nack_bitmap & (1 << bit) != 0 {
                let seq = first_unacked.add(bit);
                if self.last_acknown.precedes(seq) && !self.last_sent.precedes(seq) {
                    retransmit.push(seq);
                }
            }
        }
        self.next_heartbeat_ms = now_ms + HEARTBEAT_PERIOD_MS;
        retransmit
    }

    /// A heartbeat keeps firing while sent data is unacknowledged and the
    /// stream has not given up on the peer.
    pub(crate) fn wants_heartbeat(&self) -> bool {
        self.in_flight() && !self.send_lost
    }

    pub(crate) fn heartbeat_deadline(&self) -> Option<i64> {
        self.wants_heartbeat().then_some(self.next_heartbeat_ms)
    }

    pub(crate) fn heartbeat_due(&self, now_ms: i64) -> bool {
        self.wants_heartbeat() && now_ms >= self.next_heartbeat_ms
    }

    pub(crate) fn on_heartbeat_sent(&mut self, now_ms: i64) {
        self.heartbeat_tries = self.heartbeat_tries.saturating_add(1);
        if self.heartbeat_tries >= MAX_HEARTBEAT_TRIES {
            self.send_lost = true;
        }
        self.next_heartbeat_ms = now_ms + HEARTBEAT_PERIOD_MS;
    }
}

fn align4(pos: usize) -> usize {
    (pos + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(history: u16, block: usize) -> OutputReliableStream {
        OutputReliableStream::new(vec![0u8; block * history as usize], 4, 0, history).unwrap()
    }

    #[test]
    fn test_history_validation() {
        assert!(OutputReliableStream::new(vec![0u8; 256], 4, 0, 3).is_err());
        assert!(OutputReliableStream::new(vec![0u8; 256], 4, 0, 0).is_err());
        assert!(OutputReliableStream::new(vec![0u8; 16], 4, 0, 4).is_err());
        assert!(OutputReliableStream::new(vec![0u8; 256], 4, 0, 4).is_ok());
    }

    #[test]
    fn test_cursor_ordering_invariant() {
        let mut s = stream(4, 64);
        for _ in 0..3 {
            s.reserve(16).unwrap();
            s.mark_flushed(0);
        }
        // last_acknown <= last_sent <= last_written at every step.
        assert!(!s.last_sent.precedes(s.last_acknown));
        assert!(!s.last_written.precedes(s.last_sent));

        s.process_acknack(SeqNum::new(2), 0, 0);
        assert_eq!(s.last_acknown, SeqNum::new(1));
        assert!(!s.last_sent.precedes(s.last_acknown));
    }

    #[test]
    fn test_submessages_share_open_slot() {
        let mut s = stream(4, 64);
        s.reserve(16).unwrap();
        s.reserve(16).unwrap();
        // Both land in the slot for seq 0.
        assert_eq!(s.last_written, SeqNum::new(0));
        assert_eq!(s.lengths[0], 4 + 32);

        s.mark_flushed(0);
        s.reserve(16).unwrap();
        assert_eq!(s.last_written, SeqNum::new(1));
    }

    #[test]
    fn test_window_flow_control() {
        let mut s = stream(4, 64);
        for _ in 0..4 {
            assert!(s.reserve(40).is_some());
            s.mark_flushed(0);
        }
        // Window holds 4 unacked slots; the fifth is refused.
        assert!(s.reserve(40).is_none());

        // Acknowledging seq 0 frees one slot.
        s.process_acknack(SeqNum::new(1), 0, 0);
        assert!(s.reserve(40).is_some());
    }

    #[test]
    fn test_acknack_retransmit_selection() {
        let mut s = stream(8, 64);
        for _ in 0..5 {
            s.reserve(16).unwrap();
            s.mark_flushed(0);
        }
        // Seqs 1 and 3 missing on the peer.
        let retransmit = s.process_acknack(SeqNum::new(1), 0b0000_0101, 0);
        assert_eq!(retransmit, vec![SeqNum::new(1), SeqNum::new(3)]);
        assert_eq!(s.last_acknown, SeqNum::new(0));
        // Bits pointing past last_sent are ignored.
        let retransmit = s.process_acknack(SeqNum::new(5), 0b0110, 0);
        assert!(retransmit.is_empty());
    }

    #[test]
    fn test_heartbeat_tries_latch_send_lost() {
        let mut s = stream(4, 64);
        s.reserve(16).unwrap();
        s.mark_flushed(0);
        assert!(s.wants_heartbeat());

        for _ in 0..MAX_HEARTBEAT_TRIES {
            s.on_heartbeat_sent(0);
        }
        assert!(s.send_lost);
        assert!(!s.wants_heartbeat());

        // Progress clears the latch.
        s.process_acknack(SeqNum::new(1), 0, 0);
        assert!(!s.send_lost);
        assert_eq!(s.heartbeat_tries, 0);
    }

    #[test]
    fn test_fragmentation_spans_slots() {
        let mut s = OutputReliableStream::new(vec![0u8; 8 * 32], 4, 8, 8).unwrap();
        // 24 usable chunk bytes per slot (32 - 4 header - 4 subheader).
        let submessage = vec![0xABu8; 60];
        assert!(s.write_fragmented(&submessage));
        // 60 / 24 -> 3 parts.
        assert_eq!(s.last_written, SeqNum::new(2));
        for seq in 0..3u16 {
            let msg = s.message_bytes(SeqNum::new(seq)).unwrap();
            assert_eq!(msg[4], SUBMESSAGE_ID_FRAGMENT);
        }
        // Last part carries the terminating flag.
        let last = s.message_bytes(SeqNum::new(2)).unwrap();
        assert_ne!(last[5] & FLAG_LAST_FRAGMENT, 0);
        let first = s.message_bytes(SeqNum::new(0)).unwrap();
        assert_eq!(first[5] & FLAG_LAST_FRAGMENT, 0);
    }

    #[test]
    fn test_fragmentation_disabled_or_oversized() {
        let mut s = stream(4, 32);
        assert!(!s.write_fragmented(&[0u8; 60]));

        let mut s = OutputReliableStream::new(vec![0u8; 4 * 32], 4, 2, 4).unwrap();
        // Needs 3 parts but only 2 allowed.
        assert!(!s.write_fragmented(&[0u8; 60]));
    }
}
