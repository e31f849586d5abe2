// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Stream identification and per-session stream storage.
//!
//! A stream id is one raw byte: 0 is the built-in "none" control stream,
//! 1..=0x7F are best-effort streams and 0x80..=0xFF reliable streams. The
//! direction is not encoded; it is known from which side of the session the
//! id is used on.

mod input_best_effort;
mod input_reliable;
mod output_best_effort;
mod output_reliable;

pub use input_best_effort::InputBestEffortStream;
pub use input_reliable::{InputReliableStream, ReceiveAction};
pub use output_best_effort::OutputBestEffortStream;
pub use output_reliable::OutputReliableStream;

use crate::config::{
    MAX_INPUT_BEST_EFFORT_STREAMS, MAX_INPUT_RELIABLE_STREAMS,
    MAX_OUTPUT_BEST_EFFORT_STREAMS, MAX_OUTPUT_RELIABLE_STREAMS,
};
use crate::error::{Error, Result};

/// First raw id of the best-effort range.
pub const BEST_EFFORT_STREAM_THRESHOLD: u8 = 0x01;

/// First raw id of the reliable range.
pub const RELIABLE_STREAM_THRESHOLD: u8 = 0x80;

/// Delivery class of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamType {
    /// The raw-0 control stream carrying session-level submessages.
    None,
    /// At-most-once, monotone delivery.
    BestEffort,
    /// Exactly-once, ordered delivery.
    Reliable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    Input,
    Output,
}

/// Decoded stream id: the raw wire byte plus its unpacked parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamId {
    pub raw: u8,
    pub index: u8,
    pub stream_type: StreamType,
    pub direction: StreamDirection,
}

impl StreamId {
    pub const fn new(index: u8, stream_type: StreamType, direction: StreamDirection) -> Self {
        let raw = match stream_type {
            StreamType::None => 0,
            StreamType::BestEffort => BEST_EFFORT_STREAM_THRESHOLD + index,
            StreamType::Reliable => RELIABLE_STREAM_THRESHOLD + index,
        };
        Self { raw, index, stream_type, direction }
    }

    pub const fn from_raw(raw: u8, direction: StreamDirection) -> Self {
        let (stream_type, index) = if raw == 0 {
            (StreamType::None, 0)
        } else if raw < RELIABLE_STREAM_THRESHOLD {
            (StreamType::BestEffort, raw - BEST_EFFORT_STREAM_THRESHOLD)
        } else {
            (StreamType::Reliable, raw - RELIABLE_STREAM_THRESHOLD)
        };
        Self { raw, index, stream_type, direction }
    }

    pub const fn none(direction: StreamDirection) -> Self {
        Self::new(0, StreamType::None, direction)
    }

    pub fn is_none_stream(&self) -> bool {
        self.stream_type == StreamType::None
    }

    pub fn is_reliable(&self) -> bool {
        self.stream_type == StreamType::Reliable
    }
}

/// The four fixed-capacity stream tables owned by a session.
#[derive(Debug, Default)]
pub struct StreamStorage {
    pub(crate) output_best_effort: Vec<OutputBestEffortStream>,
    pub(crate) output_reliable: Vec<OutputReliableStream>,
    pub(crate) input_best_effort: Vec<InputBestEffortStream>,
    pub(crate) input_reliable: Vec<InputReliableStream>,
}

impl StreamStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_output_best_effort(
        &mut self,
        stream: OutputBestEffortStream,
    ) -> Result<StreamId> {
        if self.output_best_effort.len() >= MAX_OUTPUT_BEST_EFFORT_STREAMS {
            return Err(Error::ResourceExhausted);
        }
        let index = self.output_best_effort.len() as u8;
        self.output_best_effort.push(stream);
        Ok(StreamId::new(index, StreamType::BestEffort, StreamDirection::Output))
    }

    pub(crate) fn add_output_reliable(&mut self, stream: OutputReliableStream) -> Result<StreamId> {
        if self.output_reliable.len() >= MAX_OUTPUT_RELIABLE_STREAMS {
            return Err(Error::ResourceExhausted);
        }
        let index = self.output_reliable.len() as u8;
        self.output_reliable.push(stream);
        Ok(StreamId::new(index, StreamType::Reliable, StreamDirection::Output))
    }

    pub(crate) fn add_input_best_effort(
        &mut self,
        stream: InputBestEffortStream,
    ) -> Result<StreamId> {
        if self.input_best_effort.len() >= MAX_INPUT_BEST_EFFORT_STREAMS {
            return Err(Error::ResourceExhausted);
        }
        let index = self.input_best_effort.len() as u8;
        self.input_best_effort.push(stream);
        Ok(StreamId::new(index, StreamType::BestEffort, StreamDirection::Input))
    }

    pub(crate) fn add_input_reliable(&mut self, stream: InputReliableStream) -> Result<StreamId> {
        if self.input_reliable.len() >= MAX_INPUT_RELIABLE_STREAMS {
            return Err(Error::ResourceExhausted);
        }
        let index = self.input_reliable.len() as u8;
        self.input_reliable.push(stream);
        Ok(StreamId::new(index, StreamType::Reliable, StreamDirection::Input))
    }

    pub(crate) fn output_best_effort_mut(&mut self, index: u8) -> Option<&mut OutputBestEffortStream> {
        self.output_best_effort.get_mut(index as usize)
    }

    pub(crate) fn output_reliable(&self, index: u8) -> Option<&OutputReliableStream> {
        self.output_reliable.get(index as usize)
    }

    pub(crate) fn output_reliable_mut(&mut self, index: u8) -> Option<&mut OutputReliableStream> {
        self.output_reliable.get_mut(index as usize)
    }

    pub(crate) fn input_best_effort_mut(&mut self, index: u8) -> Option<&mut InputBestEffortStream> {
        self.input_best_effort.get_mut(index as usize)
    }

    pub(crate) fn input_reliable_mut(&mut self, index: u8) -> Option<&mut InputReliableStream> {
        self.input_reliable.get_mut(index as usize)
    }

    /// True when no reliable output stream holds unacknowledged data.
    pub(crate) fn outputs_confirmed(&self) -> bool {
        self.output_reliable.iter().all(|s| s.confirmed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_id_raw_encoding() {
        let be = StreamId::new(0, StreamType::BestEffort, StreamDirection::Output);
        assert_eq!(be.raw, 0x01);
        let rel = StreamId::new(2, StreamType::Reliable, StreamDirection::Output);
        assert_eq!(rel.raw, 0x82);
        let none = StreamId::none(StreamDirection::Input);
        assert_eq!(none.raw, 0x00);
        assert!(none.is_none_stream());
    }

    #[test]
    fn test_stream_id_from_raw() {
        let id = StreamId::from_raw(0x01, StreamDirection::Input);
        assert_eq!(id.stream_type, StreamType::BestEffort);
        assert_eq!(id.index, 0);

        let id = StreamId::from_raw(0x85, StreamDirection::Input);
        assert_eq!(id.stream_type, StreamType::Reliable);
        assert_eq!(id.index, 5);
        assert!(id.is_reliable());

        let id = StreamId::from_raw(0x00, StreamDirection::Input);
        assert_eq!(id.stream_type, StreamType::None);
    }

    #[test]
    fn test_storage_capacity() {
        let mut storage = StreamStorage::new();
        for i in 0..MAX_INPUT_BEST_EFFORT_STREAMS {
            let id = storage.add_input_best_effort(InputBestEffortStream::new()).unwrap();
            assert_eq!(id.index as usize, i);
        }
        let err = storage.add_input_best_effort(InputBestEffortStream::new()).unwrap_err();
        assert_eq!(err, Error::ResourceExhausted);
    }
}
