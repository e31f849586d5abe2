// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

// Buffered entity-creation and data-access operations.
//
// Each operation serializes one submessage into the chosen output stream
// and returns the request id to correlate the agent's later STATUS, or
// INVALID_REQUEST_ID when the stream has no room (flow control: flush or
// run the session, then retry). Nothing here touches the wire; flushing
// does.

use crate::codec::Writer;
use crate::config::SUBHEADER_SIZE;
use crate::protocol::{
    write_submessage_header, BaseObjectRequest, CreatePayload, DeletePayload, DeliveryControl,
    ObjectId, ReadDataPayload, Representation, DELETE_PAYLOAD_SIZE, FORMAT_DATA,
    INVALID_REQUEST_ID, SUBMESSAGE_ID_CREATE, SUBMESSAGE_ID_DELETE, SUBMESSAGE_ID_READ_DATA,
    SUBMESSAGE_ID_WRITE_DATA,
};
use crate::session::{Session, SessionListener};
use crate::stream::{StreamDirection, StreamId, StreamType};
use crate::transport::Transport;

impl<T: Transport, L: SessionListener> Session<T, L> {
    // -----------------------------------------------------------------------
    // Entity creation / deletion
    // -----------------------------------------------------------------------

    /// Ask the agent to create a participant in `domain_id` from an XML
    /// representation. `mode` is 0, FLAG_REUSE and/or FLAG_REPLACE.
    pub fn buffer_create_participant(
        &mut self,
        stream_id: StreamId,
        object_id: ObjectId,
        domain_id: i16,
        xml: &str,
        mode: u8,
    ) -> u16 {
        self.buffer_create(
            stream_id,
            object_id,
            Representation::Participant { domain_id, xml: xml.to_owned() },
            mode,
        )
    }

    pub fn buffer_create_topic(
        &mut self,
        stream_id: StreamId,
        object_id: ObjectId,
        participant: ObjectId,
        xml: &str,
        mode: u8,
    ) -> u16 {
        self.buffer_create(
            stream_id,
            object_id,
            Representation::Topic { participant, xml: xml.to_owned() },
            mode,
        )
    }

    pub fn buffer_create_publisher(
        &mut self,
        stream_id: StreamId,
        object_id: ObjectId,
        participant: ObjectId,
        xml: &str,
        mode: u8,
    ) -> u16 {
        self.buffer_create(
            stream_id,
            object_id,
            Representation::Publisher { participant, xml: xml.to_owned() },
            mode,
        )
    }

    pub fn buffer_create_subscriber(
        &mut self,
        stream_id: StreamId,
        object_id: ObjectId,
        participant: ObjectId,
        xml: &str,
        mode: u8,
    ) -> u16 {
        self.buffer_create(
            stream_id,
            object_id,
            Representation::Subscriber { participant, xml: xml.to_owned() },
            mode,
        )
    }

    pub fn buffer_create_datawriter(
        &mut self,
        stream_id: StreamId,
        object_id: ObjectId,
        publisher: ObjectId,
        xml: &str,
        mode: u8,
    ) -> u16 {
        self.buffer_create(
            stream_id,
            object_id,
            Representation::DataWriter { publisher, xml: xml.to_owned() },
            mode,
        )
    }

    pub fn buffer_create_datareader(
        &mut self,
        stream_id: StreamId,
        object_id: ObjectId,
        subscriber: ObjectId,
        xml: &str,
        mode: u8,
    ) -> u16 {
        self.buffer_create(
            stream_id,
            object_id,
            Representation::DataReader { subscriber, xml: xml.to_owned() },
            mode,
        )
    }

    fn buffer_create(
        &mut self,
        stream_id: StreamId,
        object_id: ObjectId,
        representation: Representation,
        mode: u8,
    ) -> u16 {
        let request_id = self.info.next_request_id();
        let payload = CreatePayload {
            base: BaseObjectRequest { request_id, object_id },
            representation,
        };

        // Serialize into scratch first; the representation's size depends
        // on its XML string and internal padding.
        let mut scratch = vec![0u8; payload_upper_bound(&payload)];
        let mut w = Writer::new(&mut scratch);
        if payload.write(&mut w).is_err() {
            return INVALID_REQUEST_ID;
        }
        let len = w.position();

        match self.prepare_stream_to_write_submessage(stream_id, len, SUBMESSAGE_ID_CREATE, mode) {
            Some(mut w) => {
                if w.write_bytes(&scratch[..len]).is_ok() {
                    request_id
                } else {
                    INVALID_REQUEST_ID
                }
            }
            None => INVALID_REQUEST_ID,
        }
    }

    /// Ask the agent to delete a previously created entity.
    pub fn buffer_delete_entity(&mut self, stream_id: StreamId, object_id: ObjectId) -> u16 {
        let request_id = self.info.next_request_id();
        let payload = DeletePayload {
            base: BaseObjectRequest { request_id, object_id },
        };
        match self.prepare_stream_to_write_submessage(
            stream_id,
            DELETE_PAYLOAD_SIZE,
            SUBMESSAGE_ID_DELETE,
            0,
        ) {
            Some(mut w) => {
                if payload.write(&mut w).is_ok() {
                    request_id
                } else {
                    INVALID_REQUEST_ID
                }
            }
            None => INVALID_REQUEST_ID,
        }
    }

    // -----------------------------------------------------------------------
    // Data access
    // -----------------------------------------------------------------------

    /// Subscribe `datareader` and have the agent deliver samples on
    /// `data_stream_id`, optionally rate-limited.
    pub fn buffer_request_data(
        &mut self,
        stream_id: StreamId,
        datareader: ObjectId,
        data_stream_id: StreamId,
        delivery_control: Option<DeliveryControl>,
    ) -> u16 {
        let request_id = self.info.next_request_id();
        let payload = ReadDataPayload {
            base: BaseObjectRequest { request_id, object_id: datareader },
            data_stream_id: data_stream_id.raw,
            data_format: FORMAT_DATA,
            delivery_control,
        };
        match self.prepare_stream_to_write_submessage(
            stream_id,
            payload.size(),
            SUBMESSAGE_ID_READ_DATA,
            0,
        ) {
            Some(mut w) => {
                if payload.write(&mut w).is_ok() {
                    request_id
                } else {
                    INVALID_REQUEST_ID
                }
            }
            None => INVALID_REQUEST_ID,
        }
    }

    /// Start a WRITE_DATA submessage for `datawriter` and hand back a
    /// writer with exactly `topic_size` bytes for the serialized sample.
    /// None means the stream cannot take it (use [`Self::buffer_topic`]
    /// for payloads that need fragmentation).
    pub fn prepare_output_stream(
        &mut self,
        stream_id: StreamId,
        datawriter: ObjectId,
        topic_size: usize,
    ) -> Option<(u16, Writer<'_>)> {
        let request_id = self.info.next_request_id();
        let payload_size = 4 + topic_size;
        let mut w = self.prepare_stream_to_write_submessage(
            stream_id,
            payload_size,
            SUBMESSAGE_ID_WRITE_DATA,
            FORMAT_DATA,
        )?;
        BaseObjectRequest { request_id, object_id: datawriter }.write(&mut w).ok()?;
        Some((request_id, w))
    }

    /// Write one serialized topic sample through `datawriter`, falling back
    /// to fragmentation on a reliable stream when the sample exceeds a slot.
    pub fn buffer_topic(&mut self, stream_id: StreamId, datawriter: ObjectId, topic: &[u8]) -> u16 {
        if let Some((request_id, mut w)) =
            self.prepare_output_stream(stream_id, datawriter, topic.len())
        {
            if w.write_bytes(topic).is_err() {
                return INVALID_REQUEST_ID;
            }
            return request_id;
        }

        if stream_id.stream_type != StreamType::Reliable
            || stream_id.direction != StreamDirection::Output
        {
            return INVALID_REQUEST_ID;
        }

        // Build the whole submessage, then let the stream split it into
        // FRAGMENT parts across consecutive slots.
        let request_id = self.info.next_request_id();
        let payload_size = 4 + topic.len();
        if payload_size > u16::MAX as usize {
            return INVALID_REQUEST_ID;
        }
        let mut scratch = vec![0u8; SUBHEADER_SIZE + payload_size];
        let mut w = Writer::new(&mut scratch);
        let built = write_submessage_header(
            &mut w,
            SUBMESSAGE_ID_WRITE_DATA,
            FORMAT_DATA,
            payload_size as u16,
        )
        .and_then(|_| BaseObjectRequest { request_id, object_id: datawriter }.write(&mut w))
        .and_then(|_| w.write_bytes(topic));
        if built.is_err() {
            return INVALID_REQUEST_ID;
        }

        let fragmented = self
            .streams
            .output_reliable_mut(stream_id.index)
            .map(|s| s.write_fragmented(&scratch))
            .unwrap_or(false);
        if fragmented {
            request_id
        } else {
            INVALID_REQUEST_ID
        }
    }
}

/// Generous serialized-size bound for a CREATE payload: base + kind +
/// parent/domain + string header + bytes + terminator + padding.
fn payload_upper_bound(payload: &CreatePayload) -> usize {
    let xml_len = match &payload.representation {
        Representation::Participant { xml, .. }
        | Representation::Topic { xml, .. }
        | Representation::Publisher { xml, .. }
        | Representation::Subscriber { xml, .. }
        | Representation::DataWriter { xml, .. }
        | Representation::DataReader { xml, .. } => xml.len(),
    };
    4 + 1 + 2 + 4 + xml_len + 1 + 8
}
