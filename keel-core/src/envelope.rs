//! Read-side view of a stored event.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    codec::Codec,
    event::{EventRegistry, Payload},
    metadata::EventMetadata,
    store::StoredEvent,
};

/// A decoded payload bundled with its persistence metadata.
///
/// Envelopes are read-only: every field is set when the event is loaded and
/// only exposed through accessors. [`EventEnvelope::raw_payload`] always
/// returns the stored bytes, whether or not the payload decoded to a
/// registered type.
#[derive(Clone, Debug, PartialEq)]
pub struct EventEnvelope<E> {
    stored: StoredEvent,
    payload: Payload<E>,
}

impl<E> EventEnvelope<E> {
    pub const fn new(stored: StoredEvent, payload: Payload<E>) -> Self {
        Self { stored, payload }
    }

    /// Decode a stored event through `registry`.
    pub fn decode<C: Codec>(stored: StoredEvent, codec: &C, registry: &EventRegistry<C, E>) -> Self
    where
        E: 'static,
    {
        let payload = registry.decode(codec, &stored.event_type, &stored.payload);
        Self::new(stored, payload)
    }

    pub const fn event_id(&self) -> Uuid {
        self.stored.event_id
    }

    pub const fn aggregate_id(&self) -> Uuid {
        self.stored.aggregate_id
    }

    pub fn aggregate_type(&self) -> &str {
        &self.stored.aggregate_type
    }

    pub fn event_type(&self) -> &str {
        &self.stored.event_type
    }

    pub const fn sequence_number(&self) -> i64 {
        self.stored.sequence_number
    }

    pub const fn payload(&self) -> &Payload<E> {
        &self.payload
    }

    pub fn raw_payload(&self) -> &[u8] {
        &self.stored.payload
    }

    pub const fn metadata(&self) -> &EventMetadata {
        &self.stored.metadata
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.stored.created_at
    }

    pub fn into_payload(self) -> Payload<E> {
        self.payload
    }
}
