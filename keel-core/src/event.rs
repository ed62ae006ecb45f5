//! Domain event traits, the untyped fallback, and the decoder registry.
//!
//! Concrete event structs implement [`DomainEvent`]; the event sum type a
//! caller appends implements [`SerializableEvent`]. On read, an
//! [`EventRegistry`] resolves each stored discriminator to a typed value.
//! Discriminators nobody registered come back as [`Payload::Raw`] with the
//! stored bytes untouched.

use std::{collections::HashMap, fmt};

use serde::de::DeserializeOwned;

use crate::codec::Codec;

/// Marker trait for a single concrete event shape.
///
/// [`Self::EVENT_TYPE`] is the discriminator persisted next to the payload,
/// e.g. `"RegattaCreated"` or `"EntryWithdrawn"`. It must be unique across
/// the event types registered with one [`EventRegistry`].
pub trait DomainEvent {
    const EVENT_TYPE: &'static str;
}

/// Instance access to [`DomainEvent::EVENT_TYPE`].
///
/// Blanket-implemented for every [`DomainEvent`]; never implement it by hand.
pub trait EventType {
    fn event_type(&self) -> &'static str;
}

impl<T: DomainEvent> EventType for T {
    fn event_type(&self) -> &'static str {
        T::EVENT_TYPE
    }
}

/// An event sum type that can be appended to the store.
///
/// Implementations report the discriminator of the variant at hand and
/// serialize only that variant's payload, so the stored bytes match what a
/// registered decoder for the discriminator expects.
///
/// ```
/// use keel_core::codec::Codec;
/// use keel_core::event::{DomainEvent, SerializableEvent};
///
/// #[derive(serde::Serialize, serde::Deserialize)]
/// struct RegattaCreated { name: String }
///
/// impl DomainEvent for RegattaCreated {
///     const EVENT_TYPE: &'static str = "RegattaCreated";
/// }
///
/// enum RegattaEvent {
///     Created(RegattaCreated),
/// }
///
/// impl SerializableEvent for RegattaEvent {
///     fn event_type(&self) -> &str {
///         match self {
///             Self::Created(_) => RegattaCreated::EVENT_TYPE,
///         }
///     }
///
///     fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, C::Error> {
///         match self {
///             Self::Created(e) => codec.serialize(e),
///         }
///     }
/// }
/// ```
pub trait SerializableEvent {
    /// Discriminator stored in the `event_type` column.
    fn event_type(&self) -> &str;

    /// Serialize the payload with the journal's codec.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the payload cannot be serialized.
    fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, C::Error>;
}

/// A stored event whose discriminator has no registered decoder.
///
/// The payload holds the exact bytes that were persisted. Appending a
/// `RawEvent` writes those bytes unchanged, so copying events between stores
/// never depends on the registry being complete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawEvent {
    pub event_type: String,
    pub payload: Vec<u8>,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            event_type: event_type.into(),
            payload: payload.into(),
        }
    }

    /// The payload as text, when it is valid UTF-8 (always the case for JSON).
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

impl SerializableEvent for RawEvent {
    fn event_type(&self) -> &str {
        &self.event_type
    }

    fn encode<C: Codec>(&self, _codec: &C) -> Result<Vec<u8>, C::Error> {
        Ok(self.payload.clone())
    }
}

/// A decoded payload: either a registered type or the untyped fallback.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload<E> {
    Typed(E),
    Raw(RawEvent),
}

impl<E> Payload<E> {
    pub const fn typed(&self) -> Option<&E> {
        match self {
            Self::Typed(event) => Some(event),
            Self::Raw(_) => None,
        }
    }

    pub const fn raw(&self) -> Option<&RawEvent> {
        match self {
            Self::Typed(_) => None,
            Self::Raw(raw) => Some(raw),
        }
    }

    pub fn into_typed(self) -> Option<E> {
        match self {
            Self::Typed(event) => Some(event),
            Self::Raw(_) => None,
        }
    }

    pub const fn is_typed(&self) -> bool {
        matches!(self, Self::Typed(_))
    }
}

impl<E: SerializableEvent> SerializableEvent for Payload<E> {
    fn event_type(&self) -> &str {
        match self {
            Self::Typed(event) => event.event_type(),
            Self::Raw(raw) => raw.event_type(),
        }
    }

    fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, C::Error> {
        match self {
            Self::Typed(event) => event.encode(codec),
            Self::Raw(raw) => raw.encode(codec),
        }
    }
}

type Decoder<C, E> = Box<dyn Fn(&C, &[u8]) -> Result<E, <C as Codec>::Error> + Send + Sync>;

/// Maps event discriminators to decoders producing the sum type `E`.
///
/// A miss is not an error: [`EventRegistry::decode`] falls back to
/// [`Payload::Raw`].
pub struct EventRegistry<C: Codec, E> {
    decoders: HashMap<&'static str, Decoder<C, E>>,
}

impl<C: Codec, E: 'static> EventRegistry<C, E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Register `T` under [`DomainEvent::EVENT_TYPE`], wrapping decoded values
    /// with `wrap` (typically an enum variant constructor).
    ///
    /// Registering the same discriminator twice replaces the earlier decoder.
    #[must_use]
    pub fn register<T>(mut self, wrap: fn(T) -> E) -> Self
    where
        T: DomainEvent + DeserializeOwned + 'static,
    {
        let decoder: Decoder<C, E> =
            Box::new(move |codec: &C, data: &[u8]| codec.deserialize::<T>(data).map(wrap));
        if self.decoders.insert(T::EVENT_TYPE, decoder).is_some() {
            tracing::debug!(event_type = T::EVENT_TYPE, "replaced registered decoder");
        }
        self
    }

    pub fn is_registered(&self, event_type: &str) -> bool {
        self.decoders.contains_key(event_type)
    }

    pub fn event_types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.decoders.keys().copied()
    }

    /// Resolve a stored payload.
    ///
    /// Unregistered discriminators, and registered ones whose bytes no longer
    /// match the decoder's shape, yield [`Payload::Raw`] holding `data`
    /// verbatim.
    pub fn decode(&self, codec: &C, event_type: &str, data: &[u8]) -> Payload<E> {
        let Some(decoder) = self.decoders.get(event_type) else {
            tracing::trace!(event_type, "no decoder registered; keeping raw payload");
            return Payload::Raw(RawEvent::new(event_type, data));
        };
        match decoder(codec, data) {
            Ok(event) => Payload::Typed(event),
            Err(error) => {
                tracing::warn!(
                    event_type,
                    error = %error,
                    "registered decoder rejected stored payload; keeping raw payload"
                );
                Payload::Raw(RawEvent::new(event_type, data))
            }
        }
    }
}

impl<C: Codec, E: 'static> Default for EventRegistry<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Codec, E> fmt::Debug for EventRegistry<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut event_types: Vec<_> = self.decoders.keys().collect();
        event_types.sort_unstable();
        f.debug_struct("EventRegistry")
            .field("event_types", &event_types)
            .finish()
    }
}
