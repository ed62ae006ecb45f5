#![doc = include_str!("../README.md")]

pub use keel_core::{
    codec,
    codec::{Codec, JsonCodec},
    concurrency,
    concurrency::{ConcurrencyConflict, NO_VERSION},
    envelope,
    envelope::EventEnvelope,
    error,
    error::{AggregateNotFound, Error, ValidationError},
    event,
    event::{DomainEvent, EventRegistry, EventType, Payload, RawEvent, SerializableEvent},
    journal,
    journal::Journal,
    metadata,
    metadata::EventMetadata,
};

pub mod store {
    pub use keel_core::store::{EventStore, NonEmpty, Page, StoredEvent};

    // Re-export low-level append types for EventStore implementors only.
    // Most users should interact with the Journal API instead.
    #[doc(hidden)]
    pub use keel_core::store::{
        AppendError, AppendOutcome, AppendResult, PersistableEvent, ReadResult, validate,
    };

    #[cfg(feature = "postgres")]
    #[cfg_attr(docsrs, doc(cfg(feature = "postgres")))]
    pub mod postgres {
        pub use keel_postgres::{
            APPEND_ONLY_SQLSTATE, Config, Error, Store, is_append_only_violation,
        };
    }

    pub use keel_core::store::inmemory;
}
