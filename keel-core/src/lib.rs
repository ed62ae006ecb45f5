//! Core traits and types for the Keel event store.
//!
//! This crate provides the backend-independent half of the event store:
//!
//! - [`journal`] - The typed engine (`Journal`) callers append and read through
//! - [`store`] - Event persistence abstraction (`EventStore`) and the in-memory backend
//! - [`event`] - Event traits (`DomainEvent`, `SerializableEvent`), `RawEvent`, `EventRegistry`
//! - [`envelope`] - Read-side `EventEnvelope`
//! - [`metadata`] - Correlation/causation ids and the free-form metadata bag
//! - [`concurrency`] - The `NO_VERSION` sentinel and `ConcurrencyConflict`
//! - [`codec`] - Payload serialization (`Codec`, `JsonCodec`)
//! - [`error`] - Validation and engine errors
//!
//! # Example
//!
//! ```
//! use keel_core::{codec::JsonCodec, event::EventRegistry, journal::Journal, store::inmemory};
//!
//! let journal: Journal<_, _, keel_core::event::RawEvent> =
//!     Journal::new(inmemory::Store::new(), JsonCodec, EventRegistry::new());
//! # let _ = journal;
//! ```
//!
//! Most users should depend on the [`keel`](https://docs.rs/keel) crate,
//! which re-exports these types together with the Postgres backend.

pub mod codec;
pub mod concurrency;
pub mod envelope;
pub mod error;
pub mod event;
pub mod journal;
pub mod metadata;
pub mod store;
