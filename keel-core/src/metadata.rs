//! Contextual metadata recorded with every appended event.

use std::collections::BTreeMap;

use serde_json::Value;
use uuid::Uuid;

/// Correlation/causation ids plus an open-ended bag of contextual values.
///
/// Backends persist the two ids in dedicated indexed columns; only
/// [`EventMetadata::data`] goes into the serialized metadata column, so
/// correlation queries never have to look inside JSON.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventMetadata {
    correlation_id: Option<Uuid>,
    causation_id: Option<Uuid>,
    data: BTreeMap<String, Value>,
}

impl EventMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild metadata from its stored parts.
    #[must_use]
    pub const fn from_parts(
        correlation_id: Option<Uuid>,
        causation_id: Option<Uuid>,
        data: BTreeMap<String, Value>,
    ) -> Self {
        Self {
            correlation_id,
            causation_id,
            data,
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    #[must_use]
    pub fn with_causation_id(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    /// Add a contextual value such as the acting user or client info.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub const fn correlation_id(&self) -> Option<Uuid> {
        self.correlation_id
    }

    pub const fn causation_id(&self) -> Option<Uuid> {
        self.causation_id
    }

    pub const fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }
}
