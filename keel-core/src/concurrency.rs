//! Optimistic concurrency primitives.
//!
//! Every aggregate carries a version equal to the sequence number of its last
//! event. Writers pass the version they last observed; a mismatch at commit
//! time is reported as a [`ConcurrencyConflict`] and the caller re-reads,
//! recomputes, and retries. The store never retries on its own.

use thiserror::Error;
use uuid::Uuid;

/// Version of an aggregate that has never been written.
///
/// Pass it as `expected_version` to require that the aggregate does not exist
/// yet; `current_version` returns it for unknown ids.
pub const NO_VERSION: i64 = -1;

/// The version a writer expected did not match the stored version.
///
/// Carries everything a retry loop needs: `actual_version` is the version to
/// re-read from, without another query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{}", format_conflict(self))]
pub struct ConcurrencyConflict {
    pub aggregate_id: Uuid,
    /// The version the writer believed was current.
    pub expected_version: i64,
    /// The version found in the store ([`NO_VERSION`] if absent).
    pub actual_version: i64,
}

impl ConcurrencyConflict {
    pub const fn new(aggregate_id: Uuid, expected_version: i64, actual_version: i64) -> Self {
        Self {
            aggregate_id,
            expected_version,
            actual_version,
        }
    }
}

fn format_conflict(conflict: &ConcurrencyConflict) -> String {
    let ConcurrencyConflict {
        aggregate_id,
        expected_version,
        actual_version,
    } = conflict;
    match (*expected_version, *actual_version) {
        (NO_VERSION, actual) => format!(
            "concurrency conflict for aggregate {aggregate_id}: expected a new aggregate, but \
             actual version is {actual} (hint: another writer created it; reload and retry)"
        ),
        (expected, NO_VERSION) => format!(
            "concurrency conflict for aggregate {aggregate_id}: expected version {expected}, but \
             the aggregate does not exist"
        ),
        (expected, actual) => format!(
            "concurrency conflict for aggregate {aggregate_id}: expected version {expected}, but \
             actual version is {actual} (hint: stream was modified; reload and retry)"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_on_new_aggregate_mentions_hint() {
        let conflict = ConcurrencyConflict::new(Uuid::nil(), NO_VERSION, 3);
        let msg = conflict.to_string();
        assert!(msg.contains("expected a new aggregate"));
        assert!(msg.contains("actual version is 3"));
        assert!(msg.contains("reload and retry"));
    }

    #[test]
    fn conflict_includes_both_versions() {
        let id = Uuid::now_v7();
        let conflict = ConcurrencyConflict::new(id, 0, 3);
        let msg = conflict.to_string();
        assert!(msg.contains(&id.to_string()));
        assert!(msg.contains("expected version 0"));
        assert!(msg.contains("actual version is 3"));
    }

    #[test]
    fn conflict_on_missing_aggregate_formats() {
        let conflict = ConcurrencyConflict::new(Uuid::nil(), 5, NO_VERSION);
        assert!(conflict.to_string().contains("does not exist"));
    }
}
