//! Four clerks record results for the same race concurrently.
//!
//! Each clerk reads the stream, folds it into the current state, decides on
//! new events and appends them with the version it read. Whoever loses the
//! race gets a `ConcurrencyConflict`, re-reads and tries again.
//!
//! Run with `RUST_LOG=debug cargo run --example retry_loop` to see the store's
//! tracing output.

use keel::{
    DomainEvent, Error, EventEnvelope, EventMetadata, EventRegistry, Journal, JsonCodec,
    NO_VERSION, Payload, SerializableEvent, codec::Codec, store::inmemory,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

const MAX_ATTEMPTS: u32 = 5;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct RaceScheduled {
    name: String,
}

impl DomainEvent for RaceScheduled {
    const EVENT_TYPE: &'static str = "RaceScheduled";
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ResultRecorded {
    crew: String,
    place: u32,
}

impl DomainEvent for ResultRecorded {
    const EVENT_TYPE: &'static str = "ResultRecorded";
}

#[derive(Clone, Debug)]
enum RaceEvent {
    Scheduled(RaceScheduled),
    Recorded(ResultRecorded),
}

impl SerializableEvent for RaceEvent {
    fn event_type(&self) -> &str {
        match self {
            Self::Scheduled(_) => RaceScheduled::EVENT_TYPE,
            Self::Recorded(_) => ResultRecorded::EVENT_TYPE,
        }
    }

    fn encode<C: Codec>(&self, codec: &C) -> Result<Vec<u8>, C::Error> {
        match self {
            Self::Scheduled(e) => codec.serialize(e),
            Self::Recorded(e) => codec.serialize(e),
        }
    }
}

type RaceJournal = Journal<inmemory::Store, JsonCodec, RaceEvent>;

/// Places handed out so far.
fn places_taken(stream: &[EventEnvelope<RaceEvent>]) -> u32 {
    let taken = stream
        .iter()
        .filter(|e| matches!(e.payload(), Payload::Typed(RaceEvent::Recorded(_))))
        .count();
    u32::try_from(taken).unwrap_or(u32::MAX)
}

async fn record_finish(
    journal: &RaceJournal,
    race: Uuid,
    crew: &str,
) -> Result<u32, Error<std::convert::Infallible>> {
    let metadata = EventMetadata::new()
        .with_correlation_id(race)
        .with_data("clerk", crew);

    let mut attempt = 0;
    loop {
        attempt += 1;
        let stream = journal.read_stream(race).await?;
        let version = stream.last().map_or(NO_VERSION, EventEnvelope::sequence_number);
        let place = places_taken(&stream) + 1;
        let event = RaceEvent::Recorded(ResultRecorded {
            crew: crew.to_owned(),
            place,
        });

        match journal.append(race, "Race", version, [event], &metadata).await {
            Ok(_) => return Ok(place),
            Err(Error::Conflict(conflict)) if attempt < MAX_ATTEMPTS => {
                tracing::info!(
                    crew,
                    attempt,
                    actual_version = conflict.actual_version,
                    "stale read; retrying"
                );
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let journal: RaceJournal = Journal::new(
        inmemory::Store::new(),
        JsonCodec,
        EventRegistry::new()
            .register(RaceEvent::Scheduled)
            .register(RaceEvent::Recorded),
    );

    let race = Uuid::now_v7();
    journal
        .append(
            race,
            "Race",
            NO_VERSION,
            [RaceEvent::Scheduled(RaceScheduled {
                name: "Final A".to_owned(),
            })],
            &EventMetadata::new().with_correlation_id(race),
        )
        .await?;

    let crews = ["Leander", "Molesey", "Thames", "London"];
    let clerks = crews.iter().map(|crew| {
        let journal = journal.clone();
        let crew = (*crew).to_owned();
        tokio::spawn(async move { record_finish(&journal, race, &crew).await })
    });
    for handle in clerks.collect::<Vec<_>>() {
        handle.await??;
    }

    for envelope in journal.read_by_correlation_id(race).await? {
        if let Payload::Typed(RaceEvent::Recorded(result)) = envelope.payload() {
            println!(
                "#{} {} (sequence {})",
                result.place,
                result.crew,
                envelope.sequence_number()
            );
        }
    }
    println!("final version: {}", journal.current_version(race).await?);
    Ok(())
}
