//! Transition pipeline for event-sourced aggregates.
//!
//! ```text
//! load stream (tenant-scoped)
//!   -> rehydrate aggregate
//!   -> decide events            (caller: aggregate.handle)
//!   -> side effects             (caller: ledger reservations)
//!   -> append, ExpectedVersion::Exact
//!   -> publish to the sink      (best-effort, never fails the transition)
//! ```
//!
//! The decide and side-effect steps belong to the caller so that ledger work
//! can be undone if the append loses a race. Publication failures are logged
//! and swallowed: the sink is at-least-once and must never roll back a
//! committed transition.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stationlend_core::{Aggregate, AggregateId, ExpectedVersion, TenantId};
use stationlend_events::{EventBus, EventEnvelope};

use crate::error::{ServiceError, ServiceResult};
use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// An aggregate rebuilt from its stream, plus the revision to append against.
#[derive(Debug)]
pub struct Rehydrated<A> {
    pub aggregate: A,
    pub expected: ExpectedVersion,
}

#[derive(Debug)]
pub struct TransitionDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> TransitionDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<S, B> TransitionDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Load and replay a stream.
    ///
    /// An empty stream yields `make_aggregate`'s fresh instance with
    /// `ExpectedVersion::NoStream`.
    pub fn load<A>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> ServiceResult<Rehydrated<A>>
    where
        A: Aggregate,
        A::Event: DeserializeOwned,
    {
        let history = self.store.load_stream(tenant_id, aggregate_id)?;
        validate_loaded_stream(tenant_id, aggregate_id, &history)?;

        let expected = match stream_version(&history) {
            0 => ExpectedVersion::NoStream,
            v => ExpectedVersion::Exact(v),
        };

        let mut aggregate = make_aggregate(aggregate_id);
        apply_history(&mut aggregate, &history)?;

        Ok(Rehydrated {
            aggregate,
            expected,
        })
    }

    /// Append decided events against the revision they were decided on.
    pub fn append<E>(
        &self,
        tenant_id: TenantId,
        aggregate_id: AggregateId,
        aggregate_type: &str,
        events: &[E],
        expected: ExpectedVersion,
    ) -> ServiceResult<Vec<StoredEvent>>
    where
        E: stationlend_events::Event + Serialize,
    {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let uncommitted = events
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    tenant_id,
                    aggregate_id,
                    aggregate_type,
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.store.append(uncommitted, expected)?)
    }

    /// Hand committed events to the sink. Never fails.
    pub fn publish(&self, committed: &[StoredEvent]) {
        for stored in committed {
            if let Err(err) = self.bus.publish(stored.to_envelope()) {
                tracing::warn!(
                    tenant_id = %stored.tenant_id,
                    aggregate_id = %stored.aggregate_id,
                    event_type = %stored.event_type,
                    error = ?err,
                    "event sink publish failed; transition stays committed"
                );
            }
        }
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    tenant_id: TenantId,
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> ServiceResult<()> {
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.tenant_id != tenant_id {
            return Err(ServiceError::Store(EventStoreError::TenantIsolation(format!(
                "loaded stream contains wrong tenant_id at index {idx}"
            ))));
        }
        if e.aggregate_id != aggregate_id {
            return Err(ServiceError::Store(EventStoreError::TenantIsolation(format!(
                "loaded stream contains wrong aggregate_id at index {idx}"
            ))));
        }
        if e.sequence_number <= last {
            return Err(ServiceError::Store(EventStoreError::InvalidAppend(format!(
                "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                e.sequence_number
            ))));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> ServiceResult<()>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    for stored in history {
        let ev: A::Event = serde_json::from_value(stored.payload.clone())
            .map_err(|e| ServiceError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }
    Ok(())
}
