use chrono::{DateTime, Utc};

/// A recorded fact about a loan (or any other aggregate).
///
/// Events are immutable, versioned and append-only.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable event name (e.g. "lending.loan.approved").
    fn event_type(&self) -> &'static str;

    /// Schema version for this event type.
    fn version(&self) -> u32;

    /// When the transition happened (business time, from the clock collaborator).
    fn occurred_at(&self) -> DateTime<Utc>;
}
