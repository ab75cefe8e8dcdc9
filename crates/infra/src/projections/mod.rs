//! Read models built from loan events.
//!
//! Projections are rebuildable from the event store, tenant-isolated and
//! idempotent under at-least-once delivery.

pub mod loans;

pub use loans::{
    LOAN_AGGREGATE_TYPE, LoanDirectory, LoanDirectoryProjection, LoanProjectionError, LoanRecord,
};
