//! Inventory domain module: what a tenant can lend.
//!
//! Two item shapes share one lending contract ([`Reservable`]):
//! - counted items, tracked by an on-shelf quantity against a catalog total;
//! - unit items, individually numbered, each with a single availability flag.
//!
//! Deterministic domain logic only (no IO, no locking). The infra ledger wraps
//! each item in a row lock and calls these primitives under it.

pub mod item;
pub mod reservation;

pub use item::{
    CountedItem, InventoryItem, ItemKind, ItemStatus, NewCountedItem, NewUnitItem, RepairAction,
    UnitItem, UnitQuery,
};
pub use reservation::{Reservable, Reservation};
