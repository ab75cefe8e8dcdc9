//! Infrastructure layer: in-memory stores, the transition pipeline and the
//! services built on it.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event_store;
pub mod gate;
pub mod ledger;
pub mod projections;
pub mod queue;
pub mod read_model;
pub mod reconciliation;
pub mod service;
pub mod stack;
pub mod tenants;

mod integration_tests;

pub use config::{AppConfig, ConfigError};
pub use error::{ServiceError, ServiceResult};
pub use ledger::{InventoryLedger, Settlement};
pub use queue::{ApprovalQueue, QueueDecision};
pub use reconciliation::{Discrepancy, ReconciliationEngine};
pub use service::{ItemSelector, LendingService, OpenLoan, ReturnDetails};
pub use stack::{EventSink, InMemoryApprovalQueue, InMemoryLendingService, InMemoryStack};
pub use tenants::{TenantSettings, TenantStore};
