//! Lending events and their distribution mechanics.
//!
//! Loan transitions are recorded as events; committed events are wrapped in an
//! [`EventEnvelope`] and handed to an [`EventBus`] so that notification and
//! audit collaborators can react without the core waiting on them.

pub mod bus;
pub mod command;
pub mod envelope;
pub mod event;
pub mod handler;
pub mod in_memory_bus;
pub mod tenant;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use envelope::EventEnvelope;
pub use event::Event;
pub use handler::execute;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
pub use tenant::TenantScoped;
