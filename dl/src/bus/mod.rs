//! In-process message bus
//!
//! Pub/sub plus request/response between phases and the coordinator.
//! Delivery is at-least-once within the process; handlers must be
//! idempotent.

mod core;
mod message;

pub use core::{BusError, GetOptions, HistoryFilter, MessageBus};
pub use message::{Message, MessageType};
