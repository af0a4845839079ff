//! Application layer orchestrating the correlation engine.
//!
//! [`adapter::Adapter`] wires the stage handlers to the bus. Handlers run as
//! independent tasks fed through `tokio` channels and share only the
//! correlation store and the pending registry.

pub mod adapter;
pub mod events;
pub mod handlers;
pub mod results;
pub mod sweeper;
