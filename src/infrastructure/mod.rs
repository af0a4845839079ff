//! Mutable shared state of the engine and the in-process provider simulation.

pub mod correlation_store;
pub mod expiring_map;
pub mod lock_map;
pub mod loopback;
pub mod pending;
