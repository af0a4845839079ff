//! In-process publish/subscribe bus.
//!
//! Each [`Channel`](crate::domain::message::Channel) is bound to exactly one
//! handler when the adapter starts; the binding table is validated before any
//! message is accepted. Publishing is fire-and-forget: messages go through an
//! unbounded queue and are dispatched on their own tasks.

pub mod bus;

pub use bus::{ChannelBus, ChannelBusBuilder, MessageHandler, MessageHandlerArc, Publisher};
