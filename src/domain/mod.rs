//! Domain types shared by every layer, and the ports through which the adapter
//! talks to the negotiation and transfer collaborators.

pub mod case;
pub mod message;
pub mod ports;
pub mod protocol;
