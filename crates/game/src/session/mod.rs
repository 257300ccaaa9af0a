//! Connection handshake and per-frame driving of a [`SimulationContext`]
//! over a [`Transport`].
//!
//! [`SimulationContext`]: crate::simulation::SimulationContext
//! [`Transport`]: crate::net::Transport

mod client;
mod events;
mod server;

pub use client::{ClientSession, ClientState};
pub use events::{DisconnectReason, SessionEvent};
pub use server::ServerSession;
