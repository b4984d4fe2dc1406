//! Router runtime: listeners, per-connection handlers, shared tables and
//! hot reload.
//!
//! Accepted client connections are decoded (SOCKS5, HTTP CONNECT, or a
//! fixed-destination forward), routed to a chain by their target address,
//! connected through that chain and then relayed. Configuration reloads
//! swap the shared tables atomically and diff the listener set by
//! descriptor.

mod audit;
pub mod cli;
mod handler;
mod http;
mod listener;
mod relay;
mod runtime;
mod socks5;
mod state;

pub use audit::AUDIT_TARGET;
pub use listener::{Listener, ListenerSet, ListenerStatus};
pub use relay::{RelayStats, relay};
pub use runtime::{ListenerInfo, Router};
pub use state::{RouterState, TableResolver, Tables, build_tables};

pub use tokio_util::sync::CancellationToken;
