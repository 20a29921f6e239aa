//! ## driftnet-core::events
//! **Datagram snapshots and the handoff between reception and decoding**

pub mod connection;
pub mod dispatcher;

pub use connection::Connection;
pub use dispatcher::{ConnectionHandler, Dispatcher, DispatcherSettings, OverflowPolicy};
