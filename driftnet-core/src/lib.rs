//! # driftnet-core
//!
//! Foundation layer shared by the receive path and the decoding workers.
//!
//! ### Key Submodules:
//! - `events`: the [`Connection`] snapshot and the [`Dispatcher`] handoff
//!   boundary (bounded crossbeam channel feeding a worker pool)
//! - `error`: handoff errors

pub mod error;
pub mod events;

pub mod prelude {
    pub use crate::error::*;
    pub use crate::events::*;
}

pub use error::DispatchError;
pub use events::{Connection, ConnectionHandler, Dispatcher, DispatcherSettings, OverflowPolicy};
