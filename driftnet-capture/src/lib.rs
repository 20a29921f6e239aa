//! # driftnet-capture
//!
//! Datagram reception. A [`Receiver`] owns one bound UDP socket and feeds
//! every datagram it reads into a [`driftnet_core::Dispatcher`] without
//! decoding it.

pub mod error;
pub mod receiver;

pub use error::ReceiverError;
pub use receiver::{Receiver, ReceiverSettings, ReceiverState, ReceiverTunables};
