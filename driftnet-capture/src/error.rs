use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::receiver::ReceiverState;

#[derive(Debug, Error)]
pub enum ReceiverError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("receiver cannot be started from state {0:?}")]
    NotStartable(ReceiverState),

    #[error("bind address change {from} -> {to} requires a stop/start cycle")]
    RebindRequired { from: SocketAddr, to: SocketAddr },
}
