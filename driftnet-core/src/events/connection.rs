//! One received datagram plus its source metadata.

use std::net::SocketAddr;

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// Immutable snapshot of a single datagram.
#[derive(Clone, Debug)]
pub struct Connection {
    source: SocketAddr,
    payload: Bytes,
    received_at: DateTime<Utc>,
}

impl Connection {
    /// Snapshot stamped with the current wall-clock time.
    #[inline]
    pub fn new(source: SocketAddr, payload: Bytes) -> Self {
        Self::with_timestamp(source, payload, Utc::now())
    }

    #[inline]
    pub fn with_timestamp(source: SocketAddr, payload: Bytes, received_at: DateTime<Utc>) -> Self {
        Self {
            source,
            payload,
            received_at,
        }
    }

    pub fn source(&self) -> SocketAddr {
        self.source
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
