//! Asynchronous handoff boundary between the receive loop and decoding.
//!
//! Connections are pushed onto a bounded crossbeam MPMC channel and consumed
//! by a pool of named worker threads.
//!
//! ## Backpressure
//! `dispatch` never blocks. When the queue is full the configured
//! [`OverflowPolicy`] decides which Connection is lost:
//! - [`OverflowPolicy::DropNewest`]: the incoming Connection is rejected with
//!   [`DispatchError::Overflow`].
//! - [`OverflowPolicy::DropOldest`]: the head of the queue is evicted and the
//!   incoming Connection takes its place.
//!
//! Either way the loss is counted in [`Dispatcher::dropped`] and in the
//! `dispatch_dropped` metric. Dropping is acceptable because UDP delivery is
//! already best-effort.
//!
//! ## Ordering
//! FIFO up to the handoff only; workers complete out of order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use driftnet_telemetry::MetricsRecorder;

use super::connection::Connection;
use crate::error::DispatchError;

/// Consumer side of the handoff. Runs on dispatcher worker threads.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn handle(&self, connection: Connection);
}

impl<F> ConnectionHandler for F
where
    F: Fn(Connection) + Send + Sync + 'static,
{
    fn handle(&self, connection: Connection) {
        self(connection)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    #[default]
    DropNewest,
    DropOldest,
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub capacity: usize,
    pub workers: usize,
    pub overflow: OverflowPolicy,
    /// Upper bound `close` waits for queued work to drain.
    pub drain_timeout: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            capacity: 4096,
            workers: 2,
            overflow: OverflowPolicy::DropNewest,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

pub struct Dispatcher {
    sender: RwLock<Option<Sender<Connection>>>,
    // Kept for eviction under `DropOldest` and for depth reporting after close.
    queue: Receiver<Connection>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    settings: DispatcherSettings,
    dispatched: AtomicU64,
    dropped: AtomicU64,
    metrics: MetricsRecorder,
}

impl Dispatcher {
    /// Creates the queue and spawns `settings.workers` consumer threads.
    pub fn new(
        settings: DispatcherSettings,
        handler: Arc<dyn ConnectionHandler>,
        metrics: MetricsRecorder,
    ) -> Result<Self, DispatchError> {
        if settings.capacity == 0 {
            return Err(DispatchError::InvalidSettings("capacity must be at least 1"));
        }
        if settings.workers == 0 {
            return Err(DispatchError::InvalidSettings("at least one worker is required"));
        }

        let (sender, queue) = channel::bounded(settings.capacity);

        let mut workers = Vec::with_capacity(settings.workers);
        for index in 0..settings.workers {
            let queue = queue.clone();
            let handler = Arc::clone(&handler);
            let depth = metrics.queue_depth.clone();
            let worker = thread::Builder::new()
                .name(format!("driftnet-worker-{index}"))
                .spawn(move || {
                    debug!("Dispatch worker started");
                    // Ends once every sender is gone and the queue is drained.
                    while let Ok(connection) = queue.recv() {
                        depth.set(queue.len() as i64);
                        handler.handle(connection);
                    }
                    debug!("Dispatch worker exiting");
                })?;
            workers.push(worker);
        }

        info!(
            capacity = settings.capacity,
            workers = settings.workers,
            overflow = ?settings.overflow,
            "Dispatcher started"
        );

        Ok(Self {
            sender: RwLock::new(Some(sender)),
            queue,
            workers: Mutex::new(workers),
            settings,
            dispatched: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            metrics,
        })
    }

    /// Queues a Connection. Returns once queued, not once processed.
    pub fn dispatch(&self, connection: Connection) -> Result<(), DispatchError> {
        let guard = self.sender.read();
        let sender = guard.as_ref().ok_or(DispatchError::Closed)?;

        let result = match sender.try_send(connection) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(connection)) => self.overflow(sender, connection),
            Err(TrySendError::Disconnected(_)) => Err(DispatchError::Closed),
        };

        if result.is_ok() {
            self.dispatched.fetch_add(1, Ordering::Relaxed);
        }
        self.metrics.queue_depth.set(sender.len() as i64);
        result
    }

    fn overflow(
        &self,
        sender: &Sender<Connection>,
        connection: Connection,
    ) -> Result<(), DispatchError> {
        let capacity = self.settings.capacity;
        match self.settings.overflow {
            OverflowPolicy::DropNewest => {
                self.record_drop();
                Err(DispatchError::Overflow { capacity })
            }
            OverflowPolicy::DropOldest => {
                // A worker may have taken one since the first attempt.
                let connection = match sender.try_send(connection) {
                    Ok(()) => return Ok(()),
                    Err(TrySendError::Full(connection)) => connection,
                    Err(TrySendError::Disconnected(_)) => return Err(DispatchError::Closed),
                };
                if self.queue.try_recv().is_ok() {
                    self.record_drop();
                }
                match sender.try_send(connection) {
                    Ok(()) => Ok(()),
                    // Another producer refilled the slot first.
                    Err(TrySendError::Full(_)) => {
                        self.record_drop();
                        Err(DispatchError::Overflow { capacity })
                    }
                    Err(TrySendError::Disconnected(_)) => Err(DispatchError::Closed),
                }
            }
        }
    }

    fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.metrics.dispatch_dropped.inc();
    }

    /// Stops accepting Connections and waits up to the drain timeout for the
    /// workers to finish the queue. Idempotent.
    pub fn close(&self) {
        let Some(sender) = self.sender.write().take() else {
            return;
        };
        drop(sender);

        let deadline = Instant::now() + self.settings.drain_timeout;
        let workers = std::mem::take(&mut *self.workers.lock());
        let mut detached = 0usize;
        for worker in workers {
            while !worker.is_finished() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
            if worker.is_finished() {
                if worker.join().is_err() {
                    warn!("Dispatch worker panicked");
                }
            } else {
                detached += 1;
            }
        }

        if detached > 0 {
            warn!(
                detached,
                remaining = self.queue.len(),
                "Drain deadline elapsed, leaving workers to finish in the background"
            );
        }
        info!(
            dispatched = self.dispatched(),
            dropped = self.dropped(),
            "Dispatcher closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.sender.read().is_none()
    }

    /// Connections queued and not yet picked up by a worker.
    pub fn depth(&self) -> usize {
        self.queue.len()
    }

    pub fn capacity(&self) -> usize {
        self.settings.capacity
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.settings.overflow
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.close();
    }
}
