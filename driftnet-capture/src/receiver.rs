//! ## driftnet-capture::receiver
//! **UDP socket receiver with a stop/reload life-cycle**
//!
//! The receive loop runs on one tokio task that exclusively owns the socket.
//! Each iteration races the stop signal against a timed `recv_from`; the stop
//! signal is polled first, so once [`Receiver::stop`] returns no further
//! datagram is handed to the dispatcher.
//!
//! A receiver is single-use: `Created -> Running -> Stopping -> Stopped`.
//! Bind failures and fatal socket errors end the instance and it is up to a
//! supervisor (see [`Receiver::subscribe`]) to build a replacement.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use driftnet_core::{Connection, DispatchError, Dispatcher};
use driftnet_telemetry::{EventLogger, MetricsRecorder};
use opentelemetry::KeyValue;
use parking_lot::{Mutex, RwLock};
use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::ReceiverError;

/// Largest UDP payload.
pub const MAX_DATAGRAM: usize = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Created,
    Running,
    Stopping,
    Stopped,
}

/// Settings that can change without rebinding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverTunables {
    /// How long one read waits before the loop re-checks the stop signal.
    pub recv_timeout: Duration,
    /// Requested `SO_RCVBUF`. The OS may grant less.
    pub recv_buffer_size: usize,
    /// How long `stop` waits for the loop before aborting it.
    pub stop_timeout: Duration,
}

impl Default for ReceiverTunables {
    fn default() -> Self {
        Self {
            recv_timeout: Duration::from_millis(500),
            recv_buffer_size: 16 * 1024 * 1024,
            stop_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiverSettings {
    /// `None` binds every interface.
    pub address: Option<IpAddr>,
    pub port: u16,
    pub tunables: ReceiverTunables,
}

impl ReceiverSettings {
    pub fn bind_addr(&self) -> SocketAddr {
        let ip = self.address.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.port)
    }
}

pub struct Receiver {
    bind_addr: SocketAddr,
    name: String,
    tunables: Arc<RwLock<ReceiverTunables>>,
    state: Arc<watch::Sender<ReceiverState>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
    dispatcher: Arc<Dispatcher>,
    metrics: MetricsRecorder,
}

impl Receiver {
    pub fn new(settings: ReceiverSettings, dispatcher: Arc<Dispatcher>, metrics: MetricsRecorder) -> Self {
        let bind_addr = settings.bind_addr();
        let (state, _) = watch::channel(ReceiverState::Created);
        let (shutdown, _) = watch::channel(false);
        Self {
            bind_addr,
            name: format!("Receiver [{bind_addr}]"),
            tunables: Arc::new(RwLock::new(settings.tunables)),
            state: Arc::new(state),
            shutdown,
            task: Mutex::new(None),
            local_addr: Mutex::new(None),
            dispatcher,
            metrics,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ReceiverState {
        *self.state.borrow()
    }

    /// Observes state changes, including an unexpected loop exit.
    pub fn subscribe(&self) -> watch::Receiver<ReceiverState> {
        self.state.subscribe()
    }

    /// The address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn tunables(&self) -> ReceiverTunables {
        *self.tunables.read()
    }

    /// Binds the socket and spawns the receive loop. Must be called from
    /// within a tokio runtime.
    #[instrument(skip(self), fields(receiver = %self.name))]
    pub fn start(&self) -> Result<SocketAddr, ReceiverError> {
        // Held for the whole start so concurrent callers serialize.
        let mut task = self.task.lock();
        let current = self.state();
        if current != ReceiverState::Created {
            return Err(ReceiverError::NotStartable(current));
        }

        let tunables = self.tunables();
        let bound = bind_socket(self.bind_addr, tunables.recv_buffer_size)
            .and_then(UdpSocket::from_std)
            .and_then(|socket| socket.local_addr().map(|addr| (socket, addr)));
        let (socket, local_addr) = match bound {
            Ok(bound) => bound,
            Err(source) => {
                error!(error = %source, "Bind failed");
                self.state.send_replace(ReceiverState::Stopped);
                return Err(ReceiverError::Bind {
                    addr: self.bind_addr,
                    source,
                });
            }
        };
        *self.local_addr.lock() = Some(local_addr);

        let receive_loop = ReceiveLoop {
            name: self.name.clone(),
            dispatcher: Arc::clone(&self.dispatcher),
            metrics: self.metrics.clone(),
            tunables: Arc::clone(&self.tunables),
            state: Arc::clone(&self.state),
            applied_buffer: tunables.recv_buffer_size,
        };
        let shutdown = self.shutdown.subscribe();
        self.state.send_replace(ReceiverState::Running);
        *task = Some(tokio::spawn(receive_loop.run(socket, shutdown)));

        info!(local_addr = %local_addr, "Receiver started");
        EventLogger::log_event(
            "receiver_started",
            &[
                KeyValue::new("receiver", self.name.clone()),
                KeyValue::new("local_addr", local_addr.to_string()),
            ],
        );
        Ok(local_addr)
    }

    /// Stops the loop and waits for it, up to the stop timeout. Idempotent;
    /// concurrent callers all return once the receiver is `Stopped`.
    #[instrument(skip(self), fields(receiver = %self.name))]
    pub async fn stop(&self) {
        let handle = self.task.lock().take();
        let Some(mut handle) = handle else {
            self.state.send_if_modified(|state| {
                let never_started = *state == ReceiverState::Created;
                if never_started {
                    *state = ReceiverState::Stopped;
                }
                never_started
            });
            let mut state = self.subscribe();
            let _ = state.wait_for(|s| *s == ReceiverState::Stopped).await;
            return;
        };

        self.state.send_if_modified(|state| {
            let running = *state == ReceiverState::Running;
            if running {
                *state = ReceiverState::Stopping;
            }
            running
        });
        self.shutdown.send_replace(true);

        let stop_timeout = self.tunables().stop_timeout;
        if tokio::time::timeout(stop_timeout, &mut handle).await.is_err() {
            warn!(?stop_timeout, "Receive loop did not stop in time, aborting");
            handle.abort();
            let _ = handle.await;
        }

        self.state.send_replace(ReceiverState::Stopped);
        info!("Receiver stopped");
        EventLogger::log_event("receiver_stopped", &[KeyValue::new("receiver", self.name.clone())]);
    }

    /// Applies new tunables to the running instance. A different bind
    /// address is rejected; that needs a stop/start cycle.
    #[instrument(skip(self, settings), fields(receiver = %self.name))]
    pub fn reload(&self, settings: &ReceiverSettings) -> Result<(), ReceiverError> {
        let requested = settings.bind_addr();
        if requested != self.bind_addr {
            return Err(ReceiverError::RebindRequired {
                from: self.bind_addr,
                to: requested,
            });
        }

        let mut tunables = self.tunables.write();
        if *tunables != settings.tunables {
            info!(old = ?*tunables, new = ?settings.tunables, "Receiver reloaded");
            *tunables = settings.tunables;
        }
        Ok(())
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        // Without an awaited stop, at least make sure the loop ends.
        self.shutdown.send_replace(true);
    }
}

fn bind_socket(addr: SocketAddr, recv_buffer_size: usize) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    request_recv_buffer(SockRef::from(&socket), recv_buffer_size);
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// Best effort: failure is logged and the OS default kept.
fn request_recv_buffer(socket: SockRef<'_>, requested: usize) {
    let requested = requested.min(i32::MAX as usize);
    match socket.set_recv_buffer_size(requested) {
        Ok(()) => debug!(
            requested,
            granted = ?socket.recv_buffer_size().ok(),
            "Receive buffer sized"
        ),
        Err(err) => warn!(requested, error = %err, "Could not size receive buffer"),
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock
            | io::ErrorKind::Interrupted
            | io::ErrorKind::TimedOut
            // ICMP port unreachable surfaces on some platforms.
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
    )
}

struct ReceiveLoop {
    name: String,
    dispatcher: Arc<Dispatcher>,
    metrics: MetricsRecorder,
    tunables: Arc<RwLock<ReceiverTunables>>,
    state: Arc<watch::Sender<ReceiverState>>,
    applied_buffer: usize,
}

impl ReceiveLoop {
    async fn run(mut self, socket: UdpSocket, mut shutdown: watch::Receiver<bool>) {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        debug!(receiver = %self.name, "Receive loop running");

        while !*shutdown.borrow() {
            let tunables = *self.tunables.read();
            if tunables.recv_buffer_size != self.applied_buffer {
                request_recv_buffer(SockRef::from(&socket), tunables.recv_buffer_size);
                self.applied_buffer = tunables.recv_buffer_size;
            }

            tokio::select! {
                biased;

                _ = shutdown.changed() => break,

                read = tokio::time::timeout(tunables.recv_timeout, socket.recv_from(&mut buf)) => match read {
                    // Idle: go round and look at the stop signal again.
                    Err(_) => continue,
                    Ok(Ok((len, source))) => {
                        self.metrics.observe_packet(len);
                        if *shutdown.borrow() {
                            break;
                        }
                        let connection = Connection::new(source, Bytes::copy_from_slice(&buf[..len]));
                        if !self.forward(connection) {
                            break;
                        }
                    }
                    Ok(Err(err)) if is_transient(&err) => {
                        trace!(receiver = %self.name, error = %err, "Transient receive error");
                    }
                    Ok(Err(err)) => {
                        error!(receiver = %self.name, error = %err, "Receive failed, closing socket");
                        break;
                    }
                },
            }
        }

        drop(socket);
        self.state.send_replace(ReceiverState::Stopped);
        debug!(receiver = %self.name, "Receive loop exited");
    }

    /// Returns `false` once the dispatcher no longer accepts work.
    fn forward(&self, connection: Connection) -> bool {
        match self.dispatcher.dispatch(connection) {
            Ok(()) => true,
            Err(DispatchError::Overflow { capacity }) => {
                trace!(receiver = %self.name, capacity, "Dispatcher full, datagram dropped");
                true
            }
            Err(err) => {
                warn!(receiver = %self.name, error = %err, "Dispatcher rejected datagram, stopping");
                false
            }
        }
    }
}
