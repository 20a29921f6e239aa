use thiserror::Error;

use driftnet_capture::ReceiverError;
use driftnet_core::DispatchError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Receiver error: {0}")]
    Receiver(#[from] ReceiverError),

    #[error("Dispatcher error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Unsupported protocol {0:?}")]
    UnsupportedProtocol(String),

    #[error("Unsupported overflow policy {0:?}")]
    UnsupportedOverflow(String),

    #[error("Dispatcher shutdown task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
