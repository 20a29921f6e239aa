use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatcher is closed")]
    Closed,

    #[error("Dispatch queue capacity ({capacity}) exceeded, connection dropped")]
    Overflow { capacity: usize },

    #[error("Invalid dispatcher settings: {0}")]
    InvalidSettings(&'static str),

    #[error("Failed to spawn dispatch worker: {0}")]
    Spawn(#[from] std::io::Error),
}
