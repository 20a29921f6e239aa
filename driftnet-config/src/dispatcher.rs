//! Handoff queue sizing and backpressure.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct DispatcherConfig {
    /// Bounded queue length between the receiver and the workers.
    #[serde(default = "default_capacity")]
    #[validate(range(min = 1, max = 1048576))]
    pub capacity: usize,

    /// Decoding worker threads.
    #[serde(default = "default_workers")]
    #[validate(range(min = 1, max = 1024))]
    pub workers: usize,

    /// What a full queue does with the next datagram (drop_newest, drop_oldest).
    #[serde(default = "default_overflow")]
    #[validate(custom(function = validation::validate_overflow))]
    pub overflow: String,

    /// Upper bound on draining queued work at shutdown.
    #[serde(default = "default_drain_timeout")]
    #[validate(range(min = 1, max = 600000))]
    pub drain_timeout_ms: u64,
}

fn default_capacity() -> usize {
    4096
}

fn default_workers() -> usize {
    num_cpus::get()
}

fn default_overflow() -> String {
    "drop_newest".into()
}

fn default_drain_timeout() -> u64 {
    5000
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            workers: default_workers(),
            overflow: default_overflow(),
            drain_timeout_ms: default_drain_timeout(),
        }
    }
}
