//! Scheduler Error Types

use obd_protocol::ObdError;
use pid_decoder::DecodeError;
use thiserror::Error;

/// Errors raised by the acquisition loop and its collaborators
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Startup configuration is unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// `start` called on a running loop
    #[error("{0} is already running")]
    AlreadyRunning(&'static str),

    /// Worker thread could not be spawned
    #[error("Failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Adapter or bus failure for one descriptor
    #[error(transparent)]
    Obd(#[from] ObdError),

    /// Payload did not match its schema
    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl SchedulerError {
    /// Vehicle asleep or not answering
    pub fn is_no_data(&self) -> bool {
        matches!(self, SchedulerError::Obd(e) if e.is_no_data())
    }
}
