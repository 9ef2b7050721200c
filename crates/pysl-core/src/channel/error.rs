use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by channel resolution and the FIFO transport
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No channel exists at the resolved path
    #[error("No channel at {}", .0.display())]
    ChannelNotFound(PathBuf),

    /// Something already occupies the path a watcher tried to create
    #[error("Channel already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    /// The channel had no reader within the write timeout and was removed
    #[error("Removed stale channel: {}", .0.display())]
    StaleChannel(PathBuf),

    /// The path exists but is not a FIFO
    #[error("Not a channel (expected a FIFO): {}", .0.display())]
    NotAChannel(PathBuf),

    /// The message cannot travel as a single frame
    #[error("Invalid message: {reason}")]
    InvalidPayload { reason: &'static str },

    #[error("Invalid channel id {id:?}: {reason}")]
    InvalidIdentity { id: String, reason: &'static str },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ChannelError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
