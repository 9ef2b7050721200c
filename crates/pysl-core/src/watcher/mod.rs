//! Watcher: owns a channel and renders what arrives on it
//!
//! Two threads share one [`OutputQueue`]: the background reader appends
//! decoded messages and the [`DisplayLoop`] drains them, falling back to an
//! [`IdleAction`] when nothing arrives within the configured delay.

mod display;
mod queue;
mod reader;

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

pub use display::{
    DisplayLoop, DisplayState, IdleAction, NoAction, ShellCommand, StatusDisplay, TerminalDisplay,
};
pub use queue::OutputQueue;

use crate::channel::{transport, ChannelIdentity, ChannelRegistry, OwnedChannel, Result};

/// Watcher settings
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// How long to wait for a message before running the idle action
    pub delay: Duration,
    /// How long each displayed item is held before the next wait
    pub timer: Duration,
    /// Drop broadcast messages
    pub direct_only: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(3),
            timer: Duration::from_millis(300),
            direct_only: false,
        }
    }
}

/// A running consumer bound to one channel
pub struct Watcher {
    identity: ChannelIdentity,
    channel: OwnedChannel,
    queue: Arc<OutputQueue>,
    config: WatcherConfig,
}

impl Watcher {
    /// Create the channel for `identity`
    ///
    /// Fails with `AlreadyExists` if the path is taken; nothing is started
    /// until [`spawn_reader`](Self::spawn_reader).
    pub fn bind(
        registry: &ChannelRegistry,
        identity: ChannelIdentity,
        config: WatcherConfig,
    ) -> Result<Self> {
        let channel = transport::create(&registry.resolve(&identity))?;
        tracing::info!(id = %identity, path = %channel.path().display(), "Watching channel");

        Ok(Self {
            identity,
            channel,
            queue: Arc::new(OutputQueue::new()),
            config,
        })
    }

    pub fn identity(&self) -> &ChannelIdentity {
        &self.identity
    }

    pub fn path(&self) -> &Path {
        self.channel.path()
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn queue(&self) -> Arc<OutputQueue> {
        self.queue.clone()
    }

    /// Start the background reader
    pub fn spawn_reader(&self) -> io::Result<JoinHandle<()>> {
        reader::spawn(
            self.channel.path().to_path_buf(),
            self.queue.clone(),
            self.config.direct_only,
        )
    }

    /// The foreground display loop for this watcher's queue
    pub fn display_loop(&self) -> DisplayLoop {
        DisplayLoop::new(self.queue.clone(), self.config.clone())
    }

    /// Stop both loops and delete the channel
    ///
    /// Safe to call more than once; the channel is removed exactly once.
    pub fn shutdown(&self) {
        if self.channel.is_released() {
            return;
        }
        self.queue.close();
        self.wake_reader();
        self.channel.release();
        tracing::debug!(id = %self.identity, "Watcher shut down");
    }

    /// Unblock a reader parked in `open` by connecting and hanging up.
    /// Returns false if no reader was attached.
    fn wake_reader(&self) -> bool {
        match OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(self.channel.path())
        {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!(
                    path = %self.channel.path().display(),
                    "Failed to wake reader: {}",
                    e
                );
                false
            }
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
