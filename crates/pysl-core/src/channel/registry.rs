//! Channel addressing
//!
//! Maps a [`ChannelIdentity`] to `<root>/pysl.<identity>` and finds every live
//! channel under the root for broadcast sends.

use std::fmt;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use walkdir::WalkDir;

use super::error::{ChannelError, Result};
use crate::codec::SEPARATOR;

/// File name prefix shared by every channel
pub const CHANNEL_PREFIX: &str = "pysl.";

/// Root shared by every process unless overridden
pub const DEFAULT_ROOT: &str = "/tmp";

static CHANNEL_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"^pysl\.[^/]+$").unwrap());

/// Logical name of a watcher's channel: an explicit id or a process id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelIdentity(String);

impl ChannelIdentity {
    /// Validate an explicit identity
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let reason = if id.is_empty() {
            Some("must not be empty")
        } else if id.contains('/') {
            Some("must not contain '/'")
        } else if id.contains(SEPARATOR) {
            Some("must not contain the message separator")
        } else if id.contains(['\0', '\n']) {
            Some("must not contain NUL or newline")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ChannelError::InvalidIdentity { id, reason }),
            None => Ok(Self(id)),
        }
    }

    /// Identity derived from a process id
    pub fn from_pid(pid: u32) -> Self {
        Self(pid.to_string())
    }

    /// Identity of the calling process
    pub fn current_process() -> Self {
        Self::from_pid(std::process::id())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ChannelIdentity {
    type Err = ChannelError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Resolves identities to channel paths under a single well-known root
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    root: PathBuf,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new(Self::default_root())
    }
}

impl ChannelRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Always `/tmp`, independent of `$TMPDIR`
    pub fn default_root() -> PathBuf {
        PathBuf::from(DEFAULT_ROOT)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Channel path for an identity. Never touches the filesystem.
    pub fn resolve(&self, identity: &ChannelIdentity) -> PathBuf {
        self.root.join(format!("{}{}", CHANNEL_PREFIX, identity.as_str()))
    }

    /// Every FIFO under the root (recursively) whose name matches `pysl.*`
    ///
    /// Unreadable directories are skipped and symlinks are not followed.
    /// The result is sorted, but callers should not depend on the order.
    pub fn discover(&self) -> Vec<PathBuf> {
        let mut channels: Vec<PathBuf> = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_fifo())
            .filter(|entry| is_channel_name(&entry.file_name().to_string_lossy()))
            .map(|entry| entry.into_path())
            .collect();

        channels.sort();
        tracing::debug!(
            root = %self.root.display(),
            count = channels.len(),
            "Discovered channels"
        );
        channels
    }
}

/// Check whether a file name follows the channel naming pattern
pub fn is_channel_name(name: &str) -> bool {
    CHANNEL_NAME.is_match(name)
}
