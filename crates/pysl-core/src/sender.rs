//! Message delivery
//!
//! With an explicit identity the message goes to that one channel and a
//! missing channel is an error. Without one it is broadcast to every
//! discovered channel, and per-target failures never stop delivery to the
//! rest.

use std::path::PathBuf;
use std::time::Duration;

use crate::channel::{transport, ChannelError, ChannelIdentity, ChannelRegistry, Result};
use crate::codec::{self, Message};

/// Sender settings
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// How long a write may wait for a reader before the channel is
    /// treated as stale
    pub write_timeout: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            write_timeout: transport::DEFAULT_WRITE_TIMEOUT,
        }
    }
}

/// Outcome of one send, per target
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Channels that accepted the message
    pub delivered: Vec<PathBuf>,
    /// Stale channels that were removed instead
    pub removed: Vec<PathBuf>,
    /// Channels that disappeared between discovery and write
    pub vanished: Vec<PathBuf>,
    /// Channels that failed for any other reason
    pub failed: Vec<PathBuf>,
}

impl SendReport {
    /// Number of targets attempted
    pub fn attempted(&self) -> usize {
        self.delivered.len() + self.removed.len() + self.vanished.len() + self.failed.len()
    }
}

/// Resolves targets and writes messages to them
#[derive(Debug, Clone, Default)]
pub struct Sender {
    registry: ChannelRegistry,
    config: SenderConfig,
}

impl Sender {
    pub fn new(registry: ChannelRegistry, config: SenderConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Send `text` to `target`, or broadcast it when no target is given
    ///
    /// Text that cannot travel as one frame (a newline, or too long) fails
    /// with [`ChannelError::InvalidPayload`] before any channel is touched.
    /// Otherwise only a direct send can fail as a whole: with
    /// [`ChannelError::ChannelNotFound`] when the named channel does not
    /// exist, or with the transport error that stopped the write. A stale
    /// target is removed and listed in the report instead.
    pub fn send(&self, text: &str, target: Option<&ChannelIdentity>) -> Result<SendReport> {
        match target {
            Some(identity) => self.send_direct(text, identity),
            None => self.broadcast(text),
        }
    }

    fn send_direct(&self, text: &str, identity: &ChannelIdentity) -> Result<SendReport> {
        let path = self.registry.resolve(identity);
        let payload = codec::encode(&Message::direct_to(&path, text));
        transport::validate_payload(&payload)?;

        let mut report = SendReport::default();
        match transport::write(&path, &payload, self.config.write_timeout) {
            Ok(()) => {
                tracing::debug!(id = %identity, "Delivered direct message");
                report.delivered.push(path);
            }
            Err(ChannelError::StaleChannel(path)) => {
                tracing::warn!(id = %identity, "Removed stale channel {}", path.display());
                report.removed.push(path);
            }
            Err(e) => return Err(e),
        }
        Ok(report)
    }

    fn broadcast(&self, text: &str) -> Result<SendReport> {
        let payload = codec::encode(&Message::broadcast(text));
        transport::validate_payload(&payload)?;
        let mut report = SendReport::default();

        for path in self.registry.discover() {
            match transport::write(&path, &payload, self.config.write_timeout) {
                Ok(()) => report.delivered.push(path),
                Err(ChannelError::StaleChannel(path)) => {
                    tracing::warn!("Removed stale channel {}", path.display());
                    report.removed.push(path);
                }
                Err(ChannelError::ChannelNotFound(path)) => {
                    tracing::debug!("Channel vanished before write: {}", path.display());
                    report.vanished.push(path);
                }
                Err(e) => {
                    tracing::warn!("Broadcast to {} failed: {}", path.display(), e);
                    report.failed.push(path);
                }
            }
        }

        tracing::debug!(
            delivered = report.delivered.len(),
            removed = report.removed.len(),
            "Broadcast finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::transport::{create, open_for_read};
    use crate::codec::{decode, Addressing};
    use nix::sys::stat::Mode;
    use nix::unistd::mkfifo;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::thread;
    use tempfile::TempDir;

    fn sender(root: &Path) -> Sender {
        Sender::new(
            ChannelRegistry::new(root),
            SenderConfig {
                write_timeout: Duration::from_millis(200),
            },
        )
    }

    fn read_one(path: PathBuf) -> thread::JoinHandle<Message> {
        thread::spawn(move || {
            let frames = open_for_read(&path).unwrap().read_once().unwrap();
            assert_eq!(frames.len(), 1);
            decode(frames[0].as_bytes())
        })
    }

    #[test]
    fn test_direct_send_to_missing_channel_fails() {
        let dir = TempDir::new().unwrap();
        let id = ChannelIdentity::new("nobody").unwrap();

        let err = sender(dir.path()).send("hello", Some(&id)).unwrap_err();
        let expected = dir.path().join("pysl.nobody");
        assert!(matches!(err, ChannelError::ChannelNotFound(p) if p == expected));
    }

    #[test]
    fn test_direct_send_tags_target_path() {
        let dir = TempDir::new().unwrap();
        let id = ChannelIdentity::new("42").unwrap();
        let channel = create(&dir.path().join("pysl.42")).unwrap();
        let reader = read_one(channel.path().to_path_buf());

        let report = sender(dir.path()).send("build ok", Some(&id)).unwrap();
        assert_eq!(report.delivered, vec![channel.path().to_path_buf()]);

        let msg = reader.join().unwrap();
        assert_eq!(msg.text(), "build ok");
        assert_eq!(
            msg.addressing(),
            &Addressing::Direct {
                target: Some(channel.path().to_path_buf())
            }
        );
    }

    #[test]
    fn test_direct_send_to_stale_channel_reports_removal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pysl.dead");
        mkfifo(&path, Mode::S_IRUSR | Mode::S_IWUSR).unwrap();
        let id = ChannelIdentity::new("dead").unwrap();

        let report = sender(dir.path()).send("anyone?", Some(&id)).unwrap();
        assert_eq!(report.removed, vec![path.clone()]);
        assert!(report.delivered.is_empty());
        assert!(!path.exists());
    }

    #[test]
    fn test_multiline_text_is_rejected_before_delivery() {
        let dir = TempDir::new().unwrap();
        let live = create(&dir.path().join("pysl.1")).unwrap();
        let id = ChannelIdentity::new("1").unwrap();
        let sender = sender(dir.path());

        // No reader is attached, so reaching the transport would time out
        for target in [None, Some(&id)] {
            let err = sender.send("two\nlines", target).unwrap_err();
            assert!(matches!(err, ChannelError::InvalidPayload { .. }));
        }
        assert!(live.path().exists());
    }

    #[test]
    fn test_broadcast_without_channels_is_empty() {
        let dir = TempDir::new().unwrap();
        let report = sender(dir.path()).send("status", None).unwrap();
        assert_eq!(report, SendReport::default());
        assert_eq!(report.attempted(), 0);
    }

    #[test]
    fn test_broadcast_continues_past_stale_channel() {
        let dir = TempDir::new().unwrap();
        let stale = dir.path().join("pysl.1");
        mkfifo(&stale, Mode::S_IRUSR | Mode::S_IWUSR).unwrap();
        let live = create(&dir.path().join("pysl.2")).unwrap();
        let reader = read_one(live.path().to_path_buf());

        let report = sender(dir.path()).send("status", None).unwrap();
        assert_eq!(report.removed, vec![stale.clone()]);
        assert_eq!(report.delivered, vec![live.path().to_path_buf()]);
        assert!(!stale.exists());

        let msg = reader.join().unwrap();
        assert!(msg.is_broadcast());
        assert_eq!(msg.text(), "status");
    }
}
