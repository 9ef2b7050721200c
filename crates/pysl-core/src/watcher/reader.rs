//! Background reader
//!
//! Blocks on the watcher's channel one write session at a time, decodes each
//! frame and queues the accepted text.
//!
//! The previous session's read end stays open until the next session has
//! connected. A sender that slips in after EOF then writes into a pipe that
//! still has a reader, and its frame is picked up by the next session instead
//! of being discarded on close.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::queue::OutputQueue;
use crate::channel::transport::{self, ChannelReader};
use crate::codec::{self, Addressing, Message};

/// Start the reader thread for the channel at `path`
pub(crate) fn spawn(
    path: PathBuf,
    queue: Arc<OutputQueue>,
    direct_only: bool,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("pysl-reader".into())
        .spawn(move || read_loop(&path, &queue, direct_only))
}

fn read_loop(path: &Path, queue: &OutputQueue, direct_only: bool) {
    tracing::debug!(path = %path.display(), direct_only, "Reader started");

    let mut previous: Option<ChannelReader> = None;
    while !queue.is_closed() {
        let mut session = match transport::open_for_read(path) {
            Ok(session) => session,
            Err(_) if queue.is_closed() => break,
            Err(e) => {
                tracing::error!("Channel reader stopped: {}", e);
                break;
            }
        };
        drop(previous.take());

        match session.read_once() {
            Ok(frames) => {
                for frame in frames {
                    let message = codec::decode(frame.as_bytes());
                    if accept(&message, path, direct_only) {
                        queue.push(message.into_text());
                    }
                }
            }
            Err(e) => tracing::warn!("Failed to read message: {}", e),
        }
        previous = Some(session);
    }

    tracing::debug!(path = %path.display(), "Reader finished");
}

/// Addressing filter applied to every decoded message
///
/// Direct messages are always accepted; the tag is not required to match
/// this channel. Broadcasts are dropped when the watcher is direct-only.
pub(crate) fn accept(message: &Message, own_path: &Path, direct_only: bool) -> bool {
    match message.addressing() {
        Addressing::Broadcast if direct_only => {
            tracing::debug!("Ignoring broadcast message (direct-only)");
            false
        }
        Addressing::Broadcast => true,
        Addressing::Direct {
            target: Some(target),
        } if target != own_path => {
            tracing::debug!(
                target_path = %target.display(),
                own_path = %own_path.display(),
                "Direct message tagged for another channel"
            );
            true
        }
        Addressing::Direct { .. } => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_broadcast() {
        let own = Path::new("/tmp/pysl.1");
        assert!(accept(&Message::broadcast("x"), own, false));
        assert!(!accept(&Message::broadcast("x"), own, true));
    }

    #[test]
    fn test_accept_direct_regardless_of_tag() {
        let own = Path::new("/tmp/pysl.1");
        assert!(accept(&Message::direct_to(own, "x"), own, true));
        assert!(accept(
            &Message::direct_to(Path::new("/tmp/pysl.2"), "x"),
            own,
            true
        ));
        assert!(accept(&Message::direct("legacy"), own, true));
    }
}
