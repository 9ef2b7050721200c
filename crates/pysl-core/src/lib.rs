//! Core library for pysl
//!
//! Short-lived senders push one-line messages into named pipes owned by
//! long-running watchers, which render the latest message as a status line.
//!
//! - [`channel`]: identity → FIFO path resolution, discovery, and the FIFO
//!   transport with stale-channel cleanup
//! - [`codec`]: the `<tag>%%<text>` wire format
//! - [`sender`]: direct and broadcast delivery
//! - [`watcher`]: background reader, output queue and display loop

pub mod channel;
pub mod codec;
pub mod sender;
pub mod watcher;

pub use channel::{ChannelError, ChannelIdentity, ChannelRegistry, OwnedChannel};
pub use codec::{Addressing, Message};
pub use sender::{SendReport, Sender, SenderConfig};
pub use watcher::{
    DisplayLoop, DisplayState, IdleAction, NoAction, OutputQueue, ShellCommand, StatusDisplay,
    TerminalDisplay, Watcher, WatcherConfig,
};
