//! Named-pipe channels
//!
//! A channel is a FIFO at `<root>/pysl.<identity>`. Watchers create and own
//! their channel; senders only discover and write to existing ones.

pub mod error;
pub mod registry;
pub mod transport;

pub use error::{ChannelError, Result};
pub use registry::{ChannelIdentity, ChannelRegistry, CHANNEL_PREFIX, DEFAULT_ROOT};
pub use transport::{ChannelReader, OwnedChannel, DEFAULT_WRITE_TIMEOUT, MAX_FRAME_LEN};
