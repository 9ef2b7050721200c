//! Wire format
//!
//! A message travels as `<tag>%%<text>`. The tag is `broadcast` for broadcast
//! sends and the resolved channel path for direct sends. Payloads without a
//! separator come from legacy senders and are read as direct messages.
//!
//! The frame delimiter (newline) belongs to the transport, which rejects
//! payloads that contain one. Message text is therefore always a single line.

use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// Splits the addressing tag from the text
pub const SEPARATOR: &str = "%%";

/// Tag marking a broadcast message
pub const BROADCAST_TAG: &str = "broadcast";

/// How a message was addressed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addressing {
    /// Sent to one named channel. `target` is the path the sender resolved,
    /// or `None` for untagged input.
    Direct { target: Option<PathBuf> },
    /// Sent to every discovered channel
    Broadcast,
}

/// A decoded message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    addressing: Addressing,
    text: String,
}

impl Message {
    /// Untagged direct message
    pub fn direct(text: impl Into<String>) -> Self {
        Self {
            addressing: Addressing::Direct { target: None },
            text: text.into(),
        }
    }

    /// Direct message tagged with the channel it was sent to
    ///
    /// A target that could not be decoded back unambiguously (empty, equal to
    /// the broadcast tag, or containing the separator) is dropped and the
    /// message goes out untagged.
    pub fn direct_to(target: &Path, text: impl Into<String>) -> Self {
        let tag = target.to_string_lossy();
        let target = if tag.is_empty() || tag == BROADCAST_TAG || tag.contains(SEPARATOR) {
            tracing::debug!(tag = %tag, "Target cannot be used as a tag, sending untagged");
            None
        } else {
            Some(target.to_path_buf())
        };
        Self {
            addressing: Addressing::Direct { target },
            text: text.into(),
        }
    }

    pub fn broadcast(text: impl Into<String>) -> Self {
        Self {
            addressing: Addressing::Broadcast,
            text: text.into(),
        }
    }

    pub fn addressing(&self) -> &Addressing {
        &self.addressing
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self.addressing, Addressing::Broadcast)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Encode a message for the wire (without the session delimiter)
pub fn encode(message: &Message) -> String {
    let tag: Cow<'_, str> = match &message.addressing {
        Addressing::Broadcast => BROADCAST_TAG.into(),
        Addressing::Direct { target: Some(path) } => path.to_string_lossy(),
        Addressing::Direct { target: None } => "".into(),
    };
    format!("{}{}{}", tag, SEPARATOR, message.text)
}

/// Decode a wire payload. Never fails.
///
/// Splits on the first separator. Input without a separator is a direct
/// message whose text is the whole payload; invalid UTF-8 is replaced.
pub fn decode(payload: &[u8]) -> Message {
    let payload = String::from_utf8_lossy(payload);

    let Some((tag, text)) = payload.split_once(SEPARATOR) else {
        return Message::direct(payload.to_string());
    };

    let addressing = match tag {
        BROADCAST_TAG => Addressing::Broadcast,
        "" => Addressing::Direct { target: None },
        path => Addressing::Direct {
            target: Some(PathBuf::from(path)),
        },
    };
    Message {
        addressing,
        text: text.to_string(),
    }
}
