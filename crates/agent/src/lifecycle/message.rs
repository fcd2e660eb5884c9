//! Control-plane messages exchanged with the hosting application.

use serde::{Deserialize, Serialize};

/// Registration slot a message is addressed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    Active,
    Waiting,
}

/// Wire form: `{"type": "GET_VERSION"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    GetVersion,
    SkipWaiting,
    ClientsClaim,
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Pong,
    Ack,
}

/// Reply to a [`ControlMessage`].
///
/// `GET_VERSION` answers with the bare version string; the other messages
/// answer with `{"type": "PONG"}` or `{"type": "ACK"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlReply {
    Version(String),
    Signal(Signal),
}
