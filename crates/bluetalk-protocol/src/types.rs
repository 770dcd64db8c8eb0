//! Chat line types handed to the application.
//!
//! A [`ChatLine`] is created once, either from a decoded inbound line or
//! from text the local user is sending, and is never mutated afterwards.
//! Ownership passes straight to whoever observes the session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::codec;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which way a chat line travelled.
///
/// `#[serde(rename_all = "lowercase")]` makes the JSON form `"inbound"` /
/// `"outbound"`, which reads naturally in event logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the peer.
    Inbound,
    /// Sent by the local user.
    Outbound,
}

// ---------------------------------------------------------------------------
// DecodedLine
// ---------------------------------------------------------------------------

/// The result of [`decode`](crate::decode): an optional sender nickname and
/// the message text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLine {
    /// The sender's nickname, or `None` for an unattributed line.
    pub nick: Option<String>,
    /// The message body (or the whole line when unattributed).
    pub text: String,
}

// ---------------------------------------------------------------------------
// ChatLine
// ---------------------------------------------------------------------------

/// One chat message as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatLine {
    /// Who sent it. `None` when an inbound line carried no nickname.
    pub sender_nick: Option<String>,
    /// The message body, without the trailing newline.
    pub text: String,
    /// Inbound (from the peer) or outbound (typed locally).
    pub direction: Direction,
    /// When the line was read from the link or handed to it.
    pub timestamp: DateTime<Utc>,
}

impl ChatLine {
    /// Builds an inbound chat line by decoding a raw wire line.
    pub fn inbound(raw: &str) -> Self {
        let DecodedLine { nick, text } = codec::decode(raw);
        Self {
            sender_nick: nick,
            text,
            direction: Direction::Inbound,
            timestamp: Utc::now(),
        }
    }

    /// Builds an outbound chat line for text the local user just sent.
    ///
    /// An empty `nick` is recorded as `None` and line breaks in `text` are
    /// flattened, matching what the peer will decode from the wire.
    pub fn outbound(nick: &str, text: &str) -> Self {
        Self {
            sender_nick: (!nick.is_empty()).then(|| nick.to_string()),
            text: codec::flatten_line_breaks(text).into_owned(),
            direction: Direction::Outbound,
            timestamp: Utc::now(),
        }
    }

    /// Returns `true` if the peer sent this line.
    pub fn is_inbound(&self) -> bool {
        self.direction == Direction::Inbound
    }
}
