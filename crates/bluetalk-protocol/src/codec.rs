//! Line framing: turning `(nick, text)` into wire bytes and back.
//!
//! The wire format is deliberately minimal. Every message is one UTF-8
//! line terminated by `\n`:
//!
//! ```text
//! alice::hello there\n     ← attributed line (nick "alice")
//! hello there\n            ← bare line (no nick)
//! ```
//!
//! There is no length prefix and no version field. Both functions are
//! pure, so they are the single place the framing rules live.

use std::borrow::Cow;

use crate::{DecodedLine, ProtocolError};

/// Separates the sender's nickname from the message body.
pub const SEPARATOR: &str = "::";

/// Encodes one outbound message as a newline-terminated line.
///
/// - A non-empty `nick` produces `nick::text\n`.
/// - An empty `nick` produces a bare `text\n`.
/// - Line breaks inside `text` (`\r\n`, `\n`, `\r`) are each replaced by a
///   single space, so one call always yields exactly one wire line.
///
/// # Errors
/// Returns [`ProtocolError::InvalidNick`] if `nick` contains `::` or a
/// line break, or ends with `:`.
///
/// # Example
///
/// ```rust
/// use bluetalk_protocol::{decode, encode};
///
/// let bytes = encode("alice", "hi\nthere").unwrap();
/// assert_eq!(bytes, b"alice::hi there\n");
///
/// let line = decode(std::str::from_utf8(&bytes).unwrap());
/// assert_eq!(line.nick.as_deref(), Some("alice"));
/// assert_eq!(line.text, "hi there");
/// ```
pub fn encode(nick: &str, text: &str) -> Result<Vec<u8>, ProtocolError> {
    if nick.contains(SEPARATOR)
        || nick.contains(['\n', '\r'])
        || nick.ends_with(':')
    {
        return Err(ProtocolError::InvalidNick(nick.to_string()));
    }

    let body = flatten_line_breaks(text);
    let mut line =
        String::with_capacity(nick.len() + SEPARATOR.len() + body.len() + 1);
    if !nick.is_empty() {
        line.push_str(nick);
        line.push_str(SEPARATOR);
    }
    line.push_str(&body);
    line.push('\n');
    Ok(line.into_bytes())
}

/// Decodes one inbound line.
///
/// One trailing `\n` and then one trailing `\r` are stripped. The line is
/// split at the FIRST `::` only when the part before it (the nick) and the
/// part after it (the text) are both non-empty. Anything else is returned
/// whole as unattributed text, so malformed framing is shown rather than
/// dropped.
pub fn decode(raw: &str) -> DecodedLine {
    let line = raw.strip_suffix('\n').unwrap_or(raw);
    let line = line.strip_suffix('\r').unwrap_or(line);

    match line.find(SEPARATOR) {
        Some(i) if i >= 1 && i + SEPARATOR.len() < line.len() => DecodedLine {
            nick: Some(line[..i].to_string()),
            text: line[i + SEPARATOR.len()..].to_string(),
        },
        _ => DecodedLine {
            nick: None,
            text: line.to_string(),
        },
    }
}

/// Replaces each line break with a space. Borrows when there is nothing
/// to replace, which is the common case for chat input.
pub(crate) fn flatten_line_breaks(text: &str) -> Cow<'_, str> {
    if !text.contains(['\n', '\r']) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", " ").replace(['\n', '\r'], " "))
}
