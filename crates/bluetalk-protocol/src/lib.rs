//! Wire protocol for BlueTalk.
//!
//! This crate defines the "language" two BlueTalk peers speak once a link
//! is up:
//!
//! - **Framing** ([`encode`], [`decode`]): one chat message per
//!   newline-terminated UTF-8 line, shaped `nick::text` or bare `text`.
//! - **Types** ([`ChatLine`], [`Direction`], [`DecodedLine`]): the
//!   structures handed to the application once a line has been framed.
//! - **Errors** ([`ProtocolError`]): what can go wrong while encoding.
//!
//! # Architecture
//!
//! The protocol layer sits between the transport (raw bytes on a link) and
//! the session (who is talking to whom). It never touches a socket; both
//! the Bluetooth and the Direct-Wi-Fi transports funnel every line through
//! the same two functions.
//!
//! ```text
//! Transport (lines) → Protocol (nick, text) → Session (ChatLine events)
//! ```

// ---------------------------------------------------------------------------
// Module declarations
// ---------------------------------------------------------------------------

mod codec;
mod error;
mod types;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use codec::{decode, encode, SEPARATOR};
pub use error::ProtocolError;
pub use types::{ChatLine, DecodedLine, Direction};
