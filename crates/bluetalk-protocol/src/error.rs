//! Error types for the protocol layer.
//!
//! Each crate in BlueTalk defines its own error enum. When you see a
//! `ProtocolError`, the problem is in framing, not in the radio or the
//! session bookkeeping.

/// Errors that can occur while framing an outbound line.
///
/// Decoding never fails: a line that does not match `nick::text` is
/// delivered as unattributed text instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The nickname cannot be framed without corrupting the line.
    ///
    /// A nickname must not contain the `::` separator or a line break, and
    /// must not end with `:` (the separator would then be found one
    /// character early on the receiving side).
    #[error("invalid nickname {0:?}: must not contain '::' or line breaks, or end with ':'")]
    InvalidNick(String),
}
