//! Where the local user's nickname comes from.
//!
//! BlueTalk does not manage accounts. Whatever does (a profile screen, a
//! config file, an OS keychain) implements [`CredentialStore`] and the
//! session asks it for a nickname each time a line is sent.

/// Supplies the local user's display nickname.
///
/// # Example
///
/// ```rust
/// use bluetalk_session::CredentialStore;
///
/// struct Fixed(&'static str);
///
/// impl CredentialStore for Fixed {
///     fn nickname(&self) -> Option<String> {
///         Some(self.0.to_string())
///     }
/// }
///
/// assert_eq!(Fixed("alice").nickname().as_deref(), Some("alice"));
/// ```
pub trait CredentialStore: Send + Sync {
    /// The nickname to attach to outgoing lines, or `None` when nobody is
    /// signed in (lines are then sent bare).
    fn nickname(&self) -> Option<String>;
}

/// A plain string is a store that always answers with itself. An empty
/// string means "no nickname".
impl CredentialStore for String {
    fn nickname(&self) -> Option<String> {
        (!self.is_empty()).then(|| self.clone())
    }
}

impl CredentialStore for str {
    fn nickname(&self) -> Option<String> {
        (!self.is_empty()).then(|| self.to_string())
    }
}
