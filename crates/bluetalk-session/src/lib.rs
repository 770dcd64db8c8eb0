//! Session management for BlueTalk.
//!
//! A session is the lifetime of one transport plus one [`Link`] to one
//! peer. This crate makes sure there is only ever one of them:
//!
//! 1. **Lifecycle**: [`SessionManager`] listens or connects on either
//!    transport, tearing any previous session down first
//! 2. **Messaging**: outgoing text is framed and written to the link;
//!    incoming lines are decoded and handed to the observer in order
//! 3. **Reporting**: every state change and failure becomes one
//!    [`Status`] on the injected [`SessionObserver`]
//!
//! # How it fits in the stack
//!
//! ```text
//! Application (above)  ← implements SessionObserver, picks peers
//!     ↕
//! Session Layer (this crate)  ← one active link, read loop, send path
//!     ↕
//! Transport + Protocol (below)  ← Link, Bluetooth, Wi-Fi Direct, framing
//! ```
//!
//! [`Link`]: bluetalk_transport::Link

#![allow(async_fn_in_trait)]

mod credential;
mod error;
mod manager;
mod observer;
mod status;

pub use credential::CredentialStore;
pub use error::SessionError;
pub use manager::SessionManager;
pub use observer::{ChannelObserver, SessionEvent, SessionObserver};
pub use status::{SessionState, Status};
