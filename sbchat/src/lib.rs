//! Conversational client for the switchboard protocol layer.
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use sbchat::ChatClient;
//! use sbprovider::ChatRegistry;
//!
//! let client = ChatClient::new(Arc::new(ChatRegistry::new()));
//! assert!(client.history().is_empty());
//! ```

mod client;
mod error;
mod types;

pub use client::ChatClient;
pub use error::{ChatError, ChatErrorKind};
pub use types::ChatTurn;

pub mod prelude {
    pub use crate::{ChatClient, ChatError, ChatErrorKind, ChatTurn};
}
