//! chatsync core contracts and value types.
//!
//! This crate exposes the shared data structures exchanged between the
//! payload normalizer, the webhook processor, and the outbound dispatcher:
//! provider kinds, canonical events, message kinds, provider configuration
//! snapshots, conversation records, and the error taxonomy.

pub mod config;
pub mod error;
pub mod event;
pub mod kind;
pub mod outcome;
pub mod provider;
pub mod records;

pub use config::*;
pub use error::*;
pub use event::*;
pub use kind::*;
pub use outcome::*;
pub use provider::*;
pub use records::*;
