//! chatsync webhook processing.
//!
//! [`WebhookProcessor`] runs the end-to-end idempotent pipeline for one
//! delivery: normalize, deduplicate, reconcile partner and channel, ingest
//! attachments, create the message. [`OutboundDispatcher`] carries internally
//! authored replies back to the provider. Both sides coordinate exclusively
//! through the conversation store; see `chatsync-store` for the contract.

pub mod attachments;
pub mod outbound;
pub mod pipeline;

pub use attachments::{AttachmentIngester, IngestedFile};
pub use outbound::OutboundDispatcher;
pub use pipeline::WebhookProcessor;
