//! Provider configuration resolution and outbound endpoint adapters.
//!
//! The configuration surface is owned by an external admin collaborator and
//! read here through [`ConfigStore`]. [`ProviderServices`] resolves a
//! provider's active configuration into a validated, explicitly reloadable
//! snapshot, and [`EndpointRegistry`] selects the per-provider capability
//! implementation used by the outbound dispatcher.

pub mod config_store;
pub mod endpoint;
pub mod heynow;
pub mod service;
pub mod text;

pub use config_store::{ConfigStore, InMemoryConfigStore};
pub use endpoint::{EndpointRegistry, OutboundFile, OutboundMessage, ProviderEndpoint};
pub use heynow::HeynowEndpoint;
pub use service::{ProviderService, ProviderServices};
pub use text::strip_html;
