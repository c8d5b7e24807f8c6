//! Editor-facing side of the bridge
//!
//! The host talks to us through a [`HostChannel`]; [`PluginApi`] decodes
//! what arrives and routes it to events, commands or the registered
//! [`LanguageService`].

pub mod api;
pub mod channel;
pub mod commands;
pub mod envelope;
pub mod events;
pub mod service;
pub mod types;

pub use api::PluginApi;
pub use channel::{HostChannel, LineChannel};
pub use events::{EventKind, EventPayload};
pub use service::{CapabilityProvider, LanguageService};
