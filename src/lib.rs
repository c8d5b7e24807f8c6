//! lsp-bridge
//!
//! Adapts an editor's plugin channel to a language server running as a
//! child process. Buffer updates and feature requests from the editor are
//! serialised through one queue so the server sees them in the order the
//! editor produced them.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod lsp;
pub mod plugin;

pub use error::{BridgeError, Result};
