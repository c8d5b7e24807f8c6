//! Language Server Protocol client
//!
//! # Components
//!
//! - [`sequencer`] - single-lane task queue every server interaction goes through
//! - [`protocol`] - JSON-RPC messages and Content-Length framing
//! - [`connection`] - server process launch and the message connection over its stdio
//! - [`document`] - didOpen/didChange decisions for buffer updates
//! - [`types`] - LSP type definitions (Position, Range, Location, etc.)
//! - [`client`] - [`LanguageClient`], the capability provider backed by a server

pub mod client;
pub mod connection;
pub mod document;
pub mod protocol;
pub mod sequencer;
pub mod types;

pub use client::{ClientOptions, InitializationParams, LanguageClient};
pub use connection::{ServerLauncher, ShellLauncher};
