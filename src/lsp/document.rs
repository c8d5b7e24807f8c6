//! Document synchronization tracking for LSP
//!
//! The bridge keeps exactly one document "open" on the server at a time and
//! always sends whole-document text. Seeing a new path re-opens; seeing the
//! same path again sends a change.

use serde_json::Value;

use super::types::{
    DidChangeTextDocumentParams, DidOpenTextDocumentParams, TextDocumentContentChangeEvent,
    TextDocumentItem, VersionedTextDocumentIdentifier,
};
use crate::plugin::types::EventContext;

#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// Notification produced for one buffer update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotification {
    Open(DidOpenTextDocumentParams),
    Change(DidChangeTextDocumentParams),
}

impl SyncNotification {
    pub fn method(&self) -> &'static str {
        match self {
            SyncNotification::Open(_) => "textDocument/didOpen",
            SyncNotification::Change(_) => "textDocument/didChange",
        }
    }

    pub fn params(&self) -> serde_json::Result<Value> {
        match self {
            SyncNotification::Open(p) => serde_json::to_value(p),
            SyncNotification::Change(p) => serde_json::to_value(p),
        }
    }
}

/// Tracks which document is open on the server
#[derive(Debug, Default)]
pub struct DocumentSyncTracker {
    open_path: Option<String>,
}

impl DocumentSyncTracker {
    pub fn new() -> Self {
        Self { open_path: None }
    }

    pub fn open_path(&self) -> Option<&str> {
        self.open_path.as_deref()
    }

    /// Forget the open document (a fresh server has nothing open)
    pub fn reset(&mut self) {
        self.open_path = None;
    }

    /// Decide between didOpen and didChange for a buffer update and record
    /// the transition.
    pub fn on_buffer_update(&mut self, context: &EventContext, lines: &[String]) -> SyncNotification {
        let path = &context.buffer_full_path;
        let uri = Self::path_to_uri(path);
        let text = lines.join(LINE_ENDING);

        if self.open_path.as_deref() == Some(path.as_str()) {
            SyncNotification::Change(DidChangeTextDocumentParams {
                text_document: VersionedTextDocumentIdentifier {
                    uri,
                    version: context.version,
                },
                content_changes: vec![TextDocumentContentChangeEvent { text }],
            })
        } else {
            self.open_path = Some(path.clone());
            SyncNotification::Open(DidOpenTextDocumentParams {
                text_document: TextDocumentItem {
                    uri,
                    language_id: context.filetype.clone(),
                    version: context.version,
                    text,
                },
            })
        }
    }

    /// Prefix a file-system path with `file:///`.
    ///
    /// Reserved characters are not percent-encoded, so paths containing
    /// spaces or `#` yield URIs a strict server may reject. The round trip
    /// is lossy: stripping `file://` from `file:////f.ts` gives `//f.ts`.
    pub fn path_to_uri(path: &str) -> String {
        format!("file:///{}", path)
    }
}
