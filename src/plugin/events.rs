//! Typed event bus for editor events
//!
//! Handlers run synchronously inside `emit`, in subscription order. That
//! keeps a subscriber that enqueues work (the language client's buffer
//! sync) ordered with respect to requests the router dispatches right after.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use super::types::{BufferUpdate, EventContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    BufferUpdate,
    BufferUpdateIncremental,
    CursorMoved,
    /// Vim autocommand alias of `CursorMoved`
    CursorMovedAutocmd,
    BufferSaved,
    BufWritePost,
    BufferEnter,
    BufEnter,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::BufferUpdate => "buffer-update",
            EventKind::BufferUpdateIncremental => "buffer-update-incremental",
            EventKind::CursorMoved => "cursor-moved",
            EventKind::CursorMovedAutocmd => "CursorMoved",
            EventKind::BufferSaved => "buffer-saved",
            EventKind::BufWritePost => "BufWritePost",
            EventKind::BufferEnter => "buffer-enter",
            EventKind::BufEnter => "BufEnter",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    BufferUpdate(BufferUpdate),
    Context(EventContext),
    Raw(Value),
}

pub type EventHandler = Arc<dyn Fn(&EventPayload) + Send + Sync>;

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<EventHandler>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: EventKind, handler: impl Fn(&EventPayload) + Send + Sync + 'static) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.entry(kind).or_default().push(Arc::new(handler));
        }
    }

    /// Call every handler for `kind`. Returns how many ran.
    pub fn emit(&self, kind: EventKind, payload: &EventPayload) -> usize {
        // Snapshot so a handler may subscribe without deadlocking
        let handlers: Vec<EventHandler> = match self.handlers.read() {
            Ok(map) => map.get(&kind).cloned().unwrap_or_default(),
            Err(_) => return 0,
        };
        tracing::trace!("emit {} to {} handlers", kind.as_str(), handlers.len());
        for handler in &handlers {
            handler(payload);
        }
        handlers.len()
    }
}
