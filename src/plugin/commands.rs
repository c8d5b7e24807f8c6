//! Editor command registry
//!
//! Commands arrive from the host by name and are forwarded to whatever
//! handler the plugin registered for that name.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

pub type CommandHandler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
pub struct Commands {
    handlers: RwLock<HashMap<String, CommandHandler>>,
}

impl Commands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for `name`
    pub fn register(&self, name: impl Into<String>, handler: impl Fn(&Value) + Send + Sync + 'static) {
        if let Ok(mut handlers) = self.handlers.write() {
            handlers.insert(name.into(), Arc::new(handler));
        }
    }

    /// Run the handler for `name`; returns false when none is registered
    pub fn on_command(&self, name: &str, args: &Value) -> bool {
        let handler = self
            .handlers
            .read()
            .ok()
            .and_then(|handlers| handlers.get(name).cloned());

        match handler {
            Some(handler) => {
                tracing::debug!("Running command {}", name);
                handler(args);
                true
            }
            None => {
                tracing::debug!("No handler for command {}", name);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_registered_command_receives_args() {
        let commands = Commands::new();
        let seen = Arc::new(Mutex::new(None));
        let s = seen.clone();
        commands.register("editor.rename", move |args| *s.lock().unwrap() = Some(args.clone()));

        assert!(commands.on_command("editor.rename", &json!({"to": "x"})));
        assert_eq!(*seen.lock().unwrap(), Some(json!({"to": "x"})));
    }

    #[test]
    fn test_unknown_command_is_ignored() {
        let commands = Commands::new();
        assert!(!commands.on_command("nope", &Value::Null));
    }
}
