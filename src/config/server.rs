//! Language server and formatting settings
//!
//! The `[server]` and `[formatting]` tables of config.toml.

use serde::{Deserialize, Serialize};

use crate::lsp::client::{ClientOptions, InitializationParams};
use crate::lsp::connection::DEFAULT_MAX_MESSAGE_BYTES;
use crate::lsp::types::FormattingOptions;

/// How to launch and talk to the language server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Shell command string, run through `sh -c` (`cmd /C` on Windows)
    pub command: String,

    /// Sent as `rootPath` / `rootUri` in `initialize`
    pub root_path: String,

    /// Largest single message accepted from the server. Some servers log
    /// very verbosely, hence the generous default.
    pub max_output_buffer_bytes: usize,

    /// Custom method used for block evaluation
    pub evaluate_method: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command: "typescript-language-server --stdio".to_string(),
            root_path: ".".to_string(),
            max_output_buffer_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            evaluate_method: "$/evaluateBlock".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormattingConfig {
    pub tab_size: u32,
    pub insert_spaces: bool,
}

impl Default for FormattingConfig {
    fn default() -> Self {
        Self {
            tab_size: 4,
            insert_spaces: true,
        }
    }
}

impl ServerConfig {
    pub fn initialization_params(&self) -> InitializationParams {
        InitializationParams {
            root_path: self.root_path.clone(),
        }
    }

    pub fn client_options(&self, formatting: &FormattingConfig) -> ClientOptions {
        ClientOptions {
            max_output_buffer_bytes: self.max_output_buffer_bytes,
            evaluate_method: self.evaluate_method.clone(),
            formatting: FormattingOptions {
                tab_size: formatting.tab_size,
                insert_spaces: formatting.insert_spaces,
            },
        }
    }
}
