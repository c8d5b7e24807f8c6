use std::path::PathBuf;

use clap::Parser;

/// lsp-bridge: connects an editor's plugin channel (newline-delimited JSON on
/// stdin/stdout) to a language server process
#[derive(Parser, Debug, Clone)]
#[command(name = "lsp-bridge")]
#[command(version)]
#[command(about = "Editor plugin channel to language server bridge", long_about = None)]
pub struct Cli {
    /// Config file (default: <config dir>/lsp-bridge/config.toml)
    #[arg(short, long, value_name = "PATH", env = "LSP_BRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Shell command that starts the language server
    #[arg(long, value_name = "CMD", env = "LSP_BRIDGE_COMMAND")]
    pub command: Option<String>,

    /// Workspace root sent in `initialize`
    #[arg(long, value_name = "DIR")]
    pub root_path: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
