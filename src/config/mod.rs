// Config module - config.toml plus command-line overrides

mod server;

pub use server::{FormattingConfig, ServerConfig};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::Cli;
use crate::error::{BridgeError, Result};

const CONFIG_DIR: &str = "lsp-bridge";
const MAIN_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: ServerConfig,
    pub formatting: FormattingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Log to this file instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl BridgeConfig {
    /// `<config dir>/lsp-bridge/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        BaseDirs::new()
            .map(|dirs| dirs.config_dir().join(CONFIG_DIR).join(MAIN_CONFIG_FILE))
            .ok_or_else(|| BridgeError::Config("Could not determine config directory".to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| BridgeError::Config(format!("Failed to parse {}: {}", path.display(), e)))
    }

    /// Like [`load`](Self::load), but a missing file means defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BridgeError::Config(format!("Failed to create config dir: {}", e)))?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| BridgeError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| BridgeError::Config(format!("Failed to write config: {}", e)))
    }

    /// Resolve the config for a command line: an explicit `--config` must
    /// exist, the default location may not. Flags win over file values.
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::load_or_default(&Self::default_path()?)?,
        };
        config.apply_overrides(cli);
        Ok(config)
    }

    pub fn apply_overrides(&mut self, cli: &Cli) {
        if let Some(command) = &cli.command {
            self.server.command = command.clone();
        }
        if let Some(root_path) = &cli.root_path {
            self.server.root_path = root_path.clone();
        }
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
        if let Some(file) = &cli.log_file {
            self.logging.file = Some(file.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.server.command, "typescript-language-server --stdio");
        assert_eq!(config.formatting.tab_size, 4);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_config_serialization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(MAIN_CONFIG_FILE);

        let mut config = BridgeConfig::default();
        config.server.command = "rust-analyzer".into();
        config.logging.file = Some(PathBuf::from("/tmp/bridge.log"));
        config.save(&path).unwrap();

        assert_eq!(BridgeConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MAIN_CONFIG_FILE);
        std::fs::write(&path, "[formatting]\ntab_size = 2\n").unwrap();

        let config = BridgeConfig::load(&path).unwrap();
        assert_eq!(config.formatting.tab_size, 2);
        assert!(config.formatting.insert_spaces);
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn test_missing_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.toml");
        assert_eq!(
            BridgeConfig::load_or_default(&missing).unwrap(),
            BridgeConfig::default()
        );
        assert!(matches!(BridgeConfig::load(&missing), Err(BridgeError::Config(_))));

        let broken = dir.path().join(MAIN_CONFIG_FILE);
        std::fs::write(&broken, "[server\ncommand = ").unwrap();
        assert!(matches!(
            BridgeConfig::load_or_default(&broken),
            Err(BridgeError::Config(_))
        ));
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MAIN_CONFIG_FILE);
        std::fs::write(
            &path,
            "[server]\ncommand = \"clangd\"\nroot_path = \"/src\"\n[logging]\nlevel = \"warn\"\n",
        )
        .unwrap();

        let cli = Cli::parse_from([
            "lsp-bridge",
            "--config",
            path.to_str().unwrap(),
            "--root-path",
            "/work",
            "--log-level",
            "debug",
        ]);
        let config = BridgeConfig::from_cli(&cli).unwrap();

        assert_eq!(config.server.command, "clangd");
        assert_eq!(config.server.root_path, "/work");
        assert_eq!(config.logging.level, "debug");
    }
}
