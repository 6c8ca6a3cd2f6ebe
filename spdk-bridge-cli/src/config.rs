//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use spdk_bridge::{BridgeConfig, LogLevel};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Route the bridge's own `log` records through the host sink instead of
    /// stderr
    #[serde(default)]
    pub forward: bool,
    #[serde(default = "default_level")]
    pub max_level: LogLevel,
    #[serde(default)]
    pub modules: Vec<String>,
    /// Shared library exporting the host log callback
    pub library: Option<PathBuf>,
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Messages emitted through the trampoline before any command runs
    #[serde(default)]
    pub messages: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            forward: false,
            max_level: default_level(),
            modules: Vec::new(),
            library: None,
            symbol: default_symbol(),
            messages: Vec::new(),
        }
    }
}

fn default_level() -> LogLevel {
    LogLevel::Notice
}

fn default_symbol() -> String {
    "bridge_host_log".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    #[serde(default)]
    pub id: u32,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    #[serde(default = "default_device")]
    pub device: String,
    #[serde(default)]
    pub writable: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            id: 0,
            pool_size: default_pool_size(),
            device: default_device(),
            writable: false,
        }
    }
}

fn default_pool_size() -> usize {
    BridgeConfig::default().pool_size
}

fn default_device() -> String {
    "nvme0n1".to_string()
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// One admin command to send
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CommandConfig {
    Identify,
    KeepAlive,
    Snapshot,
    Custom {
        opcode: u8,
        #[serde(default)]
        cdw10: u32,
        #[serde(default)]
        cdw11: u32,
    },
}

impl AppConfig {
    /// Library configuration derived from the `[logging]` and `[channel]`
    /// sections
    pub fn bridge_config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::new()
            .with_max_level(self.logging.max_level)
            .with_pool_size(self.channel.pool_size);
        for module in &self.logging.modules {
            config = config.add_module(module.clone());
        }
        config
    }

    pub fn validate(&self) -> Result<()> {
        self.bridge_config()
            .validate()
            .context("Invalid [logging] or [channel] section")?;
        if self.channel.device.is_empty() {
            bail!("[channel] device name must not be empty");
        }
        if self.logging.symbol.is_empty() {
            bail!("[logging] symbol must not be empty");
        }
        Ok(())
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    config
        .validate()
        .with_context(|| format!("Invalid config file: {:?}", path))?;

    Ok(config)
}
