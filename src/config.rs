//! Runtime configuration.
//!
//! Built once at startup from defaults, an optional TOML file, and command
//! line flags (in increasing priority), then passed by reference into the
//! transfer code.

use crate::error::{Result, TransferError};
use crate::streaming::{DEFAULT_BLOCK_SIZE, MAX_BLOCK_SIZE};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_IP: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 4949;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub ip: String,
    pub port: u16,
    pub block_size: u32,
    pub output_path: Option<PathBuf>,
    pub receive_directory: Option<PathBuf>,
    /// Seconds; unset means wait indefinitely
    pub connect_timeout: Option<u64>,
    /// Seconds; unset means wait indefinitely
    pub handshake_timeout: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ip: DEFAULT_IP.to_string(),
            port: DEFAULT_PORT,
            block_size: DEFAULT_BLOCK_SIZE,
            output_path: None,
            receive_directory: None,
            connect_timeout: None,
            handshake_timeout: None,
        }
    }
}

impl Config {
    /// Parse a TOML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            TransferError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
            .map_err(|e| TransferError::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// `~/.config/lancom/config.toml` (platform equivalent), if it exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("lancom").join("config.toml"))
            .filter(|path| path.is_file())
    }

    /// Load `explicit` if given, else the default file if present, else defaults.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) => {
                    tracing::debug!("using config file {}", path.display());
                    Self::load(&path)
                }
                None => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.ip.trim().is_empty() {
            return Err(TransferError::Config("ip must not be empty".to_string()));
        }
        if self.block_size == 0 {
            return Err(TransferError::Config(
                "block size must be greater than zero".to_string(),
            ));
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(TransferError::Config(format!(
                "block size {} exceeds maximum of {}",
                self.block_size, MAX_BLOCK_SIZE
            )));
        }
        Ok(())
    }

    /// `ip:port`, bracketing IPv6 literals.
    pub fn addr(&self) -> String {
        if self.ip.contains(':') && !self.ip.starts_with('[') {
            format!("[{}]:{}", self.ip, self.port)
        } else {
            format!("{}:{}", self.ip, self.port)
        }
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout.map(Duration::from_secs)
    }

    pub fn handshake_timeout(&self) -> Option<Duration> {
        self.handshake_timeout.map(Duration::from_secs)
    }
}

/// Expand tilde (~) in paths to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();

    if path_str == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
    } else if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            home.join(rest)
        } else {
            path.to_path_buf()
        }
    } else {
        path.to_path_buf()
    }
}
