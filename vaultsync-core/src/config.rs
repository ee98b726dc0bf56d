//! Client configuration.

use crate::platform;
use crate::session::keepalive::DEFAULT_MAX_FAILURES;
use crate::{Result, VaultError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the server, e.g. `https://cloud.example.com`.
    pub server_url: String,
    pub username: String,
    /// App password used for HTTP Basic auth. Never the master password.
    pub app_token: String,
    pub request_timeout_secs: u64,
    /// Keep-alive interval when the server does not advertise a session lifetime.
    pub keep_alive_interval_secs: u64,
    pub keep_alive_max_failures: u32,
    pub keep_alive_backoff_secs: u64,
    pub cache_path: PathBuf,
    pub remember_master_password: bool,
    /// Forget the remembered master password when the server revokes the client.
    pub purge_password_on_deauthorization: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            username: String::new(),
            app_token: String::new(),
            request_timeout_secs: 30,
            keep_alive_interval_secs: 300,
            keep_alive_max_failures: DEFAULT_MAX_FAILURES,
            keep_alive_backoff_secs: 10,
            cache_path: platform::get_default_cache_path(),
            remember_master_password: false,
            purge_password_on_deauthorization: true,
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| VaultError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Load `path`, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| VaultError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the fields a connection needs.
    pub fn validate(&self) -> Result<()> {
        if !(self.server_url.starts_with("https://") || self.server_url.starts_with("http://")) {
            return Err(VaultError::Config(format!(
                "server_url must be an http(s) URL, got {:?}",
                self.server_url
            )));
        }
        if self.username.is_empty() {
            return Err(VaultError::Config("username is not set".to_string()));
        }
        if self.app_token.is_empty() {
            return Err(VaultError::Config("app_token is not set".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(VaultError::Config("request_timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}
