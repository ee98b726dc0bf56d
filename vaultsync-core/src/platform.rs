//! Platform-specific paths for configuration and cached data

use std::path::PathBuf;

const APP_DIR: &str = "vaultsync";

/// Get the platform-specific data directory for the entity cache
///
/// Returns:
/// - Windows: %LOCALAPPDATA%\vaultsync
/// - macOS: ~/Library/Application Support/vaultsync
/// - Linux/Other: ~/.local/share/vaultsync
pub fn get_data_dir() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".data")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Get the platform-specific config directory
///
/// Returns:
/// - Windows: %APPDATA%\vaultsync
/// - macOS: ~/Library/Application Support/vaultsync
/// - Linux/Other: ~/.config/vaultsync
pub fn get_config_dir() -> PathBuf {
    let base = dirs::config_dir()
        .or_else(dirs::data_dir)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_DIR)
}

/// Get the default config file path
pub fn get_default_config_path() -> PathBuf {
    get_config_dir().join("config.toml")
}

/// Get the default cache database path
pub fn get_default_cache_path() -> PathBuf {
    get_data_dir().join("cache.db")
}
