//! Centralized application directory paths.
//!
//! Single source of truth for the filesystem paths used by the daemon.
//! Uses the [`dirs`] crate for platform-appropriate resolution.
//!
//! # Environment Overrides
//!
//! Both paths can be overridden for testing or custom deployments:
//! - `REVEIL_CONFIG_DIR` — overrides [`config_dir`]
//! - `REVEIL_DATA_DIR` — overrides [`data_dir`]

use std::path::PathBuf;

/// Application config directory.
///
/// Holds `config.toml`. Resolves to `dirs::config_dir()/reveil/` by
/// default; override with `REVEIL_CONFIG_DIR`.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("REVEIL_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("reveil"))
        .unwrap_or_else(|| PathBuf::from("/tmp/reveil-config"))
}

/// Application data directory.
///
/// Holds the persisted alarm store (`alarms.json`). Resolves to
/// `dirs::data_dir()/reveil/` by default; override with `REVEIL_DATA_DIR`.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("REVEIL_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("reveil"))
        .unwrap_or_else(|| PathBuf::from("/tmp/reveil-data"))
}
