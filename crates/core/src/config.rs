//! Catalog engine configuration with per-catalog overrides.
//!
//! Config priority: catalog-relative (.catalog/config.toml) > user (~/.config/catalog/config.toml)

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Per-catalog config directory, next to the catalog document
pub const CATALOG_CONFIG_DIR: &str = ".catalog";

// ============================================================================
// Refresh Configuration
// ============================================================================

/// Defaults for a reconciliation pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
  /// Create entries for files on disk that the catalog does not reference (default: true)
  pub add_unreferenced: bool,

  /// Drop entries whose file is gone (default: false)
  pub remove_missing: bool,

  /// Keep the stored file count and byte total in step with the walk (default: true)
  pub populate_stats: bool,

  /// Recompute digests during the walk (default: true)
  pub compute_checksums: bool,
}

impl Default for RefreshConfig {
  fn default() -> Self {
    Self {
      add_unreferenced: true,
      remove_missing: false,
      populate_stats: true,
      compute_checksums: true,
    }
  }
}

// ============================================================================
// Checksum Configuration
// ============================================================================

/// Digest algorithm options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
  /// 128-bit digest
  #[default]
  Md5,
  Sha256,
}

impl ChecksumAlgorithm {
  pub fn as_str(&self) -> &'static str {
    match self {
      ChecksumAlgorithm::Md5 => "md5",
      ChecksumAlgorithm::Sha256 => "sha256",
    }
  }
}

impl std::str::FromStr for ChecksumAlgorithm {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "md5" => Ok(ChecksumAlgorithm::Md5),
      "sha256" | "sha-256" => Ok(ChecksumAlgorithm::Sha256),
      _ => Err(format!("Invalid checksum algorithm: {}", s)),
    }
  }
}

/// Digest settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChecksumConfig {
  /// Which digest to compute
  pub algorithm: ChecksumAlgorithm,

  /// Smallest read window in bytes (default: 512)
  pub min_window: usize,

  /// Largest read window in bytes (default: 64KiB)
  pub max_window: usize,
}

impl Default for ChecksumConfig {
  fn default() -> Self {
    Self {
      algorithm: ChecksumAlgorithm::Md5,
      min_window: 512,
      max_window: 64 * 1024,
    }
  }
}

// ============================================================================
// History Configuration
// ============================================================================

/// Retention of overwritten and removed files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
  /// Move old copies aside before overwrite or delete (default: false)
  pub enabled: bool,

  /// Side-area directory name, relative to the catalog's directory (default: ".history")
  pub directory: String,
}

impl Default for HistoryConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      directory: ".history".to_string(),
    }
  }
}

// ============================================================================
// Storage Configuration
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// Write newly created catalogs gzip-compressed (default: false)
  pub compress_new: bool,
}

// ============================================================================
// Logging Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Log level: error, warn, info, debug, trace (default: "info")
  pub level: String,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
    }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

/// Catalog engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  #[serde(default)]
  pub refresh: RefreshConfig,

  #[serde(default)]
  pub checksum: ChecksumConfig,

  #[serde(default)]
  pub history: HistoryConfig,

  #[serde(default)]
  pub storage: StorageConfig,

  #[serde(default)]
  pub logging: LoggingConfig,
}

impl Config {
  /// Load config for a catalog directory, with fallback to user config.
  ///
  /// A config file that exists but fails to load is logged and replaced by defaults.
  pub fn load_for_catalog(catalog_dir: &Path) -> Self {
    Self::try_load_for_catalog(catalog_dir).unwrap_or_else(|e| {
      warn!("Ignoring config for {}: {}", catalog_dir.display(), e);
      Self::default()
    })
  }

  /// Like [`Config::load_for_catalog`], but a broken config file is an error
  pub fn try_load_for_catalog(catalog_dir: &Path) -> Result<Self> {
    let catalog_config = Self::catalog_config_path(catalog_dir);
    if catalog_config.exists() {
      return Self::load_from(&catalog_config);
    }

    if let Some(user_config_path) = Self::user_config_path()
      && user_config_path.exists()
    {
      return Self::load_from(&user_config_path);
    }

    Ok(Self::default())
  }

  /// Parse one config file, surfacing read and syntax errors
  pub fn load_from(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CATALOG_CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("catalog").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("catalog").join("config.toml"))
  }

  /// Get the catalog-relative config path
  pub fn catalog_config_path(catalog_dir: &Path) -> PathBuf {
    catalog_dir.join(CATALOG_CONFIG_DIR).join("config.toml")
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    let defaults = Self::default();
    format!(
      r#"# Catalog Engine Configuration
# Place in <catalog dir>/.catalog/config.toml or ~/.config/catalog/config.toml

# ============================================================================
# Refresh Defaults
# ============================================================================

[refresh]
# Add entries for files the catalog does not reference yet
add_unreferenced = {add_unreferenced}

# Drop entries whose file no longer exists
remove_missing = {remove_missing}

# Track file count and total bytes
populate_stats = {populate_stats}

# Recompute digests on every refresh
compute_checksums = {compute_checksums}

# ============================================================================
# Checksums
# ============================================================================

[checksum]
# Algorithm: md5 or sha256
algorithm = "{algorithm}"

# Only a bounded window of each file is digested (bytes)
min_window = {min_window}
max_window = {max_window}

# ============================================================================
# File History
# ============================================================================

[history]
# Keep overwritten and removed files in a side area
enabled = {history_enabled}

# Side-area directory, relative to the catalog
directory = "{history_dir}"

# ============================================================================
# Storage
# ============================================================================

[storage]
# Write new catalogs as .json.gz
compress_new = {compress_new}

# ============================================================================
# Logging
# ============================================================================

[logging]
# error, warn, info, debug, trace (RUST_LOG overrides)
level = "{level}"
"#,
      add_unreferenced = defaults.refresh.add_unreferenced,
      remove_missing = defaults.refresh.remove_missing,
      populate_stats = defaults.refresh.populate_stats,
      compute_checksums = defaults.refresh.compute_checksums,
      algorithm = defaults.checksum.algorithm.as_str(),
      min_window = defaults.checksum.min_window,
      max_window = defaults.checksum.max_window,
      history_enabled = defaults.history.enabled,
      history_dir = defaults.history.directory,
      compress_new = defaults.storage.compress_new,
      level = defaults.logging.level,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert!(config.refresh.add_unreferenced);
    assert!(!config.refresh.remove_missing);
    assert!(config.refresh.populate_stats);
    assert!(config.refresh.compute_checksums);
    assert_eq!(config.checksum.algorithm, ChecksumAlgorithm::Md5);
    assert_eq!(config.checksum.min_window, 512);
    assert_eq!(config.checksum.max_window, 65536);
    assert!(!config.history.enabled);
    assert_eq!(config.history.directory, ".history");
  }

  #[test]
  fn test_load_catalog_config() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join(".catalog");
    std::fs::create_dir_all(&dir).unwrap();

    let config_content = r#"
[checksum]
algorithm = "sha256"

[history]
enabled = true
"#;
    std::fs::write(dir.join("config.toml"), config_content).unwrap();

    let config = Config::load_for_catalog(temp.path());
    assert_eq!(config.checksum.algorithm, ChecksumAlgorithm::Sha256);
    assert!(config.history.enabled);
    assert_eq!(config.history.directory, ".history");
    assert!(config.refresh.add_unreferenced);
  }

  #[test]
  fn test_load_from_reports_syntax_errors() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "[checksum]\nalgorithm = \"crc32\"\n").unwrap();
    assert!(matches!(Config::load_from(&path), Err(Error::Config(_))));
  }

  #[test]
  fn test_broken_catalog_config_is_reported() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join(".catalog");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), "[history]\nenabled = \"yes\"\n").unwrap();

    let err = Config::try_load_for_catalog(temp.path()).unwrap_err();
    assert!(err.to_string().contains("config.toml"));

    let config = Config::load_for_catalog(temp.path());
    assert!(!config.history.enabled);
    assert!(config.refresh.add_unreferenced);
  }

  #[test]
  fn test_template_parses_to_defaults() {
    let template = Config::generate_template();
    assert!(template.contains("[refresh]"));
    assert!(template.contains("[history]"));

    let parsed: Config = toml::from_str(&template).unwrap();
    assert_eq!(parsed.checksum.algorithm, ChecksumAlgorithm::Md5);
    assert_eq!(parsed.checksum.max_window, 65536);
    assert!(!parsed.history.enabled);
  }

  #[test]
  fn test_algorithm_from_str() {
    assert_eq!("MD5".parse::<ChecksumAlgorithm>(), Ok(ChecksumAlgorithm::Md5));
    assert_eq!("sha-256".parse::<ChecksumAlgorithm>(), Ok(ChecksumAlgorithm::Sha256));
    assert!("crc32".parse::<ChecksumAlgorithm>().is_err());
  }

  #[test]
  fn test_toml_roundtrip() {
    let mut config = Config::default();
    config.refresh.remove_missing = true;
    config.storage.compress_new = true;

    let toml_str = toml::to_string_pretty(&config).unwrap();
    let parsed: Config = toml::from_str(&toml_str).unwrap();
    assert!(parsed.refresh.remove_missing);
    assert!(parsed.storage.compress_new);
  }
}
