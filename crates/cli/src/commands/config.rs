use anyhow::{Result, bail};
use catalog_core::Config;
use std::path::Path;
use tracing::warn;

/// Effective config for a catalog directory. A broken config file is reported, then replaced by defaults.
pub fn load_config(catalog_dir: &Path) -> Config {
  Config::try_load_for_catalog(catalog_dir).unwrap_or_else(|e| {
    // Logging isn't initialized yet
    eprintln!("warning: ignoring config: {}", e);
    Config::default()
  })
}

/// Show current effective configuration
pub fn cmd_config_show(catalog_dir: &Path, config: &Config) -> Result<()> {
  let catalog_config = Config::catalog_config_path(catalog_dir);
  let user_config = Config::user_config_path();

  println!("Effective configuration for: {:?}", catalog_dir);
  println!();

  if catalog_config.exists() {
    println!("Using catalog config: {:?}", catalog_config);
  } else if let Some(ref user_path) = user_config {
    if user_path.exists() {
      println!("Using user config: {:?}", user_path);
    } else {
      println!("Using default configuration (no config file found)");
    }
  } else {
    println!("Using default configuration");
  }
  println!();

  let toml_str = toml::to_string_pretty(config)?;
  println!("{}", toml_str);

  Ok(())
}

/// Write the default config template into a catalog directory
pub fn cmd_config_init(catalog_dir: &Path) -> Result<()> {
  let config_path = Config::catalog_config_path(catalog_dir);

  if config_path.exists() {
    warn!("Config file already exists: {:?}", config_path);
    bail!("Delete {} first if you want to regenerate it", config_path.display());
  }

  if let Some(parent) = config_path.parent() {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(&config_path, Config::generate_template())?;

  println!("Created catalog config: {:?}", config_path);
  println!("Edit the file to customize settings.");

  Ok(())
}
