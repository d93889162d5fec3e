//! Out-of-band file changes that keep the catalog in step

use anyhow::{Context, Result};
use catalog_core::Config;
use reconcile::CatalogService;
use std::path::Path;

use super::StampArgs;

pub fn cmd_replace(config: Config, catalog: &Path, uri: &str, source: &Path, stamp: &StampArgs) -> Result<()> {
  let history = config.history.enabled;
  let service = CatalogService::new(config);
  let entry = service
    .replace_file(catalog, uri, source, &stamp.resource_info())
    .with_context(|| format!("Failed to replace {} in {}", uri, catalog.display()))?;

  println!("Replaced {} with {}", entry.uri, source.display());
  if let Some(digest) = &entry.digest {
    println!("  Digest:   {}", digest);
  }
  if history {
    println!("  Previous copy kept under the history directory");
  }
  Ok(())
}

pub fn cmd_remove(config: Config, catalog: &Path, uri: &str, stamp: &StampArgs) -> Result<()> {
  let history = config.history.enabled;
  let service = CatalogService::new(config);
  let entry = service
    .remove_file(catalog, uri, &stamp.resource_info())
    .with_context(|| format!("Failed to remove {} from {}", uri, catalog.display()))?;

  println!("Removed {} from {}", entry.uri, catalog.display());
  if history {
    println!("  Previous copy kept under the history directory");
  }
  Ok(())
}
