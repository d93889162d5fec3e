//! Refresh and formalize

use anyhow::{Context, Result, bail};
use catalog_core::{Config, format_bytes};
use reconcile::{CatalogService, ReconcileOptions, ReconcileOutcome};
use std::path::Path;

use super::StampArgs;

/// Reconcile a catalog with its directory
pub fn cmd_refresh(config: Config, catalog: &Path, options: ReconcileOptions, stamp: &StampArgs, json: bool) -> Result<()> {
  let service = CatalogService::new(config);
  let outcome = service
    .refresh(catalog, &stamp.resource_info(), options)
    .with_context(|| format!("Failed to refresh {}", catalog.display()))?;

  let report = match outcome {
    ReconcileOutcome::Reconciled(report) => report,
    ReconcileOutcome::Ambiguous { directory, documents } => {
      let names: Vec<String> = documents.iter().map(|d| d.display().to_string()).collect();
      bail!(
        "Refusing to refresh {}: {} also holds {}",
        catalog.display(),
        directory.display(),
        names.join(", ")
      );
    }
  };

  if json {
    let value = serde_json::json!({
      "catalog": catalog.display().to_string(),
      "modified": report.modified,
      "added": report.added,
      "updated": report.updated,
      "removed": report.removed,
      "file_count": report.file_count,
      "file_size": report.file_size,
      "skipped": report.skipped,
      "duration_ms": report.duration.as_millis() as u64,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    return Ok(());
  }

  if !report.modified {
    println!("{} is up to date ({:?})", catalog.display(), report.duration);
    return Ok(());
  }

  println!("Refreshed {} in {:?}", catalog.display(), report.duration);
  println!("  Added:    {}", report.added.len());
  println!("  Updated:  {}", report.updated.len());
  println!("  Removed:  {}", report.removed.len());
  if options.populate_stats {
    println!("  Files:    {} ({})", report.file_count, format_bytes(report.file_size));
  }
  if report.skipped > 0 {
    println!("  Skipped:  {} unreadable", report.skipped);
  }

  Ok(())
}

/// Backfill ids, provenance and blank digests
pub fn cmd_formalize(config: Config, catalog: &Path, checksums: bool, remove: bool, stamp: &StampArgs) -> Result<()> {
  let service = CatalogService::new(config);
  let report = service
    .formalize(catalog, &stamp.resource_info(), checksums, remove)
    .with_context(|| format!("Failed to formalize {}", catalog.display()))?;

  if !report.modified {
    println!("{} needs no changes", catalog.display());
    return Ok(());
  }

  println!("Formalized {}", catalog.display());
  println!("  Backfilled:   {}", report.backfilled);
  println!("  Checksummed:  {}", report.checksummed);
  println!("  Removed:      {}", report.removed.len());
  for uri in report.removed.iter().take(10) {
    println!("                - {}", uri);
  }
  if report.removed.len() > 10 {
    println!("                ... and {} more", report.removed.len() - 10);
  }

  Ok(())
}
