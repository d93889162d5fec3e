//! Side area for overwritten and removed files.
//!
//! Each change gets a bucket directory named after its timestamp under the
//! configured history directory. The old file moves into the bucket at its
//! original relative path, and a side catalog in the bucket records what the
//! entry looked like before the change. Archival is best effort: failures are
//! logged and the change goes ahead.

use catalog_core::{Catalog, Entry, HistoryConfig, ResourceInfo};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::document::{read_catalog, resolve_existing, write_catalog};
use crate::error::Result;
use crate::lock::ManifestLock;
use crate::reconciler::catalog_dir;

#[derive(Debug, Clone)]
pub struct HistoryArchiver {
  enabled: bool,
  directory: String,
}

impl HistoryArchiver {
  pub fn new(config: &HistoryConfig) -> Self {
    Self {
      enabled: config.enabled,
      directory: config.directory.clone(),
    }
  }

  pub fn is_enabled(&self) -> bool {
    self.enabled
  }

  /// Name of the history directory below the catalog's directory
  pub fn directory(&self) -> &str {
    &self.directory
  }

  /// Bucket directory name for a change at `time`
  pub fn bucket(time: DateTime<Utc>) -> String {
    time.format("%Y%m%dT%H%M%S%.3fZ").to_string()
  }

  fn bucket_dir(&self, catalog_file: &Path, time: DateTime<Utc>) -> PathBuf {
    catalog_dir(catalog_file).join(&self.directory).join(Self::bucket(time))
  }

  /// Side catalog recording entries archived at `time`
  pub fn side_manifest_path(&self, catalog_file: &Path, time: DateTime<Utc>) -> PathBuf {
    let name = catalog_file
      .file_name()
      .map(|n| n.to_os_string())
      .unwrap_or_else(|| "catalog.json".into());
    self.bucket_dir(catalog_file, time).join(name)
  }

  /// Move `old_file` into the bucket for `time`.
  ///
  /// Returns the new location, or `None` when history is disabled or the move failed.
  pub fn archive(&self, catalog_file: &Path, old_file: &Path, time: DateTime<Utc>) -> Option<PathBuf> {
    if !self.enabled {
      return None;
    }

    let root = catalog_dir(catalog_file);
    let relative = match old_file.strip_prefix(&root) {
      Ok(relative) => relative.to_path_buf(),
      Err(_) => PathBuf::from(old_file.file_name()?),
    };
    let target = self.bucket_dir(catalog_file, time).join(relative);

    match relocate(old_file, &target) {
      Ok(()) => {
        info!("Archived {} to {}", old_file.display(), target.display());
        Some(target)
      }
      Err(e) => {
        warn!("Failed to archive {}: {}", old_file.display(), e);
        None
      }
    }
  }

  /// Add a copy of `original` to the side catalog for the change's bucket.
  ///
  /// The copy points at the archived file and carries the change's
  /// modification provenance. Side catalogs are only written under the live
  /// catalog's lock, so they need no lock of their own.
  pub fn record_history_entry(
    &self,
    lock: &ManifestLock<'_>,
    archived: &Path,
    original: &Entry,
    change: &ResourceInfo,
  ) -> Option<PathBuf> {
    if !self.enabled {
      return None;
    }

    let side = self.side_manifest_path(lock.path(), change.modified);
    match self.append_entry(&side, archived, original, change) {
      Ok(()) => {
        debug!("Recorded history for {} in {}", original.uri, side.display());
        Some(side)
      }
      Err(e) => {
        warn!("Failed to record history for {}: {}", original.uri, e);
        None
      }
    }
  }

  fn append_entry(&self, side: &Path, archived: &Path, original: &Entry, change: &ResourceInfo) -> Result<()> {
    let side_dir = catalog_dir(side);
    fs::create_dir_all(&side_dir)?;

    let mut catalog = match resolve_existing(side) {
      Some(existing) => read_catalog(&existing)?,
      None => Catalog::new(Self::bucket(change.modified)),
    };

    let mut entry = original.clone();
    entry.uri = archived
      .strip_prefix(&side_dir)
      .map(uri_of)
      .unwrap_or_else(|_| archived.to_string_lossy().into_owned());
    entry.stamp_modified(change);
    catalog.root.push_entry(entry);

    write_catalog(&catalog, side)
  }
}

fn uri_of(relative: &Path) -> String {
  relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy().into_owned())
    .collect::<Vec<_>>()
    .join("/")
}

/// Rename into place, copying across filesystems
fn relocate(from: &Path, to: &Path) -> io::Result<()> {
  if let Some(parent) = to.parent() {
    fs::create_dir_all(parent)?;
  }
  match fs::rename(from, to) {
    Ok(()) => Ok(()),
    Err(e) => {
      debug!("Rename failed ({}), copying {} instead", e, from.display());
      fs::copy(from, to)?;
      fs::remove_file(from)
    }
  }
}
