use catalog_core::{AuditSummary, Catalog};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::checksum::Checksummer;
use crate::document::write_catalog;
use crate::error::Result;
use crate::lock::{LockRegistry, MANIFEST_LOCKS, ManifestLock};
use crate::reconciler::catalog_dir;

/// Writes catalogs under the manifest lock
#[derive(Debug, Clone)]
pub struct ManifestPersister {
  checksummer: Checksummer,
  locks: &'static LockRegistry,
}

impl Default for ManifestPersister {
  fn default() -> Self {
    Self::new(Checksummer::default())
  }
}

impl ManifestPersister {
  pub fn new(checksummer: Checksummer) -> Self {
    Self::with_registry(checksummer, &MANIFEST_LOCKS)
  }

  pub fn with_registry(checksummer: Checksummer, locks: &'static LockRegistry) -> Self {
    Self { checksummer, locks }
  }

  pub fn locks(&self) -> &'static LockRegistry {
    self.locks
  }

  /// Take the catalog's lock, then write it
  pub fn write(&self, catalog: &mut Catalog, path: &Path, compute_checksums: bool, delta: &AuditSummary) -> Result<()> {
    self.prepare(catalog, path, compute_checksums)?;
    let _lock = self.locks.acquire(path)?;
    commit(catalog, path, delta)
  }

  /// Write while the caller already holds the catalog's lock
  pub fn write_under(
    &self,
    lock: &ManifestLock<'_>,
    catalog: &mut Catalog,
    compute_checksums: bool,
    delta: &AuditSummary,
  ) -> Result<()> {
    self.prepare(catalog, lock.path(), compute_checksums)?;
    commit(catalog, lock.path(), delta)
  }

  fn prepare(&self, catalog: &mut Catalog, path: &Path, compute_checksums: bool) -> Result<()> {
    let dir = catalog_dir(path);
    if compute_checksums {
      let filled = self.checksummer.fill_missing(&mut catalog.root, &dir);
      if filled > 0 {
        debug!("Filled {} missing digests before writing {}", filled, path.display());
      }
    }

    fs::create_dir_all(&dir)?;
    Ok(())
  }
}

/// Fold `delta` into the ledger and write. The caller's catalog only takes
/// the new ledger once the document is on disk, so a retry never folds twice.
fn commit(catalog: &mut Catalog, path: &Path, delta: &AuditSummary) -> Result<()> {
  if delta.is_empty() {
    return write_catalog(catalog, path);
  }

  let mut staged = catalog.clone();
  staged.set_audit_field(AuditSummary::merge(catalog.audit_field(), delta));
  write_catalog(&staged, path)?;
  *catalog = staged;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::document::read_catalog;
  use catalog_core::{ChangeKind, Entry};
  use tempfile::TempDir;

  #[test]
  fn test_write_folds_delta_once() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c.json");
    let mut catalog = Catalog::new("c");
    catalog.set_audit_field("1:2020-01-01T00:00:00.000Z=ADDED:2");

    let mut delta = AuditSummary::new();
    delta.record("2:2020-01-02T00:00:00.000Z", ChangeKind::Removed, 1);
    ManifestPersister::default().write(&mut catalog, &path, false, &delta).unwrap();

    let stored = read_catalog(&path).unwrap();
    assert_eq!(
      stored.audit_field(),
      Some("1:2020-01-01T00:00:00.000Z=ADDED:2|2:2020-01-02T00:00:00.000Z=REMOVED:1")
    );
  }

  #[test]
  fn test_failed_write_does_not_fold_delta() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c.json");
    let blocker = dir.path().join("c.json.lock");
    std::fs::create_dir(&blocker).unwrap();

    let mut catalog = Catalog::new("c");
    catalog.set_audit_field("1:2020-01-01T00:00:00.000Z=ADDED:2");
    let mut delta = AuditSummary::new();
    delta.record("2:2020-01-02T00:00:00.000Z", ChangeKind::Removed, 1);

    let persister = ManifestPersister::default();
    assert!(persister.write(&mut catalog, &path, false, &delta).is_err());
    assert_eq!(catalog.audit_field(), Some("1:2020-01-01T00:00:00.000Z=ADDED:2"));

    std::fs::remove_dir(&blocker).unwrap();
    persister.write(&mut catalog, &path, false, &delta).unwrap();

    let stored = read_catalog(&path).unwrap();
    assert_eq!(
      stored.audit_field(),
      Some("1:2020-01-01T00:00:00.000Z=ADDED:2|2:2020-01-02T00:00:00.000Z=REMOVED:1")
    );
    assert_eq!(catalog.audit_field(), stored.audit_field());
  }

  #[test]
  fn test_empty_delta_leaves_ledger_alone() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c.json");
    let mut catalog = Catalog::new("c");

    ManifestPersister::default()
      .write(&mut catalog, &path, false, &AuditSummary::new())
      .unwrap();
    assert!(read_catalog(&path).unwrap().audit_field().is_none());
  }

  #[test]
  fn test_catch_up_checksums() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
    let path = dir.path().join("c.json");
    let mut catalog = Catalog::new("c");
    catalog.root.push_entry(Entry::new("a.txt"));

    ManifestPersister::default()
      .write(&mut catalog, &path, true, &AuditSummary::new())
      .unwrap();
    let stored = read_catalog(&path).unwrap();
    assert_eq!(
      stored.find_entry("a.txt").unwrap().digest.as_deref(),
      Some("5d41402abc4b2a76b9719d911017c592")
    );
  }

  #[test]
  fn test_creates_destination_directory() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("c.json");
    let mut catalog = Catalog::new("c");

    ManifestPersister::default()
      .write(&mut catalog, &path, false, &AuditSummary::new())
      .unwrap();
    assert!(path.exists());
  }

  #[test]
  fn test_write_under_held_lock() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("c.json");
    let persister = ManifestPersister::default();
    let lock = persister.locks().acquire(&path).unwrap();

    let mut catalog = Catalog::new("c");
    persister
      .write_under(&lock, &mut catalog, false, &AuditSummary::new())
      .unwrap();
    assert!(path.exists());
  }
}
