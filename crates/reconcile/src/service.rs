//! Locked, end-to-end catalog operations.
//!
//! Every mutating call holds the catalog's lock from load to write, so
//! concurrent callers on one catalog see each other's changes rather than
//! overwriting them.

use catalog_core::{AuditSummary, CATALOG_CONFIG_DIR, Catalog, ChangeKind, Config, Entry, ResourceInfo};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::checksum::Checksummer;
use crate::document::{gz_sibling, is_compressed, resolve_existing};
use crate::error::{CatalogError, Result};
use crate::history::HistoryArchiver;
use crate::loader::{FormalizeReport, ManifestLoader};
use crate::lock::ManifestLock;
use crate::manifest_index::{IndexedEntry, ManifestIndex};
use crate::persist::ManifestPersister;
use crate::reconciler::{ReconcileOptions, ReconcileOutcome, Reconciler, catalog_dir};

/// Decoded ledger of a catalog
#[derive(Debug, Clone)]
pub struct AuditReport {
  pub summary: AuditSummary,
  pub totals: BTreeMap<ChangeKind, u64>,
}

pub struct CatalogService {
  config: Config,
  reconciler: Reconciler,
  loader: ManifestLoader,
  persister: ManifestPersister,
  history: HistoryArchiver,
}

impl CatalogService {
  pub fn new(config: Config) -> Self {
    let checksummer = Checksummer::new(&config.checksum);
    Self {
      reconciler: Reconciler::new(checksummer.clone())
        .exclude_dir(config.history.directory.clone())
        .exclude_dir(CATALOG_CONFIG_DIR),
      loader: ManifestLoader::new(checksummer.clone()),
      persister: ManifestPersister::new(checksummer),
      history: HistoryArchiver::new(&config.history),
      config,
    }
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  /// Options for a refresh using the configured defaults
  pub fn refresh_options(&self) -> ReconcileOptions {
    ReconcileOptions::from(&self.config.refresh)
  }

  /// Load the catalog at `path`, creating an empty one if it doesn't exist.
  ///
  /// New catalogs are written gzip-compressed when `storage.compress_new` is set.
  pub fn open_or_create(&self, path: &Path, catalog_id: &str) -> Result<(PathBuf, Catalog)> {
    if resolve_existing(path).is_some() {
      return self.loader.load(path);
    }

    let target = self.creation_path(path);
    fs::create_dir_all(catalog_dir(&target))?;
    let _lock = self.persister.locks().acquire(&target)?;
    self.loader.load_or_create(&target, catalog_id)
  }

  pub fn load(&self, path: &Path) -> Result<Catalog> {
    Ok(self.loader.load(path)?.1)
  }

  /// Reconcile a catalog against its directory and persist any changes
  pub fn refresh(&self, path: &Path, info: &ResourceInfo, options: ReconcileOptions) -> Result<ReconcileOutcome> {
    let (lock, mut catalog) = self.lock_and_load(path)?;

    let outcome = self.reconciler.reconcile(lock.path(), &mut catalog, info, options);
    if let ReconcileOutcome::Reconciled(report) = &outcome
      && report.modified
    {
      self
        .persister
        .write_under(&lock, &mut catalog, options.compute_checksums, &report.audit)?;
    }

    Ok(outcome)
  }

  /// Backfill provenance and blank digests without walking the directory
  pub fn formalize(
    &self,
    path: &Path,
    info: &ResourceInfo,
    compute_checksums: bool,
    remove_missing: bool,
  ) -> Result<FormalizeReport> {
    let (lock, mut catalog) = self.lock_and_load(path)?;
    let base_dir = catalog_dir(lock.path());

    let report = self
      .loader
      .formalize(&mut catalog, &base_dir, info, compute_checksums, remove_missing);
    if report.modified {
      self
        .persister
        .write_under(&lock, &mut catalog, compute_checksums, &report.audit)?;
    }

    Ok(report)
  }

  /// Overwrite the file behind `uri` with `source`, archiving the old copy when history is on.
  ///
  /// Returns the updated entry.
  pub fn replace_file(&self, path: &Path, uri: &str, source: &Path, info: &ResourceInfo) -> Result<Entry> {
    let (lock, mut catalog) = self.lock_and_load(path)?;
    let slot = find_slot(&catalog, lock.path(), uri)?;
    let root = catalog_dir(lock.path());
    let target = resolve_existing(&root.join(uri)).unwrap_or_else(|| root.join(uri));

    if target.exists() {
      self.archive(&lock, &target, &catalog, &slot, info);
    }
    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::copy(source, &target)?;

    let len = fs::metadata(&target)?.len();
    let digest = self.reconciler.checksummer().compute(&target, len);
    let entry = entry_mut(&mut catalog, lock.path(), uri, &slot)?;
    entry.digest = (!digest.is_empty()).then_some(digest);
    entry.stamp_modified(info);
    let updated = entry.clone();

    let mut delta = AuditSummary::new();
    delta.record(
      &AuditSummary::event_key(info.event_id, info.modified),
      ChangeKind::Modified,
      1,
    );
    self.persister.write_under(&lock, &mut catalog, false, &delta)?;

    info!("Replaced {} in {}", uri, lock.path().display());
    Ok(updated)
  }

  /// Delete the file behind `uri` and drop its entry. Returns the dropped entry.
  pub fn remove_file(&self, path: &Path, uri: &str, info: &ResourceInfo) -> Result<Entry> {
    let (lock, mut catalog) = self.lock_and_load(path)?;
    let slot = find_slot(&catalog, lock.path(), uri)?;
    let removed = entry_mut(&mut catalog, lock.path(), uri, &slot)?.clone();

    let root = catalog_dir(lock.path());
    if let Some(target) = resolve_existing(&root.join(uri)) {
      self.archive(&lock, &target, &catalog, &slot, info);
      if target.exists() {
        fs::remove_file(&target)?;
      }
    } else {
      debug!("No file behind {}, dropping the entry only", uri);
    }

    let uris: HashSet<String> = [uri.to_string()].into_iter().collect();
    if let Some(subset) = catalog.root.subset_at_mut(&slot.subset) {
      subset.remove_entries(&uris);
    }

    let mut delta = AuditSummary::new();
    delta.record(
      &AuditSummary::event_key(info.event_id, info.modified),
      ChangeKind::Removed,
      1,
    );
    self.persister.write_under(&lock, &mut catalog, false, &delta)?;

    info!("Removed {} from {}", uri, lock.path().display());
    Ok(removed)
  }

  pub fn audit(&self, path: &Path) -> Result<AuditReport> {
    let catalog = self.load(path)?;
    let summary = match catalog.audit_field() {
      Some(encoded) => AuditSummary::decode(encoded)?,
      None => AuditSummary::new(),
    };
    let totals = summary.totals();
    Ok(AuditReport { summary, totals })
  }

  fn lock_and_load(&self, path: &Path) -> Result<(ManifestLock<'static>, Catalog)> {
    let resolved = match resolve_existing(path) {
      Some(existing) => existing,
      None => self.creation_path(path),
    };
    fs::create_dir_all(catalog_dir(&resolved))?;

    let lock = self.persister.locks().acquire(&resolved)?;
    let (_, catalog) = self.loader.load_or_create(&resolved, &default_catalog_id(&resolved))?;
    Ok((lock, catalog))
  }

  fn creation_path(&self, path: &Path) -> PathBuf {
    if self.config.storage.compress_new && !is_compressed(path) {
      gz_sibling(path)
    } else {
      path.to_path_buf()
    }
  }

  fn archive(&self, lock: &ManifestLock<'_>, target: &Path, catalog: &Catalog, slot: &IndexedEntry, info: &ResourceInfo) {
    if !self.history.is_enabled() {
      return;
    }
    let Some(original) = catalog
      .root
      .subset_at(&slot.subset)
      .and_then(|subset| subset.children.get(slot.position))
      .and_then(|node| match node {
        catalog_core::Node::Entry(entry) => Some(entry),
        catalog_core::Node::Subset(_) => None,
      })
    else {
      return;
    };

    match self.history.archive(lock.path(), target, info.modified) {
      Some(moved) => {
        self.history.record_history_entry(lock, &moved, original, info);
      }
      None => warn!("Proceeding without a history copy of {}", target.display()),
    }
  }
}

fn find_slot(catalog: &Catalog, catalog_file: &Path, uri: &str) -> Result<IndexedEntry> {
  ManifestIndex::build(&catalog.root)
    .get(uri)
    .cloned()
    .ok_or_else(|| CatalogError::EntryNotFound {
      catalog: catalog_file.to_path_buf(),
      uri: uri.to_string(),
    })
}

fn entry_mut<'a>(catalog: &'a mut Catalog, catalog_file: &Path, uri: &str, slot: &IndexedEntry) -> Result<&'a mut Entry> {
  catalog
    .root
    .subset_at_mut(&slot.subset)
    .and_then(|subset| subset.entry_at_mut(slot.position))
    .ok_or_else(|| CatalogError::EntryNotFound {
      catalog: catalog_file.to_path_buf(),
      uri: uri.to_string(),
    })
}

/// Catalog id derived from the file name, minus its document extensions
pub fn default_catalog_id(path: &Path) -> String {
  let name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  let name = name.strip_suffix(".gz").unwrap_or(&name);
  name.strip_suffix(".json").unwrap_or(name).to_string()
}
