//! Directory-tree reconciliation.
//!
//! One walk of the catalog's directory classifies every file as unchanged,
//! content-changed, or unreferenced, then optionally drops entries whose files
//! were never seen. The walk finishes before the catalog is touched, so an
//! aborted pass leaves no partial mutation behind.

use catalog_core::{AuditSummary, Catalog, CatalogStats, ChangeKind, Entry, RefreshConfig, ResourceInfo};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::checksum::Checksummer;
use crate::document::{LOCK_SUFFIX, TEMP_PREFIX, looks_like_catalog};
use crate::manifest_index::{IndexedEntry, ManifestIndex};

/// What a reconciliation pass is allowed to change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
  pub add_unreferenced: bool,
  pub remove_missing: bool,
  pub populate_stats: bool,
  pub compute_checksums: bool,
}

impl Default for ReconcileOptions {
  fn default() -> Self {
    Self::from(&RefreshConfig::default())
  }
}

impl From<&RefreshConfig> for ReconcileOptions {
  fn from(config: &RefreshConfig) -> Self {
    Self {
      add_unreferenced: config.add_unreferenced,
      remove_missing: config.remove_missing,
      populate_stats: config.populate_stats,
      compute_checksums: config.compute_checksums,
    }
  }
}

/// Result of a pass that ran to completion
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
  pub modified: bool,
  /// This pass's counts only, keyed by (event id, pass time)
  pub audit: AuditSummary,
  pub added: Vec<String>,
  pub updated: Vec<String>,
  pub removed: Vec<String>,
  pub file_count: u64,
  pub file_size: u64,
  /// Files that could not be read during the walk
  pub skipped: u32,
  pub duration: Duration,
}

#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
  Reconciled(ReconcileReport),
  /// More than one catalog document sits in the catalog's directory; nothing was changed
  Ambiguous { directory: PathBuf, documents: Vec<PathBuf> },
}

impl ReconcileOutcome {
  pub fn is_modified(&self) -> bool {
    matches!(self, ReconcileOutcome::Reconciled(report) if report.modified)
  }

  pub fn report(&self) -> Option<&ReconcileReport> {
    match self {
      ReconcileOutcome::Reconciled(report) => Some(report),
      ReconcileOutcome::Ambiguous { .. } => None,
    }
  }
}

/// A regular file found by the walk
#[derive(Debug)]
struct WalkedFile {
  path: PathBuf,
  relative: String,
  len: u64,
}

#[derive(Debug, Default)]
struct Walk {
  files: Vec<WalkedFile>,
  foreign_catalogs: Vec<PathBuf>,
  skipped: u32,
}

/// Reconciles a catalog against the directory tree it lives in
#[derive(Debug, Clone)]
pub struct Reconciler {
  checksummer: Checksummer,
  excluded_dirs: Vec<PathBuf>,
}

impl Reconciler {
  pub fn new(checksummer: Checksummer) -> Self {
    Self {
      checksummer,
      excluded_dirs: Vec::new(),
    }
  }

  /// Skip a directory during the walk, given relative to the catalog root
  pub fn exclude_dir(mut self, relative: impl Into<PathBuf>) -> Self {
    self.excluded_dirs.push(relative.into());
    self
  }

  pub fn checksummer(&self) -> &Checksummer {
    &self.checksummer
  }

  /// Bring `catalog` in line with the files under `catalog_file`'s directory.
  ///
  /// The pass is stamped with `info`: new entries take its creation details,
  /// content changes its modification details, and the audit delta is keyed
  /// by its event id and modification time.
  pub fn reconcile(
    &self,
    catalog_file: &Path,
    catalog: &mut Catalog,
    info: &ResourceInfo,
    options: ReconcileOptions,
  ) -> ReconcileOutcome {
    let start = Instant::now();
    let root = catalog_dir(catalog_file);
    let catalog_name = catalog_file
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();

    let walk = self.walk(&root, &catalog_name);
    if !walk.foreign_catalogs.is_empty() {
      warn!(
        "Found {} other catalog document(s) in {}, refusing to reconcile {}",
        walk.foreign_catalogs.len(),
        root.display(),
        catalog_name
      );
      return ReconcileOutcome::Ambiguous {
        directory: root,
        documents: walk.foreign_catalogs,
      };
    }

    let mut report = ReconcileReport {
      skipped: walk.skipped,
      ..Default::default()
    };
    let audit_key = AuditSummary::event_key(info.event_id, info.modified);
    let mut index = ManifestIndex::build(&catalog.root);
    let walked: HashSet<&str> = walk.files.iter().map(|f| f.relative.as_str()).collect();

    for file in &walk.files {
      match resolve_uri(&index, &walked, &file.relative) {
        Some(uri) => {
          let Some(slot) = index.mark_present(&uri) else {
            continue;
          };
          self.refresh_entry(catalog, &uri, &slot, file, info, options, &audit_key, &mut report);
        }
        None if options.add_unreferenced => {
          self.add_entry(catalog, file, info, options, &audit_key, &mut report);
        }
        None => {
          debug!("Ignoring unreferenced file {}", file.relative);
          continue;
        }
      }

      if options.populate_stats {
        report.file_count += 1;
        report.file_size += file.len;
      }
    }

    if options.remove_missing {
      remove_missing(catalog, &index, &audit_key, &mut report);
    }

    if options.populate_stats {
      let stats = CatalogStats {
        file_count: report.file_count,
        file_size: report.file_size,
      };
      if catalog.stats != Some(stats) {
        catalog.stats = Some(stats);
        report.modified = true;
      }
    }

    report.duration = start.elapsed();
    info!(
      catalog = %catalog_file.display(),
      added = report.added.len(),
      updated = report.updated.len(),
      removed = report.removed.len(),
      skipped = report.skipped,
      modified = report.modified,
      "Reconciled catalog in {:?}",
      report.duration
    );

    ReconcileOutcome::Reconciled(report)
  }

  fn walk(&self, root: &Path, catalog_name: &str) -> Walk {
    let mut walk = Walk::default();
    let lock_name = format!("{}{}", catalog_name, LOCK_SUFFIX);

    let walker = WalkDir::new(root)
      .follow_links(false)
      .sort_by_file_name()
      .into_iter()
      .filter_entry(|entry| !(entry.file_type().is_dir() && self.is_excluded(root, entry.path())));

    for entry in walker {
      let entry = match entry {
        Ok(entry) => entry,
        Err(e) => {
          warn!("Skipping unreadable path under {}: {}", root.display(), e);
          walk.skipped += 1;
          continue;
        }
      };

      if entry.file_type().is_dir() {
        continue;
      }

      let name = entry.file_name().to_string_lossy();
      if entry.depth() == 1 && (name == catalog_name || name == lock_name.as_str()) {
        continue;
      }
      if name.starts_with(TEMP_PREFIX) {
        continue;
      }

      let path = entry.path().to_path_buf();
      // Follows links: a linked file counts as the file it points at, a linked directory is not entered
      let metadata = match std::fs::metadata(&path) {
        Ok(metadata) => metadata,
        Err(e) => {
          warn!("Skipping {}: {}", path.display(), e);
          walk.skipped += 1;
          continue;
        }
      };
      if !metadata.is_file() {
        continue;
      }

      if looks_like_catalog(&path) {
        if entry.depth() == 1 {
          walk.foreign_catalogs.push(path);
        } else {
          debug!("Leaving nested catalog {} alone", path.display());
        }
        continue;
      }

      let Some(relative) = relative_uri(root, &path) else {
        continue;
      };

      walk.files.push(WalkedFile {
        path,
        relative,
        len: metadata.len(),
      });
    }

    walk
  }

  fn is_excluded(&self, root: &Path, dir: &Path) -> bool {
    let relative = dir.strip_prefix(root).ok();
    self.excluded_dirs.iter().any(|excluded| {
      if excluded.is_absolute() {
        dir == excluded.as_path()
      } else {
        relative == Some(excluded.as_path())
      }
    })
  }

  #[allow(clippy::too_many_arguments)]
  fn refresh_entry(
    &self,
    catalog: &mut Catalog,
    uri: &str,
    slot: &IndexedEntry,
    file: &WalkedFile,
    info: &ResourceInfo,
    options: ReconcileOptions,
    audit_key: &str,
    report: &mut ReconcileReport,
  ) {
    let Some(entry) = catalog
      .root
      .subset_at_mut(&slot.subset)
      .and_then(|subset| subset.entry_at_mut(slot.position))
    else {
      warn!("Index points at a missing entry for {}", uri);
      return;
    };

    if entry.backfill(&slot.id_prefix, info) {
      report.modified = true;
    }
    if entry.enforce_kind_format() {
      report.modified = true;
    }

    if options.compute_checksums {
      let digest = self.checksummer.compute(&file.path, file.len);
      if !digest.is_empty() && entry.digest.as_deref() != Some(digest.as_str()) {
        debug!("Content of {} changed", uri);
        entry.digest = Some(digest);
        entry.stamp_modified(info);
        report.audit.record(audit_key, ChangeKind::Modified, 1);
        report.updated.push(uri.to_string());
        report.modified = true;
      }
    }
  }

  fn add_entry(
    &self,
    catalog: &mut Catalog,
    file: &WalkedFile,
    info: &ResourceInfo,
    options: ReconcileOptions,
    audit_key: &str,
    report: &mut ReconcileReport,
  ) {
    let mut entry = Entry::created_from(file.relative.as_str(), "", info);
    if options.compute_checksums {
      let digest = self.checksummer.compute(&file.path, file.len);
      if !digest.is_empty() {
        entry.digest = Some(digest);
      }
    }

    debug!("Adding {}", file.relative);
    catalog.root.push_entry(entry);
    report.audit.record(audit_key, ChangeKind::Added, 1);
    report.added.push(file.relative.clone());
    report.modified = true;
  }
}

/// Directory a catalog file describes
pub fn catalog_dir(catalog_file: &Path) -> PathBuf {
  match catalog_file.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
    _ => PathBuf::from("."),
  }
}

/// `/`-separated path of `path` below `root`
fn relative_uri(root: &Path, path: &Path) -> Option<String> {
  let relative = path.strip_prefix(root).ok()?;
  let parts: Vec<String> = relative
    .components()
    .map(|c| c.as_os_str().to_string_lossy().into_owned())
    .collect();
  (!parts.is_empty()).then(|| parts.join("/"))
}

/// Index key for a walked file. A compressed `x.gz` stands in for an indexed
/// `x` when no plain `x` was walked.
fn resolve_uri(index: &ManifestIndex, walked: &HashSet<&str>, relative: &str) -> Option<String> {
  if index.contains(relative) {
    return Some(relative.to_string());
  }
  let plain = relative.strip_suffix(".gz")?;
  (index.contains(plain) && !walked.contains(plain)).then(|| plain.to_string())
}

fn remove_missing(catalog: &mut Catalog, index: &ManifestIndex, audit_key: &str, report: &mut ReconcileReport) {
  let mut by_subset: HashMap<Vec<usize>, HashSet<String>> = HashMap::new();
  for (uri, slot) in index.missing() {
    by_subset.entry(slot.subset.clone()).or_default().insert(uri.to_string());
  }

  // Deepest subsets first: removing leaves from a parent shifts the
  // positions recorded for its nested subsets.
  let mut subsets: Vec<_> = by_subset.into_iter().collect();
  subsets.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

  for (path, uris) in subsets {
    let Some(subset) = catalog.root.subset_at_mut(&path) else {
      warn!("Index points at a missing subset {:?}", path);
      continue;
    };
    let dropped = subset.remove_entries(&uris);
    if dropped == 0 {
      continue;
    }

    let mut uris: Vec<String> = uris.into_iter().collect();
    uris.sort();
    debug!("Removing {} missing entries", dropped);
    report.audit.record(audit_key, ChangeKind::Removed, dropped as u64);
    report.removed.extend(uris);
    report.modified = true;
  }
}
