//! Catalog loading and load-time normalization.

use catalog_core::{AuditSummary, Catalog, ChangeKind, Node, ResourceInfo, Subset};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::checksum::Checksummer;
use crate::document::{read_catalog, resolve_existing, write_catalog};
use crate::error::Result;
use crate::manifest_index::join_prefix;

/// Outcome of a formalize pass
#[derive(Debug, Clone, Default)]
pub struct FormalizeReport {
  pub modified: bool,
  pub backfilled: usize,
  pub checksummed: usize,
  pub removed: Vec<String>,
  /// REMOVED counts for this pass, not yet folded into the catalog
  pub audit: AuditSummary,
}

#[derive(Debug, Clone, Default)]
pub struct ManifestLoader {
  checksummer: Checksummer,
}

impl ManifestLoader {
  pub fn new(checksummer: Checksummer) -> Self {
    Self { checksummer }
  }

  /// Read a catalog, trying `<path>.gz` when `path` is absent.
  ///
  /// Catalogs written before auditing existed get a ledger rebuilt from entry
  /// provenance here, ahead of any mutation.
  pub fn load(&self, path: &Path) -> Result<(PathBuf, Catalog)> {
    let resolved = resolve_existing(path).unwrap_or_else(|| path.to_path_buf());
    let mut catalog = read_catalog(&resolved)?;

    if catalog.audit_field().is_none() && catalog.entry_count() > 0 {
      let rebuilt = AuditSummary::rebuild(&catalog.root);
      if !rebuilt.is_empty() {
        debug!("Rebuilt audit ledger for {} from entry provenance", resolved.display());
        catalog.set_audit_field(rebuilt.encode());
      }
    }

    let duplicates = catalog.root.duplicate_uris();
    if !duplicates.is_empty() {
      warn!(
        "Catalog {} lists {} URI(s) more than once: {}",
        resolved.display(),
        duplicates.len(),
        duplicates.join(", ")
      );
    }

    Ok((resolved, catalog))
  }

  /// Load the catalog at `path`, or write an empty one with `catalog_id` if none exists.
  ///
  /// Returns the path the catalog actually lives at.
  pub fn load_or_create(&self, path: &Path, catalog_id: &str) -> Result<(PathBuf, Catalog)> {
    if resolve_existing(path).is_some() {
      return self.load(path);
    }

    let catalog = Catalog::new(catalog_id);
    write_catalog(&catalog, path)?;
    info!("Created empty catalog {}", path.display());
    Ok((path.to_path_buf(), catalog))
  }

  /// Normalize a loaded catalog without walking its directory.
  ///
  /// Digests are computed only where blank. A full refresh recomputes and
  /// compares every digest; this pass must stay cheap and must never
  /// replace a stored digest.
  pub fn formalize(
    &self,
    catalog: &mut Catalog,
    base_dir: &Path,
    info: &ResourceInfo,
    compute_checksums: bool,
    remove_missing: bool,
  ) -> FormalizeReport {
    let mut report = FormalizeReport::default();
    self.formalize_subset(&mut catalog.root, "", base_dir, compute_checksums, remove_missing, info, &mut report);

    if !report.removed.is_empty() {
      let key = AuditSummary::event_key(info.event_id, info.modified);
      report.audit.record(&key, ChangeKind::Removed, report.removed.len() as u64);
    }
    report.modified = report.backfilled > 0 || report.checksummed > 0 || !report.removed.is_empty();
    report
  }

  #[allow(clippy::too_many_arguments)]
  fn formalize_subset(
    &self,
    subset: &mut Subset,
    prefix: &str,
    base_dir: &Path,
    compute_checksums: bool,
    remove_missing: bool,
    info: &ResourceInfo,
    report: &mut FormalizeReport,
  ) {
    let mut gone = Vec::new();

    for node in &mut subset.children {
      match node {
        Node::Subset(nested) => {
          let nested_prefix = join_prefix(prefix, &nested.id);
          self.formalize_subset(
            nested,
            &nested_prefix,
            base_dir,
            compute_checksums,
            remove_missing,
            info,
            report,
          );
        }
        Node::Entry(entry) => {
          let backfilled = entry.backfill(prefix, info);
          let reformatted = entry.enforce_kind_format();
          if backfilled || reformatted {
            report.backfilled += 1;
          }

          let file = resolve_existing(&base_dir.join(&entry.uri));
          match file {
            Some(path) if compute_checksums && !entry.has_digest() => {
              let len = path.metadata().map(|m| m.len()).unwrap_or(0);
              let digest = self.checksummer.compute(&path, len);
              if !digest.is_empty() {
                entry.digest = Some(digest);
                report.checksummed += 1;
              }
            }
            Some(_) => {}
            None if remove_missing => gone.push(entry.uri.clone()),
            None => {}
          }
        }
      }
    }

    if !gone.is_empty() {
      let uris = gone.iter().cloned().collect();
      subset.remove_entries(&uris);
      debug!("Dropped {} entries with no file from subset '{}'", gone.len(), subset.id);
      report.removed.extend(gone);
    }
  }
}
