//! Shared fixtures for catalog integration tests

use catalog_core::{Config, ResourceInfo};
use chrono::{TimeZone, Utc};
use reconcile::{CatalogService, ReconcileOutcome, ReconcileReport};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A catalog directory with its catalog path and a service using default config
#[allow(dead_code)]
pub fn catalog_fixture() -> (TempDir, PathBuf, CatalogService) {
  let dir = TempDir::new().expect("Failed to create catalog temp dir");
  let path = dir.path().join("scan_catalog.json");
  (dir, path, CatalogService::new(Config::default()))
}

/// Pass stamp with a fixed time derived from the event id
#[allow(dead_code)]
pub fn stamp(event: u64) -> ResourceInfo {
  let time = Utc.timestamp_opt(1_600_000_000 + event as i64 * 60, 0).unwrap();
  ResourceInfo::at(Some("tester".to_string()), Some(event), time)
}

#[allow(dead_code)]
pub fn write_file(root: &Path, relative: &str, content: &[u8]) {
  let path = root.join(relative);
  if let Some(parent) = path.parent() {
    std::fs::create_dir_all(parent).unwrap();
  }
  std::fs::write(path, content).unwrap();
}

#[allow(dead_code)]
pub fn completed(outcome: ReconcileOutcome) -> ReconcileReport {
  match outcome {
    ReconcileOutcome::Reconciled(report) => report,
    other => panic!("Expected a completed pass, got {:?}", other),
  }
}
