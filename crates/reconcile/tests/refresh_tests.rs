//! End-to-end refresh behaviour against real directory trees.

mod common;

use catalog_core::{AuditSummary, Catalog, ChangeKind, Entry};
use common::{catalog_fixture, completed, stamp, write_file};
use pretty_assertions::assert_eq;
use reconcile::{ReconcileOptions, ReconcileOutcome, read_catalog, write_catalog};
use std::collections::BTreeSet;
use std::thread;

fn digests(catalog: &Catalog) -> Vec<(String, Option<String>)> {
  let mut out: Vec<_> = catalog
    .root
    .all_entries()
    .into_iter()
    .map(|e| (e.uri.clone(), e.digest.clone()))
    .collect();
  out.sort();
  out
}

/// A second pass over an unchanged tree changes nothing
#[test]
fn test_refresh_is_idempotent() {
  let (dir, path, service) = catalog_fixture();
  write_file(dir.path(), "a.txt", b"alpha");
  write_file(dir.path(), "nested/b.bin", &[3u8; 2048]);

  let first = completed(service.refresh(&path, &stamp(1), service.refresh_options()).unwrap());
  assert!(first.modified);
  let after_first = service.load(&path).unwrap();
  let bytes_after_first = std::fs::read(&path).unwrap();

  let second = completed(service.refresh(&path, &stamp(2), service.refresh_options()).unwrap());
  assert!(!second.modified);
  assert!(second.audit.is_empty());

  let after_second = service.load(&path).unwrap();
  assert_eq!(digests(&after_first), digests(&after_second));
  assert_eq!(std::fs::read(&path).unwrap(), bytes_after_first);
}

/// A new file becomes exactly one entry with a digest and one ADDED count
#[test]
fn test_unreferenced_file_is_added() {
  let (dir, path, service) = catalog_fixture();
  write_file(dir.path(), "a.txt", b"0123456789");

  let info = stamp(5);
  let report = completed(service.refresh(&path, &info, service.refresh_options()).unwrap());
  assert_eq!(report.added, vec!["a.txt".to_string()]);
  assert_eq!(report.file_count, 1);
  assert_eq!(report.file_size, 10);

  let key = AuditSummary::event_key(Some(5), info.modified);
  assert_eq!(report.audit.count(&key, ChangeKind::Added), 1);

  let catalog = service.load(&path).unwrap();
  assert_eq!(catalog.entry_count(), 1);
  let entry = catalog.find_entry("a.txt").unwrap();
  assert!(entry.has_digest());
  assert_eq!(entry.created.event_id, Some(5));

  let stats = catalog.stats.unwrap();
  assert_eq!(stats.file_count, 1);
  assert_eq!(stats.file_size, 10);

  let ledger = AuditSummary::decode(catalog.audit_field().unwrap()).unwrap();
  assert_eq!(ledger.count(&key, ChangeKind::Added), 1);
}

/// Missing files are dropped only when removal is enabled
#[test]
fn test_missing_file_removal_is_opt_in() {
  let (dir, path, service) = catalog_fixture();
  write_file(dir.path(), "keep.txt", b"k");
  write_file(dir.path(), "missing.txt", b"m");
  completed(service.refresh(&path, &stamp(1), service.refresh_options()).unwrap());
  std::fs::remove_file(dir.path().join("missing.txt")).unwrap();

  let keep = ReconcileOptions {
    remove_missing: false,
    ..service.refresh_options()
  };
  let retained = completed(service.refresh(&path, &stamp(2), keep).unwrap());
  assert!(retained.removed.is_empty());
  assert_eq!(retained.audit.totals().get(&ChangeKind::Removed), None);
  assert!(service.load(&path).unwrap().find_entry("missing.txt").is_some());

  let drop = ReconcileOptions {
    remove_missing: true,
    ..service.refresh_options()
  };
  let info = stamp(3);
  let removed = completed(service.refresh(&path, &info, drop).unwrap());
  assert_eq!(removed.removed, vec!["missing.txt".to_string()]);
  let key = AuditSummary::event_key(Some(3), info.modified);
  assert_eq!(removed.audit.count(&key, ChangeKind::Removed), 1);

  let catalog = service.load(&path).unwrap();
  assert!(catalog.find_entry("missing.txt").is_none());
  assert!(catalog.find_entry("keep.txt").is_some());
}

/// A content change yields a new digest and one MODIFIED count
#[test]
fn test_content_change_is_modified_once() {
  let (dir, path, service) = catalog_fixture();
  write_file(dir.path(), "data.txt", b"before");
  write_file(dir.path(), "other.txt", b"steady");
  completed(service.refresh(&path, &stamp(1), service.refresh_options()).unwrap());
  let before = service.load(&path).unwrap();

  write_file(dir.path(), "data.txt", b"after!");
  let info = stamp(2);
  let report = completed(service.refresh(&path, &info, service.refresh_options()).unwrap());
  assert_eq!(report.updated, vec!["data.txt".to_string()]);
  let key = AuditSummary::event_key(Some(2), info.modified);
  assert_eq!(report.audit.count(&key, ChangeKind::Modified), 1);

  let after = service.load(&path).unwrap();
  assert_ne!(
    before.find_entry("data.txt").unwrap().digest,
    after.find_entry("data.txt").unwrap().digest
  );
  assert_eq!(
    before.find_entry("other.txt").unwrap().digest,
    after.find_entry("other.txt").unwrap().digest
  );
  let modified = after.find_entry("data.txt").unwrap().modified.clone().unwrap();
  assert_eq!(modified.event_id, Some(2));
}

/// The ledger keeps one record per changing pass
#[test]
fn test_ledger_appends_per_pass() {
  let (dir, path, service) = catalog_fixture();
  write_file(dir.path(), "a.txt", b"a");
  completed(service.refresh(&path, &stamp(1), service.refresh_options()).unwrap());
  write_file(dir.path(), "b.txt", b"b");
  completed(service.refresh(&path, &stamp(2), service.refresh_options()).unwrap());

  let catalog = service.load(&path).unwrap();
  let encoded = catalog.audit_field().unwrap();
  assert_eq!(encoded.split('|').count(), 2);

  let ledger = AuditSummary::decode(encoded).unwrap();
  assert_eq!(ledger.totals().get(&ChangeKind::Added), Some(&2));
}

/// Another catalog beside ours aborts the pass and leaves our document untouched
#[test]
fn test_second_catalog_in_directory_aborts() {
  let (dir, path, service) = catalog_fixture();
  service.open_or_create(&path, "scan").unwrap();
  write_file(dir.path(), "a.txt", b"a");
  write_catalog(&Catalog::new("rival"), &dir.path().join("rival_catalog.json")).unwrap();
  let before = std::fs::read(&path).unwrap();

  let outcome = service.refresh(&path, &stamp(1), service.refresh_options()).unwrap();
  match &outcome {
    ReconcileOutcome::Ambiguous { documents, .. } => {
      assert_eq!(documents, &vec![dir.path().join("rival_catalog.json")]);
    }
    other => panic!("Expected an ambiguous outcome, got {:?}", other),
  }
  assert!(!outcome.is_modified());
  assert_eq!(std::fs::read(&path).unwrap(), before);
}

/// Catalogs in subdirectories are neither an error nor catalog content
#[test]
fn test_nested_catalog_is_skipped() {
  let (dir, path, service) = catalog_fixture();
  write_file(dir.path(), "a.txt", b"a");
  std::fs::create_dir(dir.path().join("sub")).unwrap();
  write_catalog(&Catalog::new("inner"), &dir.path().join("sub").join("inner.json")).unwrap();
  write_file(dir.path(), "sub/config.json", br#"{"format": "not-a-catalog"}"#);

  let report = completed(service.refresh(&path, &stamp(1), service.refresh_options()).unwrap());
  let added: BTreeSet<_> = report.added.into_iter().collect();
  let expected: BTreeSet<_> = ["a.txt", "sub/config.json"].into_iter().map(String::from).collect();
  assert_eq!(added, expected);
}

/// A compressed data file stands in for its indexed plain name
#[test]
fn test_gz_data_file_matches_plain_entry() {
  let (dir, path, service) = catalog_fixture();
  let mut catalog = Catalog::new("scan");
  catalog.root.push_entry(Entry::new("volume.nii"));
  write_catalog(&catalog, &path).unwrap();
  write_file(dir.path(), "volume.nii.gz", b"compressed volume");

  let options = ReconcileOptions {
    remove_missing: true,
    ..service.refresh_options()
  };
  let report = completed(service.refresh(&path, &stamp(1), options).unwrap());
  assert!(report.added.is_empty());
  assert!(report.removed.is_empty());
  assert_eq!(report.file_size, 17);

  let stored = service.load(&path).unwrap();
  assert_eq!(stored.entry_count(), 1);
  assert!(stored.find_entry("volume.nii").unwrap().has_digest());
}

/// A gzip catalog stays gzip after refresh
#[test]
fn test_compressed_catalog_round_trip() {
  let (dir, _, service) = catalog_fixture();
  let path = dir.path().join("scan_catalog.json.gz");
  write_catalog(&Catalog::new("scan"), &path).unwrap();
  write_file(dir.path(), "a.txt", b"a");

  let plain = dir.path().join("scan_catalog.json");
  let report = completed(service.refresh(&plain, &stamp(1), service.refresh_options()).unwrap());
  assert_eq!(report.added, vec!["a.txt".to_string()]);
  assert!(!plain.exists());

  let raw = std::fs::read(&path).unwrap();
  assert_eq!(&raw[..2], &[0x1f, 0x8b]);
  assert_eq!(read_catalog(&path).unwrap().entry_count(), 1);
}

/// Concurrent refreshes of one catalog serialize and keep every addition
#[test]
fn test_concurrent_refreshes_union_additions() {
  let (dir, path, service) = catalog_fixture();
  service.open_or_create(&path, "scan").unwrap();

  thread::scope(|scope| {
    for worker in 0..4u64 {
      let (root, path, service) = (dir.path(), &path, &service);
      scope.spawn(move || {
        for round in 0..3u64 {
          write_file(root, &format!("w{}/r{}.txt", worker, round), b"payload");
          service
            .refresh(path, &stamp(worker * 10 + round), service.refresh_options())
            .unwrap();
        }
      });
    }
  });

  let catalog = read_catalog(&path).unwrap();
  assert_eq!(catalog.entry_count(), 12);
  assert!(catalog.root.duplicate_uris().is_empty());
  for worker in 0..4 {
    for round in 0..3 {
      assert!(catalog.find_entry(&format!("w{}/r{}.txt", worker, round)).is_some());
    }
  }

  let ledger = AuditSummary::decode(catalog.audit_field().unwrap()).unwrap();
  assert_eq!(ledger.totals().get(&ChangeKind::Added), Some(&12));
}

/// Per-catalog config is not catalog content
#[test]
fn test_config_directory_is_skipped() {
  let (dir, path, service) = catalog_fixture();
  write_file(dir.path(), ".catalog/config.toml", b"[refresh]\nremove_missing = true\n");
  write_file(dir.path(), "a.txt", b"a");

  let report = completed(service.refresh(&path, &stamp(1), service.refresh_options()).unwrap());
  assert_eq!(report.added, vec!["a.txt".to_string()]);
}

/// A symlinked file is catalog content like the file it points at
#[cfg(unix)]
#[test]
fn test_symlinked_file_is_kept() {
  let (dir, path, service) = catalog_fixture();
  let outside = tempfile::TempDir::new().unwrap();
  write_file(outside.path(), "volume.nii", b"linked volume");
  std::os::unix::fs::symlink(outside.path().join("volume.nii"), dir.path().join("volume.nii")).unwrap();
  write_file(dir.path(), "a.txt", b"a");

  let options = ReconcileOptions {
    remove_missing: true,
    ..service.refresh_options()
  };
  let first = completed(service.refresh(&path, &stamp(1), options).unwrap());
  let added: BTreeSet<_> = first.added.into_iter().collect();
  let expected: BTreeSet<_> = ["a.txt", "volume.nii"].into_iter().map(String::from).collect();
  assert_eq!(added, expected);
  assert_eq!(first.file_count, 2);
  assert_eq!(first.file_size, 14);

  let second = completed(service.refresh(&path, &stamp(2), options).unwrap());
  assert!(second.removed.is_empty());
  assert!(!second.modified);
  assert_eq!(second.file_count, 2);

  let catalog = service.load(&path).unwrap();
  assert!(catalog.find_entry("volume.nii").unwrap().has_digest());
}

/// Unreadable directories are skipped and counted, not fatal
#[cfg(unix)]
#[test]
fn test_unreadable_directory_is_skipped() {
  use std::os::unix::fs::PermissionsExt;

  let (dir, path, service) = catalog_fixture();
  write_file(dir.path(), "ok.txt", b"readable");
  write_file(dir.path(), "locked/secret.txt", b"hidden contents");
  let locked = dir.path().join("locked");
  std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

  // Permission bits don't bind a privileged user
  if std::fs::read_dir(&locked).is_ok() {
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
    return;
  }

  let outcome = service.refresh(&path, &stamp(1), service.refresh_options());
  std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

  let report = completed(outcome.unwrap());
  assert!(report.skipped >= 1);
  assert_eq!(report.added, vec!["ok.txt".to_string()]);
  assert_eq!(report.file_count, 1);
  assert_eq!(report.file_size, 8);

  let stats = service.load(&path).unwrap().stats.unwrap();
  assert_eq!(stats.file_count, 1);
  assert_eq!(stats.file_size, 8);
}
