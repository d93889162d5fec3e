//! Catalog write coordination
//!
//! Two layers guard every catalog write:
//! - A process-local registry keyed by canonical path serializes threads
//! - An OS advisory lock on `<catalog>.lock` serializes processes
//!
//! Registry slots are reference counted and dropped when the last holder or
//! waiter lets go, so the map only ever holds catalogs being written.

use fs4::fs_std::FileExt;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, LazyLock, Mutex, PoisonError};
use tracing::{debug, trace};

use crate::document::lock_path;
use crate::error::{CatalogError, Result};

/// Registry shared by every catalog service in this process
pub static MANIFEST_LOCKS: LazyLock<LockRegistry> = LazyLock::new(LockRegistry::new);

#[derive(Debug, Default)]
struct Slot {
  held: Mutex<bool>,
  released: Condvar,
}

#[derive(Debug)]
struct SlotRef {
  slot: Arc<Slot>,
  refs: usize,
}

/// Canonical path -> reference-counted lock slot
#[derive(Debug, Default)]
pub struct LockRegistry {
  slots: Mutex<HashMap<PathBuf, SlotRef>>,
}

impl LockRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Block until this thread holds the catalog at `path` exclusively.
  ///
  /// The catalog file itself need not exist, but its directory must.
  pub fn acquire(&self, path: &Path) -> Result<ManifestLock<'_>> {
    let key = canonical_key(path).map_err(|source| CatalogError::Lock {
      path: path.to_path_buf(),
      source,
    })?;
    let slot = self.checkout(&key);

    {
      let mut held = slot.held.lock().unwrap_or_else(PoisonError::into_inner);
      while *held {
        trace!("Waiting for in-process lock on {}", key.display());
        held = slot.released.wait(held).unwrap_or_else(PoisonError::into_inner);
      }
      *held = true;
    }

    match lock_file(&key) {
      Ok(file) => {
        debug!("Locked catalog {}", key.display());
        Ok(ManifestLock {
          registry: self,
          path: path.to_path_buf(),
          key,
          slot,
          file: Some(file),
        })
      }
      Err(source) => {
        self.release(&key, &slot);
        Err(CatalogError::Lock {
          path: path.to_path_buf(),
          source,
        })
      }
    }
  }

  /// Number of catalogs currently held or waited on
  pub fn active(&self) -> usize {
    self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  fn checkout(&self, key: &Path) -> Arc<Slot> {
    let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
    let entry = slots.entry(key.to_path_buf()).or_insert_with(|| SlotRef {
      slot: Arc::new(Slot::default()),
      refs: 0,
    });
    entry.refs += 1;
    Arc::clone(&entry.slot)
  }

  fn release(&self, key: &Path, slot: &Slot) {
    {
      let mut held = slot.held.lock().unwrap_or_else(PoisonError::into_inner);
      *held = false;
    }
    slot.released.notify_one();

    let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(entry) = slots.get_mut(key) {
      entry.refs -= 1;
      if entry.refs == 0 {
        slots.remove(key);
      }
    }
  }
}

/// Exclusive hold on one catalog; released on drop
pub struct ManifestLock<'a> {
  registry: &'a LockRegistry,
  path: PathBuf,
  key: PathBuf,
  slot: Arc<Slot>,
  file: Option<File>,
}

impl ManifestLock<'_> {
  /// The catalog path as the caller gave it
  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Drop for ManifestLock<'_> {
  fn drop(&mut self) {
    // Closing the sidecar releases the OS lock
    drop(self.file.take());
    self.registry.release(&self.key, &self.slot);
    debug!("Unlocked catalog {}", self.key.display());
  }
}

/// Canonical directory plus file name, so the catalog need not exist yet
fn canonical_key(path: &Path) -> std::io::Result<PathBuf> {
  let name = path
    .file_name()
    .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "catalog path has no file name"))?;
  let dir = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => fs::canonicalize(parent)?,
    _ => std::env::current_dir()?,
  };
  Ok(dir.join(name))
}

fn lock_file(key: &Path) -> std::io::Result<File> {
  let file = OpenOptions::new()
    .create(true)
    .truncate(false)
    .read(true)
    .write(true)
    .open(lock_path(key))?;
  file.lock_exclusive()?;
  Ok(file)
}
