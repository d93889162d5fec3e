//! Windowed content digests.
//!
//! Only the first `window` bytes of a file feed the digest, where the window
//! is the file length clamped to `[min_window, max_window]`. Files larger than
//! the maximum window are fingerprinted by their head only: two large files
//! differing past the window share a digest. Callers needing full-file
//! integrity must not rely on these values.

use catalog_core::{ChecksumAlgorithm, ChecksumConfig, Node, Subset};
use md5::Md5;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::{debug, warn};

use crate::document::resolve_existing;

const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct Checksummer {
  algorithm: ChecksumAlgorithm,
  min_window: usize,
  max_window: usize,
}

impl Default for Checksummer {
  fn default() -> Self {
    Self::new(&ChecksumConfig::default())
  }
}

impl Checksummer {
  pub fn new(config: &ChecksumConfig) -> Self {
    let min_window = config.min_window.max(1);
    Self {
      algorithm: config.algorithm,
      min_window,
      max_window: config.max_window.max(min_window),
    }
  }

  pub fn algorithm(&self) -> ChecksumAlgorithm {
    self.algorithm
  }

  /// Number of leading bytes digested for a file of `len` bytes
  pub fn window_for(&self, len: u64) -> usize {
    let len = usize::try_from(len).unwrap_or(usize::MAX);
    len.clamp(self.min_window, self.max_window)
  }

  /// Lowercase hex digest, or an empty string if the file can't be read
  pub fn compute(&self, path: &Path, len: u64) -> String {
    match self.try_compute(path, len) {
      Ok(digest) => digest,
      Err(e) => {
        warn!("Failed to checksum {}: {}", path.display(), e);
        String::new()
      }
    }
  }

  fn try_compute(&self, path: &Path, len: u64) -> io::Result<String> {
    let file = File::open(path)?;
    let mut window = file.take(self.window_for(len) as u64);
    match self.algorithm {
      ChecksumAlgorithm::Md5 => digest_reader::<Md5>(&mut window),
      ChecksumAlgorithm::Sha256 => digest_reader::<Sha256>(&mut window),
    }
  }

  /// Compute digests for leaves that have none. Existing digests are never touched.
  ///
  /// Returns the number of digests filled in.
  pub fn fill_missing(&self, subset: &mut Subset, base_dir: &Path) -> usize {
    let mut filled = 0;
    for node in &mut subset.children {
      match node {
        Node::Subset(nested) => filled += self.fill_missing(nested, base_dir),
        Node::Entry(entry) if !entry.has_digest() => {
          let Some(path) = resolve_existing(&base_dir.join(&entry.uri)) else {
            debug!("No file for entry {}, leaving digest blank", entry.uri);
            continue;
          };
          let Ok(metadata) = path.metadata() else {
            continue;
          };
          let digest = self.compute(&path, metadata.len());
          if !digest.is_empty() {
            entry.digest = Some(digest);
            filled += 1;
          }
        }
        Node::Entry(_) => {}
      }
    }
    filled
  }
}

fn digest_reader<D: Digest>(reader: &mut impl Read) -> io::Result<String> {
  let mut hasher = D::new();
  let mut buffer = [0u8; READ_CHUNK];
  loop {
    let n = match reader.read(&mut buffer) {
      Ok(0) => break,
      Ok(n) => n,
      Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    };
    hasher.update(&buffer[..n]);
  }
  Ok(hex::encode(hasher.finalize()))
}
