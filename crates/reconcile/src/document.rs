//! Catalog document I/O: plain or gzip JSON, chosen by a `.gz` suffix.

use catalog_core::{Catalog, is_catalog_format};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{CatalogError, Result};

/// Sidecar file holding the advisory lock for a catalog
pub const LOCK_SUFFIX: &str = ".lock";

/// Prefix of in-flight temporary files next to a catalog being written
pub const TEMP_PREFIX: &str = ".catalog-tmp";

const GZ_SUFFIX: &str = ".gz";

pub fn is_compressed(path: &Path) -> bool {
  path
    .file_name()
    .is_some_and(|name| name.to_string_lossy().ends_with(GZ_SUFFIX))
}

/// `path` with `.gz` appended to its file name
pub fn gz_sibling(path: &Path) -> PathBuf {
  let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(GZ_SUFFIX);
  path.with_file_name(name)
}

/// Resolve a path, falling back to its `.gz` sibling when the plain file is absent
pub fn resolve_existing(path: &Path) -> Option<PathBuf> {
  if path.exists() {
    return Some(path.to_path_buf());
  }
  if is_compressed(path) {
    return None;
  }
  let compressed = gz_sibling(path);
  compressed.exists().then_some(compressed)
}

/// Path of the lock sidecar for a catalog
pub fn lock_path(catalog_path: &Path) -> PathBuf {
  let mut name = catalog_path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
  name.push(LOCK_SUFFIX);
  catalog_path.with_file_name(name)
}

/// Whether the file name is one a catalog could be stored under
pub fn has_catalog_name(path: &Path) -> bool {
  let Some(name) = path.file_name() else {
    return false;
  };
  let name = name.to_string_lossy().to_ascii_lowercase();
  name.ends_with(".json") || name.ends_with(".json.gz")
}

#[derive(Deserialize)]
struct FormatHeader {
  #[serde(default)]
  format: String,
}

/// Whether the file is a catalog document: right name, and a catalog format marker inside
pub fn looks_like_catalog(path: &Path) -> bool {
  if !has_catalog_name(path) {
    return false;
  }
  match open_reader(path).and_then(|reader| Ok(serde_json::from_reader::<_, FormatHeader>(reader)?)) {
    Ok(header) => is_catalog_format(&header.format),
    Err(e) => {
      debug!("{} is not a catalog: {}", path.display(), e);
      false
    }
  }
}

fn open_reader(path: &Path) -> Result<Box<dyn Read>> {
  let file = File::open(path)?;
  if is_compressed(path) {
    Ok(Box::new(BufReader::new(GzDecoder::new(file))))
  } else {
    Ok(Box::new(BufReader::new(file)))
  }
}

/// Parse a catalog document, decompressing if the path ends in `.gz`
pub fn read_catalog(path: &Path) -> Result<Catalog> {
  let catalog: Catalog = serde_json::from_reader(open_reader(path)?)?;
  if !is_catalog_format(&catalog.format) {
    return Err(CatalogError::NotCatalog(path.to_path_buf()));
  }
  Ok(catalog)
}

/// Serialize a catalog next to `path` and rename it into place.
///
/// Readers see either the previous document or the new one, never a partial write.
pub fn write_catalog(catalog: &Catalog, path: &Path) -> Result<()> {
  let dir = match path.parent() {
    Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
    _ => PathBuf::from("."),
  };
  fs::create_dir_all(&dir)?;

  let temp = tempfile::Builder::new().prefix(TEMP_PREFIX).tempfile_in(&dir)?;
  {
    let mut writer = BufWriter::new(temp.as_file());
    if is_compressed(path) {
      let mut encoder = GzEncoder::new(&mut writer, Compression::default());
      serde_json::to_writer_pretty(&mut encoder, catalog)?;
      encoder.finish()?;
    } else {
      serde_json::to_writer_pretty(&mut writer, catalog)?;
      writer.write_all(b"\n")?;
    }
    writer.flush()?;
  }
  temp.as_file().sync_all()?;
  temp.persist(path).map_err(|e| CatalogError::Io(e.error))?;

  debug!("Wrote catalog {} ({} entries)", path.display(), catalog.entry_count());
  Ok(())
}
