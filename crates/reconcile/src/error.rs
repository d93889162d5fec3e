use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON error: {0}")]
  Json(#[from] serde_json::Error),
  #[error(transparent)]
  Core(#[from] catalog_core::Error),
  #[error("Failed to lock {path}: {source}")]
  Lock {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
  #[error("Not a catalog document: {0}")]
  NotCatalog(PathBuf),
  #[error("No entry '{uri}' in catalog {catalog}")]
  EntryNotFound { catalog: PathBuf, uri: String },
}

pub type Result<T> = std::result::Result<T, CatalogError>;
