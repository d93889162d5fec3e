pub mod audit;
pub mod catalog;
pub mod config;
pub mod error;
pub mod format;
pub mod resource;

pub use audit::{AuditSummary, ChangeKind};
pub use catalog::{
  AUDIT_FIELD, CATALOG_FORMAT, CATALOG_FORMAT_PREFIX, Catalog, CatalogStats, DICOM_FORMAT, Entry, EntryKind,
  MetaField, Node, Provenance, Subset, is_catalog_format,
};
pub use config::{
  CATALOG_CONFIG_DIR, ChecksumAlgorithm, ChecksumConfig, Config, HistoryConfig, LoggingConfig, RefreshConfig, StorageConfig,
};
pub use error::{Error, Result};
pub use format::format_bytes;
pub use resource::ResourceInfo;
