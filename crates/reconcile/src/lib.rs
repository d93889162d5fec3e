pub mod checksum;
pub mod document;
pub mod error;
pub mod history;
pub mod loader;
pub mod lock;
pub mod manifest_index;
pub mod persist;
pub mod reconciler;
pub mod service;

pub use checksum::Checksummer;
pub use document::{looks_like_catalog, read_catalog, resolve_existing, write_catalog};
pub use error::{CatalogError, Result};
pub use history::HistoryArchiver;
pub use loader::{FormalizeReport, ManifestLoader};
pub use lock::{LockRegistry, MANIFEST_LOCKS, ManifestLock};
pub use manifest_index::{IndexedEntry, ManifestIndex};
pub use persist::ManifestPersister;
pub use reconciler::{ReconcileOptions, ReconcileOutcome, ReconcileReport, Reconciler, catalog_dir};
pub use service::{AuditReport, CatalogService, default_catalog_id};
