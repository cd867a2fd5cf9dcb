//! The embedded transactional catalog: `files` (one row per indexed
//! `(path, host)`) and `backups` (one row per distinct content fingerprint).

pub mod catalog;
pub mod error;
pub mod model;

pub use catalog::{BackupWriter, Catalog, IndexWriter, BATCH_SIZE};
pub use error::CatalogError;
pub use model::{BackupRecord, BornSource, IndexedFile};
