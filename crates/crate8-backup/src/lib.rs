//! The backup pipeline: plan one job per distinct content fingerprint, then
//! run a fixed worker pool that picks a canonical replica, derives a
//! content-addressed destination, and copies it in with verify-then-rename.

pub mod error;
pub mod model;
pub mod planner;
pub mod pipeline;
pub mod worker;

pub use error::BackupError;
pub use model::{BackupConfig, BackupJob};
pub use pipeline::{run_backup_pipeline, BackupRunStats};
pub use planner::plan_jobs;
pub use worker::run_backup_job;
