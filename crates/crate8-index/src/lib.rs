//! The index pipeline: walk, fingerprint, extract metadata, write — as a
//! bounded producer/consumer over blocking OS threads.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod worker;

pub use config::IndexConfig;
pub use error::IndexError;
pub use pipeline::{run_index_pipeline, IndexRunStats};
pub use worker::index_one;
