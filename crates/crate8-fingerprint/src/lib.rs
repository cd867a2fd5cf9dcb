//! Content fingerprinting, type sniffing, and capture-time extraction.
//!
//! This crate knows nothing about the catalog, the filesystem walk, or the
//! backup pipeline; it answers exactly one question for a given file: *what is
//! it, and when was it made?*

pub mod error;
pub mod exif;
pub mod filename_time;
pub mod fingerprint;
pub mod sidecar;
pub mod sniff;

pub use error::{ExifError, FingerprintError};
pub use exif::{cache_path, extract, CaptureTime, ExifTool, ExtractionResult, RawExifToolOutput};
pub use filename_time::{best_filename_time, time_from_name};
pub use fingerprint::{fingerprint_file, Fingerprint, FingerprintOutput, SNIFF_HEAD_BYTES};
pub use sidecar::{related_siblings, RELATED_SIDECAR_EXTENSIONS};
pub use sniff::{sniff, MimeClass};
