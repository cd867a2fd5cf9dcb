pub mod error;
pub mod walk;

pub use error::WalkError;
pub use walk::{walk, WalkStats, DEFAULT_IGNORE_FILE_NAME};
