//! Utility modules for error handling, configuration, and labels

pub mod config;
pub mod error;
pub mod filename;
pub mod labels;

// Re-export for convenience
pub use config::Settings;
pub use error::{ErrorKind, VidgrabError};
pub use filename::{content_disposition, sanitize_download_name};
pub use labels::{duration_label, size_label};
