//! Runtime settings with sensible defaults

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Tunables for resolution, egress, and staging.
///
/// Every field has a working default; embedders override what their
/// deployment needs. The Instagram session cookie is read from config
/// but never written back out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Total budget for one strategy HTTP request, in seconds.
    pub request_timeout_secs: u64,

    /// Connect budget for the streaming proxy client, in seconds. The
    /// proxy sets no total timeout so long downloads are not cut off.
    pub connect_timeout_secs: u64,

    /// How long to wait for a yt-dlp metadata probe, in seconds.
    pub probe_timeout_secs: u64,

    /// How long a cached resolution stays valid, in seconds.
    pub cache_ttl_secs: u64,

    /// Ceiling on a proxied download's declared size, in bytes.
    pub max_proxy_bytes: u64,

    /// Full Cookie header value for the authenticated Instagram path.
    /// Absent means that path is skipped, not an error.
    #[serde(skip_serializing)]
    pub instagram_session: Option<String>,

    /// Root directory for locally staged media.
    pub staging_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 15,
            connect_timeout_secs: 10,
            probe_timeout_secs: 30,
            cache_ttl_secs: 3600,
            max_proxy_bytes: 200 * 1024 * 1024,
            instagram_session: None,
            staging_dir: default_staging_dir(),
        }
    }
}

/// OS cache directory plus `vidgrab/staging`, falling back to the
/// system temp directory when no cache dir is available.
pub fn default_staging_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("vidgrab")
        .join("staging")
}
