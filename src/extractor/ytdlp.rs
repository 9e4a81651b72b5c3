//! yt-dlp subprocess wrapper
//!
//! Handles binary discovery, the metadata probe used by the YouTube
//! chain, and the merge-and-stream child the proxy uses for video-only
//! formats. Absence of the binary is a normal condition: the chain
//! falls through to network strategies and the proxy reports the
//! capability gap.

use crate::utils::error::{truncate_diagnostic, VidgrabError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Handle to a discovered yt-dlp binary.
pub struct YtDlp {
    path: PathBuf,
    probe_timeout: Duration,
}

/// Subset of `--dump-json` output the resolver cares about.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub formats: Vec<ProbeFormat>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProbeFormat {
    pub format_id: String,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
    #[serde(default)]
    pub url: Option<String>,
}

impl ProbeFormat {
    pub fn has_video(&self) -> bool {
        codec_present(self.vcodec.as_deref())
    }

    pub fn has_audio(&self) -> bool {
        codec_present(self.acodec.as_deref())
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.filesize.or(self.filesize_approx)
    }
}

fn codec_present(codec: Option<&str>) -> bool {
    matches!(codec, Some(c) if !c.is_empty() && c != "none")
}

impl YtDlp {
    /// Discover the binary: system PATH first, then conventional
    /// install locations. Returns `None` when nothing usable exists.
    pub fn locate(probe_timeout: Duration) -> Option<Self> {
        let path = find_ytdlp()?;
        debug!("Using yt-dlp at {}", path.display());
        Some(Self {
            path,
            probe_timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a metadata probe without downloading anything.
    pub async fn probe(&self, url: &str) -> Result<ProbeInfo, VidgrabError> {
        debug!("Probing {} with yt-dlp", url);

        let output = Command::new(&self.path)
            .arg("--dump-json")
            .arg("--no-download")
            .arg("--no-warnings")
            .arg("--no-playlist")
            .arg(url)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.probe_timeout, output)
            .await
            .map_err(|_| {
                VidgrabError::UpstreamUnavailable(format!(
                    "The metadata probe timed out after {}s. The video service may be slow; try again shortly.",
                    self.probe_timeout.as_secs()
                ))
            })?
            .map_err(|e| {
                VidgrabError::UpstreamUnavailable(format!(
                    "The yt-dlp helper could not be run ({})",
                    truncate_diagnostic(&e.to_string())
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp probe failed for {}: {}", url, truncate_diagnostic(&stderr));
            return Err(classify_probe_stderr(&stderr));
        }

        let info: ProbeInfo = serde_json::from_slice(&output.stdout).map_err(|e| {
            VidgrabError::ParseFailure(format!(
                "The probe returned output that could not be understood ({})",
                truncate_diagnostic(&e.to_string())
            ))
        })?;

        Ok(info)
    }

    /// Spawn a child that merges the chosen video format with the best
    /// audio and writes the muxed mp4 to stdout. The child dies with
    /// the handle, so dropping the consumer cancels the transfer.
    pub fn stream_merged(&self, url: &str, format_id: &str) -> Result<Child, VidgrabError> {
        let selector = format!(
            "{id}+bestaudio[ext=m4a]/{id}+bestaudio/best",
            id = format_id
        );
        debug!("Spawning yt-dlp merge stream for {} ({})", url, selector);

        Command::new(&self.path)
            .arg("-f")
            .arg(&selector)
            .arg("--merge-output-format")
            .arg("mp4")
            .arg("-o")
            .arg("-")
            .arg("--no-playlist")
            .arg("--no-warnings")
            .arg("--quiet")
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                VidgrabError::UpstreamUnavailable(format!(
                    "The yt-dlp helper could not be started for merged delivery ({})",
                    truncate_diagnostic(&e.to_string())
                ))
            })
    }
}

/// Map yt-dlp stderr onto the failure taxonomy.
pub fn classify_probe_stderr(stderr: &str) -> VidgrabError {
    let lowered = stderr.to_lowercase();

    if lowered.contains("sign in")
        || lowered.contains("login required")
        || lowered.contains("age-restricted")
        || lowered.contains("age restricted")
        || lowered.contains("confirm you")
    {
        return VidgrabError::LoginRequired(
            "YouTube is asking for a signed-in session to serve this video. Try a different public video, or use the download-page options.".to_string(),
        );
    }

    if lowered.contains("private video") || lowered.contains("private account") {
        return VidgrabError::Private(
            "This video is private and cannot be downloaded. Only public videos are supported.".to_string(),
        );
    }

    if lowered.contains("video unavailable")
        || lowered.contains("404")
        || lowered.contains("not found")
        || lowered.contains("does not exist")
        || lowered.contains("has been removed")
    {
        return VidgrabError::NotFound(
            "This video was not found. It may have been deleted; check that the URL is complete and correct.".to_string(),
        );
    }

    VidgrabError::ParseFailure(format!(
        "The video page could not be processed. It may use an unsupported layout ({})",
        truncate_diagnostic(stderr)
    ))
}

// ============================================================
// Binary discovery
// ============================================================

fn find_ytdlp() -> Option<PathBuf> {
    if let Ok(path) = which::which("yt-dlp") {
        if path.exists() {
            return Some(path);
        }
    }

    find_in_common_paths()
}

fn find_in_common_paths() -> Option<PathBuf> {
    let common_paths = [
        "/opt/homebrew/bin/yt-dlp",
        "/usr/local/bin/yt-dlp",
        "/usr/bin/yt-dlp",
        "~/.local/bin/yt-dlp",
    ];

    for path_str in common_paths {
        let expanded = if let Some(rest) = path_str.strip_prefix("~/") {
            match dirs::home_dir() {
                Some(home) => home.join(rest),
                None => continue,
            }
        } else {
            PathBuf::from(path_str)
        };

        if expanded.exists() && is_executable(&expanded) {
            return Some(expanded);
        }
    }

    None
}

fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if let Ok(metadata) = std::fs::metadata(path) {
            return metadata.permissions().mode() & 0o111 != 0;
        }
        false
    }

    #[cfg(not(unix))]
    {
        path.exists()
    }
}

// ============================================================
// Tests
// ============================================================
