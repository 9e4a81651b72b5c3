//! Local media staging
//!
//! Pulls an upstream media URL down into a per-item staging directory
//! so the proxy's local-file branch can serve it later. Used when a
//! download needs to survive upstream link expiry.

use crate::extractor::net::streaming_client;
use crate::utils::error::truncate_diagnostic;
use crate::utils::{sanitize_download_name, size_label, Settings, VidgrabError};
use futures::StreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

pub struct MediaStager {
    root: PathBuf,
    client: Client,
    max_bytes: u64,
}

/// A file the stager wrote, ready for the proxy's local-file branch.
#[derive(Debug)]
pub struct StagedMedia {
    pub path: PathBuf,
    pub bytes: u64,
}

impl StagedMedia {
    /// Remove the per-item staging directory. Best-effort; a leftover
    /// directory is an operational nuisance, not a correctness problem.
    pub async fn discard(self) {
        let Some(dir) = self.path.parent().map(|p| p.to_path_buf()) else {
            return;
        };
        if let Err(e) = tokio::fs::remove_dir_all(&dir).await {
            warn!("Could not discard staging dir {}: {}", dir.display(), e);
        }
    }
}

impl MediaStager {
    pub fn new(settings: &Settings) -> Self {
        Self {
            root: settings.staging_dir.clone(),
            client: streaming_client(Duration::from_secs(settings.connect_timeout_secs)),
            max_bytes: settings.max_proxy_bytes,
        }
    }

    /// Stream a media URL into a fresh staging directory and return the
    /// staged file.
    pub async fn stage_from_url(
        &self,
        url: &str,
        suggested_name: &str,
    ) -> Result<StagedMedia, VidgrabError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            VidgrabError::UpstreamFetchFailed(format!(
                "Could not reach the media host for staging ({})",
                truncate_diagnostic(&e.to_string())
            ))
        })?;

        if !response.status().is_success() {
            return Err(VidgrabError::UpstreamFetchFailed(format!(
                "The media host answered HTTP {} while staging this download.",
                response.status().as_u16()
            )));
        }

        let declared_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if let Some(length) = declared_length {
            if length > self.max_bytes {
                return Err(VidgrabError::TooLarge(format!(
                    "This file is {} but staging only accepts up to {}. Pick a lower quality.",
                    size_label(Some(length)),
                    size_label(Some(self.max_bytes))
                )));
            }
        }

        let dir = self.root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(sanitize_download_name(suggested_name));

        debug!("Staging {} into {}", url, path.display());
        let mut file = tokio::fs::File::create(&path).await?;
        let mut body = response.bytes_stream();
        let mut bytes: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                VidgrabError::UpstreamFetchFailed(format!(
                    "The media stream broke off while staging ({})",
                    truncate_diagnostic(&e.to_string())
                ))
            })?;
            bytes += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        file.sync_all().await?;

        debug!("Staged {} ({} bytes)", path.display(), bytes);
        Ok(StagedMedia { path, bytes })
    }
}
