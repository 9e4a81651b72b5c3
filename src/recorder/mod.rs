//! Usage recording
//!
//! Resolutions, downloads, and failures are reported here as
//! fire-and-forget events. Recorders are infallible at the trait
//! surface: storage problems are logged and swallowed, never returned.

pub mod sqlite;

pub use sqlite::{DownloadRow, FailureRow, PopularRow, SqliteRecorder};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// A completed media hand-off worth counting.
#[derive(Debug, Clone)]
pub struct DownloadEvent {
    pub url: String,
    pub platform: String,
    pub quality: String,
    pub title: String,
    pub user_agent: String,
    pub country: String,
    pub timestamp: DateTime<Utc>,
}

impl DownloadEvent {
    pub fn new(url: &str, platform: &str, quality: &str, title: &str) -> Self {
        Self {
            url: url.to_string(),
            platform: platform.to_string(),
            quality: quality.to_string(),
            title: title.to_string(),
            user_agent: "Unknown".to_string(),
            country: "Unknown".to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_client_context(mut self, user_agent: Option<&str>, country: Option<&str>) -> Self {
        if let Some(ua) = user_agent {
            self.user_agent = ua.to_string();
        }
        if let Some(c) = country {
            self.country = c.to_string();
        }
        self
    }
}

/// A resolution that ended in an error.
#[derive(Debug, Clone)]
pub struct FailureEvent {
    pub url: String,
    pub error_message: String,
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl FailureEvent {
    pub fn new(url: &str, error_message: &str) -> Self {
        Self {
            url: url.to_string(),
            error_message: error_message.to_string(),
            detail: None,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
pub trait UsageRecorder: Send + Sync {
    async fn record_download(&self, event: DownloadEvent);
    async fn record_failure(&self, event: FailureEvent);
}

/// Recorder backed by plain vectors, for embedders that want counters
/// without persistence and for tests.
#[derive(Default)]
pub struct MemoryRecorder {
    downloads: Mutex<Vec<DownloadEvent>>,
    failures: Mutex<Vec<FailureEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn downloads(&self) -> Vec<DownloadEvent> {
        self.downloads.lock().await.clone()
    }

    pub async fn failures(&self) -> Vec<FailureEvent> {
        self.failures.lock().await.clone()
    }
}

#[async_trait]
impl UsageRecorder for MemoryRecorder {
    async fn record_download(&self, event: DownloadEvent) {
        self.downloads.lock().await.push(event);
    }

    async fn record_failure(&self, event: FailureEvent) {
        self.failures.lock().await.push(event);
    }
}
