//! Best-effort TTL cache for resolved video bundles

use crate::extractor::models::VideoInfo;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

/// A resolution pinned to the moment it was produced.
#[derive(Debug, Clone)]
pub struct CachedResolution {
    pub info: VideoInfo,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CachedResolution {
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Storage for resolved bundles, keyed by the trimmed source URL.
///
/// Implementations are best-effort: they swallow their own storage
/// errors and report a miss rather than ever failing a resolution.
#[async_trait]
pub trait VideoCache: Send + Sync {
    async fn get(&self, url: &str) -> Option<VideoInfo>;
    async fn put(&self, url: &str, info: &VideoInfo);
}

/// In-process cache with lazy eviction. Entries die on the first `get`
/// past their TTL; there is no background sweeper.
pub struct MemoryCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedResolution>>,
}

impl MemoryCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs as i64),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl VideoCache for MemoryCache {
    async fn get(&self, url: &str) -> Option<VideoInfo> {
        let key = url.trim();
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                debug!("Cache entry for {} expired, evicting", key);
                entries.remove(key);
                None
            }
            Some(entry) => Some(entry.info.clone()),
            None => None,
        }
    }

    async fn put(&self, url: &str, info: &VideoInfo) {
        let created_at = Utc::now();
        let entry = CachedResolution {
            info: info.clone(),
            created_at,
            expires_at: created_at + self.ttl,
        };
        self.entries
            .lock()
            .await
            .insert(url.trim().to_string(), entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::models::VideoFormat;

    fn sample_info(title: &str) -> VideoInfo {
        VideoInfo {
            platform: "TikTok".to_string(),
            title: title.to_string(),
            author: "someone".to_string(),
            thumbnail_url: String::new(),
            duration_label: "0:42".to_string(),
            formats: vec![VideoFormat {
                quality: "HD (No Watermark)".to_string(),
                container: "mp4".to_string(),
                locator: "https://cdn/v.mp4".to_string(),
                approx_size_label: "1.2 MB".to_string(),
                has_audio: true,
                has_video: true,
                requires_merge: false,
                is_external_redirect: false,
            }],
            source_url: "https://www.tiktok.com/@u/video/1".to_string(),
        }
    }

    #[tokio::test]
    async fn stores_and_returns_entries_within_ttl() {
        let cache = MemoryCache::new(3600);
        let info = sample_info("dance");
        cache.put("https://www.tiktok.com/@u/video/1", &info).await;

        let hit = cache.get("https://www.tiktok.com/@u/video/1").await;
        assert_eq!(hit, Some(info));
    }

    #[tokio::test]
    async fn keys_are_trimmed_on_both_sides() {
        let cache = MemoryCache::new(3600);
        let info = sample_info("dance");
        cache.put("  https://www.tiktok.com/@u/video/1 ", &info).await;

        let hit = cache.get("https://www.tiktok.com/@u/video/1").await;
        assert!(hit.is_some());
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_on_get() {
        let cache = MemoryCache::new(0);
        let info = sample_info("dance");
        cache.put("https://www.tiktok.com/@u/video/1", &info).await;

        // TTL of zero expires the entry immediately.
        let hit = cache.get("https://www.tiktok.com/@u/video/1").await;
        assert!(hit.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn unknown_keys_miss() {
        let cache = MemoryCache::new(3600);
        assert!(cache.get("https://www.tiktok.com/@u/video/9").await.is_none());
    }

    #[tokio::test]
    async fn put_overwrites_an_existing_entry() {
        let cache = MemoryCache::new(3600);
        cache.put("https://a", &sample_info("first")).await;
        cache.put("https://a", &sample_info("second")).await;

        let hit = cache.get("https://a").await;
        assert_eq!(hit.map(|i| i.title), Some("second".to_string()));
        assert_eq!(cache.len().await, 1);
    }
}
