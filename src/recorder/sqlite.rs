//! SQLite-backed usage recorder

use super::{DownloadEvent, FailureEvent, UsageRecorder};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Pool, Row, Sqlite};
use tracing::{debug, info, warn};

pub struct SqliteRecorder {
    pool: Pool<Sqlite>,
}

impl SqliteRecorder {
    /// Open (creating if missing) the recorder database at the given path.
    pub async fn open(db_path: &str) -> Result<Self> {
        if !Sqlite::database_exists(db_path).await? {
            debug!("Creating usage database at: {}", db_path);
            Sqlite::create_database(db_path).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect(db_path)
            .await?;

        info!("Running usage database migrations");
        create_tables(&pool).await?;

        Ok(Self { pool })
    }

    async fn try_record_download(&self, event: &DownloadEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO downloads (video_url, platform, quality, video_title, user_agent, country, downloaded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.url)
        .bind(&event.platform)
        .bind(&event.quality)
        .bind(&event.title)
        .bind(&event.user_agent)
        .bind(&event.country)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO popular_videos (video_url, platform, title, download_count, last_downloaded)
            VALUES (?, ?, ?, 1, ?)
            ON CONFLICT(video_url) DO UPDATE SET
                download_count = download_count + 1,
                last_downloaded = excluded.last_downloaded
            "#,
        )
        .bind(&event.url)
        .bind(&event.platform)
        .bind(&event.title)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;

        debug!("Recorded download of {} ({})", event.url, event.quality);
        Ok(())
    }

    async fn try_record_failure(&self, event: &FailureEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO error_logs (url, error_message, detail, occurred_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&event.url)
        .bind(&event.error_message)
        .bind(&event.detail)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;

        debug!("Recorded failure for {}", event.url);
        Ok(())
    }

    /// Most recent download events, newest first.
    pub async fn recent_downloads(&self, limit: u32) -> Result<Vec<DownloadRow>> {
        let rows = sqlx::query(
            "SELECT video_url, platform, quality, video_title, user_agent, country, downloaded_at \
             FROM downloads ORDER BY downloaded_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut downloads = Vec::with_capacity(rows.len());
        for row in rows {
            downloads.push(DownloadRow {
                video_url: row.get("video_url"),
                platform: row.get("platform"),
                quality: row.get("quality"),
                video_title: row.get("video_title"),
                user_agent: row.get("user_agent"),
                country: row.get("country"),
                downloaded_at: row.get("downloaded_at"),
            });
        }

        Ok(downloads)
    }

    /// Most downloaded videos, by descending count.
    pub async fn popular_videos(&self, limit: u32) -> Result<Vec<PopularRow>> {
        let rows = sqlx::query(
            "SELECT video_url, platform, title, download_count, last_downloaded \
             FROM popular_videos ORDER BY download_count DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut videos = Vec::with_capacity(rows.len());
        for row in rows {
            videos.push(PopularRow {
                video_url: row.get("video_url"),
                platform: row.get("platform"),
                title: row.get("title"),
                download_count: row.get::<i64, _>("download_count") as u64,
                last_downloaded: row.get("last_downloaded"),
            });
        }

        Ok(videos)
    }

    /// Most recent failures, newest first.
    pub async fn recent_failures(&self, limit: u32) -> Result<Vec<FailureRow>> {
        let rows = sqlx::query(
            "SELECT url, error_message, detail, occurred_at \
             FROM error_logs ORDER BY occurred_at DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut failures = Vec::with_capacity(rows.len());
        for row in rows {
            failures.push(FailureRow {
                url: row.get("url"),
                error_message: row.get("error_message"),
                detail: row.get("detail"),
                occurred_at: row.get("occurred_at"),
            });
        }

        Ok(failures)
    }
}

#[async_trait]
impl UsageRecorder for SqliteRecorder {
    async fn record_download(&self, event: DownloadEvent) {
        if let Err(e) = self.try_record_download(&event).await {
            warn!("Failed to record download of {}: {}", event.url, e);
        }
    }

    async fn record_failure(&self, event: FailureEvent) {
        if let Err(e) = self.try_record_failure(&event).await {
            warn!("Failed to record failure for {}: {}", event.url, e);
        }
    }
}

/// Create recorder tables
async fn create_tables(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS downloads (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            video_url TEXT NOT NULL,
            platform TEXT NOT NULL,
            quality TEXT NOT NULL,
            video_title TEXT NOT NULL,
            user_agent TEXT,
            country TEXT,
            downloaded_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS popular_videos (
            video_url TEXT PRIMARY KEY,
            platform TEXT NOT NULL,
            title TEXT NOT NULL,
            download_count INTEGER DEFAULT 1,
            last_downloaded DATETIME
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS error_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            url TEXT NOT NULL,
            error_message TEXT NOT NULL,
            detail TEXT,
            occurred_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_downloads_platform ON downloads(platform)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_error_logs_occurred ON error_logs(occurred_at)")
        .execute(pool)
        .await?;

    debug!("Usage tables created successfully");
    Ok(())
}

/// One row of the downloads table.
#[derive(Debug, Clone)]
pub struct DownloadRow {
    pub video_url: String,
    pub platform: String,
    pub quality: String,
    pub video_title: String,
    pub user_agent: Option<String>,
    pub country: Option<String>,
    pub downloaded_at: DateTime<Utc>,
}

/// One row of the popular_videos table.
#[derive(Debug, Clone)]
pub struct PopularRow {
    pub video_url: String,
    pub platform: String,
    pub title: String,
    pub download_count: u64,
    pub last_downloaded: Option<DateTime<Utc>>,
}

/// One row of the error_logs table.
#[derive(Debug, Clone)]
pub struct FailureRow {
    pub url: String,
    pub error_message: String,
    pub detail: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn open_temp_recorder() -> (tempfile::TempDir, SqliteRecorder) {
        let dir = tempdir().expect("temp dir");
        let db_path = dir.path().join("usage.db");
        let recorder = SqliteRecorder::open(&db_path.to_string_lossy())
            .await
            .expect("open recorder");
        (dir, recorder)
    }

    #[tokio::test]
    async fn download_events_round_trip() {
        let (_dir, recorder) = open_temp_recorder().await;

        recorder
            .record_download(
                DownloadEvent::new(
                    "https://www.tiktok.com/@u/video/1",
                    "TikTok",
                    "HD (No Watermark)",
                    "dance",
                )
                .with_client_context(Some("Mozilla/5.0"), Some("DE")),
            )
            .await;

        let rows = recorder.recent_downloads(10).await.expect("query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].platform, "TikTok");
        assert_eq!(rows[0].quality, "HD (No Watermark)");
        assert_eq!(rows[0].user_agent.as_deref(), Some("Mozilla/5.0"));
        assert_eq!(rows[0].country.as_deref(), Some("DE"));
    }

    #[tokio::test]
    async fn repeat_downloads_bump_the_popular_counter() {
        let (_dir, recorder) = open_temp_recorder().await;

        for _ in 0..3 {
            recorder
                .record_download(DownloadEvent::new("https://a", "YouTube", "720p", "clip"))
                .await;
        }
        recorder
            .record_download(DownloadEvent::new("https://b", "TikTok", "HD", "other"))
            .await;

        let popular = recorder.popular_videos(10).await.expect("query");
        assert_eq!(popular.len(), 2);
        assert_eq!(popular[0].video_url, "https://a");
        assert_eq!(popular[0].download_count, 3);
        assert_eq!(popular[1].download_count, 1);
    }

    #[tokio::test]
    async fn failures_are_stored_with_detail() {
        let (_dir, recorder) = open_temp_recorder().await;

        let mut event = FailureEvent::new("https://bad", "Video not found");
        event.detail = Some("status 404 from upstream".to_string());
        recorder.record_failure(event).await;

        let failures = recorder.recent_failures(5).await.expect("query");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error_message, "Video not found");
        assert_eq!(failures[0].detail.as_deref(), Some("status 404 from upstream"));
    }

    #[tokio::test]
    async fn recent_queries_honor_their_limit() {
        let (_dir, recorder) = open_temp_recorder().await;

        for i in 0..5 {
            recorder
                .record_download(DownloadEvent::new(
                    &format!("https://v/{i}"),
                    "YouTube",
                    "720p",
                    &format!("clip {i}"),
                ))
                .await;
        }

        let rows = recorder.recent_downloads(2).await.expect("query");
        assert_eq!(rows.len(), 2);
    }
}
