//! Egress proxy
//!
//! Streams resolved media through the service so the browser never
//! talks to the upstream CDN directly. Locators come from a prior
//! resolution, not from arbitrary user input, but each fetch still runs
//! a host allowlist check, a size ceiling, and a content-type check
//! before any bytes are forwarded.

use crate::cache::VideoCache;
use crate::extractor::net::{streaming_client, BROWSER_USER_AGENT};
use crate::extractor::ytdlp::YtDlp;
use crate::recorder::{DownloadEvent, UsageRecorder};
use crate::utils::error::truncate_diagnostic;
use crate::utils::{content_disposition, size_label, Settings, VidgrabError};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, REFERER, USER_AGENT};
use reqwest::Client;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use url::Url;

/// CDN hosts whose responses are trusted without a content-type check.
/// Matched by suffix, so subdomains qualify.
const ALLOWED_MEDIA_HOSTS: &[&str] = &[
    "tikwm.com",
    "tiktokcdn.com",
    "cdninstagram.com",
    "fbcdn.net",
    "twimg.com",
    "googlevideo.com",
    "ytimg.com",
    "ssyoutube.com",
    "cobalt.tools",
];

/// One download order: where the bytes live plus the client context the
/// usage record wants.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub media_url: String,
    pub filename: String,
    pub quality: Option<String>,
    pub user_agent: Option<String>,
    pub country: Option<String>,
}

impl ProxyRequest {
    pub fn new(media_url: &str, filename: &str) -> Self {
        Self {
            media_url: media_url.to_string(),
            filename: filename.to_string(),
            quality: None,
            user_agent: None,
            country: None,
        }
    }
}

/// What the proxy hands to the HTTP layer: response headers plus the
/// body. Dropping the stream cancels the upstream transfer.
pub struct MediaStream {
    pub content_type: String,
    pub content_length: Option<u64>,
    pub content_disposition: String,
    pub stream: Pin<Box<dyn Stream<Item = Result<Bytes, VidgrabError>> + Send>>,
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("content_disposition", &self.content_disposition)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProxyPhase {
    Validating,
    HostChecking,
    SizeChecking,
    Streaming,
    Complete,
    Aborted,
}

/// Body wrapper that closes out the phase machine: `Complete` when the
/// upstream ends the body, `Aborted` when the consumer drops it early.
struct PhasedBody {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, VidgrabError>> + Send>>,
    locator: String,
    finished: bool,
}

impl PhasedBody {
    fn wrap(
        locator: &str,
        inner: Pin<Box<dyn Stream<Item = Result<Bytes, VidgrabError>> + Send>>,
    ) -> Pin<Box<dyn Stream<Item = Result<Bytes, VidgrabError>> + Send>> {
        Box::pin(Self {
            inner,
            locator: locator.to_string(),
            finished: false,
        })
    }
}

impl Stream for PhasedBody {
    type Item = Result<Bytes, VidgrabError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let poll = self.inner.as_mut().poll_next(cx);
        if let Poll::Ready(None) = poll {
            self.finished = true;
        }
        poll
    }
}

impl Drop for PhasedBody {
    fn drop(&mut self) {
        let phase = if self.finished {
            ProxyPhase::Complete
        } else {
            ProxyPhase::Aborted
        };
        debug!("Proxy {:?} -> {:?} for {}", ProxyPhase::Streaming, phase, self.locator);
    }
}

pub struct EgressProxy {
    client: Client,
    settings: Settings,
    cache: Arc<dyn VideoCache>,
    recorder: Arc<dyn UsageRecorder>,
    ytdlp: Option<Arc<YtDlp>>,
}

impl EgressProxy {
    pub fn new(
        settings: Settings,
        cache: Arc<dyn VideoCache>,
        recorder: Arc<dyn UsageRecorder>,
    ) -> Self {
        let client = streaming_client(Duration::from_secs(settings.connect_timeout_secs));
        let ytdlp = YtDlp::locate(Duration::from_secs(settings.probe_timeout_secs)).map(Arc::new);
        Self {
            client,
            settings,
            cache,
            recorder,
            ytdlp,
        }
    }

    /// Fetch a resolved locator and hand back a streamable body with
    /// download headers.
    pub async fn fetch(&self, request: ProxyRequest) -> Result<MediaStream, VidgrabError> {
        let locator = request.media_url.trim().to_string();
        debug!("Proxy {:?} for {}", ProxyPhase::Validating, locator);

        if locator.is_empty() {
            return Err(VidgrabError::InvalidLocator(
                "The download locator is empty. Resolve the video again and pick a format."
                    .to_string(),
            ));
        }

        // Locally staged files skip the host and size checks.
        if locator.starts_with('/') && !locator.contains("://") {
            return self.stream_local_file(&locator, &request).await;
        }

        let parsed = Url::parse(&locator).map_err(|_| {
            VidgrabError::InvalidLocator(format!(
                "The download locator is not a fetchable URL ({})",
                truncate_diagnostic(&locator)
            ))
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(VidgrabError::InvalidLocator(format!(
                "Only http(s) media locators can be proxied, got scheme {:?}",
                parsed.scheme()
            )));
        }

        let host = parsed.host_str().unwrap_or_default().to_string();
        let allowlisted = is_allowlisted_host(&host);
        debug!(
            "Proxy {:?} for {}: host {} allowlisted = {}",
            ProxyPhase::HostChecking,
            locator,
            host,
            allowlisted
        );

        let origin = parsed.origin().ascii_serialization();
        let response = self
            .client
            .get(parsed)
            .header(USER_AGENT, BROWSER_USER_AGENT)
            .header(REFERER, origin)
            .send()
            .await
            .map_err(|e| {
                VidgrabError::UpstreamFetchFailed(format!(
                    "Could not reach the media host ({}). The link may have expired; resolve the video again.",
                    truncate_diagnostic(&e.to_string())
                ))
            })?;

        if !response.status().is_success() {
            return Err(VidgrabError::UpstreamFetchFailed(format!(
                "The media host answered HTTP {} for this download. The link may have expired; resolve the video again.",
                response.status().as_u16()
            )));
        }

        let declared_length = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        debug!(
            "Proxy {:?} for {}: declared length {:?}",
            ProxyPhase::SizeChecking,
            locator,
            declared_length
        );
        if let Some(length) = declared_length {
            if length > self.settings.max_proxy_bytes {
                return Err(VidgrabError::TooLarge(format!(
                    "This file is {} but the proxy only serves up to {}. Pick a lower quality.",
                    size_label(Some(length)),
                    size_label(Some(self.settings.max_proxy_bytes))
                )));
            }
        }

        let upstream_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !allowlisted && !is_media_content_type(&upstream_type) {
            warn!(
                "Refusing non-media content type {:?} from unlisted host {}",
                upstream_type, host
            );
            return Err(VidgrabError::NotMedia(format!(
                "The media host returned {} instead of a media stream. The link may have expired; resolve the video again.",
                if upstream_type.is_empty() { "no content type" } else { &upstream_type }
            )));
        }

        debug!("Proxy {:?} for {}", ProxyPhase::Streaming, locator);
        self.record_download_if_cached(&request).await;

        let content_type = if upstream_type.is_empty() {
            "video/mp4".to_string()
        } else {
            upstream_type
        };
        let body = response.bytes_stream().map(|item| {
            item.map_err(|e| {
                VidgrabError::UpstreamFetchFailed(format!(
                    "The media stream broke off mid-transfer ({})",
                    truncate_diagnostic(&e.to_string())
                ))
            })
        });

        Ok(MediaStream {
            content_type,
            content_length: declared_length,
            content_disposition: content_disposition(&request.filename),
            stream: PhasedBody::wrap(&locator, Box::pin(body)),
        })
    }

    /// Deliver a video-only format by having the yt-dlp helper merge it
    /// with the best audio on the fly. The child process dies when the
    /// returned stream is dropped.
    pub async fn fetch_merged(
        &self,
        source_url: &str,
        format_id: &str,
        request: ProxyRequest,
    ) -> Result<MediaStream, VidgrabError> {
        debug!(
            "Proxy {:?} for merged format {} of {}",
            ProxyPhase::Validating,
            format_id,
            source_url
        );
        if source_url.trim().is_empty() || format_id.trim().is_empty() {
            return Err(VidgrabError::InvalidLocator(
                "A merged download needs both the video URL and a format id. Resolve the video again.".to_string(),
            ));
        }

        let Some(ytdlp) = &self.ytdlp else {
            return Err(VidgrabError::UpstreamUnavailable(
                "This quality needs its audio merged in, which requires the yt-dlp helper, and that is not installed on this host. Pick a quality that does not need merging.".to_string(),
            ));
        };

        let mut child = ytdlp.stream_merged(source_url, format_id)?;
        let stdout = child.stdout.take().ok_or_else(|| {
            VidgrabError::UpstreamFetchFailed(
                "The merge helper started without an output stream.".to_string(),
            )
        })?;

        debug!(
            "Proxy {:?} for merged format {} of {}",
            ProxyPhase::Streaming,
            format_id,
            source_url
        );
        self.record_download_if_cached(&ProxyRequest {
            media_url: source_url.to_string(),
            ..request.clone()
        })
        .await;

        // The child rides along inside the stream so dropping the body
        // kills the process (kill_on_drop is set at spawn).
        let reader = ReaderStream::new(stdout).map(|item| item.map_err(VidgrabError::from));
        let body = MergedBody {
            _child: child,
            reader: Box::pin(reader),
        };

        Ok(MediaStream {
            content_type: "video/mp4".to_string(),
            content_length: None,
            content_disposition: content_disposition(&request.filename),
            stream: PhasedBody::wrap(source_url, Box::pin(body)),
        })
    }

    async fn stream_local_file(
        &self,
        path: &str,
        request: &ProxyRequest,
    ) -> Result<MediaStream, VidgrabError> {
        let file = tokio::fs::File::open(path).await.map_err(|_| {
            VidgrabError::InvalidLocator(
                "The staged file for this download is gone. Resolve the video again.".to_string(),
            )
        })?;
        let content_length = file.metadata().await.ok().map(|m| m.len());

        debug!("Proxy {:?} for staged file {}", ProxyPhase::Streaming, path);
        self.record_download_if_cached(request).await;

        let body = ReaderStream::new(file).map(|item| item.map_err(VidgrabError::from));
        Ok(MediaStream {
            content_type: guess_content_type(path).to_string(),
            content_length,
            content_disposition: content_disposition(&request.filename),
            stream: PhasedBody::wrap(path, Box::pin(body)),
        })
    }

    /// A download only produces a usage record when the media URL maps
    /// back to a previously resolved video. A miss just skips the record.
    async fn record_download_if_cached(&self, request: &ProxyRequest) {
        let Some(info) = self.cache.get(request.media_url.trim()).await else {
            return;
        };
        let event = DownloadEvent::new(
            &info.source_url,
            &info.platform,
            request.quality.as_deref().unwrap_or("Unknown"),
            &info.title,
        )
        .with_client_context(request.user_agent.as_deref(), request.country.as_deref());
        let recorder = Arc::clone(&self.recorder);
        tokio::spawn(async move {
            recorder.record_download(event).await;
        });
    }
}

/// yt-dlp child plus its stdout reader, so both live and die together.
struct MergedBody {
    _child: tokio::process::Child,
    reader: Pin<Box<dyn Stream<Item = Result<Bytes, VidgrabError>> + Send>>,
}

impl Stream for MergedBody {
    type Item = Result<Bytes, VidgrabError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.reader.as_mut().poll_next(cx)
    }
}

fn is_allowlisted_host(host: &str) -> bool {
    let lowered = host.to_lowercase();
    ALLOWED_MEDIA_HOSTS
        .iter()
        .any(|allowed| lowered == *allowed || lowered.ends_with(&format!(".{allowed}")))
}

fn is_media_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    essence.starts_with("video/")
        || essence.starts_with("audio/")
        || essence.starts_with("image/")
        || essence == "application/octet-stream"
}

fn guess_content_type(path: &str) -> &'static str {
    let extension = path.rsplit('.').next().unwrap_or_default().to_lowercase();
    match extension.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::recorder::MemoryRecorder;
    use std::io::Write;

    fn proxy_without_helper() -> EgressProxy {
        let settings = Settings::default();
        EgressProxy {
            client: streaming_client(Duration::from_secs(2)),
            settings,
            cache: Arc::new(MemoryCache::new(60)),
            recorder: Arc::new(MemoryRecorder::new()),
            ytdlp: None,
        }
    }

    async fn collect(mut stream: Pin<Box<dyn Stream<Item = Result<Bytes, VidgrabError>> + Send>>) -> Vec<u8> {
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.expect("chunk"));
        }
        collected
    }

    #[test]
    fn allowlist_matches_exact_hosts_and_subdomains() {
        assert!(is_allowlisted_host("tikwm.com"));
        assert!(is_allowlisted_host("www.tikwm.com"));
        assert!(is_allowlisted_host("v16-webapp.tiktokcdn.com"));
        assert!(is_allowlisted_host("scontent.cdninstagram.com"));
        assert!(is_allowlisted_host("rr3---sn-abc.googlevideo.com"));
        assert!(is_allowlisted_host("PBS.TWIMG.COM"));
    }

    #[test]
    fn allowlist_rejects_lookalike_hosts() {
        assert!(!is_allowlisted_host("eviltikwm.com"));
        assert!(!is_allowlisted_host("tikwm.com.evil.example"));
        assert!(!is_allowlisted_host("example.com"));
        assert!(!is_allowlisted_host(""));
    }

    #[test]
    fn media_content_types_are_recognized_with_parameters() {
        assert!(is_media_content_type("video/mp4"));
        assert!(is_media_content_type("video/webm; codecs=vp9"));
        assert!(is_media_content_type("audio/mpeg"));
        assert!(is_media_content_type("image/jpeg"));
        assert!(is_media_content_type("application/octet-stream; charset=binary"));
        assert!(!is_media_content_type("text/html; charset=utf-8"));
        assert!(!is_media_content_type("application/json"));
        assert!(!is_media_content_type(""));
    }

    #[test]
    fn content_type_guessing_covers_the_staged_formats() {
        assert_eq!(guess_content_type("/tmp/x/video.mp4"), "video/mp4");
        assert_eq!(guess_content_type("/tmp/x/audio.M4A"), "audio/mp4");
        assert_eq!(guess_content_type("/tmp/x/track.mp3"), "audio/mpeg");
        assert_eq!(guess_content_type("/tmp/x/mystery"), "application/octet-stream");
    }

    #[tokio::test]
    async fn empty_locators_are_rejected_in_validation() {
        let proxy = proxy_without_helper();
        let err = proxy
            .fetch(ProxyRequest::new("   ", "video.mp4"))
            .await
            .expect_err("should reject");
        assert!(matches!(err, VidgrabError::InvalidLocator(_)));
    }

    #[tokio::test]
    async fn unparseable_locators_are_rejected_in_validation() {
        let proxy = proxy_without_helper();
        for locator in ["not a url", "ftp://host/file.mp4"] {
            let err = proxy
                .fetch(ProxyRequest::new(locator, "video.mp4"))
                .await
                .expect_err("should reject");
            assert!(matches!(err, VidgrabError::InvalidLocator(_)), "locator: {locator}");
        }
    }

    #[tokio::test]
    async fn staged_files_stream_back_byte_identical() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("clip.mp4");
        let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        std::fs::File::create(&path)
            .and_then(|mut f| f.write_all(&payload))
            .expect("write staged file");

        let proxy = proxy_without_helper();
        let media = proxy
            .fetch(ProxyRequest::new(&path.to_string_lossy(), "my clip.mp4"))
            .await
            .expect("should stream");

        assert_eq!(media.content_type, "video/mp4");
        assert_eq!(media.content_length, Some(payload.len() as u64));
        assert_eq!(media.content_disposition, r#"attachment; filename="my clip.mp4""#);
        assert_eq!(collect(media.stream).await, payload);
    }

    #[tokio::test]
    async fn missing_staged_files_are_invalid_locators() {
        let proxy = proxy_without_helper();
        let err = proxy
            .fetch(ProxyRequest::new("/nonexistent/staging/clip.mp4", "clip.mp4"))
            .await
            .expect_err("should reject");
        assert!(matches!(err, VidgrabError::InvalidLocator(_)));
    }

    #[tokio::test]
    async fn merged_delivery_without_the_helper_names_the_gap() {
        let proxy = proxy_without_helper();
        let err = proxy
            .fetch_merged(
                "https://www.youtube.com/watch?v=abc123def45",
                "137",
                ProxyRequest::new("137", "clip.mp4"),
            )
            .await
            .expect_err("should fail");
        assert!(matches!(err, VidgrabError::UpstreamUnavailable(_)));
        assert!(err.to_string().contains("yt-dlp"));
    }

    #[tokio::test]
    async fn merged_delivery_requires_both_identifiers() {
        let proxy = proxy_without_helper();
        let err = proxy
            .fetch_merged("", "137", ProxyRequest::new("137", "clip.mp4"))
            .await
            .expect_err("should fail");
        assert!(matches!(err, VidgrabError::InvalidLocator(_)));
    }
}
