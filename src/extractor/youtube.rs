//! YouTube extraction chain
//!
//! Three strategies in falling order of fidelity: a local yt-dlp probe,
//! a no-binary path combining oEmbed metadata with a third-party
//! direct-link resolver, and a redirect-page fallback that always
//! leaves the user with something clickable.

use crate::extractor::models::{Extraction, RawStream};
use crate::extractor::net::unavailable_for_status;
use crate::extractor::traits::ExtractStrategy;
use crate::extractor::ytdlp::{ProbeInfo, YtDlp};
use crate::utils::error::{truncate_diagnostic, VidgrabError};
use crate::utils::{duration_label, size_label};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

const NOEMBED_ENDPOINT: &str = "https://noembed.com/embed";
const RESOLVER_ENDPOINT: &str = "https://api.cobalt.tools/api/json";

/// At most this many distinct video renditions from a probe.
const MAX_PROBE_STREAMS: usize = 6;

lazy_static! {
    static ref VIDEO_ID_RE: Regex = Regex::new(
        r"(?:youtube\.com/(?:watch\?v=|shorts/|embed/|live/)|youtu\.be/)([A-Za-z0-9_-]{11})"
    )
    .expect("video id pattern is valid");
}

/// Pull the 11-character video id out of any supported URL shape.
pub fn parse_video_id(url: &str) -> Option<String> {
    VIDEO_ID_RE
        .captures(url)
        .map(|caps| caps[1].to_string())
}

fn invalid_youtube_url() -> VidgrabError {
    VidgrabError::InvalidInput(
        "This does not look like a YouTube video URL. Paste a watch, shorts, or youtu.be link with its video id.".to_string(),
    )
}

// ============================================================
// Strategy (a): local yt-dlp probe
// ============================================================

pub struct YtDlpProbeStrategy {
    ytdlp: Option<Arc<YtDlp>>,
}

impl YtDlpProbeStrategy {
    pub fn new(ytdlp: Option<Arc<YtDlp>>) -> Self {
        Self { ytdlp }
    }
}

#[async_trait]
impl ExtractStrategy for YtDlpProbeStrategy {
    fn id(&self) -> &'static str {
        "youtube.ytdlp"
    }

    async fn attempt(&self, url: &str) -> Result<Extraction, VidgrabError> {
        let ytdlp = self.ytdlp.as_ref().ok_or_else(|| {
            VidgrabError::UpstreamUnavailable(
                "The yt-dlp helper is not installed on this host, so the direct YouTube path is unavailable.".to_string(),
            )
        })?;

        let info = ytdlp.probe(url).await?;
        let streams = streams_from_probe(&info);
        if streams.is_empty() {
            return Err(VidgrabError::NoUsableFormats(
                "YouTube listed no downloadable formats for this video. It may be a live stream or members-only; try another video.".to_string(),
            ));
        }

        Ok(Extraction {
            title: info.title.unwrap_or_else(|| "YouTube Video".to_string()),
            author: info
                .uploader
                .or(info.channel)
                .unwrap_or_else(|| "YouTube Creator".to_string()),
            thumbnail_url: info.thumbnail.unwrap_or_default(),
            duration_label: duration_label(info.duration.unwrap_or(0.0)),
            streams,
        })
    }
}

/// Map a probe's format list onto candidate streams: one entry per
/// distinct height (tallest first, capped), then the best audio-only
/// rendition. Muxed formats carry their direct URL; video-only formats
/// carry the bare format id for the proxy to merge later.
fn streams_from_probe(info: &ProbeInfo) -> Vec<RawStream> {
    let mut video_formats: Vec<_> = info
        .formats
        .iter()
        .filter(|f| f.has_video() && f.height.is_some())
        .collect();
    video_formats.sort_by(|a, b| b.height.cmp(&a.height));

    let mut streams = Vec::new();
    let mut seen_heights = Vec::new();

    for format in video_formats {
        let height = match format.height {
            Some(h) => h,
            None => continue,
        };
        if seen_heights.contains(&height) {
            continue;
        }
        seen_heights.push(height);

        let locator = if format.has_audio() {
            format
                .url
                .clone()
                .unwrap_or_else(|| format.format_id.clone())
        } else {
            format.format_id.clone()
        };

        streams.push(RawStream {
            quality: format!("{}p", height),
            container: format.ext.clone().unwrap_or_else(|| "mp4".to_string()),
            locator,
            size_label: size_label(format.size_bytes()),
            has_audio: format.has_audio(),
            ..RawStream::default()
        });

        if streams.len() >= MAX_PROBE_STREAMS {
            break;
        }
    }

    let best_audio = info
        .formats
        .iter()
        .filter(|f| f.has_audio() && !f.has_video())
        .max_by_key(|f| f.size_bytes().unwrap_or(0));
    if let Some(audio) = best_audio {
        streams.push(RawStream {
            quality: "Audio Only".to_string(),
            container: audio.ext.clone().unwrap_or_else(|| "m4a".to_string()),
            locator: audio
                .url
                .clone()
                .unwrap_or_else(|| audio.format_id.clone()),
            size_label: size_label(audio.size_bytes()),
            has_video: false,
            ..RawStream::default()
        });
    }

    streams
}

// ============================================================
// Strategy (b): oEmbed metadata + third-party direct-link resolver
// ============================================================

pub struct OembedResolverStrategy {
    client: Client,
}

impl OembedResolverStrategy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractStrategy for OembedResolverStrategy {
    fn id(&self) -> &'static str {
        "youtube.resolver"
    }

    async fn attempt(&self, url: &str) -> Result<Extraction, VidgrabError> {
        let direct_url = resolve_direct_link(&self.client, url).await?;
        let meta = noembed_or_defaults(&self.client, url).await;

        Ok(Extraction {
            title: meta.title,
            author: meta.author,
            thumbnail_url: meta.thumbnail_url,
            duration_label: "0:00".to_string(),
            streams: vec![RawStream {
                quality: "HD Video".to_string(),
                locator: direct_url,
                ..RawStream::default()
            }],
        })
    }
}

#[derive(Debug, Deserialize)]
struct ResolverResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

async fn resolve_direct_link(client: &Client, url: &str) -> Result<String, VidgrabError> {
    let response = client
        .post(RESOLVER_ENDPOINT)
        .header(reqwest::header::ACCEPT, "application/json")
        .json(&serde_json::json!({ "url": url, "vQuality": "720" }))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(unavailable_for_status("The link resolver", response.status()));
    }

    let body: ResolverResponse = response.json().await.map_err(|e| {
        VidgrabError::ParseFailure(format!(
            "The link resolver answered with something that is not JSON ({})",
            truncate_diagnostic(&e.to_string())
        ))
    })?;

    parse_resolver_response(body)
}

fn parse_resolver_response(body: ResolverResponse) -> Result<String, VidgrabError> {
    let usable = matches!(
        body.status.as_deref(),
        Some("stream") | Some("redirect") | Some("success")
    );
    match (usable, body.url) {
        (true, Some(url)) if !url.is_empty() => Ok(url),
        _ => Err(VidgrabError::NoUsableFormats(format!(
            "The link resolver had no direct link for this video ({}). The download-page options still work.",
            truncate_diagnostic(body.text.as_deref().unwrap_or("no detail"))
        ))),
    }
}

// ============================================================
// Strategy (c): redirect-page fallback, never empty
// ============================================================

pub struct RedirectPageStrategy {
    client: Client,
}

impl RedirectPageStrategy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractStrategy for RedirectPageStrategy {
    fn id(&self) -> &'static str {
        "youtube.redirect"
    }

    async fn attempt(&self, url: &str) -> Result<Extraction, VidgrabError> {
        let video_id = parse_video_id(url).ok_or_else(invalid_youtube_url)?;
        let meta = noembed_or_defaults(&self.client, url).await;

        Ok(Extraction {
            title: meta.title,
            author: meta.author,
            thumbnail_url: if meta.thumbnail_url.is_empty() {
                format!("https://i.ytimg.com/vi/{}/hqdefault.jpg", video_id)
            } else {
                meta.thumbnail_url
            },
            duration_label: "0:00".to_string(),
            streams: build_redirect_streams(&video_id, url),
        })
    }
}

fn build_redirect_streams(video_id: &str, url: &str) -> Vec<RawStream> {
    vec![
        RawStream {
            quality: "Download Page (HD)".to_string(),
            locator: format!("https://ssyoutube.com/watch?v={}", video_id),
            is_external_redirect: true,
            ..RawStream::default()
        },
        RawStream {
            quality: "Download Page (MP3)".to_string(),
            container: "mp3".to_string(),
            locator: format!(
                "https://ytmp3.nu/youtube-to-mp3/?url={}",
                urlencoding::encode(url)
            ),
            has_video: false,
            is_external_redirect: true,
            ..RawStream::default()
        },
    ]
}

// ============================================================
// Shared oEmbed metadata lookup
// ============================================================

#[derive(Debug, Deserialize)]
struct NoembedResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author_name: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

struct VideoMeta {
    title: String,
    author: String,
    thumbnail_url: String,
}

impl Default for VideoMeta {
    fn default() -> Self {
        Self {
            title: "YouTube Video".to_string(),
            author: "YouTube Creator".to_string(),
            thumbnail_url: String::new(),
        }
    }
}

/// Metadata is cosmetic next to a working download link, so oEmbed
/// failures degrade to defaults instead of failing the strategy.
async fn noembed_or_defaults(client: &Client, url: &str) -> VideoMeta {
    let endpoint = format!("{}?url={}", NOEMBED_ENDPOINT, urlencoding::encode(url));
    let response = match client.get(&endpoint).send().await {
        Ok(r) => r,
        Err(e) => {
            debug!("noembed lookup failed: {}", e);
            return VideoMeta::default();
        }
    };

    let body: NoembedResponse = match response.json().await {
        Ok(b) => b,
        Err(e) => {
            debug!("noembed response unreadable: {}", e);
            return VideoMeta::default();
        }
    };

    if let Some(err) = body.error {
        debug!("noembed reported: {}", err);
        return VideoMeta::default();
    }

    let defaults = VideoMeta::default();
    VideoMeta {
        title: body.title.unwrap_or(defaults.title),
        author: body.author_name.unwrap_or(defaults.author),
        thumbnail_url: body.thumbnail_url.unwrap_or(defaults.thumbnail_url),
    }
}

// ============================================================
// Tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::ErrorKind;

    #[test]
    fn video_id_parses_every_supported_shape() {
        let cases = [
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
            ("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42s", Some("dQw4w9WgXcQ")),
            ("https://youtube.com/shorts/abc123DEF45", Some("abc123DEF45")),
            ("https://www.youtube.com/embed/abc123DEF45", Some("abc123DEF45")),
            ("https://www.youtube.com/live/abc123DEF45", Some("abc123DEF45")),
            ("https://youtu.be/dQw4w9WgXcQ", Some("dQw4w9WgXcQ")),
            ("https://youtu.be/dQw4w9WgXcQ?si=share", Some("dQw4w9WgXcQ")),
            ("https://www.youtube.com/@somechannel", None),
            ("https://example.com/watch?v=dQw4w9WgXcQ", None),
        ];
        for (url, expected) in cases {
            assert_eq!(parse_video_id(url).as_deref(), expected, "url: {}", url);
        }
    }

    #[test]
    fn probe_streams_dedupe_heights_and_append_audio() {
        let info: ProbeInfo = serde_json::from_str(
            r#"{
                "title": "t",
                "formats": [
                    {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "aac", "filesize": 3000000, "url": "https://a/audio"},
                    {"format_id": "599", "ext": "m4a", "vcodec": "none", "acodec": "aac", "filesize": 900000},
                    {"format_id": "134", "ext": "mp4", "height": 360, "vcodec": "avc1", "acodec": "none"},
                    {"format_id": "18", "ext": "mp4", "height": 360, "vcodec": "avc1", "acodec": "aac", "url": "https://a/360"},
                    {"format_id": "137", "ext": "mp4", "height": 1080, "vcodec": "avc1", "acodec": "none", "filesize": 50000000},
                    {"format_id": "22", "ext": "mp4", "height": 720, "vcodec": "avc1", "acodec": "aac", "url": "https://a/720"}
                ]
            }"#,
        )
        .expect("fixture should parse");

        let streams = streams_from_probe(&info);
        let qualities: Vec<&str> = streams.iter().map(|s| s.quality.as_str()).collect();
        assert_eq!(qualities, vec!["1080p", "720p", "360p", "Audio Only"]);

        // video-only 1080p keeps the opaque format id for later merging
        assert_eq!(streams[0].locator, "137");
        assert!(!streams[0].has_audio);

        // muxed formats carry their direct URL
        assert_eq!(streams[1].locator, "https://a/720");
        assert!(streams[1].has_audio);

        // 360p dedupe keeps the first (list is sorted by height only),
        // and the best audio wins by size
        let audio = streams.last().expect("audio stream");
        assert_eq!(audio.locator, "https://a/audio");
        assert!(!audio.has_video);
    }

    #[test]
    fn resolver_response_needs_a_usable_status_and_url() {
        let ok: ResolverResponse =
            serde_json::from_str(r#"{"status": "stream", "url": "https://cdn/x.mp4"}"#)
                .expect("fixture should parse");
        assert_eq!(parse_resolver_response(ok).expect("usable"), "https://cdn/x.mp4");

        let redirect: ResolverResponse =
            serde_json::from_str(r#"{"status": "redirect", "url": "https://cdn/y.mp4"}"#)
                .expect("fixture should parse");
        assert!(parse_resolver_response(redirect).is_ok());

        let error: ResolverResponse =
            serde_json::from_str(r#"{"status": "error", "text": "rate limited"}"#)
                .expect("fixture should parse");
        let err = parse_resolver_response(error).expect_err("should fail");
        assert_eq!(err.kind(), ErrorKind::NoUsableFormats);
        assert!(err.to_string().contains("rate limited"));

        let empty: ResolverResponse = serde_json::from_str(r#"{"status": "stream"}"#)
            .expect("fixture should parse");
        assert!(parse_resolver_response(empty).is_err());
    }

    #[test]
    fn redirect_streams_are_external_and_cover_hd_plus_audio() {
        let url = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
        let streams = build_redirect_streams("dQw4w9WgXcQ", url);
        assert_eq!(streams.len(), 2);
        assert!(streams.iter().all(|s| s.is_external_redirect));
        assert!(streams[0].locator.contains("ssyoutube.com"));
        assert!(streams[0].has_video);
        assert!(streams[1].locator.contains("ytmp3.nu"));
        assert!(!streams[1].has_video);
    }

    #[tokio::test]
    async fn missing_binary_fails_fast_as_unavailable() {
        let strategy = YtDlpProbeStrategy::new(None);
        let err = strategy
            .attempt("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .await
            .expect_err("should fail without a binary");
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert!(err.to_string().contains("yt-dlp"));
    }
}
