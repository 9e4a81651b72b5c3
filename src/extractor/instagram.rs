//! Instagram extraction chain
//!
//! Three strategies: the public GraphQL document query (works for
//! public posts without any session), the authenticated mobile API
//! (only assembled into the chain when a session cookie is
//! configured), and an external-download-pages fallback that always
//! gives the user three clickable options.

use crate::extractor::models::{Extraction, RawStream};
use crate::extractor::net::unavailable_for_status;
use crate::extractor::traits::ExtractStrategy;
use crate::utils::duration_label;
use crate::utils::error::{truncate_diagnostic, VidgrabError};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{ACCEPT, COOKIE, ORIGIN, REFERER};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const IG_APP_ID: &str = "936619743392459";
const IG_ASBD_ID: &str = "198387";
const GRAPHQL_DOC_ID: &str = "8845758582119845";

/// Captions can run to thousands of characters; only this much becomes
/// the title.
const TITLE_CAP: usize = 120;

lazy_static! {
    static ref SHORTCODE_RE: Regex =
        Regex::new(r"instagram\.com/(?:reels?|p|tv)/([A-Za-z0-9_-]+)")
            .expect("shortcode pattern is valid");
    static ref CSRF_RE: Regex =
        Regex::new(r"csrftoken=([^;]+)").expect("csrf pattern is valid");
}

/// Pull the media shortcode out of a Reel/post/IGTV URL. Audio pages
/// (`/reels/audio/...`) share the path prefix but are not media posts.
pub fn parse_shortcode(url: &str) -> Option<String> {
    SHORTCODE_RE
        .captures(url)
        .map(|caps| caps[1].to_string())
        .filter(|code| code != "audio")
}

/// Decode a shortcode into the numeric media pk the mobile API wants
/// (big-endian base-64 over Instagram's URL-safe alphabet). `None` for
/// foreign characters or ids too long for 128 bits.
pub fn shortcode_to_pk(shortcode: &str) -> Option<u128> {
    const CHARS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

    let mut pk: u128 = 0;
    for c in shortcode.chars() {
        let idx = CHARS.find(c)? as u128;
        pk = pk.checked_mul(64)?.checked_add(idx)?;
    }
    Some(pk)
}

fn invalid_instagram_url() -> VidgrabError {
    VidgrabError::InvalidInput(
        "This does not look like an Instagram video URL. Paste a Reel, post, or IGTV link.".to_string(),
    )
}

fn cap_title(text: &str) -> String {
    text.chars().take(TITLE_CAP).collect()
}

// ============================================================
// Strategy (a): public GraphQL document query
// ============================================================

pub struct GraphQlStrategy {
    client: Client,
    session: Option<String>,
}

impl GraphQlStrategy {
    pub fn new(client: Client, session: Option<String>) -> Self {
        Self { client, session }
    }
}

#[async_trait]
impl ExtractStrategy for GraphQlStrategy {
    fn id(&self) -> &'static str {
        "instagram.graphql"
    }

    async fn attempt(&self, url: &str) -> Result<Extraction, VidgrabError> {
        let shortcode = parse_shortcode(url).ok_or_else(invalid_instagram_url)?;

        let variables = serde_json::json!({
            "shortcode": shortcode,
            "child_comment_count": 3,
            "fetch_comment_count": 40,
            "parent_comment_count": 24,
            "has_threaded_comments": true,
        })
        .to_string();
        let gql_url = format!(
            "https://www.instagram.com/graphql/query/?doc_id={}&variables={}",
            GRAPHQL_DOC_ID,
            urlencoding::encode(&variables)
        );

        let mut request = self
            .client
            .get(&gql_url)
            .header("X-IG-App-ID", IG_APP_ID)
            .header("X-ASBD-ID", IG_ASBD_ID)
            .header("X-IG-WWW-Claim", "0")
            .header("X-CSRFToken", "")
            .header("X-Requested-With", "XMLHttpRequest")
            .header(ORIGIN, "https://www.instagram.com")
            .header(ACCEPT, "*/*")
            .header(
                REFERER,
                format!("https://www.instagram.com/reel/{}/", shortcode),
            );
        if let Some(cookie) = &self.session {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(unavailable_for_status("instagram.com", response.status()));
        }

        let body: GraphQlResponse = response.json().await.map_err(|e| {
            VidgrabError::ParseFailure(format!(
                "Instagram answered with something that is not JSON ({})",
                truncate_diagnostic(&e.to_string())
            ))
        })?;

        build_graphql_extraction(body)
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<GraphQlData>,
}

#[derive(Debug, Deserialize)]
struct GraphQlData {
    #[serde(default)]
    xdt_shortcode_media: Option<ShortcodeMedia>,
}

#[derive(Debug, Default, Deserialize)]
struct ShortcodeMedia {
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    video_url: Option<String>,
    #[serde(default)]
    display_url: Option<String>,
    #[serde(default)]
    video_duration: Option<f64>,
    #[serde(default)]
    owner: Option<MediaOwner>,
    #[serde(default)]
    edge_media_to_caption: Option<CaptionEdges>,
    #[serde(default)]
    edge_sidecar_to_children: Option<SidecarEdges>,
}

#[derive(Debug, Default, Deserialize)]
struct MediaOwner {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CaptionEdges {
    #[serde(default)]
    edges: Vec<CaptionEdge>,
}

#[derive(Debug, Default, Deserialize)]
struct CaptionEdge {
    #[serde(default)]
    node: Option<CaptionNode>,
}

#[derive(Debug, Default, Deserialize)]
struct CaptionNode {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SidecarEdges {
    #[serde(default)]
    edges: Vec<SidecarEdge>,
}

#[derive(Debug, Default, Deserialize)]
struct SidecarEdge {
    #[serde(default)]
    node: Option<SidecarNode>,
}

#[derive(Debug, Default, Deserialize)]
struct SidecarNode {
    #[serde(default)]
    is_video: bool,
    #[serde(default)]
    video_url: Option<String>,
}

fn no_public_media() -> VidgrabError {
    VidgrabError::NoUsableFormats(
        "Instagram returned no media for this post. It may be private or image-only; the download-page options can still help.".to_string(),
    )
}

fn build_graphql_extraction(body: GraphQlResponse) -> Result<Extraction, VidgrabError> {
    let media = body
        .data
        .and_then(|d| d.xdt_shortcode_media)
        .ok_or_else(no_public_media)?;

    let mut streams = Vec::new();

    if media.is_video {
        if let Some(video_url) = media.video_url.as_deref().filter(|s| !s.is_empty()) {
            streams.push(RawStream {
                quality: "HD".to_string(),
                locator: video_url.to_string(),
                ..RawStream::default()
            });
        }
    } else if let Some(sidecar) = &media.edge_sidecar_to_children {
        for (i, edge) in sidecar.edges.iter().enumerate() {
            let node = match &edge.node {
                Some(node) if node.is_video => node,
                _ => continue,
            };
            if let Some(video_url) = node.video_url.as_deref().filter(|s| !s.is_empty()) {
                streams.push(RawStream {
                    quality: format!("Video {}", i + 1),
                    locator: video_url.to_string(),
                    ..RawStream::default()
                });
            }
        }
    }

    if streams.is_empty() {
        return Err(no_public_media());
    }

    let caption = media
        .edge_media_to_caption
        .as_ref()
        .and_then(|c| c.edges.first())
        .and_then(|e| e.node.as_ref())
        .and_then(|n| n.text.as_deref())
        .filter(|t| !t.is_empty());

    Ok(Extraction {
        title: caption.map(cap_title).unwrap_or_else(|| "Instagram Video".to_string()),
        author: owner_label(media.owner.as_ref()),
        thumbnail_url: media.display_url.unwrap_or_default(),
        duration_label: duration_label(media.video_duration.unwrap_or(0.0)),
        streams,
    })
}

fn owner_label(owner: Option<&MediaOwner>) -> String {
    match owner {
        Some(o) => {
            if let Some(full_name) = o.full_name.as_deref().filter(|s| !s.is_empty()) {
                full_name.to_string()
            } else if let Some(username) = o.username.as_deref().filter(|s| !s.is_empty()) {
                format!("@{}", username)
            } else {
                "Instagram User".to_string()
            }
        }
        None => "Instagram User".to_string(),
    }
}

// ============================================================
// Strategy (b): authenticated mobile API
// ============================================================

pub struct MobileApiStrategy {
    client: Client,
    session: String,
}

impl MobileApiStrategy {
    pub fn new(client: Client, session: String) -> Self {
        Self { client, session }
    }
}

#[async_trait]
impl ExtractStrategy for MobileApiStrategy {
    fn id(&self) -> &'static str {
        "instagram.mobile"
    }

    async fn attempt(&self, url: &str) -> Result<Extraction, VidgrabError> {
        let shortcode = parse_shortcode(url).ok_or_else(invalid_instagram_url)?;
        let pk = shortcode_to_pk(&shortcode).ok_or_else(|| {
            VidgrabError::ParseFailure(
                "The Instagram post id could not be decoded into a media pk. Check that the URL is complete.".to_string(),
            )
        })?;

        let csrf = CSRF_RE
            .captures(&self.session)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();

        let response = self
            .client
            .get(format!("https://i.instagram.com/api/v1/media/{}/info/", pk))
            .header("X-IG-App-ID", IG_APP_ID)
            .header("X-ASBD-ID", IG_ASBD_ID)
            .header("X-IG-WWW-Claim", "0")
            .header(ORIGIN, "https://www.instagram.com")
            .header(ACCEPT, "*/*")
            .header(COOKIE, &self.session)
            .header("X-CSRFToken", csrf)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(VidgrabError::LoginRequired(
                "Instagram rejected the configured session. Refresh the session cookie and try again.".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(unavailable_for_status("i.instagram.com", status));
        }

        let body: MobileResponse = response.json().await.map_err(|e| {
            VidgrabError::ParseFailure(format!(
                "The Instagram mobile API answered with something that is not JSON ({})",
                truncate_diagnostic(&e.to_string())
            ))
        })?;

        build_mobile_extraction(body)
    }
}

#[derive(Debug, Deserialize)]
struct MobileResponse {
    #[serde(default)]
    items: Vec<MobileItem>,
}

#[derive(Debug, Default, Deserialize)]
struct MobileItem {
    #[serde(default)]
    video_versions: Vec<VideoVersion>,
    #[serde(default)]
    image_versions2: Option<ImageVersions>,
    #[serde(default)]
    caption: Option<MobileCaption>,
    #[serde(default)]
    user: Option<MobileUser>,
    #[serde(default)]
    video_duration: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct VideoVersion {
    url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

#[derive(Debug, Default, Deserialize)]
struct ImageVersions {
    #[serde(default)]
    candidates: Vec<ImageCandidate>,
}

#[derive(Debug, Deserialize)]
struct ImageCandidate {
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct MobileCaption {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MobileUser {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    full_name: Option<String>,
}

fn build_mobile_extraction(body: MobileResponse) -> Result<Extraction, VidgrabError> {
    let item = body.items.into_iter().next().ok_or_else(|| {
        VidgrabError::NoUsableFormats(
            "The Instagram mobile API returned no items for this post. It may have been removed.".to_string(),
        )
    })?;

    let mut versions = item.video_versions.clone();
    versions.sort_by(|a, b| b.width.cmp(&a.width));

    let streams: Vec<RawStream> = versions
        .into_iter()
        .take(3)
        .enumerate()
        .map(|(i, v)| RawStream {
            quality: if i == 0 {
                format!("{}x{} HD", v.width, v.height)
            } else {
                format!("{}x{}", v.width, v.height)
            },
            locator: v.url,
            ..RawStream::default()
        })
        .collect();

    if streams.is_empty() {
        return Err(VidgrabError::NoUsableFormats(
            "This Instagram post has no video streams. Image posts cannot be downloaded as video.".to_string(),
        ));
    }

    let author = match &item.user {
        Some(user) => {
            if let Some(full_name) = user.full_name.as_deref().filter(|s| !s.is_empty()) {
                full_name.to_string()
            } else if let Some(username) = user.username.as_deref().filter(|s| !s.is_empty()) {
                format!("@{}", username)
            } else {
                "Instagram User".to_string()
            }
        }
        None => "Instagram User".to_string(),
    };

    Ok(Extraction {
        title: item
            .caption
            .as_ref()
            .and_then(|c| c.text.as_deref())
            .filter(|t| !t.is_empty())
            .map(cap_title)
            .unwrap_or_else(|| "Instagram Video".to_string()),
        author,
        thumbnail_url: item
            .image_versions2
            .as_ref()
            .and_then(|iv| iv.candidates.first())
            .map(|c| c.url.clone())
            .unwrap_or_default(),
        duration_label: duration_label(item.video_duration.unwrap_or(0.0)),
        streams,
    })
}

// ============================================================
// Strategy (c): external download pages, never empty
// ============================================================

pub struct ExternalPagesStrategy {
    client: Client,
}

impl ExternalPagesStrategy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractStrategy for ExternalPagesStrategy {
    fn id(&self) -> &'static str {
        "instagram.redirect"
    }

    async fn attempt(&self, url: &str) -> Result<Extraction, VidgrabError> {
        parse_shortcode(url).ok_or_else(invalid_instagram_url)?;
        let meta = oembed_or_defaults(&self.client, url).await;

        Ok(Extraction {
            title: meta.title,
            author: meta.author,
            thumbnail_url: meta.thumbnail_url,
            duration_label: "0:00".to_string(),
            streams: build_external_streams(url),
        })
    }
}

fn build_external_streams(url: &str) -> Vec<RawStream> {
    let encoded = urlencoding::encode(url);
    let sites = [
        ("igram.world", format!("https://igram.world/?url={}", encoded)),
        ("snapinsta.app", format!("https://snapinsta.app/?url={}", encoded)),
        ("saveig.app", format!("https://saveig.app/en?url={}", encoded)),
    ];

    sites
        .into_iter()
        .map(|(site, locator)| RawStream {
            quality: format!("\u{2197} Open on {}", site),
            locator,
            size_label: "Opens download site".to_string(),
            is_external_redirect: true,
            ..RawStream::default()
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct InstagramOembed {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author_name: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

struct OembedMeta {
    title: String,
    author: String,
    thumbnail_url: String,
}

impl Default for OembedMeta {
    fn default() -> Self {
        Self {
            title: "Instagram Video".to_string(),
            author: "Instagram User".to_string(),
            thumbnail_url: String::new(),
        }
    }
}

async fn oembed_or_defaults(client: &Client, url: &str) -> OembedMeta {
    let endpoint = format!(
        "https://api.instagram.com/oembed/?url={}&maxwidth=640&omitscript=1",
        urlencoding::encode(url)
    );

    let response = match client.get(&endpoint).send().await {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            debug!("Instagram oEmbed lookup returned {}", r.status());
            return OembedMeta::default();
        }
        Err(e) => {
            debug!("Instagram oEmbed lookup failed: {}", e);
            return OembedMeta::default();
        }
    };

    match response.json::<InstagramOembed>().await {
        Ok(body) => {
            let defaults = OembedMeta::default();
            OembedMeta {
                title: body.title.filter(|t| !t.is_empty()).unwrap_or(defaults.title),
                author: body
                    .author_name
                    .filter(|a| !a.is_empty())
                    .unwrap_or(defaults.author),
                thumbnail_url: body.thumbnail_url.unwrap_or(defaults.thumbnail_url),
            }
        }
        Err(e) => {
            debug!("Instagram oEmbed response unreadable: {}", e);
            OembedMeta::default()
        }
    }
}

// ============================================================
// Tests
// ============================================================
