//! Twitter/X extraction via the twitsave resolver page

use crate::extractor::models::{Extraction, RawStream};
use crate::extractor::net::unavailable_for_status;
use crate::extractor::traits::ExtractStrategy;
use crate::utils::VidgrabError;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::REFERER;
use reqwest::Client;

const RESOLVER_SITE: &str = "https://twitsave.com";

/// Cap for unlabeled fallback links only. Labeled variants are kept as-is.
const MAX_FALLBACK_FORMATS: usize = 3;

lazy_static! {
    static ref LABELED_ANCHOR_RE: Regex =
        Regex::new(r#"(?i)<a[^>]+href="(https://[^"]+\.mp4[^"]*)"[^>]*>([^<]+)</a>"#)
            .expect("labeled anchor pattern is valid");
    static ref RESOLUTION_TOKEN_RE: Regex =
        Regex::new(r"(\d+x\d+)").expect("resolution token pattern is valid");
    static ref BARE_LINK_RE: Regex =
        Regex::new(r#"(?i)href="(https://[^"]+\.mp4[^"]*)""#).expect("bare link pattern is valid");
    static ref TITLE_RE: Regex =
        Regex::new(r#"(?i)class="[^"]*title[^"]*"[^>]*>([^<]+)<|<title>([^<|]+)"#)
            .expect("title pattern is valid");
    static ref POSTER_THUMB_RE: Regex =
        Regex::new(r#"(?i)(?:poster|og:image)[^"]*"(https://[^"]*pbs\.twimg\.com[^"]+)""#)
            .expect("poster thumbnail pattern is valid");
    static ref IMG_THUMB_RE: Regex =
        Regex::new(r#"(?i)src="(https://[^"]*pbs\.twimg\.com/[^"]+)""#)
            .expect("img thumbnail pattern is valid");
}

pub struct TwitsaveStrategy {
    client: Client,
}

impl TwitsaveStrategy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractStrategy for TwitsaveStrategy {
    fn id(&self) -> &'static str {
        "twitter.twitsave"
    }

    async fn attempt(&self, url: &str) -> Result<Extraction, VidgrabError> {
        // twitsave only understands the twitter.com form of a status URL.
        let canonical = url.replacen("x.com", "twitter.com", 1);
        let response = self
            .client
            .get(format!(
                "{}/info?url={}",
                RESOLVER_SITE,
                urlencoding::encode(&canonical)
            ))
            .header(REFERER, format!("{}/", RESOLVER_SITE))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(unavailable_for_status("The Twitter/X resolver", response.status()));
        }

        let html = response.text().await?;
        parse_resolver_page(&html)
    }
}

/// Anchors whose text carries a resolution token become labeled formats.
/// Bare mp4 links are only considered when no labeled anchor matched.
fn parse_resolver_page(html: &str) -> Result<Extraction, VidgrabError> {
    let mut streams: Vec<RawStream> = Vec::new();

    for caps in LABELED_ANCHOR_RE.captures_iter(html) {
        let label = caps[2].trim();
        let quality = RESOLUTION_TOKEN_RE
            .captures(label)
            .map(|m| m[1].to_string())
            .unwrap_or_else(|| {
                if label.is_empty() {
                    "HD".to_string()
                } else {
                    label.to_string()
                }
            });
        streams.push(RawStream {
            quality,
            locator: caps[1].to_string(),
            ..RawStream::default()
        });
    }

    if streams.is_empty() {
        for caps in BARE_LINK_RE.captures_iter(html) {
            if streams.len() >= MAX_FALLBACK_FORMATS {
                break;
            }
            streams.push(RawStream {
                quality: format!("Quality {}", streams.len() + 1),
                locator: caps[1].to_string(),
                ..RawStream::default()
            });
        }
    }

    if streams.is_empty() {
        return Err(VidgrabError::NoUsableFormats(
            "Could not extract Twitter/X video. Only public tweets with video are supported."
                .to_string(),
        ));
    }

    Ok(Extraction {
        title: parse_title(html),
        author: "Twitter User".to_string(),
        thumbnail_url: parse_thumbnail(html),
        duration_label: "0:00".to_string(),
        streams,
    })
}

fn parse_title(html: &str) -> String {
    TITLE_RE
        .captures(html)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Twitter/X Video".to_string())
}

fn parse_thumbnail(html: &str) -> String {
    POSTER_THUMB_RE
        .captures(html)
        .or_else(|| IMG_THUMB_RE.captures(html))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESOLVER_PAGE: &str = r#"
        <html>
        <head><title>Great goal | twitsave</title></head>
        <body>
            <video poster="https://pbs.twimg.com/ext_tw_video_thumb/1/pu/img/abc.jpg"></video>
            <div class="video-title leading-tight">Great goal from last night</div>
            <a class="dl" href="https://video.twimg.com/ext_tw_video/1/pu/vid/1280x720/hi.mp4?tag=12">Download 1280x720</a>
            <a class="dl" href="https://video.twimg.com/ext_tw_video/1/pu/vid/640x360/mid.mp4?tag=12">Download 640x360</a>
            <a class="dl" href="https://video.twimg.com/ext_tw_video/1/pu/vid/320x180/lo.mp4?tag=12">Download 320x180</a>
        </body>
        </html>
    "#;

    #[test]
    fn labeled_anchors_become_resolution_formats() {
        let extraction = parse_resolver_page(RESOLVER_PAGE).expect("should extract");
        let qualities: Vec<&str> = extraction.streams.iter().map(|s| s.quality.as_str()).collect();
        assert_eq!(qualities, vec!["1280x720", "640x360", "320x180"]);
        assert!(extraction.streams[0].locator.ends_with("hi.mp4?tag=12"));
    }

    #[test]
    fn label_without_resolution_token_is_kept_verbatim() {
        let html = r#"<a href="https://video.twimg.com/v.mp4">Best quality</a>"#;
        let extraction = parse_resolver_page(html).expect("should extract");
        assert_eq!(extraction.streams[0].quality, "Best quality");
    }

    #[test]
    fn bare_links_are_capped_and_used_only_without_labeled_anchors() {
        let html = r#"
            <link href="https://video.twimg.com/a.mp4" />
            <link href="https://video.twimg.com/b.mp4" />
            <link href="https://video.twimg.com/c.mp4" />
            <link href="https://video.twimg.com/d.mp4" />
        "#;
        let extraction = parse_resolver_page(html).expect("should extract");
        let qualities: Vec<&str> = extraction.streams.iter().map(|s| s.quality.as_str()).collect();
        assert_eq!(qualities, vec!["Quality 1", "Quality 2", "Quality 3"]);
        assert!(extraction.streams[0].locator.ends_with("a.mp4"));
        assert!(extraction.streams[2].locator.ends_with("c.mp4"));
    }

    #[test]
    fn page_title_is_cut_at_the_site_separator() {
        let extraction = parse_resolver_page(RESOLVER_PAGE).expect("should extract");
        assert_eq!(extraction.title, "Great goal");
        assert_eq!(extraction.author, "Twitter User");
    }

    #[test]
    fn titled_element_is_used_when_the_page_has_no_title_tag() {
        let html = r#"
            <div class="video-title leading-tight">Great goal from last night</div>
            <a href="https://video.twimg.com/v.mp4">Download</a>
        "#;
        let extraction = parse_resolver_page(html).expect("should extract");
        assert_eq!(extraction.title, "Great goal from last night");
    }

    #[test]
    fn thumbnail_comes_from_the_poster_attribute() {
        let extraction = parse_resolver_page(RESOLVER_PAGE).expect("should extract");
        assert_eq!(
            extraction.thumbnail_url,
            "https://pbs.twimg.com/ext_tw_video_thumb/1/pu/img/abc.jpg"
        );
    }

    #[test]
    fn page_without_video_links_is_no_usable_formats() {
        let err =
            parse_resolver_page("<html><body>no media</body></html>").expect_err("should fail");
        assert!(matches!(err, VidgrabError::NoUsableFormats(_)));
        assert!(err.to_string().contains("public tweets"));
    }

    #[test]
    fn x_com_urls_are_rewritten_once() {
        let url = "https://x.com/user/status/123";
        assert_eq!(
            url.replacen("x.com", "twitter.com", 1),
            "https://twitter.com/user/status/123"
        );
    }
}
