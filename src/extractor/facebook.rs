//! Facebook extraction via the getfvid resolver page

use crate::extractor::models::{Extraction, RawStream};
use crate::extractor::net::unavailable_for_status;
use crate::extractor::traits::ExtractStrategy;
use crate::utils::VidgrabError;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, ORIGIN, REFERER};
use reqwest::Client;

const RESOLVER_SITE: &str = "https://getfvid.com";

/// At most this many formats from the resolver page.
const MAX_FORMATS: usize = 3;

lazy_static! {
    static ref HD_LINK_RE: Regex = Regex::new(
        r#"(?i)href="(https://[^"]+facebook[^"]+(?:&dl=1|download)[^"]*)"[^>]*>[^<]*HD"#
    )
    .expect("hd link pattern is valid");
    static ref HD_CLASS_RE: Regex =
        Regex::new(r#"(?i)<a[^>]+href="(https://[^"]+)"[^>]*class="[^"]*hd[^"]*""#)
            .expect("hd class pattern is valid");
    static ref SD_LINK_RE: Regex = Regex::new(
        r#"(?i)href="(https://[^"]+facebook[^"]+(?:&dl=1|download)[^"]*)"[^>]*>[^<]*SD"#
    )
    .expect("sd link pattern is valid");
    static ref SD_CLASS_RE: Regex =
        Regex::new(r#"(?i)<a[^>]+href="(https://[^"]+)"[^>]*class="[^"]*sd[^"]*""#)
            .expect("sd class pattern is valid");
    static ref GENERIC_LINK_RE: Regex = Regex::new(
        r#"(?i)href="(https://[^"]*(?:fbcdn\.net|facebook\.com)[^"]*(?:&dl=1|\.mp4)[^"]*)""#
    )
    .expect("generic link pattern is valid");
    static ref TITLE_RE: Regex =
        Regex::new(r#"(?i)(?:og:title|<title)[^>]*content="([^"]+)"|<title>([^<]+)</title>"#)
            .expect("title pattern is valid");
    static ref THUMB_RE: Regex =
        Regex::new(r#"(?i)og:image[^>]*content="([^"]+)"|<img[^>]+src="(https://[^"]*scontent[^"]+)""#)
            .expect("thumbnail pattern is valid");
}

pub struct GetfvidStrategy {
    client: Client,
}

impl GetfvidStrategy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractStrategy for GetfvidStrategy {
    fn id(&self) -> &'static str {
        "facebook.getfvid"
    }

    async fn attempt(&self, url: &str) -> Result<Extraction, VidgrabError> {
        let response = self
            .client
            .post(format!("{}/downloader", RESOLVER_SITE))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(REFERER, format!("{}/", RESOLVER_SITE))
            .header(ORIGIN, RESOLVER_SITE)
            .body(format!("url={}", urlencoding::encode(url)))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(unavailable_for_status("The Facebook resolver", response.status()));
        }

        let html = response.text().await?;
        parse_download_page(&html)
    }
}

/// Pull quality-labeled links out of the resolver page, falling back to
/// any Facebook CDN link, capped at three distinct formats.
fn parse_download_page(html: &str) -> Result<Extraction, VidgrabError> {
    let mut streams: Vec<RawStream> = Vec::new();

    let hd = HD_LINK_RE
        .captures(html)
        .or_else(|| HD_CLASS_RE.captures(html));
    if let Some(caps) = hd {
        streams.push(RawStream {
            quality: "HD 720p".to_string(),
            locator: caps[1].to_string(),
            ..RawStream::default()
        });
    }

    let sd = SD_LINK_RE
        .captures(html)
        .or_else(|| SD_CLASS_RE.captures(html));
    if let Some(caps) = sd {
        streams.push(RawStream {
            quality: "SD 480p".to_string(),
            locator: caps[1].to_string(),
            ..RawStream::default()
        });
    }

    for caps in GENERIC_LINK_RE.captures_iter(html) {
        if streams.len() >= MAX_FORMATS {
            break;
        }
        let link = caps[1].to_string();
        if streams.iter().any(|s| s.locator == link) {
            continue;
        }
        streams.push(RawStream {
            quality: format!("Quality {}", streams.len() + 1),
            locator: link,
            ..RawStream::default()
        });
    }

    if streams.is_empty() {
        return Err(VidgrabError::NoUsableFormats(
            "Could not extract Facebook video. Make sure the video is public and the URL is correct."
                .to_string(),
        ));
    }

    Ok(Extraction {
        title: parse_title(html),
        author: "Facebook User".to_string(),
        thumbnail_url: parse_thumbnail(html),
        duration_label: "0:00".to_string(),
        streams,
    })
}

fn parse_title(html: &str) -> String {
    TITLE_RE
        .captures(html)
        .and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().replace(" | getfvid", "").trim().to_string())
        })
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "Facebook Video".to_string())
}

fn parse_thumbnail(html: &str) -> String {
    THUMB_RE
        .captures(html)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}
