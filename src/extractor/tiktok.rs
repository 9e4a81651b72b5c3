//! TikTok extraction via the tikwm resolver API

use crate::extractor::models::{Extraction, RawStream};
use crate::extractor::net::unavailable_for_status;
use crate::extractor::traits::ExtractStrategy;
use crate::utils::error::{truncate_diagnostic, VidgrabError};
use crate::utils::{duration_label, size_label};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const TIKWM_BASE: &str = "https://www.tikwm.com";

pub struct TikwmStrategy {
    client: Client,
}

impl TikwmStrategy {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ExtractStrategy for TikwmStrategy {
    fn id(&self) -> &'static str {
        "tiktok.tikwm"
    }

    async fn attempt(&self, url: &str) -> Result<Extraction, VidgrabError> {
        let api_url = format!(
            "{}/api/?url={}&hd=1",
            TIKWM_BASE,
            urlencoding::encode(url)
        );

        let response = self.client.get(&api_url).send().await?;
        if !response.status().is_success() {
            return Err(unavailable_for_status("tikwm.com", response.status()));
        }

        let body: TikwmResponse = response.json().await.map_err(|e| {
            VidgrabError::ParseFailure(format!(
                "The TikTok resolver returned something that is not JSON ({})",
                truncate_diagnostic(&e.to_string())
            ))
        })?;

        build_extraction(body)
    }
}

#[derive(Debug, Deserialize)]
struct TikwmResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<TikwmData>,
}

#[derive(Debug, Default, Deserialize)]
struct TikwmData {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    cover: Option<String>,
    #[serde(default)]
    origin_cover: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    play: Option<String>,
    #[serde(default)]
    wmplay: Option<String>,
    #[serde(default)]
    hdplay: Option<String>,
    #[serde(default)]
    music: Option<String>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    wm_size: Option<u64>,
    #[serde(default)]
    hd_size: Option<u64>,
    #[serde(default)]
    author: Option<TikwmAuthor>,
    #[serde(default)]
    music_info: Option<TikwmMusicInfo>,
}

#[derive(Debug, Default, Deserialize)]
struct TikwmAuthor {
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    unique_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct TikwmMusicInfo {
    #[serde(default)]
    size: Option<u64>,
}

/// tikwm sometimes returns site-relative media paths.
fn absolute(locator: &str) -> String {
    if locator.starts_with("http") {
        locator.to_string()
    } else {
        format!("{}{}", TIKWM_BASE, locator)
    }
}

fn build_extraction(body: TikwmResponse) -> Result<Extraction, VidgrabError> {
    if body.code != 0 {
        let msg = body.msg.unwrap_or_else(|| "no reason given".to_string());
        return Err(VidgrabError::ParseFailure(format!(
            "The TikTok resolver rejected this URL ({}). Check that it points at a single video.",
            truncate_diagnostic(&msg)
        )));
    }

    let data = body.data.ok_or_else(|| {
        VidgrabError::ParseFailure(
            "The TikTok resolver answered without any video data. The service may have changed its format.".to_string(),
        )
    })?;

    let mut streams = Vec::new();

    if let Some(hd) = data.hdplay.as_deref().filter(|s| !s.is_empty()) {
        streams.push(RawStream {
            quality: "Full HD (No Watermark)".to_string(),
            locator: absolute(hd),
            size_label: size_label(data.hd_size),
            ..RawStream::default()
        });
    }

    if let Some(play) = data.play.as_deref().filter(|s| !s.is_empty()) {
        streams.push(RawStream {
            quality: "HD (No Watermark)".to_string(),
            locator: absolute(play),
            size_label: size_label(data.size),
            ..RawStream::default()
        });
    }

    if let Some(wm) = data.wmplay.as_deref().filter(|s| !s.is_empty()) {
        streams.push(RawStream {
            quality: "SD (Watermarked)".to_string(),
            locator: absolute(wm),
            size_label: size_label(data.wm_size),
            ..RawStream::default()
        });
    }

    if let Some(music) = data.music.as_deref().filter(|s| !s.is_empty()) {
        streams.push(RawStream {
            quality: "Music / Audio".to_string(),
            container: "mp3".to_string(),
            locator: absolute(music),
            size_label: size_label(data.music_info.as_ref().and_then(|m| m.size)),
            has_video: false,
            ..RawStream::default()
        });
    }

    if streams.is_empty() {
        return Err(VidgrabError::NoUsableFormats(
            "TikTok returned no downloadable media for this video. It may be region-locked or removed; try another video.".to_string(),
        ));
    }

    let author = data
        .author
        .as_ref()
        .and_then(|a| a.nickname.clone().or_else(|| a.unique_id.clone()))
        .unwrap_or_else(|| "TikTok User".to_string());

    Ok(Extraction {
        title: data.title.unwrap_or_else(|| "TikTok Video".to_string()),
        author,
        thumbnail_url: data.cover.or(data.origin_cover).unwrap_or_default(),
        duration_label: duration_label(data.duration.unwrap_or(0.0)),
        streams,
    })
}
