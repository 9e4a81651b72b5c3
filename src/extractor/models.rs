//! Data structures for resolved video information

use serde::{Deserialize, Serialize};

/// One downloadable option presented to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoFormat {
    /// Human-facing quality label ("1080p", "HD (No Watermark)", ...).
    pub quality: String,
    pub container: String,
    /// A directly fetchable URL, an opaque extractor format id, or the
    /// path of a locally staged file.
    pub locator: String,
    pub approx_size_label: String,
    pub has_audio: bool,
    pub has_video: bool,
    /// Video-only stream that must be paired with audio at delivery.
    #[serde(default)]
    pub requires_merge: bool,
    /// Locator points at a third-party download page, not media bytes.
    #[serde(default)]
    pub is_external_redirect: bool,
}

/// Resolved information for one video URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub platform: String,
    pub title: String,
    pub author: String,
    pub thumbnail_url: String,
    /// Rendered as M:SS, "0:00" when unknown.
    pub duration_label: String,
    pub formats: Vec<VideoFormat>,
    pub source_url: String,
}

/// What a strategy hands back: metadata plus the candidate streams it
/// found, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub title: String,
    pub author: String,
    pub thumbnail_url: String,
    pub duration_label: String,
    pub streams: Vec<RawStream>,
}

/// A candidate stream as a strategy found it, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawStream {
    pub quality: String,
    pub container: String,
    pub locator: String,
    pub size_label: String,
    pub has_audio: bool,
    pub has_video: bool,
    pub is_external_redirect: bool,
}

impl Default for RawStream {
    fn default() -> Self {
        Self {
            quality: String::new(),
            container: "mp4".to_string(),
            locator: String::new(),
            size_label: "Unknown".to_string(),
            has_audio: true,
            has_video: true,
            is_external_redirect: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_serialize_camel_case() {
        let format = VideoFormat {
            quality: "720p".to_string(),
            container: "mp4".to_string(),
            locator: "https://example.com/v.mp4".to_string(),
            approx_size_label: "12.5 MB".to_string(),
            has_audio: true,
            has_video: true,
            requires_merge: false,
            is_external_redirect: false,
        };
        let json = serde_json::to_string(&format).expect("format should serialize");
        assert!(json.contains("approxSizeLabel"));
        assert!(json.contains("hasAudio"));
        assert!(json.contains("requiresMerge"));
        assert!(json.contains("isExternalRedirect"));
    }

    #[test]
    fn older_payloads_without_merge_flags_deserialize() {
        let json = r#"{
            "quality": "480p",
            "container": "mp4",
            "locator": "https://example.com/v.mp4",
            "approxSizeLabel": "Unknown",
            "hasAudio": true,
            "hasVideo": true
        }"#;
        let format: VideoFormat = serde_json::from_str(json).expect("should deserialize");
        assert!(!format.requires_merge);
        assert!(!format.is_external_redirect);
    }

    #[test]
    fn raw_stream_defaults_to_muxed_mp4() {
        let raw = RawStream {
            quality: "HD".to_string(),
            locator: "https://example.com/v.mp4".to_string(),
            ..RawStream::default()
        };
        assert!(raw.has_audio && raw.has_video);
        assert_eq!(raw.container, "mp4");
        assert_eq!(raw.size_label, "Unknown");
        assert!(!raw.is_external_redirect);
    }
}
