//! Platform detection for user-submitted URLs

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported source platforms, in routing precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    YouTube,
    TikTok,
    Instagram,
    Facebook,
    Twitter,
}

impl Platform {
    /// Human-facing label, used verbatim in resolved video bundles.
    pub fn label(&self) -> &'static str {
        match self {
            Platform::YouTube => "YouTube",
            Platform::TikTok => "TikTok",
            Platform::Instagram => "Instagram",
            Platform::Facebook => "Facebook",
            Platform::Twitter => "Twitter/X",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classify a URL by case-insensitive host substring. Checks run in a
/// fixed order so `fb.watch` short links and `x.com` both land on the
/// right platform. Returns `None` for anything unrecognized.
pub fn classify(url: &str) -> Option<Platform> {
    let lower = url.to_lowercase();

    if lower.contains("youtube.com") || lower.contains("youtu.be") {
        return Some(Platform::YouTube);
    }
    if lower.contains("tiktok.com") {
        return Some(Platform::TikTok);
    }
    if lower.contains("instagram.com") {
        return Some(Platform::Instagram);
    }
    if lower.contains("facebook.com") || lower.contains("fb.watch") || lower.contains("fb.com") {
        return Some(Platform::Facebook);
    }
    if lower.contains("twitter.com") || lower.contains("x.com") {
        return Some(Platform::Twitter);
    }

    None
}
