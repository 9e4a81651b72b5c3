//! Error taxonomy for resolution and egress failures

use thiserror::Error;

/// Upper bound on upstream diagnostic text embedded in a message.
const DIAGNOSTIC_LIMIT: usize = 200;

/// Classified failure raised by resolution and proxy operations.
///
/// Every variant carries a complete, user-presentable message that names
/// the problem and suggests a next step. Raw transport or scrape error
/// text never appears except as a truncated diagnostic inside that
/// message.
#[derive(Debug, Error)]
pub enum VidgrabError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    UnsupportedPlatform(String),

    #[error("{0}")]
    LoginRequired(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Private(String),

    #[error("{0}")]
    UpstreamUnavailable(String),

    #[error("{0}")]
    ParseFailure(String),

    #[error("{0}")]
    NoUsableFormats(String),

    #[error("{0}")]
    InvalidLocator(String),

    #[error("{0}")]
    NotMedia(String),

    #[error("{0}")]
    TooLarge(String),

    #[error("{0}")]
    UpstreamFetchFailed(String),
}

/// Stable programmatic classification of a [`VidgrabError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    UnsupportedPlatform,
    LoginRequired,
    NotFound,
    Private,
    UpstreamUnavailable,
    ParseFailure,
    NoUsableFormats,
    InvalidLocator,
    NotMedia,
    TooLarge,
    UpstreamFetchFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::UnsupportedPlatform => "unsupported_platform",
            ErrorKind::LoginRequired => "login_required",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Private => "private",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::ParseFailure => "parse_failure",
            ErrorKind::NoUsableFormats => "no_usable_formats",
            ErrorKind::InvalidLocator => "invalid_locator",
            ErrorKind::NotMedia => "not_media",
            ErrorKind::TooLarge => "too_large",
            ErrorKind::UpstreamFetchFailed => "upstream_fetch_failed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl VidgrabError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VidgrabError::InvalidInput(_) => ErrorKind::InvalidInput,
            VidgrabError::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            VidgrabError::LoginRequired(_) => ErrorKind::LoginRequired,
            VidgrabError::NotFound(_) => ErrorKind::NotFound,
            VidgrabError::Private(_) => ErrorKind::Private,
            VidgrabError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            VidgrabError::ParseFailure(_) => ErrorKind::ParseFailure,
            VidgrabError::NoUsableFormats(_) => ErrorKind::NoUsableFormats,
            VidgrabError::InvalidLocator(_) => ErrorKind::InvalidLocator,
            VidgrabError::NotMedia(_) => ErrorKind::NotMedia,
            VidgrabError::TooLarge(_) => ErrorKind::TooLarge,
            VidgrabError::UpstreamFetchFailed(_) => ErrorKind::UpstreamFetchFailed,
        }
    }
}

/// Cap upstream error text so transport internals never dominate a
/// user-facing message.
pub fn truncate_diagnostic(text: &str) -> String {
    let cleaned = text.trim();
    if cleaned.len() <= DIAGNOSTIC_LIMIT {
        return cleaned.to_string();
    }
    let mut end = DIAGNOSTIC_LIMIT;
    while !cleaned.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &cleaned[..end])
}

impl From<reqwest::Error> for VidgrabError {
    fn from(err: reqwest::Error) -> Self {
        VidgrabError::UpstreamUnavailable(format!(
            "The upstream service did not respond. It may be down or rate-limiting; try again shortly ({})",
            truncate_diagnostic(&err.to_string())
        ))
    }
}

impl From<std::io::Error> for VidgrabError {
    fn from(err: std::io::Error) -> Self {
        VidgrabError::UpstreamFetchFailed(format!(
            "Reading the media stream failed partway. Try the download again ({})",
            truncate_diagnostic(&err.to_string())
        ))
    }
}

impl From<serde_json::Error> for VidgrabError {
    fn from(err: serde_json::Error) -> Self {
        VidgrabError::ParseFailure(format!(
            "The upstream response could not be understood. The service may have changed its format ({})",
            truncate_diagnostic(&err.to_string())
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        let err = VidgrabError::Private("This video is private.".to_string());
        assert_eq!(err.kind(), ErrorKind::Private);
        assert_eq!(err.kind().as_str(), "private");

        let err = VidgrabError::TooLarge("File exceeds the limit.".to_string());
        assert_eq!(err.kind(), ErrorKind::TooLarge);
    }

    #[test]
    fn display_is_the_message_verbatim() {
        let msg = "Unsupported platform. Supported: YouTube, TikTok, Instagram, Facebook, Twitter/X.";
        let err = VidgrabError::UnsupportedPlatform(msg.to_string());
        assert_eq!(err.to_string(), msg);
    }

    #[test]
    fn diagnostic_is_truncated() {
        let long = "x".repeat(500);
        let out = truncate_diagnostic(&long);
        assert!(out.len() <= DIAGNOSTIC_LIMIT + 3);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn diagnostic_truncation_respects_char_boundaries() {
        let long = "ü".repeat(300);
        let out = truncate_diagnostic(&long);
        assert!(out.ends_with("..."));
        // must not panic slicing mid-character
        assert!(out.chars().count() > 0);
    }

    #[test]
    fn short_diagnostic_passes_through_trimmed() {
        assert_eq!(truncate_diagnostic("  connection refused  "), "connection refused");
    }

    #[test]
    fn json_error_classifies_as_parse_failure() {
        let err: VidgrabError =
            serde_json::from_str::<serde_json::Value>("{not json").unwrap_err().into();
        assert_eq!(err.kind(), ErrorKind::ParseFailure);
    }
}
