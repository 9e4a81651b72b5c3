//! Shared HTTP identity for upstream requests
//!
//! Every outbound request presents the same desktop-browser header set;
//! several of the upstreams serve different (or no) content to
//! obviously-programmatic clients.

use crate::utils::VidgrabError;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use std::time::Duration;

pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

const BROWSER_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8";

const BROWSER_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Client for resolution strategies: browser identity plus a total
/// request timeout so one hung upstream leaves budget for fallbacks.
pub fn browser_client(timeout: Duration) -> Client {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(BROWSER_ACCEPT));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static(BROWSER_ACCEPT_LANGUAGE));

    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .expect("Failed to create HTTP client")
}

/// Client for the egress proxy: connect timeout only, since a total
/// timeout would cut off long downloads mid-stream.
pub fn streaming_client(connect_timeout: Duration) -> Client {
    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .connect_timeout(connect_timeout)
        .build()
        .expect("Failed to create HTTP client")
}

/// Standard classification for a non-success status from a resolution
/// upstream.
pub fn unavailable_for_status(service: &str, status: reqwest::StatusCode) -> VidgrabError {
    VidgrabError::UpstreamUnavailable(format!(
        "{} responded with HTTP {}. The service may be down or rate-limiting; try again shortly.",
        service,
        status.as_u16()
    ))
}
