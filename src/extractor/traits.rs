use crate::extractor::models::Extraction;
use crate::utils::VidgrabError;
use async_trait::async_trait;

/// One way of extracting downloadable media from a platform URL.
///
/// This trait isolates the resolution pipeline from the specific
/// extraction method (local yt-dlp probe, upstream API, resolver-page
/// scrape, redirect fallback). A platform's chain holds several of
/// these in priority order.
#[async_trait]
pub trait ExtractStrategy: Send + Sync {
    /// Returns a stable identifier for logs (e.g., "tiktok.tikwm",
    /// "instagram.graphql").
    fn id(&self) -> &'static str;

    /// Makes one full extraction attempt against the given URL.
    ///
    /// Implementations classify every upstream failure into
    /// [`VidgrabError`] before returning; raw transport text only ever
    /// survives as a truncated diagnostic inside the message.
    async fn attempt(&self, url: &str) -> Result<Extraction, VidgrabError>;
}
