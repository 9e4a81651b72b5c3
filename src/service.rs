//! Resolution service
//!
//! Ties the pieces together: validate the submitted URL, consult the
//! cache, route to the platform's strategy chain, normalize the result,
//! and report failures to the usage recorder without ever letting the
//! recorder or cache affect the caller's outcome.

use crate::cache::{MemoryCache, VideoCache};
use crate::extractor::chain::StrategyChain;
use crate::extractor::facebook::GetfvidStrategy;
use crate::extractor::instagram::{ExternalPagesStrategy, GraphQlStrategy, MobileApiStrategy};
use crate::extractor::models::VideoInfo;
use crate::extractor::net::browser_client;
use crate::extractor::tiktok::TikwmStrategy;
use crate::extractor::traits::ExtractStrategy;
use crate::extractor::twitter::TwitsaveStrategy;
use crate::extractor::youtube::{OembedResolverStrategy, RedirectPageStrategy, YtDlpProbeStrategy};
use crate::extractor::ytdlp::YtDlp;
use crate::normalize::normalize;
use crate::recorder::{FailureEvent, MemoryRecorder, UsageRecorder};
use crate::router::{classify, Platform};
use crate::utils::{Settings, VidgrabError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

pub struct Resolver {
    chains: HashMap<Platform, StrategyChain>,
    cache: Arc<dyn VideoCache>,
    recorder: Arc<dyn UsageRecorder>,
}

impl Resolver {
    /// Resolver with the stock strategy chains, an in-process cache, and
    /// an in-process recorder.
    pub fn new(settings: &Settings) -> Self {
        Self::with_chains(
            Self::default_chains(settings),
            Arc::new(MemoryCache::new(settings.cache_ttl_secs)),
            Arc::new(MemoryRecorder::new()),
        )
    }

    /// Seam for embedders and tests: any strategy set, any cache and
    /// recorder implementations.
    pub fn with_chains(
        chains: HashMap<Platform, StrategyChain>,
        cache: Arc<dyn VideoCache>,
        recorder: Arc<dyn UsageRecorder>,
    ) -> Self {
        Self {
            chains,
            cache,
            recorder,
        }
    }

    /// The stock per-platform chains, ordered most-capable first. The
    /// Instagram mobile API strategy joins the chain only when a session
    /// credential is configured.
    pub fn default_chains(settings: &Settings) -> HashMap<Platform, StrategyChain> {
        let client = browser_client(Duration::from_secs(settings.request_timeout_secs));
        let ytdlp = YtDlp::locate(Duration::from_secs(settings.probe_timeout_secs)).map(Arc::new);

        let mut chains = HashMap::new();

        chains.insert(
            Platform::YouTube,
            StrategyChain::new(vec![
                Arc::new(YtDlpProbeStrategy::new(ytdlp)) as Arc<dyn ExtractStrategy>,
                Arc::new(OembedResolverStrategy::new(client.clone())),
                Arc::new(RedirectPageStrategy::new(client.clone())),
            ]),
        );

        chains.insert(
            Platform::TikTok,
            StrategyChain::new(vec![
                Arc::new(TikwmStrategy::new(client.clone())) as Arc<dyn ExtractStrategy>
            ]),
        );

        let mut instagram: Vec<Arc<dyn ExtractStrategy>> = vec![Arc::new(GraphQlStrategy::new(
            client.clone(),
            settings.instagram_session.clone(),
        ))];
        if let Some(session) = &settings.instagram_session {
            instagram.push(Arc::new(MobileApiStrategy::new(
                client.clone(),
                session.clone(),
            )));
        }
        instagram.push(Arc::new(ExternalPagesStrategy::new(client.clone())));
        chains.insert(Platform::Instagram, StrategyChain::new(instagram));

        chains.insert(
            Platform::Facebook,
            StrategyChain::new(vec![
                Arc::new(GetfvidStrategy::new(client.clone())) as Arc<dyn ExtractStrategy>
            ]),
        );

        chains.insert(
            Platform::Twitter,
            StrategyChain::new(vec![
                Arc::new(TwitsaveStrategy::new(client)) as Arc<dyn ExtractStrategy>
            ]),
        );

        chains
    }

    /// Resolve a user-submitted URL into a downloadable-format bundle.
    pub async fn resolve(&self, url: &str) -> Result<VideoInfo, VidgrabError> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(VidgrabError::InvalidInput(
                "Please enter a valid URL.".to_string(),
            ));
        }

        match Url::parse(trimmed) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                return Err(VidgrabError::InvalidInput(
                    "Invalid URL format. Please paste the full video URL including https://"
                        .to_string(),
                ));
            }
        }

        if let Some(info) = self.cache.get(trimmed).await {
            debug!("Cache hit for {}", trimmed);
            return Ok(info);
        }

        let result = self.resolve_fresh(trimmed).await;

        if let Err(error) = &result {
            warn!("Resolution failed for {}: {}", trimmed, error);
            let recorder = Arc::clone(&self.recorder);
            let mut event = FailureEvent::new(trimmed, &error.to_string());
            event.detail = Some(error.kind().as_str().to_string());
            tokio::spawn(async move {
                recorder.record_failure(event).await;
            });
        }

        result
    }

    async fn resolve_fresh(&self, url: &str) -> Result<VideoInfo, VidgrabError> {
        let platform = classify(url).ok_or_else(|| {
            VidgrabError::UnsupportedPlatform(
                "Unsupported platform. Supported: YouTube, TikTok, Instagram, Facebook, Twitter/X. \
                 Make sure you paste the full video URL."
                    .to_string(),
            )
        })?;

        let chain = self.chains.get(&platform).ok_or_else(|| {
            VidgrabError::NoUsableFormats(
                "No extraction strategy is configured for this platform. This is a deployment problem, not a problem with your URL.".to_string(),
            )
        })?;

        debug!("Resolving {} as {}", url, platform);
        let extraction = chain.run(url).await?;

        let info = VideoInfo {
            platform: platform.label().to_string(),
            title: extraction.title,
            author: extraction.author,
            thumbnail_url: extraction.thumbnail_url,
            duration_label: extraction.duration_label,
            formats: normalize(extraction.streams, url),
            source_url: url.to_string(),
        };

        self.cache.put(url, &info).await;
        debug!(
            "Resolved {} to {} formats via {}",
            url,
            info.formats.len(),
            platform
        );

        Ok(info)
    }
}
