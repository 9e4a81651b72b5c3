use crate::extractor::models::Extraction;
use crate::extractor::traits::ExtractStrategy;
use crate::utils::VidgrabError;
use std::sync::Arc;
use tracing::{debug, warn};

/// An ordered fallback chain of extraction strategies for one platform.
///
/// Strategies run sequentially in construction order; the first success
/// wins and later strategies are never attempted. When every strategy
/// fails, the LAST strategy's error is surfaced — chains are built so
/// the last strategy is the most user-explicable fallback. Earlier
/// failures are kept visible in the logs.
pub struct StrategyChain {
    strategies: Vec<Arc<dyn ExtractStrategy>>,
}

impl StrategyChain {
    pub fn new(strategies: Vec<Arc<dyn ExtractStrategy>>) -> Self {
        Self { strategies }
    }

    pub async fn run(&self, url: &str) -> Result<Extraction, VidgrabError> {
        let mut last_error: Option<VidgrabError> = None;

        for strategy in &self.strategies {
            debug!("Attempting extraction with {} for {}", strategy.id(), url);
            match strategy.attempt(url).await {
                Ok(extraction) => {
                    debug!(
                        "Extraction succeeded with {} ({} streams)",
                        strategy.id(),
                        extraction.streams.len()
                    );
                    return Ok(extraction);
                }
                Err(e) => {
                    warn!("Strategy {} failed for {}: {}", strategy.id(), url, e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            VidgrabError::NoUsableFormats(
                "No extraction strategy is configured for this platform. This is a deployment problem, not a problem with your URL.".to_string(),
            )
        }))
    }
}
