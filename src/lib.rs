//! vidgrab library
//!
//! Core of a social-media video download service: resolve a YouTube,
//! TikTok, Instagram, Facebook, or Twitter/X URL into a bundle of
//! downloadable formats, then stream the chosen format out through a
//! guarded egress proxy. Embedders wire the resolver and proxy into
//! whatever HTTP surface they expose.

pub mod cache;
pub mod extractor;
pub mod normalize;
pub mod proxy;
pub mod recorder;
pub mod router;
pub mod service;
pub mod staging;
pub mod utils;

// Re-export main types for easier use
pub use cache::{CachedResolution, MemoryCache, VideoCache};
pub use extractor::{ExtractStrategy, Extraction, RawStream, StrategyChain, VideoFormat, VideoInfo, YtDlp};
pub use normalize::normalize;
pub use proxy::{EgressProxy, MediaStream, ProxyRequest};
pub use recorder::{
    DownloadEvent, FailureEvent, MemoryRecorder, SqliteRecorder, UsageRecorder,
};
pub use router::{classify, Platform};
pub use service::Resolver;
pub use staging::{MediaStager, StagedMedia};
pub use utils::{ErrorKind, Settings, VidgrabError};

/// Install a plain fmt tracing subscriber. Embedders with their own
/// subscriber skip this.
pub fn init_tracing() {
    tracing_subscriber::fmt::init();
}
