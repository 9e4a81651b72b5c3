pub mod chain;
pub mod facebook;
pub mod instagram;
pub mod models;
pub mod net;
pub mod tiktok;
pub mod traits;
pub mod twitter;
pub mod youtube;
pub mod ytdlp;

pub use chain::StrategyChain;
pub use models::{Extraction, RawStream, VideoFormat, VideoInfo};
pub use traits::ExtractStrategy;
pub use ytdlp::YtDlp;
