//! Normalization of raw strategy output into the published format list
//!
//! Strategies return whatever their upstream exposes. This pass turns
//! that into a predictable list: junk discarded, duplicates collapsed,
//! merge requirements tagged, best quality first, and never empty.

use crate::extractor::models::{RawStream, VideoFormat};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref DIMENSIONS_RE: Regex =
        Regex::new(r"(\d+)\s*x\s*(\d+)").expect("dimensions pattern is valid");
    static ref HEIGHT_RE: Regex = Regex::new(r"(\d+)p\b").expect("height pattern is valid");
}

/// Numeric resolution of a quality label, when one can be read out of
/// it. `"1280x720"` and `"HD 720p"` both mean 720.
fn parse_resolution(label: &str) -> Option<u32> {
    if let Some(caps) = DIMENSIONS_RE.captures(label) {
        return caps[2].parse().ok();
    }
    HEIGHT_RE
        .captures(label)
        .and_then(|caps| caps[1].parse().ok())
}

fn sort_rank(format: &VideoFormat) -> u8 {
    if !format.has_video {
        2
    } else if parse_resolution(&format.quality).is_some() {
        0
    } else {
        1
    }
}

/// Clean up a strategy's candidate streams into the final format list.
///
/// Entries with no locator or no media are dropped, duplicates by
/// (quality, audio, video) keep their first occurrence, at most one
/// audio-only entry survives, and video-only entries are flagged as
/// needing a merge. Video formats sort by descending resolution with
/// unparseable labels after them in their original order, and the
/// audio-only entry goes last. An empty result is replaced by a single
/// "Best Available" entry pointing at the source URL itself.
pub fn normalize(streams: Vec<RawStream>, source_url: &str) -> Vec<VideoFormat> {
    let mut seen: HashSet<(String, bool, bool)> = HashSet::new();
    let mut kept_audio_only = false;
    let mut formats: Vec<VideoFormat> = Vec::new();

    for stream in streams {
        if stream.locator.trim().is_empty() {
            continue;
        }
        if !stream.has_audio && !stream.has_video {
            continue;
        }
        if !stream.has_video {
            if kept_audio_only {
                continue;
            }
            kept_audio_only = true;
        }
        let key = (stream.quality.clone(), stream.has_audio, stream.has_video);
        if !seen.insert(key) {
            continue;
        }
        let requires_merge = stream.has_video && !stream.has_audio;
        formats.push(VideoFormat {
            quality: stream.quality,
            container: stream.container,
            locator: stream.locator,
            approx_size_label: stream.size_label,
            has_audio: stream.has_audio,
            has_video: stream.has_video,
            requires_merge,
            is_external_redirect: stream.is_external_redirect,
        });
    }

    formats.sort_by(|a, b| {
        sort_rank(a).cmp(&sort_rank(b)).then_with(|| {
            let ra = parse_resolution(&a.quality).unwrap_or(0);
            let rb = parse_resolution(&b.quality).unwrap_or(0);
            rb.cmp(&ra)
        })
    });

    if formats.is_empty() {
        formats.push(VideoFormat {
            quality: "Best Available".to_string(),
            container: "mp4".to_string(),
            locator: source_url.to_string(),
            approx_size_label: "Unknown".to_string(),
            has_audio: true,
            has_video: true,
            requires_merge: false,
            is_external_redirect: false,
        });
    }

    formats
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_stream() -> impl Strategy<Value = RawStream> {
        (
            prop_oneof![
                Just("1080p".to_string()),
                Just("HD 720p".to_string()),
                Just("640x360".to_string()),
                Just("Audio Only".to_string()),
                Just("Best Quality".to_string()),
                "[A-Za-z0-9 ]{0,12}",
            ],
            prop_oneof![Just(String::new()), Just("https://cdn/v.mp4".to_string()), "[a-z0-9/:.]{1,24}"],
            any::<bool>(),
            any::<bool>(),
        )
            .prop_map(|(quality, locator, has_audio, has_video)| RawStream {
                quality,
                locator,
                has_audio,
                has_video,
                ..RawStream::default()
            })
    }

    proptest! {
        #[test]
        fn output_is_never_empty(streams in proptest::collection::vec(arb_stream(), 0..12)) {
            let formats = normalize(streams, "https://src");
            prop_assert!(!formats.is_empty());
        }

        #[test]
        fn quality_keys_are_unique(streams in proptest::collection::vec(arb_stream(), 0..12)) {
            let formats = normalize(streams, "https://src");
            let mut keys: Vec<_> = formats
                .iter()
                .map(|f| (f.quality.clone(), f.has_audio, f.has_video))
                .collect();
            let before = keys.len();
            keys.sort();
            keys.dedup();
            prop_assert_eq!(before, keys.len());
        }

        #[test]
        fn at_most_one_audio_only_entry(streams in proptest::collection::vec(arb_stream(), 0..12)) {
            let formats = normalize(streams, "https://src");
            let audio_only = formats.iter().filter(|f| !f.has_video).count();
            prop_assert!(audio_only <= 1);
        }

        #[test]
        fn merge_flag_matches_the_stream_shape(streams in proptest::collection::vec(arb_stream(), 0..12)) {
            let formats = normalize(streams, "https://src");
            for f in &formats {
                prop_assert_eq!(f.requires_merge, f.has_video && !f.has_audio);
            }
        }

        #[test]
        fn normalization_is_idempotent(streams in proptest::collection::vec(arb_stream(), 0..12)) {
            let formats = normalize(streams, "https://src");
            let as_raw: Vec<RawStream> = formats
                .iter()
                .map(|f| RawStream {
                    quality: f.quality.clone(),
                    container: f.container.clone(),
                    locator: f.locator.clone(),
                    size_label: f.approx_size_label.clone(),
                    has_audio: f.has_audio,
                    has_video: f.has_video,
                    is_external_redirect: f.is_external_redirect,
                })
                .collect();
            prop_assert_eq!(formats, normalize(as_raw, "https://src"));
        }
    }
}
