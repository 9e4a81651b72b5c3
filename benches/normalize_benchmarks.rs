use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::Rng;
use vidgrab::utils::sanitize_download_name;
use vidgrab::{classify, normalize, RawStream};

fn tiktok_shaped() -> Vec<RawStream> {
    vec![
        RawStream {
            quality: "Full HD (No Watermark)".to_string(),
            locator: "https://tikwm.com/video/media/hdplay/7123.mp4".to_string(),
            size_label: "8.4 MB".to_string(),
            ..RawStream::default()
        },
        RawStream {
            quality: "HD (No Watermark)".to_string(),
            locator: "https://tikwm.com/video/media/play/7123.mp4".to_string(),
            size_label: "4.1 MB".to_string(),
            ..RawStream::default()
        },
        RawStream {
            quality: "SD (Watermarked)".to_string(),
            locator: "https://tikwm.com/video/media/wmplay/7123.mp4".to_string(),
            size_label: "3.9 MB".to_string(),
            ..RawStream::default()
        },
        RawStream {
            quality: "Music / Audio".to_string(),
            container: "mp3".to_string(),
            locator: "https://tikwm.com/video/music/7123.mp3".to_string(),
            has_video: false,
            ..RawStream::default()
        },
    ]
}

fn probe_shaped() -> Vec<RawStream> {
    let mut streams = Vec::new();
    for height in [144, 240, 360, 480, 720, 720, 1080, 1080, 1440, 2160] {
        streams.push(RawStream {
            quality: format!("{}p", height),
            locator: format!("https://rr3---sn-abc.googlevideo.com/videoplayback?itag={}", height),
            has_audio: height <= 360,
            ..RawStream::default()
        });
    }
    streams.push(RawStream {
        quality: "Audio Only".to_string(),
        container: "m4a".to_string(),
        locator: "https://rr3---sn-abc.googlevideo.com/videoplayback?itag=140".to_string(),
        has_video: false,
        ..RawStream::default()
    });
    streams
}

fn randomized(count: usize) -> Vec<RawStream> {
    let mut rng = rand::thread_rng();
    let qualities = ["360p", "480p", "720p", "1080p", "1280x720", "HD", "Unknown"];
    (0..count)
        .map(|i| RawStream {
            quality: qualities[rng.gen_range(0..qualities.len())].to_string(),
            locator: format!("https://cdn.example/video/{}.mp4", i),
            has_audio: rng.gen_bool(0.7),
            has_video: rng.gen_bool(0.9),
            size_label: format!("{}.{} MB", rng.gen_range(1..40), rng.gen_range(0..10)),
            ..RawStream::default()
        })
        .collect()
}

fn benchmark_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("Stream Normalization");

    let tiktok = tiktok_shaped();
    group.bench_function("tiktok bundle", |b| {
        b.iter(|| {
            normalize(
                black_box(tiktok.clone()),
                black_box("https://www.tiktok.com/@user/video/7123"),
            )
        })
    });

    let probe = probe_shaped();
    group.bench_function("probe bundle with duplicates", |b| {
        b.iter(|| {
            normalize(
                black_box(probe.clone()),
                black_box("https://www.youtube.com/watch?v=abc123def45"),
            )
        })
    });

    let mixed = randomized(64);
    group.bench_function("64 randomized streams", |b| {
        b.iter(|| {
            normalize(
                black_box(mixed.clone()),
                black_box("https://www.tiktok.com/@user/video/7123"),
            )
        })
    });

    group.finish();
}

fn benchmark_sanitize_download_name(c: &mut Criterion) {
    let mut group = c.benchmark_group("Download Name Sanitization");

    group.bench_function("simple", |b| {
        b.iter(|| sanitize_download_name(black_box("video.mp4")))
    });

    group.bench_function("complex", |b| {
        b.iter(|| sanitize_download_name(black_box("My Video (2024) - Best Quality [1080p].mp4")))
    });

    group.bench_function("malicious", |b| {
        b.iter(|| sanitize_download_name(black_box("../../../etc/passwd")))
    });

    let long_name = "a".repeat(500) + ".mp4";
    group.bench_function("long", |b| {
        b.iter(|| sanitize_download_name(black_box(&long_name)))
    });

    group.finish();
}

fn benchmark_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("Platform Classification");
    let urls = [
        ("youtube", "https://www.youtube.com/watch?v=abc123def45"),
        ("tiktok", "https://www.tiktok.com/@user/video/7123"),
        ("instagram", "https://www.instagram.com/reel/C8abcDEfGhI/"),
        ("facebook", "https://www.facebook.com/watch/?v=123456"),
        ("twitter", "https://x.com/user/status/178901234"),
        ("unsupported", "https://vimeo.com/123456"),
    ];

    for (name, url) in urls {
        group.bench_function(name, |b| b.iter(|| classify(black_box(url))));
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_normalize,
    benchmark_sanitize_download_name,
    benchmark_classify
);
criterion_main!(benches);
