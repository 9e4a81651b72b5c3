//! Human-facing duration and size labels shared by the extractors

/// Format a duration in seconds as `M:SS`. Unknown or nonsense input
/// renders as `0:00` rather than erroring, since the label is cosmetic.
pub fn duration_label(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Format a byte count as `N KB` below one mebibyte and `X.Y MB` above,
/// `Unknown` when the size is absent or zero.
pub fn size_label(bytes: Option<u64>) -> String {
    match bytes {
        None | Some(0) => "Unknown".to_string(),
        Some(b) if b < 1024 * 1024 => format!("{} KB", (b + 512) / 1024),
        Some(b) => format!("{:.1} MB", b as f64 / (1024.0 * 1024.0)),
    }
}
