//! Download filename sanitization for Content-Disposition headers

/// Characters invalid on Windows/macOS/Linux filesystems, plus the
/// quote and backslash that would break out of a quoted header value.
const INVALID_CHARS: [char; 10] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', '\0'];

const MAX_NAME_LEN: usize = 200;

const FALLBACK_NAME: &str = "video.mp4";

/// Sanitize a suggested download name so it is safe both as a saved
/// filename and inside a quoted `Content-Disposition` value. Non-ASCII
/// text (titles in any language) is preserved.
pub fn sanitize_download_name(name: &str) -> String {
    // Remove path traversal sequences
    let mut sanitized = name.replace("..", "");

    // Replace invalid and control characters
    sanitized = sanitized
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Remove leading dots (hidden files) and surrounding whitespace
    sanitized = sanitized.trim().trim_start_matches('.').to_string();

    // Remove trailing dots and spaces (Windows issue)
    sanitized = sanitized.trim_end_matches('.').trim_end().to_string();

    // Collapse multiple underscores
    while sanitized.contains("__") {
        sanitized = sanitized.replace("__", "_");
    }

    if sanitized.is_empty() {
        return FALLBACK_NAME.to_string();
    }

    // Limit length, preserving a short extension when there is one
    if sanitized.len() > MAX_NAME_LEN {
        if let Some(dot_pos) = sanitized.rfind('.') {
            let extension = sanitized[dot_pos..].to_string();
            if extension.len() < 10 {
                let cut = floor_char_boundary(&sanitized, MAX_NAME_LEN - extension.len());
                return format!("{}{}", &sanitized[..cut], extension);
            }
        }
        let cut = floor_char_boundary(&sanitized, MAX_NAME_LEN);
        sanitized.truncate(cut);
    }

    sanitized
}

/// Build the full `Content-Disposition` value for a download.
pub fn content_disposition(name: &str) -> String {
    format!("attachment; filename=\"{}\"", sanitize_download_name(name))
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
