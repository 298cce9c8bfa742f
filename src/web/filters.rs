//! Formatting helpers for server-rendered HTML

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Converts newlines to `<br>`. Apply after escaping.
pub fn nl2br(value: &str) -> String {
    value.replace("\r\n", "\n").replace('\n', "<br>")
}

/// Truncates to at most `max_chars` characters, adding an ellipsis.
pub fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let kept: String = value.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// File size filter - formats bytes as human-readable size
pub fn filesize(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Marks `<option>` as selected when `value == current`.
pub fn selected(value: &str, current: Option<&str>) -> &'static str {
    if current == Some(value) {
        " selected"
    } else {
        ""
    }
}
