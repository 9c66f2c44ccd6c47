use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prepend `https://` to a target that has no `http://` or `https://` scheme.
pub fn normalize_url(target: &str) -> String {
    if has_http_scheme(target) {
        target.to_string()
    } else {
        format!("https://{target}")
    }
}

pub fn has_http_scheme(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Directory name for a URL: the first `://` becomes `-`.
pub fn output_dir_name(url: &str) -> String {
    url.replacen("://", "-", 1)
}

pub fn output_dir_for(root: &Path, url: &str) -> PathBuf {
    root.join(output_dir_name(url))
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;
    let millis = duration.subsec_millis();

    if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else if seconds > 0 {
        format!("{}.{}s", seconds, millis / 100)
    } else {
        format!("{millis}ms")
    }
}

/// Parse `500ms`, `2s`, `1m`, `1h`, or a bare number of milliseconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("invalid duration: {input:?}"))?;

    let seconds = match unit.trim() {
        "" | "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        other => return Err(format!("unknown duration unit {other:?} in {input:?}")),
    };

    Duration::try_from_secs_f64(seconds).map_err(|_| format!("duration out of range: {input:?}"))
}
