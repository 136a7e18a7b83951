/// Formats a moment offset as `MM:SS`, or `HH:MM:SS` once it passes an hour.
pub fn format_timecode(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    let hh = total / 3600;
    let mm = (total % 3600) / 60;
    let ss = total % 60;
    if hh > 0 {
        format!("{hh:02}:{mm:02}:{ss:02}")
    } else {
        format!("{mm:02}:{ss:02}")
    }
}

/// Deep link into the source video at `start` seconds.
pub fn watch_link_at(source_url: &str, start: f64) -> String {
    let separator = if source_url.contains('?') { '&' } else { '?' };
    let offset = if start.is_finite() && start > 0.0 {
        start.floor() as u64
    } else {
        0
    };
    format!("{source_url}{separator}t={offset}s")
}

/// Splits a comma-separated keyword field, dropping blanks.
pub fn parse_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|keyword| !keyword.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timecode_omits_hours_when_zero() {
        assert_eq!(format_timecode(0.0), "00:00");
        assert_eq!(format_timecode(75.9), "01:15");
        assert_eq!(format_timecode(3725.0), "01:02:05");
        assert_eq!(format_timecode(-3.0), "00:00");
    }

    #[test]
    fn watch_link_picks_separator() {
        assert_eq!(
            watch_link_at("https://www.youtube.com/watch?v=abc", 12.7),
            "https://www.youtube.com/watch?v=abc&t=12s"
        );
        assert_eq!(
            watch_link_at("https://youtu.be/abc", 3.0),
            "https://youtu.be/abc?t=3s"
        );
    }

    #[test]
    fn keywords_are_trimmed_and_blank_entries_dropped() {
        assert_eq!(
            parse_keywords(" rust, async ,, clips ,"),
            vec!["rust".to_string(), "async".to_string(), "clips".to_string()]
        );
        assert!(parse_keywords("  ").is_empty());
    }
}
