//! Utility functions for naming artifacts and rendering timestamps

use crate::config::ClockZone;
use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, Timelike, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Extension used when an attachment URL carries none
const DEFAULT_EXTENSION: &str = ".jpg";

// Patterns are static literals, compiling them cannot fail
#[allow(clippy::expect_used)]
fn illegal_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[#@.<>:"/\\|?*\n\r]"#).expect("valid pattern"))
}

#[allow(clippy::expect_used)]
fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid pattern"))
}

/// Make free text usable as a file or folder name
///
/// Removes characters that are illegal on common filesystems (plus `#`, `@`
/// and `.`), collapses whitespace runs into one space, strips spaces and dots
/// at both ends and truncates to `max_length` characters.
///
/// # Examples
///
/// ```
/// use dynamic_dl::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("  Hello, world. #tag\n", 25), "Hello, world tag");
/// assert_eq!(sanitize_filename("abcdefghij", 4), "abcd");
/// ```
#[must_use]
pub fn sanitize_filename(name: &str, max_length: usize) -> String {
    let cleaned = illegal_chars().replace_all(name, "");
    let collapsed = whitespace_runs().replace_all(&cleaned, " ");
    let trimmed = collapsed.trim_matches(|c: char| c == ' ' || c == '.');

    if trimmed.chars().count() > max_length {
        let truncated: String = trimmed.chars().take(max_length).collect();
        truncated
            .trim_end_matches(|c: char| c == ' ' || c == '.')
            .to_string()
    } else {
        trimmed.to_string()
    }
}

fn in_zone(instant: &DateTime<Utc>, zone: ClockZone) -> NaiveDateTime {
    match zone {
        ClockZone::Local => instant.with_timezone(&Local).naive_local(),
        ClockZone::FixedOffset(secs) => match FixedOffset::east_opt(secs) {
            Some(offset) => instant.with_timezone(&offset).naive_local(),
            None => instant.naive_utc(),
        },
    }
}

/// Render a timestamp as `YYYY-M-D-HH-MM`
///
/// Year, month and day are not padded; hour and minute are. Artifact names
/// depend on this exact shape, so it must stay stable across releases.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use dynamic_dl::config::ClockZone;
/// use dynamic_dl::utils::format_display_timestamp;
///
/// let t = Utc.with_ymd_and_hms(2024, 3, 5, 7, 4, 59).unwrap();
/// assert_eq!(format_display_timestamp(&t, ClockZone::FixedOffset(0)), "2024-3-5-07-04");
/// ```
#[must_use]
pub fn format_display_timestamp(instant: &DateTime<Utc>, zone: ClockZone) -> String {
    let t = in_zone(instant, zone);
    format!(
        "{}-{}-{}-{:02}-{:02}",
        t.year(),
        t.month(),
        t.day(),
        t.hour(),
        t.minute()
    )
}

/// Encode a timestamp as the integer `YYYYMMDDHHMM`
///
/// Used by the date-threshold comparator. Numeric order equals
/// chronological order for any two instants rendered in the same zone.
#[must_use]
pub fn encode_timestamp(instant: &DateTime<Utc>, zone: ClockZone) -> u64 {
    let t = in_zone(instant, zone);
    let year = u64::try_from(t.year()).unwrap_or(0);
    year * 100_000_000
        + u64::from(t.month()) * 1_000_000
        + u64::from(t.day()) * 10_000
        + u64::from(t.hour()) * 100
        + u64::from(t.minute())
}

/// Infer an attachment's file extension from its URL
///
/// Takes the extension of the last path segment (query and fragment are
/// ignored) and returns it with a leading dot, or `.jpg` if there is none.
///
/// # Examples
///
/// ```
/// use dynamic_dl::utils::extension_from_url;
///
/// assert_eq!(extension_from_url("https://i0.example.com/bfs/a/b.png?x=1.2"), ".png");
/// assert_eq!(extension_from_url("https://i0.example.com/bfs/a/b"), ".jpg");
/// ```
#[must_use]
pub fn extension_from_url(url: &str) -> String {
    let last_segment = match url::Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .map(str::to_string),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .and_then(|path| path.rsplit('/').next())
            .map(str::to_string),
    };

    last_segment
        .and_then(|segment| {
            // A leading dot alone (".hidden") is not an extension
            let idx = segment.rfind('.')?;
            if idx == 0 || idx + 1 == segment.len() {
                return None;
            }
            Some(segment[idx..].to_string())
        })
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Extract the first run of digits from a directory name
///
/// Owner content directories are named `<name>_<owner>`; this recovers the
/// owner id so an existing directory can be found again after a rename.
#[must_use]
pub fn first_digit_run(name: &str) -> Option<&str> {
    let start = name.find(|c: char| c.is_ascii_digit())?;
    let rest = &name[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const UTC: ClockZone = ClockZone::FixedOffset(0);

    #[test]
    fn test_sanitize_removes_illegal_characters() {
        assert_eq!(sanitize_filename("a<b>c:d\"e/f\\g|h?i*j", 25), "abcdefghij");
        assert_eq!(sanitize_filename("#topic# @someone", 25), "topic someone");
        assert_eq!(sanitize_filename("line1\r\nline2", 25), "line1line2");
    }

    #[test]
    fn test_sanitize_collapses_whitespace_and_strips_edges() {
        assert_eq!(sanitize_filename("  a \t\t b  ", 25), "a b");
        assert_eq!(sanitize_filename("...", 25), "");
    }

    #[test]
    fn test_sanitize_truncates_by_characters() {
        // Multi-byte characters count as one each
        assert_eq!(sanitize_filename("今天天气很好我们去公园", 4), "今天天气");
        // Trailing space after truncation is stripped
        assert_eq!(sanitize_filename("abc def", 4), "abc");
    }

    #[test]
    fn test_format_display_timestamp_padding() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 9, 5, 0).unwrap();
        assert_eq!(format_display_timestamp(&t, UTC), "2024-1-1-09-05");

        let t = Utc.with_ymd_and_hms(2023, 12, 31, 18, 30, 0).unwrap();
        assert_eq!(format_display_timestamp(&t, UTC), "2023-12-31-18-30");
    }

    #[test]
    fn test_format_display_timestamp_respects_offset() {
        let t = Utc.with_ymd_and_hms(2023, 12, 31, 18, 30, 0).unwrap();
        // UTC+8 crosses midnight into the new year
        assert_eq!(
            format_display_timestamp(&t, ClockZone::FixedOffset(8 * 3600)),
            "2024-1-1-02-30"
        );
    }

    #[test]
    fn test_encode_timestamp_is_zero_padded() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(encode_timestamp(&t, UTC), 202401011200);

        let t = Utc.with_ymd_and_hms(2023, 12, 31, 18, 0, 0).unwrap();
        assert_eq!(encode_timestamp(&t, UTC), 202312311800);
    }

    #[test]
    fn test_encode_timestamp_orders_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert!(encode_timestamp(&earlier, UTC) < encode_timestamp(&later, UTC));
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(extension_from_url("https://i0.hdslb.com/bfs/new_dyn/x.gif"), ".gif");
        assert_eq!(extension_from_url("https://i0.hdslb.com/bfs/new_dyn/x.webp#f"), ".webp");
        assert_eq!(extension_from_url("https://i0.hdslb.com/"), ".jpg");
        assert_eq!(extension_from_url("https://i0.hdslb.com/bfs/.hidden"), ".jpg");
        assert_eq!(extension_from_url("not a url/file.png"), ".png");
    }

    #[test]
    fn test_first_digit_run() {
        assert_eq!(first_digit_run("someone_560647"), Some("560647"));
        assert_eq!(first_digit_run("user2_560647"), Some("2"));
        assert_eq!(first_digit_run("no digits"), None);
    }
}
