use std::{sync::OnceLock, time::Duration};

use chrono::{DateTime, FixedOffset};
use regex::Regex;

use crate::{errors::Error, Result};

// ============== Timestamp Helpers ==============

/// Second-resolution timestamp used when rendering messages.
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

// ============== Durations ==============

static DURATION_PART: OnceLock<Regex> = OnceLock::new();

fn duration_part_re() -> &'static Regex {
    DURATION_PART.get_or_init(|| {
        Regex::new(r"(?i)([0-9]+)\s*(w|d|h|m|s)?\s*").expect("duration regex is valid")
    })
}

/// Parse human durations such as `"45"`, `"30s"`, `"5m"`, `"1h 30m"`, `"2d"`.
///
/// A bare number is seconds. Groups are summed; anything that is not a
/// `<number><unit>` group is rejected.
pub fn parse_duration(raw: &str) -> Result<Duration> {
    let s = raw.trim();
    if s.is_empty() {
        return Err(Error::Config("empty duration".to_string()));
    }

    let mut total: u64 = 0;
    let mut pos = 0usize;
    for caps in duration_part_re().captures_iter(s) {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        if whole.start != pos {
            break;
        }
        pos = whole.end;

        let n: u64 = caps[1]
            .parse()
            .map_err(|_| Error::Config(format!("duration number too large: {raw}")))?;
        let unit = caps
            .get(2)
            .map(|m| m.as_str().to_ascii_lowercase())
            .unwrap_or_default();
        let scale = match unit.as_str() {
            "w" => 7 * 24 * 3600,
            "d" => 24 * 3600,
            "h" => 3600,
            "m" => 60,
            _ => 1,
        };
        total = n
            .checked_mul(scale)
            .and_then(|v| total.checked_add(v))
            .ok_or_else(|| Error::Config(format!("duration overflows: {raw}")))?;
    }

    if pos != s.len() {
        return Err(Error::Config(format!("invalid duration: {raw:?}")));
    }
    Ok(Duration::from_secs(total))
}

// ============== Text ==============

pub fn truncate_text(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        return s.to_string();
    }
    let mut out = s.chars().take(max_len).collect::<String>();
    out.push_str("...");
    out
}

/// Collapse line breaks so a message fits on one output line.
pub fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_seconds_and_units() {
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("2d").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_duration("1w").unwrap(), Duration::from_secs(604_800));
    }

    #[test]
    fn sums_compound_durations() {
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration(" 1h 30m 15s ").unwrap(), Duration::from_secs(5415));
        assert_eq!(parse_duration("0s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(parse_duration(""), Err(Error::Config(_))));
        assert!(matches!(parse_duration("soon"), Err(Error::Config(_))));
        assert!(matches!(parse_duration("5x"), Err(Error::Config(_))));
        assert!(matches!(parse_duration("1h and 2m"), Err(Error::Config(_))));
    }

    #[test]
    fn non_ascii_digits_are_invalid_not_overflow() {
        let err = parse_duration("٣s").unwrap_err();
        assert!(err.to_string().contains("invalid duration"), "{err}");
    }

    #[test]
    fn truncate_text_adds_ellipsis() {
        let s = "ж".repeat(20);
        let t = truncate_text(&s, 10);
        assert!(t.ends_with("..."));
        assert_eq!(t.chars().count(), 13);
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn single_line_collapses_whitespace() {
        assert_eq!(single_line("a\nb  c\r\n d"), "a b c d");
    }
}
