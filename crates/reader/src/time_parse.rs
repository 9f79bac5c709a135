// ABOUTME: Flexible date parsing for RSS pubDate and Atom published/updated.
// ABOUTME: Tries RFC 2822 and RFC 3339 first, then common sloppy variants.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};

/// Parses a feed datetime string. Returns None when no known format matches;
/// callers treat that as a missing date, never as a fatal error.
pub fn parse_feed_date(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    // RFC 2822 covers the normal RSS pubDate shapes, including GMT/UT names.
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // RFC 3339 covers Atom published/updated.
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    // Variants with a numeric offset that RFC 2822 parsing rejects.
    let with_offset = [
        "%a, %e %b %Y %H:%M:%S %z",
        "%d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%z",
    ];
    for fmt in &with_offset {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // Offset-less variants, assumed UTC.
    let naive = [
        "%a, %d %b %Y %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%d %b %Y %H:%M:%S",
    ];
    for fmt in &naive {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }

    // Date-only, midnight UTC.
    for fmt in &["%Y-%m-%d", "%d %b %Y"] {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_rss_pub_date() {
        let dt = parse_feed_date("Mon, 15 Jan 2024 10:00:00 +0000").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 15));
    }

    #[test]
    fn test_atom_date() {
        let dt = parse_feed_date("2023-06-15T14:30:00Z").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2023, 6, 15));
    }

    #[test]
    fn test_naive_assumed_utc() {
        assert!(parse_feed_date("2006-01-02 15:04:05").is_some());
        assert!(parse_feed_date("2006-01-02").is_some());
    }

    #[test]
    fn test_garbage_is_none() {
        assert!(parse_feed_date("").is_none());
        assert!(parse_feed_date("   ").is_none());
        assert!(parse_feed_date("next Tuesday, probably").is_none());
    }
}
