//! Cookie header parsing and `Set-Cookie` formatting.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::cookie::signer::MAX_COOKIE_AGE_SECS;

/// Format a timestamp as an RFC 1123 date with a `GMT` suffix.
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Expiry for a cookie of `age_secs` seconds. Zero means long-lived, which
/// is capped at the signed-cookie validity window.
pub fn cookie_expiry(age_secs: u64, now: DateTime<Utc>) -> DateTime<Utc> {
    let age = if age_secs == 0 { MAX_COOKIE_AGE_SECS } else { age_secs };
    let age = i64::try_from(age).unwrap_or(i64::MAX);
    Duration::try_seconds(age)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Render a `Set-Cookie` value: `name=value; expires=<date>; path=/`.
pub fn format_set_cookie(name: &str, value: &str, expires: DateTime<Utc>) -> String {
    format!("{}={}; expires={}; path=/", name, value, http_date(expires))
}

/// Parse a `Cookie` request header into a name → value map.
///
/// Malformed pairs are skipped. When a name repeats, the first value wins.
pub fn parse_cookie_header(header: &str) -> HashMap<String, String> {
    let mut cookies = HashMap::new();
    for pair in header.split(';') {
        let Some((name, value)) = pair.trim().split_once('=') else {
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        let value = value.trim().trim_matches('"');
        cookies
            .entry(name.to_string())
            .or_insert_with(|| value.to_string());
    }
    cookies
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_http_date_uses_gmt() {
        let t = Utc.with_ymd_and_hms(1994, 11, 6, 8, 49, 37).unwrap();
        assert_eq!(http_date(t), "Sun, 06 Nov 1994 08:49:37 GMT");
    }

    #[test]
    fn test_set_cookie_format() {
        let t = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(
            format_set_cookie("sessionId", "abc|1|ff", t),
            "sessionId=abc|1|ff; expires=Tue, 02 Jan 2024 03:04:05 GMT; path=/"
        );
    }

    #[test]
    fn test_cookie_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(cookie_expiry(600, now), now + Duration::seconds(600));
        assert_eq!(cookie_expiry(0, now), now + Duration::days(31));
    }

    #[test]
    fn test_parse_cookie_header() {
        let cookies = parse_cookie_header("sessionId=YWJj|17|ff; theme=\"dark\"; junk; =x; b64=ab==");
        assert_eq!(cookies.get("sessionId").map(String::as_str), Some("YWJj|17|ff"));
        assert_eq!(cookies.get("theme").map(String::as_str), Some("dark"));
        assert_eq!(cookies.get("b64").map(String::as_str), Some("ab=="));
        assert_eq!(cookies.len(), 3);
    }

    #[test]
    fn test_first_duplicate_wins() {
        let cookies = parse_cookie_header("a=1; a=2");
        assert_eq!(cookies.get("a").map(String::as_str), Some("1"));
    }
}
