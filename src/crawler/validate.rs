//! Plausibility check applied to every fetched body
//!
//! Relays and mirrors happily return 200 with an error page, a challenge or
//! the national filtering notice, so a success status alone means little.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Bodies larger than this are assumed to be real pages even if they mention a marker
const MARKER_SCAN_LIMIT: usize = 20_000;

/// Markers of pages that stand in for the requested content
const BLOCK_MARKERS: &[(&str, &str)] = &[
    ("10.10.34.34", "filtering page"),
    ("peyvandha.ir", "filtering page"),
    ("cf-browser-verification", "cloudflare challenge"),
    ("challenge-platform", "cloudflare challenge"),
    ("just a moment...", "cloudflare challenge"),
    ("g-recaptcha", "captcha"),
    ("h-captcha", "captcha"),
    ("access denied", "access denied"),
    ("403 forbidden", "forbidden"),
    ("proxy error", "proxy error"),
    ("too many requests", "rate limited"),
    ("the requested url was rejected", "waf rejection"),
];

/// Outcome of the plausibility check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "detail", rename_all = "snake_case")]
pub enum ContentVerdict {
    Plausible,
    HttpStatus(u16),
    Empty,
    TooShort(usize),
    Blocked(String),
}

impl ContentVerdict {
    pub fn is_plausible(&self) -> bool {
        matches!(self, ContentVerdict::Plausible)
    }
}

impl fmt::Display for ContentVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentVerdict::Plausible => write!(f, "plausible"),
            ContentVerdict::HttpStatus(code) => write!(f, "HTTP {}", code),
            ContentVerdict::Empty => write!(f, "empty body"),
            ContentVerdict::TooShort(len) => write!(f, "too short ({} bytes)", len),
            ContentVerdict::Blocked(reason) => write!(f, "blocked: {}", reason),
        }
    }
}

/// Whether `c` is in the Arabic script blocks used for Persian
pub fn is_persian_char(c: char) -> bool {
    matches!(c,
        '\u{0600}'..='\u{06FF}'
        | '\u{0750}'..='\u{077F}'
        | '\u{FB50}'..='\u{FDFF}'
        | '\u{FE70}'..='\u{FEFF}')
}

/// Share of alphabetic characters that are Persian/Arabic script
pub fn persian_ratio(text: &str) -> f64 {
    let mut letters = 0usize;
    let mut persian = 0usize;
    for c in text.chars().filter(|c| c.is_alphabetic()) {
        letters += 1;
        if is_persian_char(c) {
            persian += 1;
        }
    }
    if letters == 0 {
        0.0
    } else {
        persian as f64 / letters as f64
    }
}

fn has_markup(body: &str) -> bool {
    let head: String = body.chars().take(4096).collect::<String>().to_ascii_lowercase();
    ["<html", "<body", "<div", "<p", "<article", "<table"]
        .iter()
        .any(|tag| head.contains(tag))
}

/// Decide whether a response carries the requested page
pub fn assess_content(status: u16, body: &str, min_len: usize) -> ContentVerdict {
    if !(200..300).contains(&status) {
        return ContentVerdict::HttpStatus(status);
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return ContentVerdict::Empty;
    }

    if trimmed.len() < MARKER_SCAN_LIMIT {
        let lower = trimmed.to_lowercase();
        if let Some((_, reason)) = BLOCK_MARKERS.iter().find(|(m, _)| lower.contains(m)) {
            return ContentVerdict::Blocked(reason.to_string());
        }
    }

    if trimmed.len() < min_len {
        return ContentVerdict::TooShort(trimmed.len());
    }

    let sample: String = trimmed.chars().take(20_000).collect();
    if !has_markup(&sample) && persian_ratio(&sample) < 0.1 {
        return ContentVerdict::Blocked("no recognizable content".to_string());
    }

    ContentVerdict::Plausible
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(body: &str) -> String {
        format!("<html><body><div class=\"content\">{}</div></body></html>", body)
    }

    #[test]
    fn test_plausible_persian_page() {
        let body = page(&"ماده ۱ - این قانون از تاریخ تصویب لازم‌الاجرا است. ".repeat(20));
        assert_eq!(assess_content(200, &body, 500), ContentVerdict::Plausible);
    }

    #[test]
    fn test_non_success_status() {
        assert_eq!(assess_content(503, "down", 1), ContentVerdict::HttpStatus(503));
        assert_eq!(assess_content(301, "", 1), ContentVerdict::HttpStatus(301));
    }

    #[test]
    fn test_empty_and_short() {
        assert_eq!(assess_content(200, "   \n", 10), ContentVerdict::Empty);
        assert_eq!(assess_content(200, "<p>hi</p>", 100), ContentVerdict::TooShort(9));
    }

    #[test]
    fn test_filtering_page_is_blocked() {
        let body = r#"<html><head></head><body><iframe src="http://10.10.34.34?type=Invalid Site"></iframe></body></html>"#;
        assert_eq!(
            assess_content(200, body, 10),
            ContentVerdict::Blocked("filtering page".to_string())
        );
    }

    #[test]
    fn test_cloudflare_challenge_is_blocked() {
        let body = page("<title>Just a moment...</title> checking your browser");
        assert!(matches!(assess_content(200, &body, 10), ContentVerdict::Blocked(_)));
    }

    #[test]
    fn test_markers_ignored_in_large_pages() {
        let mut body = page(&"متن قانون ".repeat(3000));
        body.push_str("<form class=\"g-recaptcha\"></form>");
        assert_eq!(assess_content(200, &body, 500), ContentVerdict::Plausible);
    }

    #[test]
    fn test_plain_text_without_persian_is_rejected() {
        let body = "x".repeat(1000);
        assert!(matches!(assess_content(200, &body, 10), ContentVerdict::Blocked(_)));
    }

    #[test]
    fn test_persian_ratio() {
        assert_eq!(persian_ratio(""), 0.0);
        assert_eq!(persian_ratio("123 !!"), 0.0);
        assert_eq!(persian_ratio("قانون"), 1.0);
        let mixed = persian_ratio("قانون law");
        assert!(mixed > 0.5 && mixed < 0.7);
    }
}
