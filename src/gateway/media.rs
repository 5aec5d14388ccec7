//! Media-URL matching and deduplication — the data side of the
//! `MediaFound(n)` exit condition and `Gateway::sniff_media`.
//!
//! Grounded on the CDP event-subscription *mechanism* `browser.rs` reuses
//! from `scraping/rust_scraper/cdp.rs` (that file renders and extracts
//! HTML; it does not itself listen for outbound request headers, so the
//! URL-pattern/blacklist logic here has no direct analog upstream and is
//! written fresh for the media-capture exit condition).

use std::collections::HashMap;

use super::types::CapturedMedia;

/// Patterns that mark a URL as a media asset worth capturing.
const MEDIA_PATTERNS: &[&str] = &[
    ".m3u8",
    ".mp4",
    ".mkv",
    ".webm",
    "/master.m3u8",
    ".urls",
    ".urlset",
];

/// Known-noise request paths that would otherwise match a pattern above
/// (or just clutter captures) but are never the media the caller wants.
const BLACKLIST: &[&str] = &["/ping.gif", "/analytics", "favicon.ico", "/google-analytics"];

/// Minimum URL length before a pattern match counts — filters out short,
/// synthetic-looking URLs that happen to contain a matched substring.
const MIN_URL_LEN: usize = 50;

/// Does `url` look like a media asset worth capturing?
pub fn is_media_url(url: &str) -> bool {
    if url.len() < MIN_URL_LEN {
        return false;
    }
    let lower = url.to_lowercase();
    if BLACKLIST.iter().any(|b| lower.contains(b)) {
        return false;
    }
    MEDIA_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Accumulates captured media URLs during one browser session,
/// deduplicated by URL, with each URL's outbound headers attached.
#[derive(Debug, Default)]
pub struct MediaCaptureSet {
    by_url: HashMap<String, CapturedMedia>,
    order: Vec<String>,
}

impl MediaCaptureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or ignore, if not media / already seen) one intercepted
    /// request. `headers` are the outbound request headers captured
    /// verbatim; `cookie_header`, if the request's origin has a known
    /// cookie string, is attached as `Cookie` so downstream playback can
    /// replay the exact auth context.
    pub fn record(&mut self, url: &str, mut headers: HashMap<String, String>, cookie_header: Option<&str>) {
        if !is_media_url(url) || self.by_url.contains_key(url) {
            return;
        }
        if let Some(cookie) = cookie_header {
            headers.insert("Cookie".to_string(), cookie.to_string());
        }
        self.by_url.insert(
            url.to_string(),
            CapturedMedia {
                url: url.to_string(),
                quality_label: guess_quality_label(url),
                headers,
            },
        );
        self.order.push(url.to_string());
    }

    pub fn len(&self) -> usize {
        self.by_url.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_url.is_empty()
    }

    /// Captures in the order they were first seen.
    pub fn into_vec(self) -> Vec<CapturedMedia> {
        self.order
            .into_iter()
            .filter_map(|u| self.by_url.get(&u).cloned())
            .collect()
    }
}

fn guess_quality_label(url: &str) -> Option<String> {
    for label in ["2160p", "1440p", "1080p", "720p", "480p", "360p"] {
        if url.contains(label) {
            return Some(label.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_url(suffix: &str) -> String {
        format!("https://cdn.example.test/videos/season1/episode1/{suffix}")
    }

    #[test]
    fn recognizes_known_media_extensions() {
        assert!(is_media_url(&long_url("master.m3u8")));
        assert!(is_media_url(&long_url("movie.mp4")));
        assert!(is_media_url(&long_url("clip.webm")));
    }

    #[test]
    fn rejects_short_urls_even_with_matching_extension() {
        assert!(!is_media_url("https://a.test/a.mp4"));
    }

    #[test]
    fn rejects_blacklisted_paths() {
        assert!(!is_media_url(&format!(
            "https://tracker.example.test/analytics/ping.gif?id=1234567890"
        )));
    }

    #[test]
    fn dedups_by_url() {
        let mut set = MediaCaptureSet::new();
        let url = long_url("master.m3u8");
        set.record(&url, HashMap::new(), None);
        set.record(&url, HashMap::new(), None);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn attaches_cookie_header_when_provided() {
        let mut set = MediaCaptureSet::new();
        let url = long_url("master.m3u8");
        set.record(&url, HashMap::new(), Some("cf_clearance=X"));
        let captured = set.into_vec();
        assert_eq!(captured[0].headers.get("Cookie").unwrap(), "cf_clearance=X");
    }

    #[test]
    fn non_media_urls_are_ignored() {
        let mut set = MediaCaptureSet::new();
        set.record(&long_url("index.html"), HashMap::new(), None);
        assert!(set.is_empty());
    }
}
