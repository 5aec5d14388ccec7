//! SessionState — the immutable (user agent, cookies, domain, acquisition
//! time) tuple at the heart of a single Gateway instance.
//!
//! Every mutation produces a new snapshot rather than touching fields in
//! place; callers publish the new snapshot under the monitor owned by
//! `Gateway` (see `gateway.rs`). This mirrors the "publish-subscribe on an
//! atomic reference" design note: readers never observe a torn mix of old
//! and new fields.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Cookies are discarded after this long even if never explicitly
/// invalidated (the CDN's own clearance cookies typically outlive this,
/// but a stale session is worse than a fresh challenge-solve).
pub const COOKIE_TTL_SECS: u64 = 30 * 60;

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Immutable snapshot of a Gateway's session. Replaced atomically, never
/// mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    pub user_agent: String,
    pub cookies: HashMap<String, String>,
    /// Bare host: no scheme, no trailing slash, no leading `www.`.
    pub domain: String,
    /// Unix timestamp the cookies were acquired at; `0` means never.
    pub cookie_acquired_at: u64,
    pub acquired_via_browser: bool,
}

impl SessionState {
    /// A brand-new session for `domain` with no cookies yet.
    pub fn fresh(user_agent: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            cookies: HashMap::new(),
            domain: normalize_domain(&domain.into()),
            cookie_acquired_at: 0,
            acquired_via_browser: false,
        }
    }

    /// Cookies are expired when they're empty or the TTL has elapsed.
    /// The boundary is inclusive: `now - acquired_at == TTL` counts as
    /// expired.
    pub fn is_expired(&self, ttl_secs: u64) -> bool {
        if self.cookies.is_empty() || self.cookie_acquired_at == 0 {
            return true;
        }
        let now = now_unix();
        now.saturating_sub(self.cookie_acquired_at) >= ttl_secs
    }

    /// `cookies non-empty AND not expired`.
    pub fn is_valid(&self, ttl_secs: u64) -> bool {
        !self.cookies.is_empty() && !self.is_expired(ttl_secs)
    }

    /// The `Cookie:` header value, or `None` when there are no cookies.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// The fixed header set `executeDirect` sends: UA, Referer, Accept,
    /// Accept-Language, client hints matching the UA family,
    /// upgrade-insecure-requests, sec-fetch-*, plus Cookie when present.
    pub fn request_headers(&self) -> Vec<(String, String)> {
        let mut headers = vec![
            ("User-Agent".to_string(), self.user_agent.clone()),
            ("Referer".to_string(), format!("https://{}/", self.domain)),
            (
                "Accept".to_string(),
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8"
                    .to_string(),
            ),
            ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
            ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
            ("Sec-Fetch-Dest".to_string(), "document".to_string()),
            ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
            ("Sec-Fetch-Site".to_string(), "none".to_string()),
        ];

        if let Some((brand, version)) = client_hint_brand(&self.user_agent) {
            headers.push((
                "sec-ch-ua".to_string(),
                format!(r#""{brand}";v="{version}", "Not_A Brand";v="24""#),
            ));
            headers.push((
                "sec-ch-ua-mobile".to_string(),
                if self.user_agent.contains("Mobile") {
                    "?1".to_string()
                } else {
                    "?0".to_string()
                },
            ));
        }

        if let Some(cookie) = self.cookie_header() {
            headers.push(("Cookie".to_string(), cookie));
        }

        headers
    }

    /// Replace cookies, recording whether they came from the browser.
    /// Never touches `userAgent` (the CDN binds clearance to the UA that
    /// solved the challenge — spec invariant 4).
    pub fn with_cookies(&self, cookies: HashMap<String, String>, via_browser: bool) -> Self {
        Self {
            user_agent: self.user_agent.clone(),
            cookies,
            domain: self.domain.clone(),
            cookie_acquired_at: now_unix(),
            acquired_via_browser: via_browser,
        }
    }

    /// Switch to a new origin. Cookies are origin-scoped, so a domain
    /// change clears them unconditionally.
    pub fn with_domain(&self, domain: impl Into<String>) -> Self {
        let domain = normalize_domain(&domain.into());
        if domain == self.domain {
            return self.clone();
        }
        Self {
            user_agent: self.user_agent.clone(),
            cookies: HashMap::new(),
            domain,
            cookie_acquired_at: 0,
            acquired_via_browser: false,
        }
    }

    /// Merge additional cookies on top of the existing set (e.g. a
    /// `Set-Cookie` seen on a direct, non-browser response), refreshing
    /// `cookie_acquired_at`.
    pub fn merge_cookies(&self, extra: HashMap<String, String>) -> Self {
        if extra.is_empty() {
            return self.clone();
        }
        let mut cookies = self.cookies.clone();
        cookies.extend(extra);
        Self {
            user_agent: self.user_agent.clone(),
            cookies,
            domain: self.domain.clone(),
            cookie_acquired_at: now_unix(),
            acquired_via_browser: self.acquired_via_browser,
        }
    }

    /// Clear cookies without touching UA or domain — used on
    /// `invalidateSession` and before every `solveChallenge` attempt (never
    /// reuse a pre-challenge cookie set).
    pub fn invalidate(&self) -> Self {
        Self {
            user_agent: self.user_agent.clone(),
            cookies: HashMap::new(),
            domain: self.domain.clone(),
            cookie_acquired_at: 0,
            acquired_via_browser: false,
        }
    }
}

/// Strip scheme, trailing `/`, and a leading `www.` from a host-or-URL-ish
/// string. Malformed input degrades to an empty string rather than
/// panicking.
pub fn normalize_domain(raw: &str) -> String {
    let mut s = raw.trim();
    if let Some(idx) = s.find("://") {
        s = &s[idx + 3..];
    }
    let s = s.split('/').next().unwrap_or("");
    let s = s.strip_prefix("www.").unwrap_or(s);
    s.to_string()
}

/// Best-effort client-hint brand/version guess from a UA string. Returns
/// `None` for non-Chromium UAs (Firefox, Safari) which don't send
/// `sec-ch-ua` at all.
fn client_hint_brand(user_agent: &str) -> Option<(&'static str, String)> {
    let version = user_agent
        .split("Chrome/")
        .nth(1)?
        .split('.')
        .next()?
        .to_string();
    if user_agent.contains("Edg/") {
        Some(("Microsoft Edge", version))
    } else if user_agent.contains("Chrome/") {
        Some(("Google Chrome", version))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desktop_ua() -> &'static str {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36"
    }

    #[test]
    fn fresh_session_has_no_cookies_and_is_expired() {
        let s = SessionState::fresh(desktop_ua(), "example.test");
        assert!(s.cookies.is_empty());
        assert!(s.is_expired(COOKIE_TTL_SECS));
        assert!(!s.is_valid(COOKIE_TTL_SECS));
    }

    #[test]
    fn with_domain_clears_cookies_and_resets_timestamp() {
        let s = SessionState::fresh(desktop_ua(), "old.test")
            .with_cookies([("a".into(), "b".into())].into_iter().collect(), true);
        assert!(!s.cookies.is_empty());

        let moved = s.with_domain("new.test");
        assert_eq!(moved.domain, "new.test");
        assert!(moved.cookies.is_empty());
        assert_eq!(moved.cookie_acquired_at, 0);
    }

    #[test]
    fn with_cookies_never_changes_user_agent() {
        let s = SessionState::fresh(desktop_ua(), "example.test");
        let updated = s.with_cookies([("x".into(), "y".into())].into_iter().collect(), false);
        assert_eq!(updated.user_agent, s.user_agent);
    }

    #[test]
    fn is_valid_iff_non_empty_and_within_ttl() {
        let mut s = SessionState::fresh(desktop_ua(), "example.test");
        s.cookies.insert("cf_clearance".into(), "x".into());
        s.cookie_acquired_at = now_unix();
        assert!(s.is_valid(COOKIE_TTL_SECS));

        // exactly at the TTL boundary is expired, not valid.
        s.cookie_acquired_at = now_unix().saturating_sub(COOKIE_TTL_SECS);
        assert!(s.is_expired(COOKIE_TTL_SECS));
        assert!(!s.is_valid(COOKIE_TTL_SECS));
    }

    #[test]
    fn normalize_domain_strips_scheme_slash_and_www() {
        assert_eq!(normalize_domain("https://www.example.test/"), "example.test");
        assert_eq!(normalize_domain("example.test"), "example.test");
        assert_eq!(normalize_domain("http://example.test/path"), "example.test");
    }

    #[test]
    fn normalize_domain_malformed_host_is_empty() {
        assert_eq!(normalize_domain(""), "");
        assert_eq!(normalize_domain("://"), "");
    }

    #[test]
    fn invalidate_clears_cookies_but_keeps_ua_and_domain() {
        let s = SessionState::fresh(desktop_ua(), "example.test")
            .with_cookies([("a".into(), "b".into())].into_iter().collect(), true);
        let cleared = s.invalidate();
        assert!(cleared.cookies.is_empty());
        assert_eq!(cleared.user_agent, s.user_agent);
        assert_eq!(cleared.domain, s.domain);
    }

    #[test]
    fn merge_cookies_adds_without_dropping_existing() {
        let s = SessionState::fresh(desktop_ua(), "example.test")
            .with_cookies([("a".into(), "1".into())].into_iter().collect(), false);
        let merged = s.merge_cookies([("b".into(), "2".into())].into_iter().collect());
        assert_eq!(merged.cookies.len(), 2);
        assert_eq!(merged.cookies.get("a").unwrap(), "1");
        assert_eq!(merged.cookies.get("b").unwrap(), "2");
    }

    #[test]
    fn cookie_header_joins_pairs() {
        let mut cookies = HashMap::new();
        cookies.insert("a".to_string(), "1".to_string());
        let s = SessionState::fresh(desktop_ua(), "example.test").with_cookies(cookies, false);
        assert_eq!(s.cookie_header(), Some("a=1".to_string()));
    }
}
