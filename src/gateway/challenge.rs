//! ChallengeDetector — a pure predicate over `(status, body)`.
//!
//! Grounded on `scraping/rust_scraper/stealth.rs::detect_challenge`, which
//! lowercases the body and checks a fixed, `||`-chained marker list. This
//! generalizes that to a broader marker set plus a status-code check and
//! a whitelist exception, but keeps the same "fixed, implementation-closed
//! list" shape: adding a marker is a code change, not a config option.

/// Fixed, closed set of markers. Case-insensitive substring match against
/// the response body.
const CHALLENGE_MARKERS: &[&str] = &[
    "challenge-platform",
    "cf-browser-verification",
    "just a moment",
    "checking your browser",
    "cf-chl-bypass",
    "cf_clearance",
    "attention required",
    "_cf_chl_opt",
];

/// Status codes that, independent of body content, indicate a challenge
/// (or a challenge-adjacent block).
const CHALLENGE_STATUS_CODES: &[u16] = &[403, 503, 429];

/// Pure predicate: does `(status, body)` indicate a CDN challenge?
///
/// `whitelist_markers` implements an exception: a `403` whose body
/// contains any configured site-title marker is treated as a legitimate
/// response, not a challenge (some origins return 403 with valid content
/// behind their own WAF).
#[derive(Debug, Clone, Default)]
pub struct ChallengeDetector {
    whitelist_markers: Vec<String>,
}

impl ChallengeDetector {
    pub fn new(whitelist_markers: Vec<String>) -> Self {
        Self { whitelist_markers }
    }

    /// Same `(status, body)` always yields the same result — no hidden
    /// state, no clock reads.
    pub fn is_challenge(&self, status: u16, body: &str) -> bool {
        if status == 403 && self.matches_whitelist(body) {
            return false;
        }

        if CHALLENGE_STATUS_CODES.contains(&status) {
            return true;
        }

        let lower = body.to_lowercase();
        CHALLENGE_MARKERS.iter().any(|m| lower.contains(m))
    }

    /// The whitelist exception specifically: a `403` whose body carries a
    /// configured site-title marker is a legitimate response masquerading
    /// as a block, not a plain 2xx. Callers that want to normalize such a
    /// response to a success check this instead of inferring it from
    /// `is_challenge` alone.
    pub fn is_whitelisted_exception(&self, status: u16, body: &str) -> bool {
        status == 403 && self.matches_whitelist(body)
    }

    fn matches_whitelist(&self, body: &str) -> bool {
        if self.whitelist_markers.is_empty() {
            return false;
        }
        self.whitelist_markers.iter().any(|m| body.contains(m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_alone_triggers_challenge() {
        let d = ChallengeDetector::default();
        assert!(d.is_challenge(503, "<html>anything</html>"));
        assert!(d.is_challenge(429, ""));
        assert!(d.is_challenge(403, "no markers here"));
    }

    #[test]
    fn body_marker_triggers_challenge_case_insensitively() {
        let d = ChallengeDetector::default();
        assert!(d.is_challenge(200, "<html>Just A Moment...</html>"));
        assert!(d.is_challenge(200, "...CF_CLEARANCE..."));
        assert!(!d.is_challenge(200, "<html>totally normal page</html>"));
    }

    #[test]
    fn whitelist_exception_overrides_403() {
        let d = ChallengeDetector::new(vec!["MySiteTitle".to_string()]);
        assert!(!d.is_challenge(403, "<html><title>MySiteTitle</title>body</html>"));
        // Without the marker, 403 is still a challenge.
        assert!(d.is_challenge(403, "<html>forbidden</html>"));
    }

    #[test]
    fn whitelist_does_not_apply_to_other_status_codes() {
        let d = ChallengeDetector::new(vec!["MySiteTitle".to_string()]);
        assert!(d.is_challenge(503, "<html><title>MySiteTitle</title></html>"));
    }

    #[test]
    fn is_whitelisted_exception_only_fires_for_403_with_marker() {
        let d = ChallengeDetector::new(vec!["MySiteTitle".to_string()]);
        assert!(d.is_whitelisted_exception(403, "<html><title>MySiteTitle</title></html>"));
        assert!(!d.is_whitelisted_exception(403, "<html>forbidden</html>"));
        assert!(!d.is_whitelisted_exception(503, "<html><title>MySiteTitle</title></html>"));
    }

    #[test]
    fn is_pure_same_input_same_output() {
        let d = ChallengeDetector::new(vec!["X".to_string()]);
        let a = d.is_challenge(403, "X marker");
        let b = d.is_challenge(403, "X marker");
        assert_eq!(a, b);
    }
}
