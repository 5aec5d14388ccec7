//! `GatewayConfig` — every configurable knob the Gateway exposes, with a
//! JSON-file -> environment-variable -> hardcoded-default fallback chain
//! per field.
//!
//! Grounded on `core/config.rs`'s `ShadowDeepResearchConfig`: per-field
//! `resolve_*` methods trying a loaded file value, then an env var, then a
//! hardcoded default, plus `load_shadow_config`'s candidate-path search
//! with log-and-degrade on a missing or unparseable file.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ua::default_user_agent;

/// Default UA override point; the `userAgent` config option falls back to
/// this when unset.
const DEFAULT_COOKIE_TTL_SECS: u64 = 30 * 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SNIFF_TIMEOUT_SECS: u64 = 30;

/// On-disk / env-overridable shape. Every field optional so a partial
/// file or partial env-var set degrades gracefully to defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfigFile {
    pub name: Option<String>,
    pub fallback_domain: Option<String>,
    pub remote_config_url: Option<String>,
    pub syncback_url: Option<String>,
    pub user_agent: Option<String>,
    pub skip_headless: Option<bool>,
    pub browser_enabled: Option<bool>,
    pub trusted_domains: Option<Vec<String>>,
    pub origin_validation_markers: Option<Vec<String>>,
    pub cookie_ttl_secs: Option<u64>,
    pub request_timeout_secs: Option<u64>,
    pub sniff_timeout_secs: Option<u64>,
}

/// The resolved configuration a `Gateway` is constructed from.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Namespacing key for persistence (`session_{name}` / `domain_{name}`).
    pub name: String,
    /// Used when no persisted/remote domain is available.
    pub fallback_domain: String,
    /// If set, probed at `ensure_initialized()`.
    pub remote_config_url: Option<String>,
    /// If set, domain changes are POSTed here.
    pub syncback_url: Option<String>,
    pub user_agent: String,
    /// Go straight to Visible challenge-solve, skipping Headless.
    pub skip_headless: bool,
    /// If false, `solve_challenge` fails immediately.
    pub browser_enabled: bool,
    /// Hosts treated as "our origin" for URL-rewrite and cookie capture.
    pub trusted_domains: Vec<String>,
    /// Strings whose presence lets a 403 pass as success.
    pub origin_validation_markers: Vec<String>,
    pub cookie_ttl: Duration,
    pub request_timeout: Duration,
    pub sniff_timeout: Duration,
}

impl GatewayConfig {
    /// Build a config from an explicit file overlay plus env-var
    /// fallbacks, applying hardcoded defaults last. `name` and
    /// `fallback_domain` have no sensible default and must resolve to a
    /// non-empty value from the file or the environment; callers that
    /// skip both get an empty-string placeholder rather than a panic
    /// (the Gateway will simply persist under an empty namespace).
    pub fn resolve(file: GatewayConfigFile) -> Self {
        Self {
            name: file
                .name
                .or_else(|| std::env::var("SHADOWGATE_NAME").ok())
                .unwrap_or_default(),
            fallback_domain: file
                .fallback_domain
                .or_else(|| std::env::var("SHADOWGATE_FALLBACK_DOMAIN").ok())
                .unwrap_or_default(),
            remote_config_url: file
                .remote_config_url
                .or_else(|| std::env::var("SHADOWGATE_REMOTE_CONFIG_URL").ok()),
            syncback_url: file
                .syncback_url
                .or_else(|| std::env::var("SHADOWGATE_SYNCBACK_URL").ok()),
            user_agent: file
                .user_agent
                .or_else(|| std::env::var("SHADOWGATE_USER_AGENT").ok())
                .unwrap_or_else(|| default_user_agent().to_string()),
            skip_headless: file
                .skip_headless
                .or_else(|| env_bool("SHADOWGATE_SKIP_HEADLESS"))
                .unwrap_or(false),
            browser_enabled: file
                .browser_enabled
                .or_else(|| env_bool("SHADOWGATE_BROWSER_ENABLED"))
                .unwrap_or(true),
            trusted_domains: file.trusted_domains.unwrap_or_default(),
            origin_validation_markers: file.origin_validation_markers.unwrap_or_default(),
            cookie_ttl: Duration::from_secs(file.cookie_ttl_secs.unwrap_or(DEFAULT_COOKIE_TTL_SECS)),
            request_timeout: Duration::from_secs(
                file.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            ),
            sniff_timeout: Duration::from_secs(
                file.sniff_timeout_secs.unwrap_or(DEFAULT_SNIFF_TIMEOUT_SECS),
            ),
        }
    }

    /// Load from a JSON file at `path` if it exists and parses; logs and
    /// degrades to an empty overlay (pure env/defaults) otherwise.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Self {
        let path = path.as_ref();
        let file = match std::fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str::<GatewayConfigFile>(&content) {
                Ok(f) => f,
                Err(e) => {
                    warn!("gateway_config: failed to parse {}: {}", path.display(), e);
                    GatewayConfigFile::default()
                }
            },
            Err(_) => GatewayConfigFile::default(),
        };
        Self::resolve(file)
    }

    /// Pure env/defaults, no file overlay.
    pub fn from_env() -> Self {
        Self::resolve(GatewayConfigFile::default())
    }

    /// A minimal config good enough to construct a `Gateway` in tests:
    /// explicit name/fallback domain, everything else defaulted.
    pub fn for_provider(name: impl Into<String>, fallback_domain: impl Into<String>) -> Self {
        Self::resolve(GatewayConfigFile {
            name: Some(name.into()),
            fallback_domain: Some(fallback_domain.into()),
            ..Default::default()
        })
    }
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(|v| match v.to_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_applies_hardcoded_defaults_when_file_is_empty() {
        let cfg = GatewayConfig::resolve(GatewayConfigFile::default());
        assert_eq!(cfg.cookie_ttl, Duration::from_secs(DEFAULT_COOKIE_TTL_SECS));
        assert!(cfg.browser_enabled);
        assert!(!cfg.skip_headless);
    }

    #[test]
    fn resolve_prefers_file_values_over_defaults() {
        let cfg = GatewayConfig::resolve(GatewayConfigFile {
            name: Some("acme".to_string()),
            fallback_domain: Some("acme.test".to_string()),
            cookie_ttl_secs: Some(60),
            skip_headless: Some(true),
            ..Default::default()
        });
        assert_eq!(cfg.name, "acme");
        assert_eq!(cfg.fallback_domain, "acme.test");
        assert_eq!(cfg.cookie_ttl, Duration::from_secs(60));
        assert!(cfg.skip_headless);
    }

    #[test]
    fn from_file_degrades_to_defaults_on_missing_file() {
        let cfg = GatewayConfig::from_file("/nonexistent/shadowgate-config.json");
        assert!(cfg.browser_enabled);
    }

    #[test]
    fn for_provider_sets_name_and_fallback_only() {
        let cfg = GatewayConfig::for_provider("acme", "acme.test");
        assert_eq!(cfg.name, "acme");
        assert_eq!(cfg.fallback_domain, "acme.test");
        assert!(cfg.trusted_domains.is_empty());
    }
}
