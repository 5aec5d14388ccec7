//! Integration tests exercising `Gateway` through its public crate
//! surface only, the way an embedding scraper would use it.

use shadowgate::{Gateway, GatewayConfig};

fn disabled_browser_config(name: &str, fallback_domain: &str) -> GatewayConfig {
    let mut cfg = GatewayConfig::for_provider(name, fallback_domain);
    cfg.browser_enabled = false;
    cfg
}

#[tokio::test]
async fn ensure_initialized_is_idempotent_and_adopts_fallback_domain() {
    let gateway = Gateway::new(disabled_browser_config("integration-init", "example.test")).unwrap();
    gateway.ensure_initialized().await;
    gateway.ensure_initialized().await;
    assert_eq!(gateway.current_domain().await, "example.test");
}

#[tokio::test]
async fn invalidate_session_is_reflected_in_image_headers() {
    let gateway = Gateway::new(disabled_browser_config("integration-invalidate", "example.test")).unwrap();
    gateway.ensure_initialized().await;

    gateway.invalidate_session("test teardown").await;

    let headers = gateway.image_headers().await;
    assert!(!headers.contains_key("Cookie"), "no cookies should remain after invalidation");
    assert!(headers.contains_key("User-Agent"));
}

#[tokio::test]
async fn solve_challenge_surfaces_unsolvable_when_browser_disabled() {
    let gateway = Gateway::new(disabled_browser_config("integration-solve", "example.test")).unwrap();
    gateway.ensure_initialized().await;

    let result = gateway.solve_challenge("https://example.test/gated").await;
    assert!(!result.ok);
}

#[tokio::test]
async fn sniff_media_returns_empty_vec_without_crashing_when_browser_disabled() {
    let gateway = Gateway::new(disabled_browser_config("integration-sniff", "example.test")).unwrap();
    gateway.ensure_initialized().await;

    let media = gateway.sniff_media("https://example.test/watch", 2, false).await;
    assert!(media.is_empty());
}

#[tokio::test]
async fn two_independent_gateways_keep_separate_sessions() {
    let a = Gateway::new(disabled_browser_config("integration-separate-a", "a.test")).unwrap();
    let b = Gateway::new(disabled_browser_config("integration-separate-b", "b.test")).unwrap();
    a.ensure_initialized().await;
    b.ensure_initialized().await;

    assert_eq!(a.current_domain().await, "a.test");
    assert_eq!(b.current_domain().await, "b.test");
}
