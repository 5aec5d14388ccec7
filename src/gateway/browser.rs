//! ScriptedBrowserEngine — drives an embedded browser to load a URL, wait
//! for an exit condition, and return cookies/body/final-URL/captured
//! media.
//!
//! Grounded on `scraping/rust_scraper/cdp.rs::fetch_via_cdp` (launch ->
//! inject stealth -> navigate -> poll -> close-on-every-path) and
//! `scraping/browser_manager.rs::fetch_html_native` (the
//! `Browser::launch` + spawned CDP-event-drain-loop + deferred
//! `browser.close()` pattern). Network interception for `MediaFound` is
//! grounded on the same event-stream-drain mechanism, listening for
//! `Network.requestWillBeSent` in addition to draining the handler.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::Browser;
use futures::StreamExt;
use tokio::time::Instant;
use tracing::{error, warn};

use super::challenge::ChallengeDetector;
use super::launch::{build_launch_config, BrowserMode};
use super::media::MediaCaptureSet;
use super::stealth::{anti_ad_script, universal_stealth_script};
use super::types::CapturedMedia;

/// Grace period after `MediaFound(n)`'s minimum count is first reached,
/// to let late-arriving request headers settle before completing.
const MEDIA_GRACE_PERIOD: Duration = Duration::from_millis(500);
/// Polling cadence for the exit-condition watcher.
const POLL_INTERVAL: Duration = Duration::from_millis(300);
/// Cadence of the periodic anti-ad/autoplay nudge during media-sniffing.
const ANTI_AD_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub enum ExitCondition {
    PageLoaded,
    CookiesPresent(Vec<String>),
    MediaFound(usize),
}

#[derive(Debug)]
pub enum BrowserSessionResult {
    Success {
        cookies: HashMap<String, String>,
        body: String,
        final_url: String,
        captured_media: Vec<CapturedMedia>,
    },
    Timeout {
        last_url: String,
        partial_body: Option<String>,
    },
    Error(String),
}

/// The seam `Gateway` calls through to solve a challenge or sniff media,
/// so tests can inject a scripted fake instead of launching real Chrome.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn run_session(
        &self,
        url: &str,
        mode: BrowserMode,
        user_agent: &str,
        exit_condition: ExitCondition,
        timeout: Duration,
    ) -> BrowserSessionResult;
}

/// Stateless driver: every call owns its own browser instance and
/// disposes it on every exit path.
#[derive(Default)]
pub struct ScriptedBrowserEngine {
    detector: ChallengeDetector,
}

impl ScriptedBrowserEngine {
    pub fn new(detector: ChallengeDetector) -> Self {
        Self { detector }
    }
}

#[async_trait]
impl BrowserSession for ScriptedBrowserEngine {
    async fn run_session(
        &self,
        url: &str,
        mode: BrowserMode,
        user_agent: &str,
        exit_condition: ExitCondition,
        timeout: Duration,
    ) -> BrowserSessionResult {
        let desktop = !user_agent.contains("Mobile") && !user_agent.contains("Android");
        let media_mode = matches!(exit_condition, ExitCondition::MediaFound(_));

        let config = match build_launch_config(mode, user_agent, None) {
            Ok(c) => c,
            Err(e) => return BrowserSessionResult::Error(format!("launch config: {e}")),
        };

        let (mut browser, mut handler) = match Browser::launch(config).await {
            Ok(pair) => pair,
            Err(e) => return BrowserSessionResult::Error(format!("browser launch failed: {e}")),
        };

        let media_set = std::sync::Arc::new(tokio::sync::Mutex::new(MediaCaptureSet::new()));

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("scripted_browser: CDP handler error: {}", e);
                }
            }
        });

        let result = self
            .drive_page(
                &mut browser,
                url,
                user_agent,
                desktop,
                media_mode,
                &exit_condition,
                timeout,
                media_set.clone(),
            )
            .await;

        // Deferred destroy: never tear down the browser from inside one
        // of its own event callbacks, so close happens here after the
        // drive loop has fully returned.
        browser.close().await.ok();
        handler_task.abort();

        result
    }
}

impl ScriptedBrowserEngine {
    #[allow(clippy::too_many_arguments)]
    async fn drive_page(
        &self,
        browser: &mut Browser,
        url: &str,
        user_agent: &str,
        desktop: bool,
        media_mode: bool,
        exit_condition: &ExitCondition,
        timeout: Duration,
        media_set: std::sync::Arc<tokio::sync::Mutex<MediaCaptureSet>>,
    ) -> BrowserSessionResult {
        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => return BrowserSessionResult::Error(format!("new_page failed: {e}")),
        };

        if let Err(e) = page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(universal_stealth_script(desktop)))
            .await
        {
            warn!("scripted_browser: stealth injection failed: {}", e);
        }

        let mut request_events = match page.event_listener::<EventRequestWillBeSent>().await {
            Ok(stream) => Some(stream),
            Err(e) => {
                warn!("scripted_browser: could not subscribe to network events: {}", e);
                None
            }
        };

        if let Err(e) = page.goto(url).await {
            return BrowserSessionResult::Error(format!("navigation failed: {e}"));
        }

        let deadline = Instant::now() + timeout;
        let mut last_anti_ad = Instant::now();
        let mut media_minimum_met_at: Option<Instant> = None;

        loop {
            if let Some(stream) = request_events.as_mut() {
                while let Ok(Some(event)) =
                    tokio::time::timeout(Duration::from_millis(1), stream.next()).await
                {
                    let req_url = event.request.url.clone();
                    let headers: HashMap<String, String> = event
                        .request
                        .headers
                        .inner()
                        .as_object()
                        .map(|m| {
                            m.iter()
                                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                                .collect()
                        })
                        .unwrap_or_default();
                    let cookie = page
                        .get_cookies()
                        .await
                        .ok()
                        .map(|cookies| {
                            cookies
                                .iter()
                                .map(|c| format!("{}={}", c.name, c.value))
                                .collect::<Vec<_>>()
                                .join("; ")
                        })
                        .filter(|s| !s.is_empty());
                    media_set.lock().await.record(&req_url, headers, cookie.as_deref());
                }
            }

            if media_mode && last_anti_ad.elapsed() >= ANTI_AD_INTERVAL {
                let _ = page.evaluate(anti_ad_script()).await;
                last_anti_ad = Instant::now();
            }

            if let Some(outcome) = self
                .check_exit_condition(&page, exit_condition, &media_set, &mut media_minimum_met_at)
                .await
            {
                return outcome;
            }

            if Instant::now() >= deadline {
                return self.on_timeout(&page, exit_condition, media_set).await;
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn check_exit_condition(
        &self,
        page: &chromiumoxide::Page,
        condition: &ExitCondition,
        media_set: &std::sync::Arc<tokio::sync::Mutex<MediaCaptureSet>>,
        media_minimum_met_at: &mut Option<Instant>,
    ) -> Option<BrowserSessionResult> {
        match condition {
            ExitCondition::PageLoaded => {
                let body = page.content().await.ok()?;
                if self.detector.is_challenge(200, &body) {
                    return None;
                }
                Some(self.success(page, body).await)
            }
            ExitCondition::CookiesPresent(keys) => {
                let cookies = page.get_cookies().await.ok()?;
                let present: std::collections::HashSet<&str> =
                    cookies.iter().map(|c| c.name.as_str()).collect();
                if keys.iter().all(|k| present.contains(k.as_str())) {
                    let body = page.content().await.unwrap_or_default();
                    Some(self.success(page, body).await)
                } else {
                    None
                }
            }
            ExitCondition::MediaFound(n) => {
                let count = media_set.lock().await.len();
                if count < *n {
                    *media_minimum_met_at = None;
                    return None;
                }
                let met_at = media_minimum_met_at.get_or_insert_with(Instant::now);
                if met_at.elapsed() >= MEDIA_GRACE_PERIOD {
                    let cookies = page
                        .get_cookies()
                        .await
                        .unwrap_or_default()
                        .into_iter()
                        .map(|c| (c.name, c.value))
                        .collect();
                    let final_url = page.url().await.ok().flatten().unwrap_or_default();
                    Some(BrowserSessionResult::Success {
                        cookies,
                        body: String::new(),
                        final_url,
                        captured_media: drain_media(&media_set).await,
                    })
                } else {
                    None
                }
            }
        }
    }

    async fn success(&self, page: &chromiumoxide::Page, body: String) -> BrowserSessionResult {
        // Cookies must be flushed to durable storage before reading.
        // chromiumoxide's CDP session persists cookies as they're set; we
        // just read the current jar here.
        let cookies = page
            .get_cookies()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|c| (c.name, c.value))
            .collect();
        let final_url = page.url().await.ok().flatten().unwrap_or_default();
        BrowserSessionResult::Success {
            cookies,
            body,
            final_url,
            captured_media: Vec::new(),
        }
    }

    async fn on_timeout(
        &self,
        page: &chromiumoxide::Page,
        condition: &ExitCondition,
        media_set: std::sync::Arc<tokio::sync::Mutex<MediaCaptureSet>>,
    ) -> BrowserSessionResult {
        let last_url = page.url().await.ok().flatten().unwrap_or_default();

        if let ExitCondition::MediaFound(_) = condition {
            let set = media_set.lock().await;
            if !set.is_empty() {
                let cookies = page
                    .get_cookies()
                    .await
                    .unwrap_or_default()
                    .into_iter()
                    .map(|c| (c.name, c.value))
                    .collect();
                return BrowserSessionResult::Success {
                    cookies,
                    body: String::new(),
                    final_url: last_url,
                    captured_media: drain_media(&media_set).await,
                };
            }
        }

        let partial_body = page.content().await.ok();
        BrowserSessionResult::Timeout { last_url, partial_body }
    }
}

async fn drain_media(set: &std::sync::Arc<tokio::sync::Mutex<MediaCaptureSet>>) -> Vec<CapturedMedia> {
    let mut guard = set.lock().await;
    std::mem::take(&mut *guard).into_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_condition_media_found_holds_the_minimum_count() {
        match ExitCondition::MediaFound(3) {
            ExitCondition::MediaFound(n) => assert_eq!(n, 3),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn browser_session_result_timeout_carries_last_url() {
        let result = BrowserSessionResult::Timeout {
            last_url: "https://example.test/".to_string(),
            partial_body: None,
        };
        match result {
            BrowserSessionResult::Timeout { last_url, .. } => {
                assert_eq!(last_url, "https://example.test/")
            }
            _ => panic!("wrong variant"),
        }
    }
}
