//! Gateway — the single public entry point. Composes SessionState,
//! SessionStore, ChallengeDetector, DomainManager, RequestQueue, and
//! ScriptedBrowserEngine; executes direct HTTP; chooses escalation paths.
//!
//! Grounded on `core/app_state.rs::AppState` (one struct composing an
//! `http_client`, concurrency primitives, and optional subsystems behind
//! `Arc`s, with a `new()` constructor wiring env-var defaults) and
//! `main.rs`'s HTTP client construction (`reqwest::Client::builder()`
//! with configurable timeouts), generalized here to also force
//! `.http1_only()` — HTTP/2 fingerprinting interacts badly with the CDN.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

use super::browser::{BrowserSession, BrowserSessionResult, ExitCondition, ScriptedBrowserEngine};
use super::challenge::ChallengeDetector;
use super::config::GatewayConfig;
use super::domain::DomainManager;
use super::error::GatewayError;
use super::http_executor::{HttpExecutor, ReqwestExecutor};
use super::launch::BrowserMode;
use super::parser::Parser;
use super::queue::RequestQueue;
use super::session::SessionState;
use super::store::{PersistedSession, SessionStore};
use super::types::{CapturedMedia, Document, RequestResult};

const HEADLESS_TIMEOUT: Duration = Duration::from_secs(30);
const VISIBLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Single public entry point, safe for concurrent use by many callers.
/// All shared mutable state lives behind `Arc`s that are cheap
/// to clone; `Gateway` itself is handed out as one shared instance, not
/// reconstructed per call.
pub struct Gateway {
    config: GatewayConfig,
    http: Arc<dyn HttpExecutor>,
    session: RwLock<SessionState>,
    store: Arc<SessionStore>,
    domain: Arc<DomainManager>,
    detector: ChallengeDetector,
    browser: Arc<dyn BrowserSession>,
    queue: Arc<RequestQueue>,
    /// The per-site `Parser` the caller constructed this Gateway with —
    /// dynamic dispatch over parsers, passed in at Gateway construction.
    /// `None` when a caller only needs raw fetch/solve and has no parsing
    /// concern of its own.
    parser: Option<Arc<dyn Parser<Document>>>,
    initialized: tokio::sync::Mutex<bool>,
    /// Lets queued actions hold a strong `Arc<Gateway>` without the
    /// struct holding one to itself — the cycle is eliminated by
    /// constructor injection via `Arc::new_cyclic` instead.
    self_weak: std::sync::Weak<Gateway>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Arc<Self>, GatewayError> {
        let reqwest_client = reqwest::Client::builder()
            .http1_only()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("failed to build http client: {e}")))?;

        let detector = ChallengeDetector::new(config.origin_validation_markers.clone());
        let browser: Arc<dyn BrowserSession> = Arc::new(ScriptedBrowserEngine::new(detector.clone()));
        let http: Arc<dyn HttpExecutor> = Arc::new(ReqwestExecutor::new(reqwest_client.clone()));

        Self::new_with_collaborators(config, http, browser, reqwest_client)
    }

    /// Constructs a `Gateway` with an injected per-site `Parser`,
    /// using the production reqwest/chromiumoxide collaborators. This is
    /// the constructor an embedding scraper reaches for once it has a
    /// concrete `Parser<Document>` to hand in.
    pub fn new_with_parser(
        config: GatewayConfig,
        parser: Arc<dyn Parser<Document>>,
    ) -> Result<Arc<Self>, GatewayError> {
        let reqwest_client = reqwest::Client::builder()
            .http1_only()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::NetworkError(format!("failed to build http client: {e}")))?;

        let detector = ChallengeDetector::new(config.origin_validation_markers.clone());
        let browser: Arc<dyn BrowserSession> = Arc::new(ScriptedBrowserEngine::new(detector.clone()));
        let http: Arc<dyn HttpExecutor> = Arc::new(ReqwestExecutor::new(reqwest_client.clone()));

        Self::new_with_collaborators_and_parser(config, http, browser, reqwest_client, Some(parser))
    }

    /// Constructs a `Gateway` with caller-supplied `HttpExecutor`/
    /// `BrowserSession` implementations instead of the production
    /// reqwest/chromiumoxide ones, so gateway-level scenarios can be
    /// exercised against scripted fakes rather than real origins and
    /// real Chrome.
    ///
    /// `domain_http` is still a concrete `reqwest::Client` because
    /// `DomainManager`'s remote-config fetch is an ambient implementation
    /// detail, not one of the scenarios that need faking; tests that
    /// don't set `remoteConfigUrl`/`syncbackUrl` never drive it.
    pub fn new_with_collaborators(
        config: GatewayConfig,
        http: Arc<dyn HttpExecutor>,
        browser: Arc<dyn BrowserSession>,
        domain_http: reqwest::Client,
    ) -> Result<Arc<Self>, GatewayError> {
        Self::new_with_collaborators_and_parser(config, http, browser, domain_http, None)
    }

    fn new_with_collaborators_and_parser(
        config: GatewayConfig,
        http: Arc<dyn HttpExecutor>,
        browser: Arc<dyn BrowserSession>,
        domain_http: reqwest::Client,
        parser: Option<Arc<dyn Parser<Document>>>,
    ) -> Result<Arc<Self>, GatewayError> {
        let store = Arc::new(SessionStore::new(config.name.clone()));
        let detector = ChallengeDetector::new(config.origin_validation_markers.clone());
        let domain = Arc::new(DomainManager::new(
            domain_http,
            store.clone(),
            config.name.clone(),
            config.fallback_domain.clone(),
            config.remote_config_url.clone(),
            config.syncback_url.clone(),
        ));

        let session = store
            .load_session()
            .map(|p| SessionState {
                user_agent: p.user_agent,
                cookies: p.cookies,
                domain: p.domain,
                cookie_acquired_at: p.cookie_timestamp,
                acquired_via_browser: p.from_webview,
            })
            .unwrap_or_else(|| SessionState::fresh(config.user_agent.clone(), config.fallback_domain.clone()));

        Ok(Arc::new_cyclic(|weak: &std::sync::Weak<Gateway>| {
            let weak_for_redirect = weak.clone();
            let weak_for_solve = weak.clone();

            let on_domain_redirect: super::queue::DomainRedirectHook = Arc::new(move |old, new| {
                let weak = weak_for_redirect.clone();
                Box::pin(async move {
                    if let Some(gw) = weak.upgrade() {
                        gw.domain.update_domain(&new).await;
                        info!("gateway: domain redirect {} -> {}", old, new);
                    }
                })
            });

            let solve_challenge: super::queue::SolveFn = Arc::new(move |url| {
                let weak = weak_for_solve.clone();
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(gw) => gw.solve_challenge(&url).await,
                        None => RequestResult::failure(0, GatewayError::Cancelled),
                    }
                })
            });

            Self {
                config,
                http,
                session: RwLock::new(session),
                store,
                domain,
                detector,
                browser,
                queue: Arc::new(RequestQueue::new(on_domain_redirect, solve_challenge)),
                parser,
                initialized: tokio::sync::Mutex::new(false),
                self_weak: weak.clone(),
            }
        }))
    }

    /// The `Parser` this Gateway was constructed with, if any.
    /// Callers that parse `get_document`'s output reach through here
    /// instead of holding their own separate reference to the same parser.
    pub fn parser(&self) -> Option<&Arc<dyn Parser<Document>>> {
        self.parser.as_ref()
    }

    /// Idempotent: loads persisted session (already done in `new`) and
    /// initializes the domain manager. Safe to call more than once.
    pub async fn ensure_initialized(&self) {
        let mut guard = self.initialized.lock().await;
        if *guard {
            return;
        }
        self.domain.ensure_initialized().await;

        // If no domain was ever persisted for the session itself, adopt
        // whatever DomainManager settled on (fallback or remote).
        let current = self.domain.current_domain().await;
        {
            let mut session = self.session.write().await;
            if session.domain.is_empty() {
                *session = session.with_domain(current);
            }
        }

        *guard = true;
    }

    pub async fn current_domain(&self) -> String {
        self.domain.current_domain().await
    }

    /// UA + Referer + Cookie, for callers fetching media assets directly.
    pub async fn image_headers(&self) -> HashMap<String, String> {
        let session = self.session.read().await;
        let mut headers = HashMap::new();
        headers.insert("User-Agent".to_string(), session.user_agent.clone());
        headers.insert("Referer".to_string(), format!("https://{}/", session.domain));
        if let Some(cookie) = session.cookie_header() {
            headers.insert("Cookie".to_string(), cookie);
        }
        headers
    }

    pub async fn invalidate_session(&self, reason: &str) {
        let mut session = self.session.write().await;
        *session = session.invalidate();
        self.persist(&session);
        warn!("gateway: session invalidated: {}", reason);
    }

    /// Drops cookies past `config.cookie_ttl` before they're sent on the
    /// next request, rather than waiting for the origin to reject them
    /// with a fresh challenge. No-op when there are no cookies to expire.
    async fn expire_stale_cookies(&self) {
        let ttl = self.config.cookie_ttl.as_secs();
        let mut session = self.session.write().await;
        if !session.cookies.is_empty() && session.is_expired(ttl) {
            *session = session.invalidate();
            self.persist(&session);
        }
    }

    fn persist(&self, session: &SessionState) {
        self.store.save_session(&PersistedSession {
            user_agent: session.user_agent.clone(),
            cookies: session.cookies.clone(),
            domain: session.domain.clone(),
            cookie_timestamp: session.cookie_acquired_at,
            from_webview: session.acquired_via_browser,
        });
    }

    /// Rewrite `url`'s host to the session domain when it's a third-party
    /// alias of our own origin: only hosts in `trustedDomains` (or the
    /// fallback domain) are substituted. Third-party embed hosts are
    /// left untouched.
    async fn rewrite_url(&self, url: &str) -> String {
        let Ok(parsed) = Url::parse(url) else {
            return url.to_string();
        };
        let Some(host) = parsed.host_str() else {
            return url.to_string();
        };

        let session_domain = self.session.read().await.domain.clone();
        if host == session_domain {
            return url.to_string();
        }

        let is_trusted = self.config.trusted_domains.iter().any(|d| d == host)
            || host == self.config.fallback_domain;
        if !is_trusted {
            return url.to_string();
        }

        let mut rewritten = parsed;
        let _ = rewritten.set_host(Some(&session_domain));
        rewritten.to_string()
    }

    /// Build the request headers for a direct fetch: SessionState's fixed
    /// set plus any caller-supplied extras (extras win on conflict).
    async fn build_headers(&self, extra_headers: &HashMap<String, String>) -> HashMap<String, String> {
        let session = self.session.read().await;
        let mut map: HashMap<String, String> = session.request_headers().into_iter().collect();
        map.extend(extra_headers.iter().map(|(k, v)| (k.clone(), v.clone())));
        map
    }

    /// Merge `Set-Cookie` values from a response into SessionState, but
    /// only when the response came from our own session domain or a
    /// trusted alias.
    async fn maybe_merge_response_cookies(&self, response_host: &str, set_cookies: &[String]) {
        let session_domain = self.session.read().await.domain.clone();
        let trusted = response_host == session_domain
            || self.config.trusted_domains.iter().any(|d| d == response_host);
        if !trusted {
            return;
        }

        let mut cookies = HashMap::new();
        for s in set_cookies {
            if let Some((name, rest)) = s.split_once('=') {
                let value = rest.split(';').next().unwrap_or("").to_string();
                cookies.insert(name.trim().to_string(), value);
            }
        }
        if cookies.is_empty() {
            return;
        }

        let mut session = self.session.write().await;
        *session = session.merge_cookies(cookies);
        self.persist(&session);
    }

    /// Issue one direct HTTP request and classify the result against the
    /// session state machine.
    pub async fn execute_direct(
        &self,
        url: &str,
        extra_headers: HashMap<String, String>,
    ) -> RequestResult {
        self.expire_stale_cookies().await;
        let rewritten = self.rewrite_url(url).await;
        let headers = self.build_headers(&extra_headers).await;

        let response = match self.http.get(&rewritten, &headers).await {
            Ok(r) => r,
            Err(e) => {
                return RequestResult::failure(0, GatewayError::NetworkError(e));
            }
        };

        let status = response.status;
        let final_url = response.final_url;
        let response_host = Url::parse(&final_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default();

        self.maybe_merge_response_cookies(&response_host, &response.set_cookies).await;

        let body_str = String::from_utf8_lossy(&response.body).to_string();

        if self.detector.is_challenge(status, &body_str) {
            return RequestResult::challenge_blocked(status, final_url);
        }

        // A whitelisted 403 is a legitimate response, normalized to a 200
        // success rather than falling into the generic status-range
        // check below.
        if self.detector.is_whitelisted_exception(status, &body_str) {
            return RequestResult::success(200, response.body, final_url);
        }

        if (200..300).contains(&status) {
            RequestResult::success(status, response.body, final_url)
        } else {
            RequestResult::failure(status, GatewayError::NetworkError(format!("status {status}")))
        }
    }

    /// POST `form_data` through the same per-origin queue as GET, keyed
    /// by origin.
    pub async fn post(
        &self,
        url: &str,
        form_data: HashMap<String, String>,
        headers: HashMap<String, String>,
    ) -> RequestResult {
        let gw_url = url.to_string();
        let gw_headers = headers;
        let gw_form = form_data;
        let this = self.self_arc();

        let action: super::queue::BoxedAction = Arc::new(move || {
            let this = this.clone();
            let url = gw_url.clone();
            let headers = gw_headers.clone();
            let form = gw_form.clone();
            Box::pin(async move { this.execute_post(&url, form, headers).await })
        });

        self.queue.enqueue(url.to_string(), action).await
    }

    async fn execute_post(
        &self,
        url: &str,
        form_data: HashMap<String, String>,
        extra_headers: HashMap<String, String>,
    ) -> RequestResult {
        self.expire_stale_cookies().await;
        let rewritten = self.rewrite_url(url).await;
        let headers = self.build_headers(&extra_headers).await;

        let response = match self.http.post_form(&rewritten, &headers, &form_data).await {
            Ok(r) => r,
            Err(e) => return RequestResult::failure(0, GatewayError::NetworkError(e)),
        };

        let status = response.status;
        let final_url = response.final_url;
        let response_host = Url::parse(&final_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .unwrap_or_default();
        self.maybe_merge_response_cookies(&response_host, &response.set_cookies).await;

        let body_str = String::from_utf8_lossy(&response.body).to_string();

        if self.detector.is_challenge(status, &body_str) {
            return RequestResult::challenge_blocked(status, final_url);
        }
        if self.detector.is_whitelisted_exception(status, &body_str) {
            return RequestResult::success(200, response.body, final_url);
        }
        if (200..300).contains(&status) {
            RequestResult::success(status, response.body, final_url)
        } else {
            RequestResult::failure(status, GatewayError::NetworkError(format!("status {status}")))
        }
    }

    /// Invalidate cookies, then run the headless-to-visible escalation
    /// through ScriptedBrowserEngine.
    pub async fn solve_challenge(&self, url: &str) -> RequestResult {
        if !self.config.browser_enabled {
            return RequestResult::failure(
                0,
                GatewayError::ChallengeUnsolvable {
                    reason: "browserEnabled=false".to_string(),
                },
            );
        }

        {
            let mut session = self.session.write().await;
            *session = session.invalidate();
        }

        let user_agent = self.session.read().await.user_agent.clone();

        let (mode, timeout) = if self.config.skip_headless {
            (BrowserMode::Visible, VISIBLE_TIMEOUT)
        } else {
            (BrowserMode::Headless, HEADLESS_TIMEOUT)
        };

        match self
            .browser
            .run_session(url, mode, &user_agent, ExitCondition::PageLoaded, timeout)
            .await
        {
            BrowserSessionResult::Success {
                cookies,
                body,
                final_url,
                ..
            } => self.finalize_solve(url, &final_url, cookies, body).await,
            BrowserSessionResult::Timeout { last_url, partial_body } => {
                let challenge_markers_present = partial_body
                    .as_deref()
                    .map(|b| self.detector.is_challenge(200, b))
                    .unwrap_or(true);

                if !challenge_markers_present || self.config.skip_headless {
                    return RequestResult::failure(
                        0,
                        GatewayError::ChallengeUnsolvable {
                            reason: format!("headless solve timed out at {last_url}"),
                        },
                    );
                }

                match self
                    .browser
                    .run_session(url, BrowserMode::Visible, &user_agent, ExitCondition::PageLoaded, VISIBLE_TIMEOUT)
                    .await
                {
                    BrowserSessionResult::Success {
                        cookies,
                        body,
                        final_url,
                        ..
                    } => self.finalize_solve(url, &final_url, cookies, body).await,
                    _ => RequestResult::failure(
                        0,
                        GatewayError::ChallengeUnsolvable {
                            reason: "visible escalation also failed".to_string(),
                        },
                    ),
                }
            }
            BrowserSessionResult::Error(reason) => {
                RequestResult::failure(0, GatewayError::ChallengeUnsolvable { reason })
            }
        }
    }

    async fn finalize_solve(
        &self,
        requested_url: &str,
        final_url: &str,
        cookies: HashMap<String, String>,
        body: String,
    ) -> RequestResult {
        {
            let mut session = self.session.write().await;
            *session = session.with_cookies(cookies, true);
            self.persist(&session);
        }
        self.domain.check_redirect(requested_url, final_url).await;
        RequestResult::success(200, body.into_bytes(), final_url.to_string())
    }

    /// `requestQueue.enqueue(url, () -> executeDirect(url))`, with a
    /// one-shot fallback through `solve_challenge` on a generic-looking
    /// 403, and an optional post-success redirect check.
    pub async fn get_document(&self, url: &str, check_domain: bool) -> Option<Document> {
        let this = self.self_arc();
        let gw_url = url.to_string();

        let action: super::queue::BoxedAction = Arc::new(move || {
            let this = this.clone();
            let url = gw_url.clone();
            Box::pin(async move { this.execute_direct(&url, HashMap::new()).await })
        });

        let result = self.queue.enqueue(url.to_string(), action).await;

        if !result.ok {
            warn!("gateway: get_document({}) failed: {:?}", url, result.error);
            return None;
        }

        if check_domain {
            if let Some(final_url) = &result.final_url {
                self.domain.check_redirect(url, final_url).await;
            }
        }

        let body = result.body_as_str()?;
        Some(Document {
            url: result.final_url.unwrap_or_else(|| url.to_string()),
            body,
            status_code: result.status_code,
        })
    }

    /// Runs ScriptedBrowserEngine in `MediaFound(min_count)` mode, headless
    /// first with visible escalation only when the timed-out page still
    /// carries challenge markers — a plain slow page that never hit
    /// `min_count` shouldn't pop a visible browser.
    pub async fn sniff_media(&self, url: &str, min_count: usize, visible: bool) -> Vec<CapturedMedia> {
        if !self.config.browser_enabled {
            return Vec::new();
        }

        let user_agent = self.session.read().await.user_agent.clone();
        let (mode, timeout) = if visible || self.config.skip_headless {
            (BrowserMode::Visible, VISIBLE_TIMEOUT)
        } else {
            (BrowserMode::Headless, HEADLESS_TIMEOUT)
        };

        match self
            .browser
            .run_session(url, mode, &user_agent, ExitCondition::MediaFound(min_count), timeout)
            .await
        {
            BrowserSessionResult::Success { captured_media, .. } => captured_media,
            BrowserSessionResult::Timeout { partial_body, .. } if mode == BrowserMode::Headless => {
                let challenge_markers_present = partial_body
                    .as_deref()
                    .map(|b| self.detector.is_challenge(200, b))
                    .unwrap_or(true);

                if !challenge_markers_present {
                    return Vec::new();
                }

                match self
                    .browser
                    .run_session(
                        url,
                        BrowserMode::Visible,
                        &user_agent,
                        ExitCondition::MediaFound(min_count),
                        VISIBLE_TIMEOUT,
                    )
                    .await
                {
                    BrowserSessionResult::Success { captured_media, .. } => captured_media,
                    _ => Vec::new(),
                }
            }
            _ => Vec::new(),
        }
    }

    /// `Arc<Self>` handle recovered from the `Weak` stashed by `new`'s
    /// `Arc::new_cyclic`. Only ever called on a fully-constructed Gateway
    /// reached through its own public methods, so the upgrade cannot fail.
    fn self_arc(&self) -> Arc<Gateway> {
        self.self_weak
            .upgrade()
            .expect("Gateway always holds a valid self-reference once constructed via Gateway::new")
    }
}
