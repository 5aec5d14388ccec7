//! Scripted fakes for `HttpExecutor` and `BrowserSession`, used by the
//! crate's own unit tests and available to integration tests so a
//! `Gateway` can be exercised end-to-end (leader-follower coalescing,
//! challenge escalation, domain redirects) without a real origin or a
//! real browser — grounded on `queue.rs`'s existing pattern of injecting
//! a `SolveFn` closure for the same reason.

#![cfg(test)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::browser::{BrowserSession, BrowserSessionResult, ExitCondition};
use super::http_executor::{HttpExecutor, HttpResponse};
use super::launch::BrowserMode;

/// One scripted response, consumed in FIFO order by `FakeHttpExecutor`.
#[derive(Debug, Clone)]
pub struct ScriptedResponse {
    pub status: u16,
    pub body: Vec<u8>,
    pub set_cookies: Vec<String>,
    pub final_url: Option<String>,
}

impl ScriptedResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into().into_bytes(), set_cookies: Vec::new(), final_url: None }
    }

    pub fn challenge(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into().into_bytes(), set_cookies: Vec::new(), final_url: None }
    }

    pub fn with_cookie(mut self, set_cookie: impl Into<String>) -> Self {
        self.set_cookies.push(set_cookie.into());
        self
    }
}

/// A fake HTTP transport that returns pre-scripted responses in order,
/// falling back to repeating the last one once the script is exhausted.
/// Counts calls so tests can assert coalescing collapsed N concurrent
/// requests into one network round-trip.
pub struct FakeHttpExecutor {
    script: Mutex<Vec<ScriptedResponse>>,
    calls: AtomicUsize,
}

impl FakeHttpExecutor {
    pub fn new(script: Vec<ScriptedResponse>) -> Self {
        Self { script: Mutex::new(script), calls: AtomicUsize::new(0) }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self, url: &str) -> HttpResponse {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        let scripted = if script.len() > 1 { script.remove(0) } else { script.first().cloned().unwrap_or_else(|| ScriptedResponse::ok("")) };
        HttpResponse {
            status: scripted.status,
            final_url: scripted.final_url.unwrap_or_else(|| url.to_string()),
            set_cookies: scripted.set_cookies,
            body: scripted.body,
        }
    }
}

#[async_trait]
impl HttpExecutor for FakeHttpExecutor {
    async fn get(&self, url: &str, _headers: &HashMap<String, String>) -> Result<HttpResponse, String> {
        Ok(self.next_response(url))
    }

    async fn post_form(
        &self,
        url: &str,
        _headers: &HashMap<String, String>,
        _form: &HashMap<String, String>,
    ) -> Result<HttpResponse, String> {
        Ok(self.next_response(url))
    }
}

/// A fake browser that always reports the same scripted outcome,
/// counting how many times a solve/sniff was attempted.
pub struct FakeBrowserSession {
    result: Box<dyn Fn() -> BrowserSessionResult + Send + Sync>,
    calls: AtomicUsize,
}

impl FakeBrowserSession {
    pub fn always_succeeds(cookies: HashMap<String, String>, body: impl Into<String> + Clone + Send + Sync + 'static) -> Self {
        Self {
            result: Box::new(move || BrowserSessionResult::Success {
                cookies: cookies.clone(),
                body: body.clone().into(),
                final_url: "https://example.test/".to_string(),
                captured_media: Vec::new(),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always_times_out() -> Self {
        Self {
            result: Box::new(|| BrowserSessionResult::Timeout {
                last_url: "https://example.test/".to_string(),
                partial_body: Some("<html>checking your browser</html>".to_string()),
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserSession for FakeBrowserSession {
    async fn run_session(
        &self,
        _url: &str,
        _mode: BrowserMode,
        _user_agent: &str,
        _exit_condition: ExitCondition,
        _timeout: Duration,
    ) -> BrowserSessionResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.result)()
    }
}
