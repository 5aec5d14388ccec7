//! `HttpExecutor` — the seam between `Gateway` and the transport it
//! issues direct HTTP requests over. Production code gets `ReqwestExecutor`
//! (HTTP/1.1-only — HTTP/2 fingerprinting interacts badly with the CDN);
//! tests inject a scripted fake instead of hitting real origins.
//!
//! Grounded on `main.rs`'s `reqwest::Client::builder()` HTTP client
//! construction, wrapped behind a trait the way `queue.rs`'s
//! `DomainRedirectHook`/`SolveFn` are injected rather than called through
//! a concrete type — the same constructor-injection pattern applied one
//! layer further out.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, SET_COOKIE};

/// What `Gateway` needs back from one HTTP round-trip: enough to run
/// `ChallengeDetector`, merge `Set-Cookie`s, and build a `RequestResult`.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub final_url: String,
    pub set_cookies: Vec<String>,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> Result<HttpResponse, String>;

    async fn post_form(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        form: &HashMap<String, String>,
    ) -> Result<HttpResponse, String>;
}

fn to_header_map(headers: &HashMap<String, String>) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (k, v) in headers {
        if let (Ok(name), Ok(value)) = (HeaderName::try_from(k.as_str()), HeaderValue::from_str(v)) {
            map.insert(name, value);
        }
    }
    map
}

fn set_cookies_of(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok().map(|s| s.to_string()))
        .collect()
}

/// Production `HttpExecutor`: a `reqwest::Client` forced to HTTP/1.1, with
/// no built-in cookie jar — cookies flow only through `SessionState`.
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> Result<HttpResponse, String> {
        let response = self
            .client
            .get(url)
            .headers(to_header_map(headers))
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let set_cookies = set_cookies_of(response.headers());
        let body = response.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse { status, final_url, set_cookies, body })
    }

    async fn post_form(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
        form: &HashMap<String, String>,
    ) -> Result<HttpResponse, String> {
        let response = self
            .client
            .post(url)
            .headers(to_header_map(headers))
            .form(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let set_cookies = set_cookies_of(response.headers());
        let body = response.bytes().await.map_err(|e| e.to_string())?.to_vec();
        Ok(HttpResponse { status, final_url, set_cookies, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_map_skips_invalid_entries_instead_of_panicking() {
        let mut headers = HashMap::new();
        headers.insert("X-Valid".to_string(), "ok".to_string());
        headers.insert("Bad Name".to_string(), "value".to_string());
        let map = to_header_map(&headers);
        assert_eq!(map.get("X-Valid").unwrap(), "ok");
        assert_eq!(map.len(), 1);
    }
}
