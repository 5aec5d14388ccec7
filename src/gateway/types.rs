//! Shared value types that don't belong to any single subsystem:
//! `RequestResult` (the queue/gateway's common result value) and
//! `CapturedMedia` (the sniffer's output).

use std::collections::HashMap;

use super::error::GatewayError;

/// The outcome of one `action()` execution, whether from `executeDirect`,
/// a POST, or a retry after a challenge solve.
///
/// Constructors enforce the invariants: `ok => body present and
/// final_url present`; `challenge_blocked => !ok`.
#[derive(Debug, Clone)]
pub struct RequestResult {
    pub ok: bool,
    pub body: Option<Vec<u8>>,
    pub status_code: u16,
    pub final_url: Option<String>,
    pub error: Option<GatewayError>,
    pub challenge_blocked: bool,
}

impl RequestResult {
    pub fn success(status_code: u16, body: Vec<u8>, final_url: String) -> Self {
        Self {
            ok: true,
            body: Some(body),
            status_code,
            final_url: Some(final_url),
            error: None,
            challenge_blocked: false,
        }
    }

    pub fn challenge_blocked(status_code: u16, final_url: String) -> Self {
        Self {
            ok: false,
            body: None,
            status_code,
            final_url: Some(final_url.clone()),
            error: Some(GatewayError::ChallengeBlocked {
                status: status_code,
                final_url,
            }),
            challenge_blocked: false, // set below, kept as a separate flag.
        }
        .mark_challenge_blocked()
    }

    fn mark_challenge_blocked(mut self) -> Self {
        self.challenge_blocked = true;
        self
    }

    pub fn failure(status_code: u16, error: GatewayError) -> Self {
        Self {
            ok: false,
            body: None,
            status_code,
            final_url: None,
            error: Some(error),
            challenge_blocked: false,
        }
    }

    pub fn body_as_str(&self) -> Option<String> {
        self.body
            .as_ref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

/// A single media URL intercepted during a `MediaFound` browser session,
/// with the outbound headers captured verbatim so downstream playback can
/// replay the exact auth context.
#[derive(Debug, Clone)]
pub struct CapturedMedia {
    pub url: String,
    pub quality_label: Option<String>,
    pub headers: HashMap<String, String>,
}

/// A resolved document returned by `Gateway::get_document`.
#[derive(Debug, Clone)]
pub struct Document {
    pub url: String,
    pub body: String,
    pub status_code: u16,
}
