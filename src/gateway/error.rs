//! The value-type error taxonomy the Gateway's public API returns.
//!
//! Grounded on `features/non_robot_search.rs`'s `NonRobotSearchError` — a
//! flat `thiserror` enum of caller-meaningful variants rather than a boxed
//! catch-all. Internal plumbing (chrome discovery, config-file I/O,
//! preflight checks) uses `anyhow::Result` and is logged-and-degraded
//! rather than surfaced through this type.

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    #[error("network error: {0}")]
    NetworkError(String),

    #[error("challenge blocked (status {status}, final url {final_url})")]
    ChallengeBlocked { status: u16, final_url: String },

    #[error("challenge unsolvable: {reason}")]
    ChallengeUnsolvable { reason: String },

    #[error("post-solve verification failed: {reason}")]
    VerificationFailed { reason: String },

    #[error("gateway used before ensure_initialized()")]
    NotInitialized,

    #[error("request cancelled")]
    Cancelled,

    #[error("parse error: {0}")]
    ParseError(String),
}

impl GatewayError {
    pub fn is_challenge_blocked(&self) -> bool {
        matches!(self, GatewayError::ChallengeBlocked { .. })
    }
}
