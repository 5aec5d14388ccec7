//! Default User-Agent pool and polite request-delay helper, used as
//! `GatewayConfig::user_agent`'s default when the caller doesn't override
//! it.
//!
//! Grounded on `features/antibot.rs` (`USER_AGENTS`, `get_random_user_agent`,
//! `RequestDelay`), trimmed of `ProxyRotator` and the mobile/profile
//! variants this crate never needs — a Gateway has exactly one fixed UA
//! for its lifetime, it just needs a reasonable one to start from.

/// A pool of realistic desktop-Chrome user agents. `default_user_agent`
/// returns the first (a fixed default, not a random pick): the UA must
/// stay stable for a Gateway's lifetime unless explicitly rotated, and
/// picking randomly at construction would make runs non-reproducible
/// for no benefit.
pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

pub fn default_user_agent() -> &'static str {
    USER_AGENTS[0]
}

/// A random pick from the pool, for callers that want UA rotation
/// (outside the scope of a single Gateway's fixed session).
pub fn random_user_agent() -> &'static str {
    use rand::prelude::*;
    let mut rng = rand::rng();
    USER_AGENTS[rng.random_range(0..USER_AGENTS.len())]
}

/// Polite jittered delay between non-coalesced requests (e.g. between
/// independent fanned-out followers) so bursts of direct HTTP still get
/// spaced out somewhat.
#[derive(Debug, Clone, Copy)]
pub struct RequestDelay {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl RequestDelay {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn random_delay_ms(&self) -> u64 {
        use rand::prelude::*;
        if self.min_ms >= self.max_ms {
            return self.min_ms;
        }
        let mut rng = rand::rng();
        rng.random_range(self.min_ms..=self.max_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_user_agent_is_stable_across_calls() {
        assert_eq!(default_user_agent(), default_user_agent());
    }

    #[test]
    fn random_user_agent_is_always_from_the_pool() {
        for _ in 0..20 {
            assert!(USER_AGENTS.contains(&random_user_agent()));
        }
    }

    #[test]
    fn request_delay_stays_within_bounds() {
        let delay = RequestDelay::new(10, 50);
        for _ in 0..20 {
            let d = delay.random_delay_ms();
            assert!((10..=50).contains(&d));
        }
    }
}
