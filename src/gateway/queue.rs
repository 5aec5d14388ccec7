//! RequestQueue — per-origin leader-follower coalescer.
//!
//! No direct analog for request-coalescing exists upstream; the *idiom*
//! — a single `tokio::sync::Mutex` guarding a small piece of shared
//! state, never held across an awaited I/O call, plus `oneshot` channels
//! standing in for completions — is grounded on the `tokio::sync`
//! discipline already used in `features/non_robot_search.rs` (its
//! `watch::channel`-based `KillSwitch` coordinates cancellation the
//! same way this coordinates completions).

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex};
use tracing::warn;

use super::error::GatewayError;
use super::types::RequestResult;

pub type BoxedAction = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = RequestResult> + Send>> + Send + Sync>;

/// A single enqueued request: the URL it targets, the action that
/// actually performs the fetch, and the channel its result is delivered
/// through. Destroyed once the completion is fulfilled.
struct PendingRequest {
    action: BoxedAction,
    completion: oneshot::Sender<RequestResult>,
}

/// The callback invoked when the leader discovers the challenge's solve
/// URL lives on a different origin than the original request — must run
/// *before* the solve so the ensuing challenge cookies are stored against
/// the new origin.
pub type DomainRedirectHook = Arc<dyn Fn(String, String) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// The challenge-solve entry point the leader calls when `action()` comes
/// back `challenge_blocked`. Returns the solve's own `RequestResult`
/// (its `ok` flag indicates solve success, independent of the retried
/// `action()` afterwards).
pub type SolveFn = Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = RequestResult> + Send>> + Send + Sync>;

pub struct RequestQueue {
    pending: Mutex<HashMap<String, VecDeque<PendingRequest>>>,
    on_domain_redirect: DomainRedirectHook,
    solve_challenge: SolveFn,
}

/// The coalescing key for `url`. A URL with no parseable host gets a key
/// derived from the URL text itself rather than the shared empty string
/// — URLs with empty origin are not rewritten and not coalesced with
/// other origins — so two different malformed URLs never land in the
/// same bucket and block on each other.
fn origin_of(url: &str) -> String {
    match url::Url::parse(url).ok().and_then(|u| u.host_str().map(|h| h.to_string())) {
        Some(host) if !host.is_empty() => host,
        _ => format!("__no-origin__{url}"),
    }
}

impl RequestQueue {
    pub fn new(on_domain_redirect: DomainRedirectHook, solve_challenge: SolveFn) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            on_domain_redirect,
            solve_challenge,
        }
    }

    /// Enqueue `action` for `url`. The first request for a cold origin
    /// becomes the leader and runs the full leader protocol inline;
    /// subsequent requests become followers and simply await their
    /// completion.
    pub async fn enqueue(&self, url: String, action: BoxedAction) -> RequestResult {
        let origin = origin_of(&url);
        let (tx, rx) = oneshot::channel();
        let is_leader = {
            let mut pending = self.pending.lock().await;
            let deque = pending.entry(origin.clone()).or_default();
            let was_empty = deque.is_empty();
            deque.push_back(PendingRequest {
                action: action.clone(),
                completion: tx,
            });
            was_empty
        };

        if is_leader {
            self.run_leader_protocol(origin, url, action).await
        } else {
            rx.await.unwrap_or_else(|_| {
                RequestResult::failure(0, GatewayError::Cancelled)
            })
        }
    }

    async fn run_leader_protocol(&self, origin: String, url: String, action: BoxedAction) -> RequestResult {
        // The leader's own slot, pushed by `enqueue`, stays in the deque
        // for the whole duration of `action()`/`solve_challenge` below —
        // while it's non-empty, a follower's `enqueue` correctly sees an
        // in-flight leader rather than racing to become a second one.
        // `parallel_fanout`/`verify_then_fanout`/`fail_all` drain it (and
        // discard the leader's own entry) only once the protocol reaches
        // a point where followers are ready to be released.
        let result = action().await;

        if result.ok {
            self.parallel_fanout(&origin).await;
            return result;
        }

        if result.challenge_blocked {
            let solve_url = result.final_url.clone().unwrap_or_else(|| url.clone());
            let solve_origin = origin_of(&solve_url);

            if !solve_origin.is_empty() && solve_origin != origin {
                (self.on_domain_redirect)(origin.clone(), solve_origin.clone()).await;
            }

            let solve_result = (self.solve_challenge)(solve_url).await;

            if solve_result.ok {
                let retried = action().await;

                if retried.challenge_blocked {
                    // A second challenge right after a solve is terminal,
                    // not re-solved — avoids looping forever against an
                    // origin that just keeps re-issuing challenges.
                    let failure = RequestResult::failure(
                        retried.status_code,
                        GatewayError::ChallengeUnsolvable {
                            reason: "second challenge encountered after solve; not re-solving".to_string(),
                        },
                    );
                    self.fail_all(&origin, &failure).await;
                    return failure;
                }

                self.verify_then_fanout(&origin).await;
                return retried;
            }

            let failure = RequestResult::failure(
                solve_result.status_code,
                GatewayError::ChallengeUnsolvable {
                    reason: "challenge solve failed".to_string(),
                },
            );
            self.fail_all(&origin, &failure).await;
            return failure;
        }

        // Other failure: complete leader with the result, fail all followers
        // with the same reason.
        self.fail_all(&origin, &result).await;
        result
    }

    /// Remove the origin's deque, drop the leader's own head entry, and
    /// launch each remaining follower's own `action()` independently and
    /// in parallel.
    async fn parallel_fanout(&self, origin: &str) {
        let followers = {
            let mut pending = self.pending.lock().await;
            let mut all = pending.remove(origin).unwrap_or_default();
            let _leader_slot = all.pop_front();
            all
        };

        for follower in followers {
            tokio::spawn(async move {
                let result = (follower.action)().await;
                let _ = follower.completion.send(result);
            });
        }
    }

    /// Remove the origin's deque, drop the leader's own head entry, and
    /// run the first remaining follower (the verifier) sequentially. If
    /// it succeeds, launch the rest in parallel. If it fails, every
    /// remaining follower (verifier included) completes with a
    /// "verification failed" result; none are re-queued.
    async fn verify_then_fanout(&self, origin: &str) {
        let mut followers = {
            let mut pending = self.pending.lock().await;
            let mut all = pending.remove(origin).unwrap_or_default();
            let _leader_slot = all.pop_front();
            all
        };

        let Some(verifier) = followers.pop_front() else {
            return;
        };

        let verifier_result = (verifier.action)().await;

        if verifier_result.ok {
            let _ = verifier.completion.send(verifier_result);
            for follower in followers {
                tokio::spawn(async move {
                    let result = (follower.action)().await;
                    let _ = follower.completion.send(result);
                });
            }
        } else {
            let failure = RequestResult::failure(
                verifier_result.status_code,
                GatewayError::VerificationFailed {
                    reason: "post-solve verifier did not reach 2xx".to_string(),
                },
            );
            let _ = verifier.completion.send(failure.clone());
            for follower in followers {
                let _ = follower.completion.send(failure.clone());
            }
        }
    }

    /// Complete every follower of `origin` with `reason`, dropping the
    /// deque and the leader's own head entry along with it.
    async fn fail_all(&self, origin: &str, reason: &RequestResult) {
        let followers = {
            let mut pending = self.pending.lock().await;
            let mut all = pending.remove(origin).unwrap_or_default();
            let _leader_slot = all.pop_front();
            all
        };
        for follower in followers {
            if let Err(_unsent) = follower.completion.send(reason.clone()) {
                warn!("request_queue: follower for {} dropped its receiver before completion", origin);
            }
        }
    }
}
