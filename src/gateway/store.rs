//! SessionStore — durable persistence of SessionState (and the current
//! domain) across process restarts.
//!
//! Grounded on `features/auth_registry.rs::save` for the atomic
//! write-to-temp-then-rename sequence, and `features/session_store.rs` for
//! the home-dir-relative, provider-namespaced path layout. Load returns
//! `None` on any I/O or parse failure rather than propagating an error —
//! if no cookies were ever persisted, callers treat it as a fresh session
//! — and save is best-effort: a write failure is logged and swallowed,
//! never surfaced to the caller.
//!
//! Writes take an exclusive `fs2` file lock around the temp-write + rename
//! so two concurrent `save_session` calls (e.g. cookie merges from
//! parallel-fanout followers) can't interleave and leave a corrupt or
//! half-written file.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The subset of SessionState that is actually persisted: `user_agent`,
/// `cookies`, `domain`, `cookie_timestamp`, `from_webview`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedSession {
    pub user_agent: String,
    pub cookies: HashMap<String, String>,
    pub domain: String,
    pub cookie_timestamp: u64,
    pub from_webview: bool,
}

pub struct SessionStore {
    provider: String,
    base_dir: PathBuf,
}

impl SessionStore {
    /// `provider` namespaces the persisted files as
    /// `session_{provider}` / `domain_{provider}`.
    pub fn new(provider: impl Into<String>) -> Self {
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".shadowgate");
        Self {
            provider: provider.into(),
            base_dir,
        }
    }

    #[cfg(test)]
    pub fn with_base_dir(provider: impl Into<String>, base_dir: PathBuf) -> Self {
        Self {
            provider: provider.into(),
            base_dir,
        }
    }

    fn session_path(&self) -> PathBuf {
        self.base_dir.join(format!("session_{}.json", self.provider))
    }

    fn domain_path(&self) -> PathBuf {
        self.base_dir.join(format!("domain_{}.json", self.provider))
    }

    /// Returns `None` when no session was ever persisted, the file is
    /// missing/corrupt, or cookies are empty.
    pub fn load_session(&self) -> Option<PersistedSession> {
        let content = std::fs::read_to_string(self.session_path()).ok()?;
        let session: PersistedSession = serde_json::from_str(&content).ok()?;
        if session.cookies.is_empty() {
            return None;
        }
        Some(session)
    }

    /// Best-effort save — never fails the caller.
    pub fn save_session(&self, session: &PersistedSession) {
        self.write_json(&self.session_path(), session);
    }

    pub fn load_domain(&self) -> Option<String> {
        let content = std::fs::read_to_string(self.domain_path()).ok()?;
        let value: serde_json::Value = serde_json::from_str(&content).ok()?;
        value
            .get("domain")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    }

    pub fn save_domain(&self, domain: &str) {
        self.write_json(&self.domain_path(), &serde_json::json!({ "domain": domain }));
    }

    /// Remove the persisted session so the next call starts fresh.
    pub fn invalidate(&self) {
        let path = self.session_path();
        if path.exists() {
            if let Err(e) = std::fs::remove_file(&path) {
                warn!("session_store: failed to remove {}: {}", path.display(), e);
            }
        }
    }

    fn write_json<T: Serialize>(&self, path: &PathBuf, value: &T) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("session_store: failed to create {}: {}", parent.display(), e);
                return;
            }
        }

        let json = match serde_json::to_string_pretty(value) {
            Ok(s) => s,
            Err(e) => {
                warn!("session_store: serialization failed: {}", e);
                return;
            }
        };

        let lock_path = lock_path_for(path);
        let _guard = match OpenOptions::new().create(true).write(true).open(&lock_path) {
            Ok(lock_file) => match lock_file.lock_exclusive() {
                Ok(()) => Some(lock_file),
                Err(e) => {
                    warn!("session_store: failed to lock {}: {} — writing unlocked", lock_path.display(), e);
                    None
                }
            },
            Err(e) => {
                warn!("session_store: failed to open lock file {}: {} — writing unlocked", lock_path.display(), e);
                None
            }
        };

        let tmp = path.with_extension("tmp");
        if let Err(e) = std::fs::write(&tmp, &json) {
            warn!("session_store: failed to write {}: {}", tmp.display(), e);
            return;
        }
        if let Err(e) = std::fs::rename(&tmp, path) {
            warn!(
                "session_store: failed to rename {} -> {}: {}",
                tmp.display(),
                path.display(),
                e
            );
        }
        // `_guard`'s exclusive lock is released on drop, after the rename.
    }
}

/// Sidecar lock file path for `path` — `session_x.json` locks on
/// `session_x.json.lock`, so the json file itself is never opened for
/// locking (avoids fighting the rename with an open handle on Windows).
fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(name: &str) -> SessionStore {
        let dir = std::env::temp_dir().join(format!("shadowgate-test-{name}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        SessionStore::with_base_dir("testprovider", dir)
    }

    #[test]
    fn round_trip_save_then_load() {
        let store = temp_store("roundtrip");
        let mut cookies = HashMap::new();
        cookies.insert("cf_clearance".to_string(), "abc".to_string());
        let session = PersistedSession {
            user_agent: "UA/1".to_string(),
            cookies,
            domain: "example.test".to_string(),
            cookie_timestamp: 1000,
            from_webview: true,
        };
        store.save_session(&session);

        let loaded = store.load_session().expect("should load what was saved");
        assert_eq!(loaded.domain, "example.test");
        assert_eq!(loaded.cookies.get("cf_clearance").unwrap(), "abc");
    }

    #[test]
    fn load_missing_file_returns_none() {
        let store = temp_store("missing");
        assert!(store.load_session().is_none());
    }

    #[test]
    fn load_with_empty_cookies_returns_none() {
        let store = temp_store("empty-cookies");
        let session = PersistedSession {
            user_agent: "UA/1".to_string(),
            cookies: HashMap::new(),
            domain: "example.test".to_string(),
            cookie_timestamp: 0,
            from_webview: false,
        };
        store.save_session(&session);
        assert!(store.load_session().is_none());
    }

    #[test]
    fn domain_round_trip() {
        let store = temp_store("domain");
        store.save_domain("example.test");
        assert_eq!(store.load_domain(), Some("example.test".to_string()));
    }

    #[test]
    fn invalidate_removes_session_file() {
        let store = temp_store("invalidate");
        let mut cookies = HashMap::new();
        cookies.insert("a".to_string(), "b".to_string());
        store.save_session(&PersistedSession {
            user_agent: "UA".to_string(),
            cookies,
            domain: "example.test".to_string(),
            cookie_timestamp: 1,
            from_webview: false,
        });
        assert!(store.load_session().is_some());
        store.invalidate();
        assert!(store.load_session().is_none());
    }

    #[test]
    fn lock_path_is_a_sidecar_not_the_json_file_itself() {
        let json = PathBuf::from("/tmp/session_acme.json");
        let lock = lock_path_for(&json);
        assert_eq!(lock, PathBuf::from("/tmp/session_acme.json.lock"));
        assert_ne!(lock, json);
    }

    #[test]
    fn concurrent_saves_from_multiple_threads_never_corrupt_the_file() {
        let store = std::sync::Arc::new(temp_store("concurrent"));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    let mut cookies = HashMap::new();
                    cookies.insert("cf_clearance".to_string(), format!("writer-{i}"));
                    store.save_session(&PersistedSession {
                        user_agent: format!("UA/{i}"),
                        cookies,
                        domain: "example.test".to_string(),
                        cookie_timestamp: i as u64,
                        from_webview: false,
                    });
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        // Whichever writer landed last, the file must be a single complete,
        // parseable `PersistedSession` — never an interleaved half-write.
        let loaded = store.load_session().expect("one of the writers should have landed cleanly");
        assert!(loaded.user_agent.starts_with("UA/"));
    }
}
