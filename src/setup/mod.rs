//! Preflight checks the embedding application can run before constructing
//! a [`crate::Gateway`]: is a Chrome-family browser discoverable (needed
//! for `solveChallenge`/`sniffMedia`), is the persistence directory
//! writable, can we actually complete a TLS handshake out to the public
//! internet.
//!
//! Grounded on `setup/mod.rs` (`check_chrome_installed`,
//! `check_storage_dirs`, `check_https_tls`), trimmed of the port-conflict
//! check (this crate runs no HTTP server of its own) and the OS-specific
//! accessibility-permission dialogs (`setup/os/*`) — there is no desktop
//! HITL flow here, just a library precondition check.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::gateway::launch::find_chrome_executable;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl CheckStatus {
    pub fn is_fail(self) -> bool {
        matches!(self, CheckStatus::Fail)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SetupCheck {
    pub id: String,
    pub title: String,
    pub status: CheckStatus,
    pub details: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SetupReport {
    pub checks: Vec<SetupCheck>,
}

impl SetupReport {
    pub fn has_failures(&self) -> bool {
        self.checks.iter().any(|c| c.status.is_fail())
    }

    pub fn summarize_for_logs(&self) -> String {
        let (mut pass, mut warn, mut fail) = (0, 0, 0);
        for c in &self.checks {
            match c.status {
                CheckStatus::Pass => pass += 1,
                CheckStatus::Warn => warn += 1,
                CheckStatus::Fail => fail += 1,
            }
        }
        format!("setup: {pass} pass, {warn} warn, {fail} fail")
    }
}

impl std::fmt::Display for SetupReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "shadowgate preflight")?;
        writeln!(f, "{}", "=".repeat(21))?;
        for c in &self.checks {
            writeln!(
                f,
                "[{:<4}] {}\n  {}",
                match c.status {
                    CheckStatus::Pass => "OK",
                    CheckStatus::Warn => "WARN",
                    CheckStatus::Fail => "FAIL",
                },
                c.title,
                c.details.replace('\n', "\n  ")
            )?;
        }
        Ok(())
    }
}

/// Run every preflight check. None of these block a running Gateway —
/// `browserEnabled=false` lets a caller skip the browser entirely, and a
/// failed storage check just means persistence degrades to in-memory.
pub async fn check_all(provider: &str, https_probe_url: &str) -> SetupReport {
    SetupReport {
        checks: vec![
            check_chrome_installed(),
            check_storage_dir(provider),
            check_https_tls(https_probe_url).await,
        ],
    }
}

fn check_chrome_installed() -> SetupCheck {
    match find_chrome_executable() {
        Some(path) => SetupCheck {
            id: "chrome_installed".to_string(),
            title: "Browser dependency (Brave/Chrome/Chromium)".to_string(),
            status: CheckStatus::Pass,
            details: format!("Found: {path}"),
        },
        None => SetupCheck {
            id: "chrome_installed".to_string(),
            title: "Browser dependency (Brave/Chrome/Chromium)".to_string(),
            status: CheckStatus::Fail,
            details: "No Brave/Chrome/Chromium executable found on PATH or in common install \
                      locations; set SHADOWGATE_CHROME_EXECUTABLE, or configure \
                      browserEnabled=false to run without challenge-solving."
                .to_string(),
        },
    }
}

fn check_storage_dir(provider: &str) -> SetupCheck {
    let Some(home) = dirs::home_dir() else {
        return SetupCheck {
            id: "storage_dir".to_string(),
            title: "Storage access (~/.shadowgate)".to_string(),
            status: CheckStatus::Fail,
            details: "Unable to resolve home directory; set HOME and retry.".to_string(),
        };
    };

    let base: PathBuf = home.join(".shadowgate");
    if let Err(e) = std::fs::create_dir_all(&base) {
        return SetupCheck {
            id: "storage_dir".to_string(),
            title: "Storage access (~/.shadowgate)".to_string(),
            status: CheckStatus::Fail,
            details: format!("Failed to create {}: {}", base.display(), e),
        };
    }

    let probe = base.join(format!(".write_test_{provider}"));
    if let Err(e) = std::fs::write(&probe, b"ok") {
        return SetupCheck {
            id: "storage_dir".to_string(),
            title: "Storage access (~/.shadowgate)".to_string(),
            status: CheckStatus::Fail,
            details: format!("Directory not writable: {} ({})", base.display(), e),
        };
    }
    let _ = std::fs::remove_file(&probe);

    SetupCheck {
        id: "storage_dir".to_string(),
        title: "Storage access (~/.shadowgate)".to_string(),
        status: CheckStatus::Pass,
        details: format!("Writable: {}", base.display()),
    }
}

async fn check_https_tls(url: &str) -> SetupCheck {
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
    {
        Ok(c) => c,
        Err(e) => {
            return SetupCheck {
                id: "https_tls".to_string(),
                title: "HTTPS / certificate store".to_string(),
                status: CheckStatus::Warn,
                details: format!("Failed to construct HTTP client: {e}"),
            };
        }
    };

    match client.get(url).send().await {
        Ok(resp) => SetupCheck {
            id: "https_tls".to_string(),
            title: "HTTPS / certificate store".to_string(),
            status: if resp.status().is_success() {
                CheckStatus::Pass
            } else {
                CheckStatus::Warn
            },
            details: format!("HTTPS probe {} returned status {}.", url, resp.status()),
        },
        Err(e) => SetupCheck {
            id: "https_tls".to_string(),
            title: "HTTPS / certificate store".to_string(),
            status: CheckStatus::Fail,
            details: format!(
                "HTTPS probe failed (possible trust store or connectivity issue): {e}"
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn storage_check_creates_and_verifies_writable_dir() {
        let check = check_storage_dir("setup-test-provider");
        assert_eq!(check.status, CheckStatus::Pass);
    }

    #[test]
    fn report_has_failures_detects_any_fail() {
        let report = SetupReport {
            checks: vec![SetupCheck {
                id: "x".to_string(),
                title: "x".to_string(),
                status: CheckStatus::Fail,
                details: String::new(),
            }],
        };
        assert!(report.has_failures());
    }
}
