//! Chrome/Chromium/Brave discovery and launch-config construction.
//!
//! Grounded almost verbatim on `scraping/browser_manager.rs`: the same
//! env-var-override -> PATH-scan -> OS-specific-paths resolution order and
//! the same stealth launch-flag set, generalized to take an explicit
//! [`BrowserMode`] and User-Agent instead of being hardcoded to a single
//! desktop/mobile profile.

use std::path::Path;

use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserMode {
    Headless,
    Visible,
}

/// Resolution order: `SHADOWGATE_CHROME_EXECUTABLE` env var, then a PATH
/// scan, then OS-specific well-known install locations.
pub fn find_chrome_executable() -> Option<String> {
    if let Ok(p) = std::env::var("SHADOWGATE_CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = [
            "brave-browser",
            "brave",
            "google-chrome",
            "chromium",
            "chromium-browser",
            "chrome",
        ];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/brave-browser",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/bin/google-chrome",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

pub fn native_browser_available() -> bool {
    find_chrome_executable().is_some()
}

/// Build a `BrowserConfig` for the given mode. Headless and Visible use
/// the same stealth flag set; chromiumoxide defaults to headless, so
/// Visible explicitly calls `.with_head()` to actually show a window
/// (`--no-sandbox` is headless-only — a visible, unsandboxed browser is a
/// local-display-only assumption this crate doesn't make).
pub fn build_launch_config(
    mode: BrowserMode,
    user_agent: &str,
    proxy_url: Option<&str>,
) -> Result<BrowserConfig> {
    let exe = find_chrome_executable()
        .ok_or_else(|| anyhow!("no Chrome/Chromium/Brave executable found; set SHADOWGATE_CHROME_EXECUTABLE"))?;

    let mut builder = BrowserConfig::builder()
        .chrome_executable(&exe)
        .viewport(Viewport {
            width: 1280,
            height: 900,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(1280, 900)
        .arg("--disable-gpu")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-blink-features=AutomationControlled")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-translate")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg(format!("--user-agent={user_agent}"));

    if mode == BrowserMode::Headless {
        builder = builder.arg("--no-sandbox");
    } else {
        builder = builder.with_head();
    }

    if let Some(proxy) = proxy_url {
        builder = builder.arg(format!("--proxy-server={proxy}"));
    }

    builder
        .build()
        .map_err(|e| anyhow!("failed to build browser config: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn native_browser_available_is_a_pure_query() {
        // Just exercises the code path; presence of a real browser is
        // environment-dependent so we don't assert a specific value.
        let _ = native_browser_available();
    }
}
