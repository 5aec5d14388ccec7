//! Stealth JS injected at page-start.
//!
//! Kept close to verbatim from `scraping/rust_scraper/stealth.rs` — it
//! already matches the mandate ("defines a specific global the origin
//! expects ... spoofs navigator.platform when the UA is desktop").

/// Comprehensive environment-normalization script: navigator.webdriver,
/// languages, plugins, `chrome.runtime` stub, permissions.query override,
/// canvas/WebGL fingerprint noise, automation-marker cleanup, and
/// userAgentData override. `desktop` toggles the desktop-only spoof
/// fields (`platform="Win32"`, `maxTouchPoints=0`, `webdriver=false`).
pub fn universal_stealth_script(desktop: bool) -> String {
    let desktop_block = if desktop {
        r#"
try {
    Object.defineProperty(Navigator.prototype, 'platform', { get: () => 'Win32', configurable: true });
    Object.defineProperty(Navigator.prototype, 'maxTouchPoints', { get: () => 0, configurable: true });
    Object.defineProperty(Navigator.prototype, 'webdriver', { get: () => undefined, configurable: true });
    delete navigator.webdriver;
} catch (e) {}
"#
    } else {
        ""
    };

    format!(
        r#"
// ====== environment normalization ======
(() => {{
    try {{
        const proto = Navigator.prototype;
        try {{ Object.defineProperty(proto, 'languages', {{ get: () => ['en-US', 'en'], configurable: true }}); }} catch (e) {{}}
        try {{ Object.defineProperty(proto, 'plugins', {{ get: () => [1, 2, 3, 4, 5], configurable: true }}); }} catch (e) {{}}
    }} catch (e) {{}}
}})();
{desktop_block}

window.__shadowgate_ready = true;

if (!window.chrome) {{ window.chrome = {{}}; }}
if (!window.chrome.runtime) {{
    window.chrome.runtime = {{
        connect: function() {{ return {{ onDisconnect: {{ addListener: function() {{}} }} }}; }},
        sendMessage: function() {{}},
    }};
}}

const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {{
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications'
            ? Promise.resolve({{ state: Notification.permission }})
            : originalQuery(parameters)
    );
}}

{canvas}

delete window.__playwright;
delete window.__puppeteer;
delete window.__selenium;
delete window.callPhantom;
delete window._phantom;

if (navigator.userAgentData) {{
    Object.defineProperty(navigator, 'userAgentData', {{
        get: () => ({{
            brands: [
                {{ brand: 'Chromium', version: '131' }},
                {{ brand: 'Google Chrome', version: '131' }},
                {{ brand: 'Not_A Brand', version: '24' }}
            ],
            mobile: false,
            platform: 'Windows'
        }})
    }});
}}
"#,
        desktop_block = desktop_block,
        canvas = canvas_spoof_script(),
    )
}

/// Canvas/WebGL fingerprint-noise injection, kept as its own script since
/// the media-sniffer profile injects it without the rest of the
/// environment-normalization bundle.
pub fn canvas_spoof_script() -> String {
    r#"
const originalGetContext = HTMLCanvasElement.prototype.getContext;
HTMLCanvasElement.prototype.getContext = function(type, ...args) {
    const context = originalGetContext.apply(this, [type, ...args]);
    if ((type === '2d' || type === 'webgl' || type === 'webgl2') && context) {
        const originalToDataURL = this.toDataURL;
        this.toDataURL = function(...args) {
            const data = originalToDataURL.apply(this, args);
            return data.replace(/.$/, String.fromCharCode(Math.random() * 10 | 0));
        };
    }
    return context;
};

const getParameter = WebGLRenderingContext.prototype.getParameter;
WebGLRenderingContext.prototype.getParameter = function(parameter) {
    if (parameter === 37445) return 'Intel Inc.';
    if (parameter === 37446) return 'Intel Iris OpenGL Engine';
    return getParameter.apply(this, arguments);
};

if (typeof WebGL2RenderingContext !== 'undefined') {
    const getParameter2 = WebGL2RenderingContext.prototype.getParameter;
    WebGL2RenderingContext.prototype.getParameter = function(parameter) {
        if (parameter === 37445) return 'Intel Inc.';
        if (parameter === 37446) return 'Intel Iris OpenGL Engine';
        return getParameter2.apply(this, arguments);
    };
}
"#
    .to_string()
}

/// Periodic anti-ad/autoplay nudge run every second during media-sniffing
/// sessions.
pub fn anti_ad_script() -> String {
    r#"
document.querySelectorAll('video').forEach(v => { v.muted = false; if (v.paused) v.play().catch(() => {}); });
document.querySelectorAll('[id*="ad"], [class*="ad-"], [class*="popup"], [class*="overlay"]').forEach(el => {
    const style = window.getComputedStyle(el);
    if (style.position === 'fixed' && parseInt(style.zIndex || '0', 10) > 1000) {
        el.style.display = 'none';
    }
});
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_script_includes_platform_spoof() {
        let script = universal_stealth_script(true);
        assert!(script.contains("Win32"));
        assert!(script.contains("maxTouchPoints"));
        assert!(script.contains("'webdriver'"));
    }

    #[test]
    fn non_desktop_script_omits_platform_spoof() {
        let script = universal_stealth_script(false);
        assert!(!script.contains("Win32"));
        assert!(!script.contains("maxTouchPoints"));
        assert!(!script.contains("'webdriver'"));
        assert!(!script.contains("navigator.webdriver"));
    }

    #[test]
    fn non_desktop_script_still_spoofs_languages_and_plugins() {
        let script = universal_stealth_script(false);
        assert!(script.contains("'languages'"));
        assert!(script.contains("'plugins'"));
    }

    #[test]
    fn canvas_spoof_masks_swiftshader() {
        let script = canvas_spoof_script();
        assert!(script.contains("Intel Inc."));
        assert!(script.contains("Intel Iris OpenGL Engine"));
    }
}
