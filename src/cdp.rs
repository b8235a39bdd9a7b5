//! Chrome DevTools Protocol backend
//!
//! Launches Chromium through `headless_chrome`, loads mermaid into a blank
//! page and drives the DOM with `Runtime.evaluate`. Captures use
//! `Page.captureScreenshot` on the same tab.

use crate::job::Settings;
use crate::surface::{ContainerId, Document, Host, Surface, SurfaceOptions};
use crate::{Error, Result};
use headless_chrome::browser::tab::Tab;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, info};
use serde_json::Value;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default location of the mermaid bundle
pub const DEFAULT_MERMAID_URL: &str = "https://cdn.jsdelivr.net/npm/mermaid@10/dist/mermaid.min.js";

const DEVTOOLS_FLAG: &str = "--auto-open-devtools-for-tabs";

// Keep the websocket open for long layouts and for diagnostic sessions.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

const LINGER_POLL: Duration = Duration::from_millis(500);

/// Where the page loads mermaid from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MermaidSource {
    /// `<script src>` injected into the page
    Url(String),
    /// Local bundle evaluated directly in the page
    File(PathBuf),
}

impl MermaidSource {
    /// Interpret a CLI argument: anything with a URL scheme is fetched,
    /// everything else is a file path.
    pub fn parse(value: &str) -> Self {
        if value.starts_with("http://") || value.starts_with("https://") || value.starts_with("file://") {
            MermaidSource::Url(value.to_string())
        } else {
            MermaidSource::File(PathBuf::from(value))
        }
    }
}

impl Default for MermaidSource {
    fn default() -> Self {
        MermaidSource::Url(DEFAULT_MERMAID_URL.to_string())
    }
}

/// Browser-specific settings for [`CdpHost`]
#[derive(Debug, Clone)]
pub struct CdpOptions {
    pub mermaid: MermaidSource,
    /// Chrome/Chromium executable; auto-detected when `None`
    pub chrome_path: Option<PathBuf>,
}

impl Default for CdpOptions {
    fn default() -> Self {
        Self {
            mermaid: MermaidSource::default(),
            chrome_path: None,
        }
    }
}

/// Creates one Chromium instance per surface
pub struct CdpHost {
    options: CdpOptions,
}

impl CdpHost {
    pub fn new(options: CdpOptions) -> Self {
        Self { options }
    }
}

impl Host for CdpHost {
    type Surface = CdpSurface;

    fn create_surface(&self, options: &SurfaceOptions) -> Result<CdpSurface> {
        let args: Vec<&OsStr> = if options.diagnostic {
            vec![OsStr::new(DEVTOOLS_FLAG)]
        } else {
            Vec::new()
        };

        let launch_options = LaunchOptions::default_builder()
            .headless(!options.diagnostic)
            .window_size(Some((options.width, options.height)))
            .path(self.options.chrome_path.clone())
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .args(args)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;

        tab.navigate_to("about:blank")
            .map_err(|e| Error::InitializationError(format!("Navigation failed: {}", e)))?;
        tab.wait_until_navigated()
            .map_err(|e| Error::InitializationError(format!("Wait for navigation failed: {}", e)))?;

        eval_guarded(&tab, BOOTSTRAP_BODY, Error::InitializationError)?;
        load_mermaid(&tab, &self.options.mermaid)?;
        info!("surface ready ({}x{}, diagnostic: {})", options.width, options.height, options.diagnostic);

        Ok(CdpSurface { browser, tab })
    }
}

fn load_mermaid(tab: &Tab, source: &MermaidSource) -> Result<()> {
    match source {
        MermaidSource::File(path) => {
            let bundle = std::fs::read_to_string(path).map_err(|e| {
                Error::InitializationError(format!("Failed to read mermaid bundle {}: {}", path.display(), e))
            })?;
            tab.evaluate(&bundle, false)
                .map_err(|e| Error::InitializationError(format!("Failed to evaluate mermaid bundle: {}", e)))?;
        }
        MermaidSource::Url(url) => {
            let script = LOAD_SCRIPT_TEMPLATE.replace("{{URL}}", &js_string(url));
            let loaded = tab
                .evaluate(&script, true)
                .map_err(|e| Error::InitializationError(format!("Failed to load mermaid: {}", e)))?;
            if let Some(Value::String(problem)) = loaded.value {
                if !problem.is_empty() {
                    return Err(Error::InitializationError(problem));
                }
            }
        }
    }

    let available = eval_guarded(tab, MERMAID_PRESENT_BODY, Error::InitializationError)?;
    if available != Value::Bool(true) {
        return Err(Error::InitializationError("mermaid is not defined after loading the bundle".into()));
    }
    debug!("mermaid loaded from {:?}", source);
    Ok(())
}

/// A Chromium tab sized to the job width
pub struct CdpSurface {
    browser: Browser,
    tab: Arc<Tab>,
}

impl Surface for CdpSurface {
    type Document = CdpDocument;

    fn content_width(&self) -> Result<u32> {
        let width = eval_guarded(&self.tab, "return document.documentElement.clientWidth;", Error::SurfaceError)?;
        width
            .as_f64()
            .map(|w| w.round() as u32)
            .ok_or_else(|| Error::SurfaceError(format!("unexpected content width {}", width)))
    }

    fn document(&self) -> Result<CdpDocument> {
        Ok(CdpDocument {
            tab: self.tab.clone(),
            next_id: 0,
        })
    }

    fn capture_png(&self) -> Result<Vec<u8>> {
        self.tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(|e| Error::SurfaceError(format!("Screenshot failed: {}", e)))
    }

    fn linger(&self) -> Result<()> {
        info!("diagnostic mode: close the browser window to exit");
        while self.browser.get_version().is_ok() {
            std::thread::sleep(LINGER_POLL);
        }
        Ok(())
    }
}

/// The page DOM as seen by the renderer
pub struct CdpDocument {
    tab: Arc<Tab>,
    next_id: u64,
}

impl CdpDocument {
    fn container_script(&self, template: &str, id: ContainerId) -> String {
        template.replace("{{ID}}", &js_string(&id.dom_id()))
    }
}

impl Document for CdpDocument {
    fn set_zoom(&mut self, zoom: f64) -> Result<()> {
        let body = format!("document.body.style.zoom = '{}'; return true;", zoom);
        eval_guarded(&self.tab, &body, Error::SurfaceError).map(|_| ())
    }

    fn inject(&mut self, code: &str) -> Result<ContainerId> {
        let id = ContainerId(self.next_id);
        self.next_id += 1;
        let body = self
            .container_script(INJECT_BODY, id)
            .replace("{{CODE}}", &js_string(code));
        eval_guarded(&self.tab, &body, Error::SurfaceError)?;
        Ok(id)
    }

    fn configure(&mut self, settings: &Settings) -> Result<()> {
        let body = CONFIGURE_BODY.replace("{{SETTINGS}}", &Value::Object(settings.clone()).to_string());
        eval_guarded(&self.tab, &body, Error::RenderError).map(|_| ())
    }

    fn run_layout(&mut self, id: ContainerId) -> Result<()> {
        let body = self.container_script(RUN_LAYOUT_BODY, id);
        eval_guarded(&self.tab, &body, Error::RenderError).map(|_| ())
    }

    fn is_processed(&mut self, id: ContainerId) -> Result<bool> {
        let body = self.container_script(IS_PROCESSED_BODY, id);
        let processed = eval_guarded(&self.tab, &body, Error::RenderError)?;
        Ok(processed == Value::Bool(true))
    }

    fn apply_max_width(&mut self, id: ContainerId, max_width: u32) -> Result<()> {
        let body = self
            .container_script(MAX_WIDTH_BODY, id)
            .replace("{{PX}}", &max_width.to_string());
        eval_guarded(&self.tab, &body, Error::SurfaceError).map(|_| ())
    }

    fn remove(&mut self, id: ContainerId) -> Result<()> {
        let body = self.container_script(REMOVE_BODY, id);
        eval_guarded(&self.tab, &body, Error::SurfaceError).map(|_| ())
    }
}

/// Encode `s` as a JavaScript string literal.
fn js_string(s: &str) -> String {
    Value::String(s.to_string()).to_string()
}

/// Run `body` inside a function, turning a thrown exception into `on_throw`.
///
/// The page returns a JSON string `{ok: value}` or `{error: message}`; this
/// keeps exception text intact regardless of how the protocol reports it.
fn eval_guarded(tab: &Tab, body: &str, on_throw: fn(String) -> Error) -> Result<Value> {
    let script = GUARD_TEMPLATE.replace("{{BODY}}", body);
    let remote = tab.evaluate(&script, false)?;

    let raw = match remote.value {
        Some(Value::String(s)) => s,
        other => return Err(Error::SurfaceError(format!("unexpected evaluation result {:?}", other))),
    };
    let mut parsed: Value = serde_json::from_str(&raw)
        .map_err(|e| Error::SurfaceError(format!("unparseable evaluation result: {}", e)))?;

    if let Some(message) = parsed.get("error") {
        let message = message.as_str().map(|s| s.to_string()).unwrap_or_else(|| message.to_string());
        return Err(on_throw(message));
    }
    Ok(parsed.get_mut("ok").map(Value::take).unwrap_or(Value::Null))
}

const GUARD_TEMPLATE: &str = r#"(function () {
    try {
        var r = (function () { {{BODY}} })();
        return JSON.stringify({ ok: r === undefined ? null : r });
    } catch (e) {
        return JSON.stringify({ error: String((e && e.message) || e) });
    }
})()"#;

const BOOTSTRAP_BODY: &str = r#"
    document.documentElement.style.background = 'white';
    document.body.style.margin = '0';
    window.__mmdSnap = { errors: {} };
    return true;
"#;

const LOAD_SCRIPT_TEMPLATE: &str = r#"new Promise(function (resolve) {
    var s = document.createElement('script');
    s.src = {{URL}};
    s.onload = function () { resolve(''); };
    s.onerror = function () { resolve('failed to load ' + s.src); };
    document.head.appendChild(s);
})"#;

const MERMAID_PRESENT_BODY: &str = r#"
    if (typeof window.mermaid !== 'object' || typeof window.mermaid.run !== 'function') return false;
    window.mermaid.initialize({ startOnLoad: false });
    return true;
"#;

const INJECT_BODY: &str = r#"
    var el = document.createElement('div');
    el.id = {{ID}};
    el.className = 'mermaid';
    el.textContent = {{CODE}};
    document.body.appendChild(el);
    return true;
"#;

const CONFIGURE_BODY: &str = r#"
    window.mermaid.initialize(Object.assign({}, {{SETTINGS}}, { startOnLoad: false }));
    return true;
"#;

const RUN_LAYOUT_BODY: &str = r#"
    var id = {{ID}};
    var el = document.getElementById(id);
    if (!el) throw new Error('missing container ' + id);
    var p = window.mermaid.run({ nodes: [el] });
    if (p && typeof p.catch === 'function') {
        p.catch(function (e) { window.__mmdSnap.errors[id] = String((e && e.message) || e); });
    }
    return true;
"#;

const IS_PROCESSED_BODY: &str = r#"
    var id = {{ID}};
    var failure = window.__mmdSnap.errors[id];
    if (failure) throw new Error(failure);
    var el = document.getElementById(id);
    if (!el) throw new Error('missing container ' + id);
    return el.getAttribute('data-processed') === 'true' && el.querySelector('svg') !== null;
"#;

const MAX_WIDTH_BODY: &str = r#"
    var el = document.getElementById({{ID}});
    if (!el) throw new Error('missing container');
    el.style.maxWidth = '{{PX}}px';
    return true;
"#;

const REMOVE_BODY: &str = r#"
    var el = document.getElementById({{ID}});
    if (el) el.remove();
    return true;
"#;
