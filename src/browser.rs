use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::types::PrintToPdfOptions;
use base64::Engine as _;
use thiserror::Error;
use crate::request::{ConversionRequest, Length, RequestError};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Error, Debug)]
pub enum BrowserError {
    #[error("ChromeError: {0}")]
    ChromeError(#[from] anyhow::Error),
    #[error("Can't launch browser: {0}")]
    LaunchError(String),
    #[error("Browser was already closed")]
    Closed,
    #[error("Page did not reach network idle within {0:?}")]
    NetworkIdleTimeout(Duration),
}

pub type Result<T> = std::result::Result<T, BrowserError>;

/// Something that can start a browser process.
pub trait Engine {
    type Browser: BrowserHandle;

    fn launch(&self) -> Result<Self::Browser>;
}

pub trait BrowserHandle {
    type Page: PageHandle;

    fn new_page(&self) -> Result<Self::Page>;

    fn close(self) -> Result<()>;
}

pub trait PageHandle {
    /// Replaces the page document with `html` and blocks until the page is network idle.
    fn set_content(&self, html: &str, idle: &NetworkIdle) -> Result<()>;

    fn pdf(&self, options: &PdfOptions) -> Result<Vec<u8>>;
}

/// Owns a launched browser and closes it when dropped.
pub struct BrowserGuard<B: BrowserHandle> {
    browser: Option<B>,
}

impl<B: BrowserHandle> BrowserGuard<B> {
    pub fn new(browser: B) -> Self {
        Self { browser: Some(browser) }
    }

    pub fn new_page(&self) -> Result<B::Page> {
        self.browser.as_ref().ok_or(BrowserError::Closed)?.new_page()
    }

    pub fn close(mut self) -> Result<()> {
        match self.browser.take() {
            Some(browser) => browser.close(),
            None => Ok(()),
        }
    }
}

impl<B: BrowserHandle> Drop for BrowserGuard<B> {
    fn drop(&mut self) {
        if let Some(browser) = self.browser.take() {
            log::debug!("Closing browser on early exit");
            if let Err(e) = browser.close() {
                log::warn!("Failed to close browser: {}", e);
            }
        }
    }
}

/// Print parameters in inches, the unit the DevTools protocol expects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfOptions {
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin_top: f64,
    pub margin_right: f64,
    pub margin_bottom: f64,
    pub margin_left: f64,
    pub print_background: bool,
}

impl TryFrom<&ConversionRequest> for PdfOptions {
    type Error = RequestError;

    fn try_from(request: &ConversionRequest) -> std::result::Result<Self, RequestError> {
        let (paper_width, paper_height) = request.format.size_inches();
        let margin = |text: &str| text.parse::<Length>().map(|l| l.inches());

        Ok(Self {
            paper_width,
            paper_height,
            margin_top: margin(&request.margins.top)?,
            margin_right: margin(&request.margins.right)?,
            margin_bottom: margin(&request.margins.bottom)?,
            margin_left: margin(&request.margins.left)?,
            print_background: true,
        })
    }
}

/// How long a page may take to go network idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkIdle {
    pub timeout: Duration,
}

impl NetworkIdle {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for NetworkIdle {
    fn default() -> Self {
        Self::with_timeout(Duration::from_secs(30))
    }
}

/// Follows the main frame's lifecycle events.
///
/// Every new document starts with `init`; Chromium emits `networkIdle` once
/// that document has had no request in flight for 500 ms.
#[derive(Debug)]
pub struct IdleTracker {
    main_frame: String,
    loading: bool,
    idle: bool,
}

impl IdleTracker {
    pub fn new(main_frame: impl Into<String>) -> Self {
        Self { main_frame: main_frame.into(), loading: false, idle: false }
    }

    pub fn observe(&mut self, frame_id: &str, name: &str) {
        if frame_id != self.main_frame {
            return;
        }

        match name {
            "init" => {
                self.loading = true;
                self.idle = false;
            }
            "networkIdle" if self.loading => self.idle = true,
            _ => {}
        }
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }
}

/// Tracker shared with the DevTools event thread, signalled on every change.
pub type IdleWatch = (Mutex<IdleTracker>, Condvar);

pub fn wait_for_network_idle(watch: &IdleWatch, idle: &NetworkIdle, started: Instant) -> Result<()> {
    let (tracker, changed) = watch;
    let remaining = idle.timeout.saturating_sub(started.elapsed());

    let tracker = tracker.lock().unwrap_or_else(PoisonError::into_inner);
    let (tracker, _) = changed
        .wait_timeout_while(tracker, remaining, |t| !t.is_idle())
        .unwrap_or_else(PoisonError::into_inner);

    if !tracker.is_idle() {
        return Err(BrowserError::NetworkIdleTimeout(idle.timeout));
    }

    log::debug!("Network idle after {:?}", started.elapsed());
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    pub chrome: Option<PathBuf>,
    pub sandbox: bool,
    pub timeout: Duration,
}

impl LaunchConfig {
    /// The DevTools connection must outlive the longest single wait we do.
    pub fn connection_timeout(&self) -> Duration {
        self.timeout.saturating_add(Duration::from_secs(30))
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            chrome: None,
            sandbox: true,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Headless Chromium through the DevTools protocol.
#[derive(Debug, Clone, Default)]
pub struct ChromeEngine {
    config: LaunchConfig,
}

impl ChromeEngine {
    pub fn new(config: LaunchConfig) -> Self {
        Self { config }
    }
}

impl Engine for ChromeEngine {
    type Browser = Browser;

    fn launch(&self) -> Result<Browser> {
        Browser::new(&self.config)
    }
}

pub struct Browser {
    inner: headless_chrome::Browser,
    timeout: Duration,
}

impl Browser {
    pub fn new(config: &LaunchConfig) -> Result<Self> {
        let options = headless_chrome::LaunchOptions::default_builder()
            .headless(true)
            .sandbox(config.sandbox)
            .path(config.chrome.clone())
            .idle_browser_timeout(config.connection_timeout())
            .build()
            .map_err(|e| BrowserError::LaunchError(e.to_string()))?;

        let inner = headless_chrome::Browser::new(options)?;

        Ok(Self { inner, timeout: config.timeout })
    }
}

impl BrowserHandle for Browser {
    type Page = WebPage;

    fn new_page(&self) -> Result<WebPage> {
        let tab = self.inner.new_tab()?;
        tab.set_default_timeout(self.timeout);
        Ok(WebPage::from_tab(tab))
    }

    fn close(self) -> Result<()> {
        // dropping the handle kills the Chromium process
        drop(self.inner);
        Ok(())
    }
}

pub struct WebPage (Arc<headless_chrome::Tab>);

impl WebPage {
    pub fn from_tab(tab: Arc<headless_chrome::Tab>) -> Self {
        Self(tab)
    }

    fn data_url(html: &str) -> String {
        let encoded = base64::engine::general_purpose::STANDARD.encode(html);
        format!("data:text/html;charset=utf-8;base64,{}", encoded)
    }

    fn load(&self, html: &str) -> Result<()> {
        self.0.navigate_to(&Self::data_url(html))?.wait_until_navigated()?;
        Ok(())
    }
}

impl PageHandle for WebPage {
    fn set_content(&self, html: &str, idle: &NetworkIdle) -> Result<()> {
        let started = Instant::now();
        // page targets share their id with their main frame
        let tracker = IdleTracker::new(self.0.get_target_id().clone());
        let watch: Arc<IdleWatch> = Arc::new((Mutex::new(tracker), Condvar::new()));

        let listener = {
            let watch = Arc::clone(&watch);
            self.0.add_event_listener(Arc::new(move |event: &Event| {
                if let Event::PageLifecycleEvent(lifecycle) = event {
                    let (tracker, changed) = &*watch;
                    let mut tracker = tracker.lock().unwrap_or_else(PoisonError::into_inner);
                    log::trace!("Lifecycle event {} on frame {}", lifecycle.params.name, lifecycle.params.frame_id);
                    tracker.observe(&lifecycle.params.frame_id, &lifecycle.params.name);
                    changed.notify_all();
                }
            }))?
        };

        let outcome = self
            .load(html)
            .and_then(|()| wait_for_network_idle(&watch, idle, started));

        if let Err(e) = self.0.remove_event_listener(&listener) {
            log::warn!("Failed to remove lifecycle listener: {}", e);
        }

        outcome
    }

    fn pdf(&self, options: &PdfOptions) -> Result<Vec<u8>> {
        let options = PrintToPdfOptions {
            print_background: Some(options.print_background),
            paper_width: Some(options.paper_width),
            paper_height: Some(options.paper_height),
            margin_top: Some(options.margin_top),
            margin_right: Some(options.margin_right),
            margin_bottom: Some(options.margin_bottom),
            margin_left: Some(options.margin_left),
            ..Default::default()
        };

        Ok(self.0.print_to_pdf(Some(options))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Margins, PaperFormat};
    use std::thread;

    const MAIN: &str = "A1B2C3";

    fn watch() -> Arc<IdleWatch> {
        Arc::new((Mutex::new(IdleTracker::new(MAIN)), Condvar::new()))
    }

    fn emit(watch: &IdleWatch, frame: &str, name: &str) {
        let (tracker, changed) = watch;
        tracker.lock().unwrap().observe(frame, name);
        changed.notify_all();
    }

    #[test]
    fn test_options_from_default_request() {
        let options = PdfOptions::try_from(&ConversionRequest::new("<p></p>")).unwrap();

        assert_eq!((options.paper_width, options.paper_height), (8.27, 11.7));
        assert!((options.margin_top - 2.0 * 37.8 / 96.0).abs() < 1e-9);
        assert!((options.margin_right - 37.8 / 96.0).abs() < 1e-9);
        assert_eq!(options.margin_top, options.margin_bottom);
        assert_eq!(options.margin_right, options.margin_left);
        assert!(options.print_background);
    }

    #[test]
    fn test_options_reject_bad_margin() {
        let mut request = ConversionRequest::new("<p></p>");
        request.format = PaperFormat::Letter;
        request.margins = Margins { left: "wide".to_string(), ..Margins::default() };

        let err = PdfOptions::try_from(&request).unwrap_err();
        assert_eq!(err, RequestError::InvalidLength("wide".to_string()));
    }

    #[test]
    fn test_data_url_is_base64() {
        let url = WebPage::data_url("<h1>é</h1>");
        assert_eq!(url, "data:text/html;charset=utf-8;base64,PGgxPsOpPC9oMT4=");
    }

    #[test]
    fn test_idle_needs_network_idle_event() {
        let mut tracker = IdleTracker::new(MAIN);

        tracker.observe(MAIN, "init");
        for name in ["DOMContentLoaded", "load", "networkAlmostIdle", "firstPaint"] {
            tracker.observe(MAIN, name);
            assert!(!tracker.is_idle(), "{name} is not network idle");
        }

        tracker.observe(MAIN, "networkIdle");
        assert!(tracker.is_idle());
    }

    #[test]
    fn test_idle_from_previous_document_is_ignored() {
        let mut tracker = IdleTracker::new(MAIN);

        tracker.observe(MAIN, "networkIdle");
        assert!(!tracker.is_idle());

        tracker.observe(MAIN, "init");
        tracker.observe(MAIN, "networkIdle");
        tracker.observe(MAIN, "init");
        assert!(!tracker.is_idle());
    }

    #[test]
    fn test_child_frames_are_ignored() {
        let mut tracker = IdleTracker::new(MAIN);

        tracker.observe(MAIN, "init");
        tracker.observe("IFRAME", "networkIdle");
        assert!(!tracker.is_idle());
    }

    #[test]
    fn test_wait_returns_once_idle_is_signalled() {
        let watch = watch();
        let signaller = {
            let watch = Arc::clone(&watch);
            thread::spawn(move || {
                emit(&watch, MAIN, "init");
                thread::sleep(Duration::from_millis(20));
                emit(&watch, MAIN, "networkIdle");
            })
        };

        let idle = NetworkIdle::with_timeout(Duration::from_secs(10));
        wait_for_network_idle(&watch, &idle, Instant::now()).unwrap();
        signaller.join().unwrap();
    }

    #[test]
    fn test_request_still_in_flight_times_out() {
        // `load` fired but no networkIdle, as when a fetch never settles
        let watch = watch();
        emit(&watch, MAIN, "init");
        emit(&watch, MAIN, "load");

        let idle = NetworkIdle::with_timeout(Duration::from_millis(50));
        let err = wait_for_network_idle(&watch, &idle, Instant::now()).unwrap_err();

        assert!(matches!(err, BrowserError::NetworkIdleTimeout(t) if t == Duration::from_millis(50)));
    }

    #[test]
    fn test_connection_timeout_saturates() {
        let config = LaunchConfig { timeout: Duration::MAX, ..LaunchConfig::default() };
        assert_eq!(config.connection_timeout(), Duration::MAX);
        assert_eq!(LaunchConfig::default().connection_timeout(), Duration::from_secs(60));
    }

    #[test]
    #[ignore = "needs a local Chromium"]
    fn test_chrome_renders_pdf() {
        let engine = ChromeEngine::default();
        let browser = engine.launch().unwrap();
        let page = browser.new_page().unwrap();

        page.set_content("<h1>Hello</h1>", &NetworkIdle::default()).unwrap();
        let options = PdfOptions::try_from(&ConversionRequest::new("")).unwrap();
        let pdf = page.pdf(&options).unwrap();

        assert!(pdf.starts_with(b"%PDF-"));
        browser.close().unwrap();
    }
}
