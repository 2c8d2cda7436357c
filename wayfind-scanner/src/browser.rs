//! Headless Chrome page driver.
//!
//! Owns one Chrome process and one tab. Runtime events (console calls, log
//! entries, uncaught exceptions, network responses and main-frame
//! navigations) are collected by background listeners into a shared buffer
//! that the traversal drains at step boundaries.

use crate::driver::{
    ConsoleLevel, DiscoveryScope, ElementSnapshot, Location, Observation, PageDriver, ReadyState,
    SessionCookie, ToggleOutcome,
};
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::log::{self, EventEntryAdded, LogEntryLevel};
use chromiumoxide::cdp::browser_protocol::network::{self, CookieParam, EventResponseReceived};
use chromiumoxide::cdp::browser_protocol::page::EventFrameNavigated;
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};
use url::Url;

const TOGGLE_SCRIPT: &str = r#"(() => {
  const selectors = [
    '[data-test="nav-mobile-menu"]',
    '[aria-label="Open menu"]',
    'button[aria-expanded="false"]',
    '[role="button"][aria-expanded="false"]',
  ];
  const done = new Set();
  let opened = 0;
  for (const sel of selectors) {
    for (const el of document.querySelectorAll(sel)) {
      if (done.has(el)) continue;
      done.add(el);
      const r = el.getBoundingClientRect();
      const st = getComputedStyle(el);
      if (r.width === 0 || r.height === 0 || st.visibility === 'hidden' || st.display === 'none') continue;
      if (el.getAttribute('aria-expanded') === 'true') continue;
      try { el.click(); opened++; } catch (e) {}
    }
  }
  return opened;
})()"#;

const SNAPSHOT_SCRIPT: &str = r#"(() => {
  const navCandidates = 'a[href], [role="menuitem"], [role="menuitemcheckbox"], [role="menuitemradio"], button, [role="button"], select';
  const groups = [
    ['nav, [role="navigation"]', 'nav', navCandidates],
    ['aside', 'aside', navCandidates],
  ];
  if (__INCLUDE_MAIN__) groups.push(['main, [role="main"]', 'main', 'a[href]']);
  const seen = new Set();
  const found = [];
  const out = [];
  for (const [containerSel, kind, sel] of groups) {
    for (const c of document.querySelectorAll(containerSel)) {
      for (const el of c.querySelectorAll(sel)) {
        if (seen.has(el)) continue;
        seen.add(el);
        const r = el.getBoundingClientRect();
        const st = getComputedStyle(el);
        out.push({
          handle: found.length,
          tag: el.tagName.toLowerCase(),
          role: el.getAttribute('role'),
          ariaLabel: el.getAttribute('aria-label'),
          title: el.getAttribute('title'),
          text: el.innerText || el.textContent || '',
          href: el.tagName === 'A' ? el.getAttribute('href') : null,
          dataTest: el.getAttribute('data-test'),
          dataTestId: el.getAttribute('data-testid'),
          visible: r.width > 0 && r.height > 0 && st.visibility !== 'hidden' && st.display !== 'none',
          enabled: !el.disabled && el.getAttribute('aria-disabled') !== 'true',
          container: kind,
        });
        found.push(el);
      }
    }
  }
  window.__wayfindCandidates = found;
  return out;
})()"#;

const ACTIVATE_SCRIPT: &str = r#"((handle, force) => {
  const el = (window.__wayfindCandidates || [])[handle];
  if (!el || !el.isConnected) return 'stale';
  el.scrollIntoView({ block: 'center', inline: 'center' });
  if (!force) {
    const r = el.getBoundingClientRect();
    const top = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2);
    if (top && top !== el && !el.contains(top)) return 'intercepted';
  }
  el.click();
  return 'ok';
})"#;

const RESOURCE_COUNT_SCRIPT: &str = "performance.getEntriesByType('resource').length";

/// Resource entries must stay flat this long to count as idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ChromeConfig {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub args: Vec<String>,
    /// Chrome executable path (None = auto-detect).
    pub chrome_path: Option<String>,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1440, 900),
            args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            chrome_path: None,
        }
    }
}

impl ChromeConfig {
    pub fn headful(mut self) -> Self {
        self.headless = false;
        self
    }

    pub fn with_chrome_path(mut self, path: impl Into<String>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    fn to_browser_config(&self) -> Result<BrowserConfig> {
        let mut config = BrowserConfig::builder();
        if !self.headless {
            config = config.with_head();
        }
        config = config.window_size(self.window_size.0, self.window_size.1);

        // separate profile per launch so parallel runs never share a singleton lock
        let user_data_dir =
            std::env::temp_dir().join(format!("wayfind-{}", uuid::Uuid::new_v4()));
        config = config.user_data_dir(user_data_dir);

        for arg in &self.args {
            config = config.arg(arg.clone());
        }
        if let Some(ref path) = self.chrome_path {
            config = config.chrome_executable(path);
        }

        config
            .build()
            .map_err(|e| ScanError::Browser(format!("invalid browser configuration: {}", e)))
    }
}

type Buffer = Arc<Mutex<Vec<Observation>>>;

pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    observations: Buffer,
    commits: Arc<AtomicU64>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChromeDriver {
    pub async fn launch(config: ChromeConfig) -> Result<Self> {
        debug!("Launching Chrome with {:?}", config);
        let (browser, mut handler) = Browser::launch(config.to_browser_config()?).await?;

        let mut tasks = vec![tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        })];

        let page = browser.new_page("about:blank").await?;
        page.execute(log::EnableParams::default()).await?;
        page.execute(network::EnableParams::default()).await?;

        let observations: Buffer = Arc::new(Mutex::new(Vec::new()));
        let commits = Arc::new(AtomicU64::new(0));

        let mut console_events = page.event_listener::<EventConsoleApiCalled>().await?;
        let buffer = observations.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = console_events.next().await {
                push(&buffer, console_observation(&event));
            }
        }));

        let mut log_events = page.event_listener::<EventEntryAdded>().await?;
        let buffer = observations.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = log_events.next().await {
                let entry = &event.entry;
                push(
                    &buffer,
                    Observation::Console {
                        level: log_level(&entry.level),
                        text: entry.text.clone(),
                        source: entry.url.clone(),
                    },
                );
            }
        }));

        let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;
        let buffer = observations.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = exceptions.next().await {
                let details = &event.exception_details;
                let message = details
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                let stack = details.stack_trace.as_ref().map(|trace| {
                    trace
                        .call_frames
                        .iter()
                        .map(|f| format!("at {} ({}:{}:{})", f.function_name, f.url, f.line_number, f.column_number))
                        .collect::<Vec<_>>()
                        .join("\n")
                });
                push(&buffer, Observation::PageError { message, stack });
            }
        }));

        let mut responses = page.event_listener::<EventResponseReceived>().await?;
        let buffer = observations.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = responses.next().await {
                push(
                    &buffer,
                    Observation::Response {
                        url: event.response.url.clone(),
                        status: u16::try_from(event.response.status).unwrap_or(0),
                    },
                );
            }
        }));

        let mut navigations = page.event_listener::<EventFrameNavigated>().await?;
        let counter = commits.clone();
        tasks.push(tokio::spawn(async move {
            while let Some(event) = navigations.next().await {
                if event.frame.parent_id.is_none() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            }
        }));

        Ok(Self {
            browser,
            page,
            observations,
            commits,
            tasks,
        })
    }

    async fn evaluate<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| ScanError::Script(e.to_string()))?
            .into_value()
            .map_err(|e| ScanError::Script(e.to_string()))
    }
}

fn push(buffer: &Buffer, observation: Observation) {
    if let Ok(mut observations) = buffer.lock() {
        observations.push(observation);
    }
}

fn console_observation(event: &EventConsoleApiCalled) -> Observation {
    let level = match event.r#type {
        ConsoleApiCalledType::Log => ConsoleLevel::Log,
        ConsoleApiCalledType::Info => ConsoleLevel::Info,
        ConsoleApiCalledType::Warning => ConsoleLevel::Warning,
        ConsoleApiCalledType::Error | ConsoleApiCalledType::Assert => ConsoleLevel::Error,
        ConsoleApiCalledType::Debug => ConsoleLevel::Debug,
        _ => ConsoleLevel::Other,
    };

    let text = event
        .args
        .iter()
        .map(|arg| match arg.value {
            Some(serde_json::Value::String(ref s)) => s.clone(),
            Some(ref other) => other.to_string(),
            None => arg.description.clone().unwrap_or_else(|| "<object>".to_string()),
        })
        .collect::<Vec<_>>()
        .join(" ");

    let source = event
        .stack_trace
        .as_ref()
        .and_then(|trace| trace.call_frames.first())
        .map(|frame| format!("{}:{}:{}", frame.url, frame.line_number, frame.column_number));

    Observation::Console { level, text, source }
}

fn log_level(level: &LogEntryLevel) -> ConsoleLevel {
    match level {
        LogEntryLevel::Error => ConsoleLevel::Error,
        LogEntryLevel::Warning => ConsoleLevel::Warning,
        LogEntryLevel::Info => ConsoleLevel::Info,
        LogEntryLevel::Verbose => ConsoleLevel::Debug,
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn goto(&mut self, url: &Url, limit: Duration) -> Result<()> {
        match timeout(limit, self.page.goto(url.as_str())).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(ScanError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(ScanError::Navigation {
                url: url.to_string(),
                reason: format!("timed out after {:?}", limit),
            }),
        }
    }

    async fn location(&mut self) -> Result<Location> {
        // frame state survives document teardown, unlike a script evaluation
        let url = match self.page.url().await? {
            Some(url) => url,
            None => self.evaluate("window.location.href").await?,
        };
        Ok(Location {
            url,
            commits: self.commits.load(Ordering::SeqCst),
        })
    }

    async fn ready_state(&mut self) -> Result<ReadyState> {
        let state: String = self.evaluate("document.readyState").await?;
        Ok(ReadyState::from(state.as_str()))
    }

    async fn wait_network_idle(&mut self, limit: Duration) -> Result<bool> {
        let started = Instant::now();
        let mut last: u64 = self.evaluate(RESOURCE_COUNT_SCRIPT).await?;
        let mut quiet_since = Instant::now();

        while started.elapsed() < limit {
            sleep(Duration::from_millis(100)).await;
            let count: u64 = self.evaluate(RESOURCE_COUNT_SCRIPT).await?;
            if count != last {
                last = count;
                quiet_since = Instant::now();
            } else if quiet_since.elapsed() >= NETWORK_QUIET {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn open_toggles(&mut self) -> Result<ToggleOutcome> {
        let opened: usize = self.evaluate(TOGGLE_SCRIPT).await?;
        if opened == 0 {
            return Ok(ToggleOutcome::NothingToOpen);
        }
        sleep(Duration::from_millis(150)).await;
        Ok(ToggleOutcome::Opened(opened))
    }

    async fn snapshot(&mut self, scope: DiscoveryScope) -> Result<Vec<ElementSnapshot>> {
        let script = SNAPSHOT_SCRIPT.replace(
            "__INCLUDE_MAIN__",
            if scope.include_main_content { "true" } else { "false" },
        );
        self.evaluate(&script).await
    }

    async fn activate(&mut self, handle: usize, force: bool) -> Result<()> {
        let script = format!("{}({}, {})", ACTIVATE_SCRIPT, handle, force);
        let outcome: String = self.evaluate(&script).await?;
        match outcome.as_str() {
            "ok" => Ok(()),
            "stale" => Err(ScanError::StaleHandle(handle)),
            other => Err(ScanError::Interaction(format!(
                "element {} not clickable: {}",
                handle, other
            ))),
        }
    }

    async fn set_cookies(&mut self, base: &Url, cookies: &[SessionCookie]) -> Result<()> {
        let params = cookies
            .iter()
            .map(|c| {
                let mut param = CookieParam::new(c.name.clone(), c.value.clone());
                param.url = Some(base.to_string());
                param.domain = c.domain.clone();
                param.path = Some(c.path.clone().unwrap_or_else(|| "/".to_string()));
                param
            })
            .collect::<Vec<_>>();
        if params.is_empty() {
            return Ok(());
        }
        self.page.set_cookies(params).await?;
        Ok(())
    }

    fn drain_observations(&mut self) -> Vec<Observation> {
        match self.observations.lock() {
            Ok(mut observations) => std::mem::take(&mut *observations),
            Err(_) => Vec::new(),
        }
    }

    async fn close(&mut self) -> Result<()> {
        debug!("Closing Chrome");
        if let Err(e) = self.browser.close().await {
            warn!("Chrome did not close cleanly: {}", e);
        }
        for task in self.tasks.drain(..) {
            task.abort();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    #[test]
    fn test_log_levels() {
        assert_eq!(log_level(&LogEntryLevel::Error), ConsoleLevel::Error);
        assert_eq!(log_level(&LogEntryLevel::Verbose), ConsoleLevel::Debug);
    }

    #[test]
    fn test_snapshot_script_toggles_main() {
        assert!(SNAPSHOT_SCRIPT.contains("__INCLUDE_MAIN__"));
        let off = SNAPSHOT_SCRIPT.replace("__INCLUDE_MAIN__", "false");
        assert!(off.contains("if (false)"));
    }

    #[tokio::test]
    #[ignore] // Requires Chrome to be installed
    async fn test_chrome_snapshot_and_console() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html")
                    .set_body_bytes(
                        br#"<html><body><nav><a href="/about">About</a></nav>
                        <script>console.error('boom')</script></body></html>"#
                            .to_vec(),
                    ),
            )
            .mount(&mock_server)
            .await;

        let mut driver = ChromeDriver::launch(ChromeConfig::default())
            .await
            .expect("failed to launch Chrome");
        let base = Url::parse(&mock_server.uri()).unwrap();
        driver.goto(&base, Duration::from_secs(10)).await.unwrap();

        let elements = driver
            .snapshot(DiscoveryScope { include_main_content: false })
            .await
            .unwrap();
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].href.as_deref(), Some("/about"));
        assert!(driver.location().await.unwrap().commits >= 1);

        let observations = driver.drain_observations();
        assert!(observations.iter().any(|o| matches!(
            o,
            Observation::Console { level: ConsoleLevel::Error, text, .. } if text == "boom"
        )));

        driver.close().await.unwrap();
    }
}
