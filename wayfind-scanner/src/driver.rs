//! The boundary between the traversal engine and the application under test.
//!
//! A `PageDriver` owns exactly one page of one session. The engine only ever
//! talks to it through this trait, so the same traversal runs against a real
//! browser (`browser::ChromeDriver`), a script-free HTTP session
//! (`fetch::StaticDriver`), or a scripted fake in tests.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Which kind of container a candidate element was found in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    #[default]
    Nav,
    Aside,
    Main,
}

/// A read-only view of one candidate element, taken at one instant.
///
/// `handle` is an index into the snapshot that produced it and is only
/// meaningful until the next `snapshot` or navigation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ElementSnapshot {
    pub handle: usize,
    /// Lowercase tag name.
    pub tag: String,
    pub role: Option<String>,
    pub aria_label: Option<String>,
    pub title: Option<String>,
    /// Rendered inner text, untrimmed.
    pub text: String,
    /// Raw `href` attribute, anchors only.
    pub href: Option<String>,
    pub data_test: Option<String>,
    pub data_test_id: Option<String>,
    pub visible: bool,
    pub enabled: bool,
    pub container: Container,
}

/// Which containers discovery should look into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryScope {
    pub include_main_content: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Loading,
    Interactive,
    Complete,
    Unknown,
}

impl From<&str> for ReadyState {
    fn from(s: &str) -> Self {
        match s {
            "loading" => ReadyState::Loading,
            "interactive" => ReadyState::Interactive,
            "complete" => ReadyState::Complete,
            _ => ReadyState::Unknown,
        }
    }
}

impl ReadyState {
    pub fn is_loading(&self) -> bool {
        matches!(self, ReadyState::Loading)
    }
}

/// The current address of the page plus a running count of committed
/// navigations. Same-URL reloads bump `commits` without changing `url`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub url: String,
    pub commits: u64,
}

/// Result of trying to expand collapsed navigation (menus, drawers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Opened(usize),
    NothingToOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warning,
    Error,
    Debug,
    Other,
}

impl From<&str> for ConsoleLevel {
    fn from(s: &str) -> Self {
        match s {
            "log" => ConsoleLevel::Log,
            "info" => ConsoleLevel::Info,
            "warning" | "warn" => ConsoleLevel::Warning,
            "error" => ConsoleLevel::Error,
            "debug" => ConsoleLevel::Debug,
            _ => ConsoleLevel::Other,
        }
    }
}

/// A raw runtime event captured by a driver, not yet classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Console {
        level: ConsoleLevel,
        text: String,
        /// Script or resource location, if the page reported one.
        source: Option<String>,
    },
    PageError {
        message: String,
        stack: Option<String>,
    },
    Response {
        url: String,
        status: u16,
    },
}

/// A cookie injected into the session by an authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

#[async_trait]
pub trait PageDriver: Send {
    /// Loads `url` directly, waiting at most `timeout` for the document to commit.
    async fn goto(&mut self, url: &Url, timeout: Duration) -> Result<()>;

    async fn location(&mut self) -> Result<Location>;

    async fn ready_state(&mut self) -> Result<ReadyState>;

    /// Best-effort wait for network quiescence. `Ok(false)` means the wait
    /// ran out without the network settling.
    async fn wait_network_idle(&mut self, timeout: Duration) -> Result<bool>;

    async fn open_toggles(&mut self) -> Result<ToggleOutcome>;

    async fn snapshot(&mut self, scope: DiscoveryScope) -> Result<Vec<ElementSnapshot>>;

    /// Interacts with the element behind `handle` from the latest snapshot.
    /// With `force`, interception checks are skipped.
    async fn activate(&mut self, handle: usize, force: bool) -> Result<()>;

    async fn set_cookies(&mut self, base: &Url, cookies: &[SessionCookie]) -> Result<()>;

    /// Takes every observation captured since the previous call.
    fn drain_observations(&mut self) -> Vec<Observation>;

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
