//! A script-free page driver built on plain HTTP.
//!
//! Pages are fetched with `reqwest` and parsed with `scraper`. Redirects are
//! followed by hand so each hop counts as one navigation commit, which keeps
//! the redirect-loop guard meaningful. Only links can navigate; every other
//! control is inert without a script runtime.

use crate::driver::{
    Container, DiscoveryScope, ElementSnapshot, Location, Observation, PageDriver, ReadyState,
    SessionCookie, ToggleOutcome,
};
use crate::error::{Result, ScanError};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{Client, redirect::Policy};
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const MAX_REDIRECT_HOPS: usize = 20;

const NAV_CONTAINERS: &str = "nav, [role=navigation]";
const ASIDE_CONTAINERS: &str = "aside";
const MAIN_CONTAINERS: &str = "main, [role=main]";
const NAV_CANDIDATES: &str = "a[href], [role=menuitem], [role=menuitemcheckbox], [role=menuitemradio], button, [role=button], select";
const MAIN_CANDIDATES: &str = "a[href]";

struct LoadedPage {
    url: Url,
    /// Raw body; parsed on demand since parsed documents are not `Send`.
    html: String,
}

pub struct StaticDriver {
    client: Client,
    jar: Arc<Jar>,
    page: Option<LoadedPage>,
    commits: u64,
    elements: Vec<ElementSnapshot>,
    observations: Vec<Observation>,
    navigation_timeout: Duration,
}

impl StaticDriver {
    pub fn new(timeout: Duration) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(concat!("wayfind/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(timeout / 2)
            .cookie_provider(jar.clone())
            .redirect(Policy::none())
            .build()?;

        Ok(Self {
            client,
            jar,
            page: None,
            commits: 0,
            elements: Vec::new(),
            observations: Vec::new(),
            navigation_timeout: timeout,
        })
    }

    /// Fetches `url`, following up to `MAX_REDIRECT_HOPS` redirects. Past the
    /// cap the last response is kept as the page.
    async fn navigate(&mut self, url: &Url, timeout: Duration) -> Result<()> {
        let mut current = url.clone();
        let mut hops = 0;

        loop {
            debug!("Fetching {}", current);
            let response = self
                .client
                .get(current.clone())
                .timeout(timeout)
                .send()
                .await
                .map_err(|e| ScanError::Navigation {
                    url: current.to_string(),
                    reason: e.to_string(),
                })?;

            let status = response.status();
            self.commits += 1;
            self.elements.clear();
            self.observations.push(Observation::Response {
                url: current.to_string(),
                status: status.as_u16(),
            });

            let location = response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| current.join(loc).ok());

            if status.is_redirection()
                && let Some(next) = location
            {
                if hops < MAX_REDIRECT_HOPS {
                    hops += 1;
                    current = next;
                    continue;
                }
                debug!("Redirect cap reached at {}", current);
            }

            let is_html = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(|ct| ct.contains("text/html"))
                .unwrap_or(false);

            let html = if is_html {
                response.text().await?
            } else {
                String::new()
            };

            self.page = Some(LoadedPage { url: current, html });
            return Ok(());
        }
    }
}

#[async_trait]
impl PageDriver for StaticDriver {
    async fn goto(&mut self, url: &Url, timeout: Duration) -> Result<()> {
        self.navigate(url, timeout).await
    }

    async fn location(&mut self) -> Result<Location> {
        let url = self
            .page
            .as_ref()
            .map(|p| p.url.to_string())
            .unwrap_or_else(|| "about:blank".to_string());
        Ok(Location {
            url,
            commits: self.commits,
        })
    }

    async fn ready_state(&mut self) -> Result<ReadyState> {
        Ok(ReadyState::Complete)
    }

    async fn wait_network_idle(&mut self, _timeout: Duration) -> Result<bool> {
        Ok(true)
    }

    async fn open_toggles(&mut self) -> Result<ToggleOutcome> {
        Ok(ToggleOutcome::NothingToOpen)
    }

    async fn snapshot(&mut self, scope: DiscoveryScope) -> Result<Vec<ElementSnapshot>> {
        self.elements = match self.page {
            Some(ref page) => snapshot_html(&page.html, scope)?,
            None => Vec::new(),
        };
        Ok(self.elements.clone())
    }

    async fn activate(&mut self, handle: usize, _force: bool) -> Result<()> {
        let element = self
            .elements
            .get(handle)
            .ok_or(ScanError::StaleHandle(handle))?;

        let (Some(href), Some(page)) = (element.href.clone(), self.page.as_ref()) else {
            debug!("Element {} has no navigation without scripts", handle);
            return Ok(());
        };

        let target = page
            .url
            .join(&href)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", href, e)))?;
        let timeout = self.navigation_timeout;
        self.navigate(&target, timeout).await
    }

    async fn set_cookies(&mut self, base: &Url, cookies: &[SessionCookie]) -> Result<()> {
        for cookie in cookies {
            let mut line = format!("{}={}", cookie.name, cookie.value);
            if let Some(ref domain) = cookie.domain {
                line.push_str(&format!("; Domain={}", domain));
            }
            line.push_str(&format!("; Path={}", cookie.path.as_deref().unwrap_or("/")));
            self.jar.add_cookie_str(&line, base);
        }
        Ok(())
    }

    fn drain_observations(&mut self) -> Vec<Observation> {
        std::mem::take(&mut self.observations)
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ScanError::ParseError(format!("{}: {:?}", css, e)))
}

/// Collects candidates in document order, container by container. Elements
/// reachable through several containers are reported once.
fn snapshot_html(html: &str, scope: DiscoveryScope) -> Result<Vec<ElementSnapshot>> {
    let document = Html::parse_document(html);
    let nav_candidates = selector(NAV_CANDIDATES)?;
    let main_candidates = selector(MAIN_CANDIDATES)?;

    let mut groups = vec![
        (selector(NAV_CONTAINERS)?, Container::Nav, &nav_candidates),
        (selector(ASIDE_CONTAINERS)?, Container::Aside, &nav_candidates),
    ];
    if scope.include_main_content {
        groups.push((selector(MAIN_CONTAINERS)?, Container::Main, &main_candidates));
    }

    let mut seen = HashSet::new();
    let mut elements = Vec::new();
    for (containers, kind, candidates) in &groups {
        for container in document.select(containers) {
            for el in container.select(candidates) {
                if !seen.insert(el.id()) {
                    continue;
                }
                elements.push(describe(el, elements.len(), *kind));
            }
        }
    }
    Ok(elements)
}

fn describe(el: ElementRef<'_>, handle: usize, container: Container) -> ElementSnapshot {
    let value = el.value();
    let attr = |name: &str| value.attr(name).map(str::to_string);
    ElementSnapshot {
        handle,
        tag: value.name().to_lowercase(),
        role: attr("role"),
        aria_label: attr("aria-label"),
        title: attr("title"),
        text: el.text().collect(),
        href: if value.name().eq_ignore_ascii_case("a") { attr("href") } else { None },
        data_test: attr("data-test"),
        data_test_id: attr("data-testid"),
        visible: is_visible(el),
        enabled: value.attr("disabled").is_none() && value.attr("aria-disabled") != Some("true"),
        container,
    }
}

// Without layout the best signal is markup that hides the element or an ancestor.
fn is_visible(el: ElementRef<'_>) -> bool {
    std::iter::once(el)
        .chain(el.ancestors().filter_map(ElementRef::wrap))
        .all(|node| {
            let v = node.value();
            let style = v
                .attr("style")
                .map(|s| s.replace(' ', "").to_lowercase())
                .unwrap_or_default();
            v.attr("hidden").is_none()
                && v.attr("aria-hidden") != Some("true")
                && !style.contains("display:none")
                && !style.contains("visibility:hidden")
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    fn html(body: &str) -> ResponseTemplate {
        ResponseTemplate::new(200)
            .insert_header("content-type", "text/html")
            .set_body_bytes(format!("<html><body>{}</body></html>", body).into_bytes())
    }

    fn driver() -> StaticDriver {
        StaticDriver::new(Duration::from_secs(5)).unwrap()
    }

    fn all() -> DiscoveryScope {
        DiscoveryScope { include_main_content: true }
    }

    #[tokio::test]
    async fn test_snapshot_reads_navigation_containers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html(
                r#"<nav>
                    <a href="/about">About</a>
                    <a href="/secret" hidden>Secret</a>
                    <button disabled>Disabled</button>
                    <div role="menuitem" data-testid="menu-help">Help</div>
                   </nav>
                   <aside><a href="/docs" aria-label="Documentation">Docs</a></aside>
                   <main><a href="/blog/1">Read more</a><button>Like</button></main>
                   <footer><a href="/terms">Terms</a></footer>"#,
            ))
            .mount(&mock_server)
            .await;

        let mut d = driver();
        let base = Url::parse(&mock_server.uri()).unwrap();
        d.goto(&base, Duration::from_secs(5)).await.unwrap();

        let elements = d.snapshot(all()).await.unwrap();
        let hrefs: Vec<_> = elements.iter().filter_map(|e| e.href.as_deref()).collect();
        assert_eq!(hrefs, vec!["/about", "/secret", "/docs", "/blog/1"]);

        let secret = elements.iter().find(|e| e.href.as_deref() == Some("/secret")).unwrap();
        assert!(!secret.visible);
        let disabled = elements.iter().find(|e| e.tag == "button").unwrap();
        assert!(!disabled.enabled);
        let help = elements.iter().find(|e| e.role.as_deref() == Some("menuitem")).unwrap();
        assert_eq!(help.data_test_id.as_deref(), Some("menu-help"));
        assert!(elements.iter().all(|e| e.text != "Like"));

        let nav_only = d
            .snapshot(DiscoveryScope { include_main_content: false })
            .await
            .unwrap();
        assert!(nav_only.iter().all(|e| e.container != Container::Main));
    }

    #[tokio::test]
    async fn test_redirects_count_as_commits() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(302).insert_header("location", "/new"))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(html("<nav></nav>"))
            .mount(&mock_server)
            .await;

        let mut d = driver();
        let start = Url::parse(&format!("{}/old", mock_server.uri())).unwrap();
        d.goto(&start, Duration::from_secs(5)).await.unwrap();

        let location = d.location().await.unwrap();
        assert_eq!(location.url, format!("{}/new", mock_server.uri()));
        assert_eq!(location.commits, 2);

        let statuses: Vec<_> = d
            .drain_observations()
            .into_iter()
            .filter_map(|o| match o {
                Observation::Response { status, .. } => Some(status),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![302, 200]);
        assert!(d.drain_observations().is_empty());
    }

    #[tokio::test]
    async fn test_redirect_loop_stops_at_cap() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/loop"))
            .respond_with(ResponseTemplate::new(307).insert_header("location", "/loop"))
            .mount(&mock_server)
            .await;

        let mut d = driver();
        let start = Url::parse(&format!("{}/loop", mock_server.uri())).unwrap();
        d.goto(&start, Duration::from_secs(5)).await.unwrap();

        let location = d.location().await.unwrap();
        assert_eq!(location.commits, (MAX_REDIRECT_HOPS + 1) as u64);
        assert!(location.url.ends_with("/loop"));
    }

    #[tokio::test]
    async fn test_activate_follows_link() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(html(r#"<nav><a href="/help">Help</a><button>Menu</button></nav>"#))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/help"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let mut d = driver();
        let base = Url::parse(&mock_server.uri()).unwrap();
        d.goto(&base, Duration::from_secs(5)).await.unwrap();
        d.drain_observations();

        let elements = d.snapshot(all()).await.unwrap();
        assert_eq!(elements.len(), 2);

        // the button is inert and leaves the page where it was
        d.activate(1, false).await.unwrap();
        assert_eq!(d.location().await.unwrap().commits, 1);

        d.activate(0, false).await.unwrap();
        let location = d.location().await.unwrap();
        assert_eq!(location.url, format!("{}/help", mock_server.uri()));
        assert!(d.drain_observations().contains(&Observation::Response {
            url: location.url.clone(),
            status: 500,
        }));

        // navigation invalidates the previous snapshot
        assert!(matches!(d.activate(0, false).await, Err(ScanError::StaleHandle(0))));
    }
}
