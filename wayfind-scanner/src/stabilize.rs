//! Settling detection after navigation and interaction.
//!
//! A page counts as stable once its URL has held still for the quiet window,
//! the document is no longer `loading`, and a best-effort network-idle wait
//! has run. Every wait here is bounded.

use crate::driver::{Location, PageDriver, ReadyState};
use crate::error::StepFault;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilizeConfig {
    /// Upper bound for a single stabilization or route-change wait.
    pub timeout: Duration,
    /// How long the URL must stay unchanged.
    pub quiet_window: Duration,
    pub poll_interval: Duration,
    pub network_idle_timeout: Duration,
    /// More observed transitions than this inside one route-change wait is a loop.
    pub redirect_threshold: usize,
}

impl Default for StabilizeConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            quiet_window: Duration::from_millis(750),
            poll_interval: Duration::from_millis(100),
            network_idle_timeout: Duration::from_millis(2500),
            redirect_threshold: 10,
        }
    }
}

impl StabilizeConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_quiet_window(mut self, quiet_window: Duration) -> Self {
        self.quiet_window = quiet_window;
        self
    }

    pub fn with_redirect_threshold(mut self, threshold: usize) -> Self {
        self.redirect_threshold = threshold;
        self
    }
}

/// Tallies transitions caused by one interaction and trips once they pass
/// the threshold.
#[derive(Debug)]
struct LoopGuard {
    threshold: usize,
    window: Duration,
    transitions: usize,
}

impl LoopGuard {
    fn new(config: &StabilizeConfig) -> Self {
        Self {
            threshold: config.redirect_threshold,
            window: config.timeout,
            transitions: 0,
        }
    }

    /// Each poll contributes the larger of "URL changed" and "commits since
    /// the previous poll", so same-URL reloads count too.
    fn observe(&mut self, previous: &Location, current: &Location) -> Result<(), StepFault> {
        let url_changed = usize::from(current.url != previous.url);
        let commits = current.commits.saturating_sub(previous.commits) as usize;
        self.transitions += url_changed.max(commits);

        if self.transitions > self.threshold {
            return Err(StepFault::RedirectLoop {
                threshold: self.threshold,
                transitions: self.transitions,
                window: self.window,
                last_url: current.url.clone(),
            });
        }
        Ok(())
    }
}

/// Polls until the page settles and returns the settled URL.
pub async fn wait_stable<D>(driver: &mut D, config: &StabilizeConfig) -> Result<String, StepFault>
where
    D: PageDriver + ?Sized,
{
    settle(driver, config, None, None).await
}

/// Settling loop shared by both waits. With a guard attached every movement
/// of the page counts against the redirect threshold.
///
/// A location read that fails (the document is being torn down mid
/// navigation) counts as movement rather than an error.
async fn settle<D>(
    driver: &mut D,
    config: &StabilizeConfig,
    mut last: Option<Location>,
    mut guard: Option<&mut LoopGuard>,
) -> Result<String, StepFault>
where
    D: PageDriver + ?Sized,
{
    let started = Instant::now();
    let mut stable_since = Instant::now();

    while started.elapsed() < config.timeout {
        let current = match driver.location().await {
            Ok(current) => current,
            Err(e) => {
                debug!("Location unavailable while settling: {}", e);
                stable_since = Instant::now();
                sleep(config.poll_interval).await;
                continue;
            }
        };

        if let Some(previous) = &last {
            if *previous != current {
                if let Some(guard) = guard.as_deref_mut() {
                    guard.observe(previous, &current)?;
                }
                stable_since = Instant::now();
            }
        } else {
            stable_since = Instant::now();
        }
        let url = current.url.clone();
        last = Some(current);

        let ready = driver
            .ready_state()
            .await
            .unwrap_or(ReadyState::Unknown);

        if !ready.is_loading() {
            match driver.wait_network_idle(config.network_idle_timeout).await {
                Ok(true) => {}
                Ok(false) => debug!("Network still busy on {}", url),
                Err(e) => debug!("Network idle wait failed on {}: {}", url, e),
            }
        }

        if stable_since.elapsed() > config.quiet_window && !ready.is_loading() {
            sleep(config.poll_interval).await;
            return Ok(url);
        }

        sleep(config.poll_interval).await;
    }

    Err(StepFault::StabilizationTimeout {
        timeout: config.timeout,
        last_url: last.map(|l| l.url).unwrap_or_default(),
    })
}

/// Waits for the interaction that just happened to move the page away from
/// `before`, then waits for it to settle. Transitions are counted across
/// both phases, so a chain that keeps hopping after the first URL change
/// still trips the redirect-loop guard.
pub async fn await_route_change<D>(
    driver: &mut D,
    before: &Location,
    config: &StabilizeConfig,
) -> Result<String, StepFault>
where
    D: PageDriver + ?Sized,
{
    let started = Instant::now();
    let mut guard = LoopGuard::new(config);
    let mut last = before.clone();

    while started.elapsed() < config.timeout {
        match driver.location().await {
            Ok(current) => {
                guard.observe(&last, &current)?;
                last = current;
                if last.url != before.url {
                    break;
                }
            }
            Err(e) => debug!("Location unavailable after interaction: {}", e),
        }

        sleep(config.poll_interval).await;
    }

    settle(driver, config, Some(last), Some(&mut guard)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DiscoveryScope, ElementSnapshot, Observation, SessionCookie, ToggleOutcome};
    use crate::error::{Result, ScanError};
    use async_trait::async_trait;
    use url::Url;

    /// A page whose location follows a fixed script, one entry per poll.
    struct ScriptedLocation {
        steps: Vec<Location>,
        polls: usize,
        ready: ReadyState,
        /// Polls that fail before the script starts answering.
        blind_polls: usize,
    }

    impl ScriptedLocation {
        fn fixed(url: &str) -> Self {
            Self::script(vec![Location { url: url.to_string(), commits: 1 }])
        }

        fn script(steps: Vec<Location>) -> Self {
            Self {
                steps,
                polls: 0,
                ready: ReadyState::Complete,
                blind_polls: 0,
            }
        }
    }

    #[async_trait]
    impl PageDriver for ScriptedLocation {
        async fn goto(&mut self, _url: &Url, _timeout: Duration) -> Result<()> {
            Ok(())
        }

        async fn location(&mut self) -> Result<Location> {
            if self.blind_polls > 0 {
                self.blind_polls -= 1;
                return Err(ScanError::Browser("Cannot find context with specified id".to_string()));
            }
            let i = self.polls.min(self.steps.len() - 1);
            self.polls += 1;
            Ok(self.steps[i].clone())
        }

        async fn ready_state(&mut self) -> Result<ReadyState> {
            Ok(self.ready)
        }

        async fn wait_network_idle(&mut self, _timeout: Duration) -> Result<bool> {
            Ok(true)
        }

        async fn open_toggles(&mut self) -> Result<ToggleOutcome> {
            Ok(ToggleOutcome::NothingToOpen)
        }

        async fn snapshot(&mut self, _scope: DiscoveryScope) -> Result<Vec<ElementSnapshot>> {
            Ok(Vec::new())
        }

        async fn activate(&mut self, _handle: usize, _force: bool) -> Result<()> {
            Ok(())
        }

        async fn set_cookies(&mut self, _base: &Url, _cookies: &[SessionCookie]) -> Result<()> {
            Ok(())
        }

        fn drain_observations(&mut self) -> Vec<Observation> {
            Vec::new()
        }
    }

    fn loc(url: &str, commits: u64) -> Location {
        Location { url: url.to_string(), commits }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stable_page_settles_after_quiet_window() {
        let mut page = ScriptedLocation::fixed("http://app.test/");
        let started = Instant::now();
        let url = wait_stable(&mut page, &StabilizeConfig::default()).await.unwrap();
        assert_eq!(url, "http://app.test/");
        assert!(started.elapsed() >= Duration::from_millis(750));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_loading_page_times_out() {
        let mut page = ScriptedLocation::fixed("http://app.test/slow");
        page.ready = ReadyState::Loading;
        let config = StabilizeConfig::default().with_timeout(Duration::from_secs(3));

        match wait_stable(&mut page, &config).await {
            Err(StepFault::StabilizationTimeout { timeout, last_url }) => {
                assert_eq!(timeout, Duration::from_secs(3));
                assert_eq!(last_url, "http://app.test/slow");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_ready_state_counts_as_settled() {
        let mut page = ScriptedLocation::fixed("http://app.test/");
        page.ready = ReadyState::Unknown;
        assert!(wait_stable(&mut page, &StabilizeConfig::default()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_route_change_returns_destination() {
        let mut page =
            ScriptedLocation::script(vec![loc("http://app.test/", 1), loc("http://app.test/about", 2)]);
        let before = loc("http://app.test/", 1);
        let url = await_route_change(&mut page, &before, &StabilizeConfig::default())
            .await
            .unwrap();
        assert_eq!(url, "http://app.test/about");
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_url_reloads_trip_loop_guard() {
        // eleven reload commits with the URL never moving
        let steps = (1..=12).map(|n| loc("http://app.test/loop", n)).collect();
        let mut page = ScriptedLocation::script(steps);
        let before = loc("http://app.test/loop", 1);

        match await_route_change(&mut page, &before, &StabilizeConfig::default()).await {
            Err(StepFault::RedirectLoop { transitions, threshold, last_url, .. }) => {
                assert_eq!(threshold, 10);
                assert_eq!(transitions, 11);
                assert_eq!(last_url, "http://app.test/loop");
            }
            other => panic!("expected redirect loop, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ten_transitions_are_tolerated() {
        let before = loc("http://app.test/a", 1);
        let mut page =
            ScriptedLocation::script(vec![loc("http://app.test/a", 10), loc("http://app.test/b", 10)]);
        let url = await_route_change(&mut page, &before, &StabilizeConfig::default())
            .await
            .unwrap();
        assert_eq!(url, "http://app.test/b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_hop_chain_after_first_change_trips_loop_guard() {
        // one hop per poll through /hop12, then it stops
        let steps = (1..=12)
            .map(|n| loc(&format!("http://app.test/hop{}", n), n + 1))
            .collect();
        let mut page = ScriptedLocation::script(steps);
        let before = loc("http://app.test/hop0", 1);

        match await_route_change(&mut page, &before, &StabilizeConfig::default()).await {
            Err(StepFault::RedirectLoop { transitions, threshold, last_url, .. }) => {
                assert_eq!(threshold, 10);
                assert_eq!(transitions, 11);
                assert_eq!(last_url, "http://app.test/hop11");
            }
            other => panic!("expected redirect loop, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_hop_chain_settles_on_last_hop() {
        let steps = (1..=5)
            .map(|n| loc(&format!("http://app.test/hop{}", n), n + 1))
            .collect();
        let mut page = ScriptedLocation::script(steps);
        let before = loc("http://app.test/hop0", 1);

        let url = await_route_change(&mut page, &before, &StabilizeConfig::default())
            .await
            .unwrap();
        assert_eq!(url, "http://app.test/hop5");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_location_during_commit_is_not_a_fault() {
        let mut page =
            ScriptedLocation::script(vec![loc("http://app.test/about", 2)]);
        page.blind_polls = 3;
        let before = loc("http://app.test/", 1);

        let url = await_route_change(&mut page, &before, &StabilizeConfig::default())
            .await
            .unwrap();
        assert_eq!(url, "http://app.test/about");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreadable_location_while_settling_is_retried() {
        let mut page = ScriptedLocation::fixed("http://app.test/");
        page.blind_polls = 2;
        let url = wait_stable(&mut page, &StabilizeConfig::default()).await.unwrap();
        assert_eq!(url, "http://app.test/");
    }
}
