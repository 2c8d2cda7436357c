//! Breadth-first exploration of everything a role can reach by interacting
//! with a running application.
//!
//! One pass drives one page of one session, one action at a time. Queued
//! actions carry only their id and description; the element is re-located
//! on a fresh load of its originating page right before it is executed.

use crate::classify::ActionRules;
use crate::discovery::{self, Discovery, PageContext};
use crate::driver::{DiscoveryScope, PageDriver};
use crate::error::{Result, StepFault};
use crate::harness::{SanityHarness, StepContext};
use crate::model::{ActionType, NavigableAction, Role};
use crate::path::PagePath;
use crate::result::{ExcludedAction, TraversalArtifacts, TraversalEdge};
use crate::stabilize::{self, StabilizeConfig};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Called with the number of executed actions and a short description of the
/// step about to run.
pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;

pub const DEFAULT_MAX_ACTIONS: usize = 1000;

#[derive(Debug, Clone)]
pub struct TraversalOptions {
    pub role: Role,
    pub entry_points: Vec<String>,
    /// Safety cap on executed actions.
    pub max_actions: usize,
    /// 0 means unlimited.
    pub max_pages: usize,
    /// Negative means unlimited.
    pub max_depth: i64,
    pub page_timeout: Duration,
    pub stabilize: StabilizeConfig,
    pub include_main_content: bool,
    pub rules: ActionRules,
    /// Paths already covered by an earlier run.
    pub covered_paths: BTreeSet<String>,
}

impl TraversalOptions {
    pub fn new(role: Role, entry_points: Vec<String>) -> Self {
        Self {
            role,
            entry_points,
            max_actions: DEFAULT_MAX_ACTIONS,
            max_pages: 0,
            max_depth: -1,
            page_timeout: Duration::from_secs(15),
            stabilize: StabilizeConfig::default(),
            include_main_content: true,
            rules: ActionRules::new(),
            covered_paths: BTreeSet::new(),
        }
    }

    pub fn with_max_actions(mut self, max_actions: usize) -> Self {
        self.max_actions = max_actions;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_max_depth(mut self, max_depth: i64) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn with_stabilize(mut self, stabilize: StabilizeConfig) -> Self {
        self.stabilize = stabilize;
        self
    }

    pub fn with_main_content(mut self, include: bool) -> Self {
        self.include_main_content = include;
        self
    }

    pub fn with_rules(mut self, rules: ActionRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_covered_paths(mut self, covered: BTreeSet<String>) -> Self {
        self.covered_paths = covered;
        self
    }

    fn allows_depth(&self, depth: u32) -> bool {
        self.max_depth < 0 || i64::from(depth) <= self.max_depth
    }

    fn scope(&self) -> DiscoveryScope {
        DiscoveryScope {
            include_main_content: self.include_main_content,
        }
    }
}

pub struct Traversal {
    base: Url,
    options: TraversalOptions,
    progress_callback: Option<ProgressCallback>,
}

impl Traversal {
    pub fn new(base: Url, options: TraversalOptions) -> Self {
        Self {
            base,
            options,
            progress_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn options(&self) -> &TraversalOptions {
        &self.options
    }

    /// Runs one full pass. Step-level problems end up in the returned
    /// artifacts; only driver setup problems surface as errors.
    pub async fn run<D>(&self, driver: &mut D) -> Result<TraversalArtifacts>
    where
        D: PageDriver + ?Sized,
    {
        info!(
            "Starting traversal of {} as {} from {:?}",
            self.base, self.options.role, self.options.entry_points
        );

        let mut pass = Pass {
            driver,
            base: &self.base,
            options: &self.options,
            progress: self.progress_callback.as_ref(),
            harness: SanityHarness::new(self.options.role.clone(), self.base.clone()),
            state: PassState::default(),
        };

        pass.seed().await;
        pass.drive().await;

        let artifacts = pass.finish();
        info!(
            "Traversal as {} complete. {} page(s), {} action(s), {} failure(s)",
            self.options.role,
            artifacts.visited_paths.len(),
            artifacts.executed_action_ids.len(),
            artifacts.failures.len()
        );
        Ok(artifacts)
    }
}

struct Queued {
    action: NavigableAction,
    /// Depth of the page this action is expected to lead to.
    depth: u32,
}

#[derive(Default)]
struct PassState {
    queue: VecDeque<Queued>,
    queued: HashSet<String>,
    executed: HashSet<String>,
    executed_order: Vec<String>,
    visited: BTreeSet<String>,
    depth_by_path: BTreeMap<String, u32>,
    edges: Vec<TraversalEdge>,
    excluded: Vec<ExcludedAction>,
    excluded_seen: HashSet<ExcludedAction>,
    skipped_covered: usize,
}

struct Pass<'a, D: PageDriver + ?Sized> {
    driver: &'a mut D,
    base: &'a Url,
    options: &'a TraversalOptions,
    progress: Option<&'a ProgressCallback>,
    harness: SanityHarness,
    state: PassState,
}

impl<D: PageDriver + ?Sized> Pass<'_, D> {
    async fn seed(&mut self) {
        let options = self.options;
        for entry_point in &options.entry_points {
            self.harness.begin_step(StepContext::seed(entry_point.as_str()));

            let Some(path) = PagePath::resolve(entry_point, self.base) else {
                warn!("Skipping entry point outside {}: {}", self.base, entry_point);
                continue;
            };

            if let Err(fault) = self.load(&path).await {
                let url = self.current_url().await;
                self.harness.record_fault(&fault, &url, entry_point);
                self.flush(&url);
                continue;
            }

            let url = self.current_url().await;
            let Some(here) = PagePath::resolve(&url, self.base) else {
                warn!("Entry point {} left the origin for {}", entry_point, url);
                self.flush(&url);
                continue;
            };

            self.visit(&here, 0);
            self.discover_and_enqueue(entry_point, &here).await;
            self.flush(&url);
        }
    }

    async fn drive(&mut self) {
        while let Some(next) = self.state.queue.pop_front() {
            let id = next.action.action_id.clone();
            self.state.queued.remove(&id);

            if self.state.executed.len() >= self.options.max_actions {
                info!("Reached the cap of {} executed actions", self.options.max_actions);
                break;
            }
            if self.options.max_pages > 0 && self.state.visited.len() >= self.options.max_pages {
                info!("Reached the limit of {} pages", self.options.max_pages);
                break;
            }
            if self.state.executed.contains(&id) {
                continue;
            }

            if let Some(callback) = self.progress {
                callback(
                    self.state.executed.len(),
                    format!("{} -> {}", next.action.from_path, next.action.label),
                );
            }

            self.step(next).await;
        }
    }

    async fn step(&mut self, next: Queued) {
        let action = &next.action;
        self.harness.begin_step(StepContext::action(
            action.entry_point.as_str(),
            action.action_id.as_str(),
            action.from_path.as_str(),
        ));

        let origin = PagePath::resolve(&action.from_path, self.base).unwrap_or_else(PagePath::root);
        if let Err(fault) = self.load(&origin).await {
            let url = self.current_url().await;
            self.harness.record_fault(&fault, &url, &action.label);
            self.mark_executed(&action.action_id);
            self.flush(&url);
            return;
        }

        let url = self.current_url().await;
        let from_path = PagePath::resolve(&url, self.base)
            .map(PagePath::into_string)
            .unwrap_or_else(|| url.clone());
        self.harness.begin_step(StepContext::action(
            action.entry_point.as_str(),
            action.action_id.as_str(),
            from_path.as_str(),
        ));

        let options = self.options;
        let page = PageContext {
            role: &options.role,
            entry_point: &action.entry_point,
            from_path: &from_path,
        };
        let found = match discovery::discover(
            &mut *self.driver,
            page,
            self.options.scope(),
            &self.options.rules,
        )
        .await
        {
            Ok(found) => found.find(&action.action_id).map(|l| l.handle),
            Err(e) => {
                debug!("Re-discovery failed on {}: {}", from_path, e);
                None
            }
        };

        let Some(handle) = found else {
            let fault = StepFault::ActionDisappeared {
                label: action.label.clone(),
            };
            self.harness.record_fault(&fault, &url, &action.label);
            self.mark_executed(&action.action_id);
            self.flush(&url);
            return;
        };

        self.mark_executed(&action.action_id);
        debug!("Executing {} ({}) on {}", action.label, action.action_type, from_path);

        let outcome = self.execute(handle).await;
        let url = self.current_url().await;
        self.flush(&url);

        match outcome {
            Ok(to_url) => match PagePath::resolve(&to_url, self.base) {
                Some(to_path) => {
                    self.harness.mark_destination(Some(to_path.to_string()));
                    self.visit(&to_path, next.depth);
                    self.state.edges.push(TraversalEdge {
                        role: self.options.role.clone(),
                        entry_point: action.entry_point.clone(),
                        from_path: from_path.clone(),
                        action_id: action.action_id.clone(),
                        action_label: action.label.clone(),
                        action_type: action.action_type,
                        action_meta: action.meta.clone(),
                        to_path: to_path.to_string(),
                        to_url: to_url.clone(),
                    });
                    self.discover_and_enqueue(&action.entry_point, &to_path).await;
                }
                None => {
                    warn!("{} on {} left the origin for {}", action.label, from_path, to_url);
                    self.harness.mark_destination(None);
                }
            },
            Err(fault) => {
                self.harness.mark_destination(None);
                self.harness.record_fault(&fault, &url, &action.label);
            }
        }

        let url = self.current_url().await;
        self.flush(&url);
    }

    /// Interacts with the element, falling back to a forced interaction,
    /// then waits for the page to settle.
    async fn execute(&mut self, handle: usize) -> std::result::Result<String, StepFault> {
        let before = self.driver.location().await?;
        if let Err(e) = self.driver.activate(handle, false).await {
            debug!("Interaction failed, forcing it: {}", e);
            self.driver.activate(handle, true).await?;
        }
        stabilize::await_route_change(&mut *self.driver, &before, &self.options.stabilize).await
    }

    async fn load(&mut self, path: &PagePath) -> std::result::Result<String, StepFault> {
        let url = path.to_url(self.base)?;
        self.driver.goto(&url, self.options.page_timeout).await?;
        stabilize::wait_stable(&mut *self.driver, &self.options.stabilize).await
    }

    async fn discover_and_enqueue(&mut self, entry_point: &str, here: &PagePath) {
        let options = self.options;
        let page = PageContext {
            role: &options.role,
            entry_point,
            from_path: here.as_str(),
        };
        match discovery::discover(
            &mut *self.driver,
            page,
            self.options.scope(),
            &self.options.rules,
        )
        .await
        {
            Ok(found) => {
                let depth = self.state.depth_by_path.get(here.as_str()).copied().unwrap_or(0);
                self.enqueue(found, depth + 1);
            }
            Err(e) => {
                let url = self.current_url().await;
                let fault = StepFault::Driver(e);
                self.harness.record_fault(&fault, &url, here.as_str());
            }
        }
    }

    fn enqueue(&mut self, found: Discovery, next_depth: u32) {
        for excluded in found.excluded {
            if self.state.excluded_seen.insert(excluded.clone()) {
                self.state.excluded.push(excluded);
            }
        }

        if !self.options.allows_depth(next_depth) {
            debug!("Depth {} is past the limit, not enqueuing", next_depth);
            return;
        }

        for located in found.actions {
            let action = located.action;
            if self.state.executed.contains(&action.action_id)
                || self.state.queued.contains(&action.action_id)
            {
                continue;
            }
            if self.leads_to_covered(&action) {
                self.state.skipped_covered += 1;
                continue;
            }
            self.state.queued.insert(action.action_id.clone());
            self.state.queue.push_back(Queued {
                action,
                depth: next_depth,
            });
        }
    }

    fn leads_to_covered(&self, action: &NavigableAction) -> bool {
        if action.action_type != ActionType::Link || self.options.covered_paths.is_empty() {
            return false;
        }
        action
            .meta
            .href
            .as_deref()
            .and_then(|href| PagePath::resolve(href, self.base))
            .is_some_and(|path| self.options.covered_paths.contains(path.as_str()))
    }

    fn visit(&mut self, path: &PagePath, depth: u32) {
        self.state.visited.insert(path.to_string());
        self.state
            .depth_by_path
            .entry(path.to_string())
            .or_insert(depth);
    }

    fn mark_executed(&mut self, action_id: &str) {
        if self.state.executed.insert(action_id.to_string()) {
            self.state.executed_order.push(action_id.to_string());
        }
    }

    async fn current_url(&mut self) -> String {
        match self.driver.location().await {
            Ok(location) => location.url,
            Err(e) => {
                debug!("Could not read the page location: {}", e);
                self.base.to_string()
            }
        }
    }

    fn flush(&mut self, url: &str) {
        let observations = self.driver.drain_observations();
        if !observations.is_empty() {
            self.harness.ingest(observations, url);
        }
    }

    fn finish(self) -> TraversalArtifacts {
        if self.state.skipped_covered > 0 {
            info!(
                "Skipped {} action(s) leading to previously covered paths",
                self.state.skipped_covered
            );
        }
        let (failures, benign_console) = self.harness.into_parts();
        TraversalArtifacts {
            edges: self.state.edges,
            visited_paths: self.state.visited.into_iter().collect(),
            executed_action_ids: self.state.executed_order,
            excluded_actions: self.state.excluded,
            depth_by_path: self.state.depth_by_path,
            failures,
            benign_console,
        }
    }
}
