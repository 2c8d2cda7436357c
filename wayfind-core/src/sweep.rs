use crate::checkpoint::{self, CHECKPOINT_FILE, Checkpoint};
use crate::error::{CoreError, Result};
use crate::inventory::{self, OrphanReport};
use crate::report::{ReportWriter, RoleOutcome};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{info, warn};
use url::Url;
use wayfind_scanner::driver::SessionCookie;
use wayfind_scanner::{
    ChromeConfig, ChromeDriver, PageDriver, Role, StaticDriver, Traversal, TraversalArtifacts,
    TraversalOptions,
};

/// Callback for reporting sweep progress
pub type SweepProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// One role and where its traversal starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePlan {
    pub role: Role,
    pub entry_points: Vec<String>,
}

impl RolePlan {
    pub fn new(role: Role, entry_points: Vec<String>) -> Self {
        Self { role, entry_points }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CheckpointPolicy {
    pub save: bool,
    /// Defaults to `crawl-checkpoint.json` in the output directory.
    pub path: Option<PathBuf>,
    pub resume_from: Option<PathBuf>,
}

/// Options for configuring a sweep
pub struct SweepOptions {
    pub base_url: Url,
    pub roles: Vec<RolePlan>,
    /// Limits and rules shared by every role pass. Role, entry points and
    /// covered paths are filled in per pass.
    pub traversal: TraversalOptions,
    pub out_dir: PathBuf,
    pub checkpoint: CheckpointPolicy,
    pub app_dir: Option<PathBuf>,
    pub health_path: String,
    pub preflight_timeout: Duration,
    pub show_progress_bars: bool,
}

impl SweepOptions {
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint
            .path
            .clone()
            .unwrap_or_else(|| self.out_dir.join(CHECKPOINT_FILE))
    }
}

/// Opens a fresh page session for each role.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open(&self, role: &Role) -> Result<Box<dyn PageDriver>>;
}

#[derive(Debug, Clone)]
pub enum DriverKind {
    Chrome(ChromeConfig),
    Static { timeout: Duration },
}

#[async_trait]
impl DriverFactory for DriverKind {
    async fn open(&self, role: &Role) -> Result<Box<dyn PageDriver>> {
        info!("Opening session for {}", role);
        match self {
            DriverKind::Chrome(config) => Ok(Box::new(ChromeDriver::launch(config.clone()).await?)),
            DriverKind::Static { timeout } => Ok(Box::new(StaticDriver::new(*timeout)?)),
        }
    }
}

/// Establishes a role's session before its traversal starts.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, role: &Role, base: &Url, driver: &mut dyn PageDriver) -> Result<()>;
}

/// Accepts only the guest role.
pub struct GuestOnly;

#[async_trait]
impl Authenticator for GuestOnly {
    async fn authenticate(&self, role: &Role, _base: &Url, _driver: &mut dyn PageDriver) -> Result<()> {
        if role.is_guest() {
            Ok(())
        } else {
            Err(CoreError::Auth {
                role: role.to_string(),
                reason: "no credentials configured".to_string(),
            })
        }
    }
}

/// Session cookies per role, read from a JSON file of the form
/// `{"admin": [{"name": "session", "value": "..."}]}`.
#[derive(Debug, Clone, Default)]
pub struct CookieFileAuth {
    cookies: HashMap<String, Vec<SessionCookie>>,
}

impl CookieFileAuth {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let cookies = serde_json::from_str(&raw)?;
        Ok(Self { cookies })
    }

    pub fn from_map(cookies: HashMap<String, Vec<SessionCookie>>) -> Self {
        Self { cookies }
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.cookies.keys().map(String::as_str)
    }
}

#[async_trait]
impl Authenticator for CookieFileAuth {
    async fn authenticate(&self, role: &Role, base: &Url, driver: &mut dyn PageDriver) -> Result<()> {
        let Some(cookies) = self.cookies.get(role.as_str()) else {
            if role.is_guest() {
                return Ok(());
            }
            return Err(CoreError::Auth {
                role: role.to_string(),
                reason: "no cookies for this role in the cookie file".to_string(),
            });
        };

        driver
            .set_cookies(base, cookies)
            .await
            .map_err(|e| CoreError::Auth {
                role: role.to_string(),
                reason: e.to_string(),
            })?;
        info!("Injected {} cookie(s) for {}", cookies.len(), role);
        Ok(())
    }
}

/// A role whose session could not be opened, authenticated or traversed
/// after an earlier role had already completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterruptedRole {
    pub role: Role,
    pub reason: String,
}

/// Everything a finished sweep produced.
#[derive(Debug)]
pub struct SweepReport {
    pub outcomes: Vec<RoleOutcome>,
    pub interrupted: Vec<InterruptedRole>,
    pub orphans: Option<OrphanReport>,
    pub out_dir: PathBuf,
    pub checkpoint_path: Option<PathBuf>,
}

impl SweepReport {
    pub fn failure_count(&self) -> usize {
        self.outcomes.iter().map(|o| o.artifacts.failures.len()).sum()
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }

    /// 2 when a role's pass was cut short, 1 when any role recorded a
    /// critical failure. Orphans never count.
    pub fn exit_code(&self) -> i32 {
        if !self.interrupted.is_empty() {
            2
        } else if self.has_failures() {
            1
        } else {
            0
        }
    }
}

/// GETs `<base><health_path>`. Transport failures and 5xx answers are fatal.
pub async fn preflight(base: &Url, health_path: &str, timeout: Duration) -> Result<u16> {
    let url = base
        .join(health_path)
        .map_err(|e| CoreError::InvalidUrl(format!("{}{}: {}", base, health_path, e)))?;

    let unreachable = |reason: String| CoreError::Unreachable {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| unreachable(e.to_string()))?;

    let response = client
        .get(url.clone())
        .send()
        .await
        .map_err(|e| unreachable(e.to_string()))?;

    let status = response.status();
    if status.is_server_error() {
        return Err(unreachable(format!("health check answered {}", status)));
    }

    info!("Preflight {} answered {}", url, status);
    Ok(status.as_u16())
}

/// Execute a sweep: one traversal pass per role, then aggregate artifacts
pub async fn execute_sweep(
    options: SweepOptions,
    factory: &dyn DriverFactory,
    auth: &dyn Authenticator,
    progress_callback: Option<SweepProgressCallback>,
) -> Result<SweepReport> {
    preflight(&options.base_url, &options.health_path, options.preflight_timeout).await?;

    let writer = ReportWriter::new(&options.out_dir, options.base_url.clone())?;

    let previous = options
        .checkpoint
        .resume_from
        .as_deref()
        .and_then(checkpoint::load);
    let covered = previous.as_ref().map(Checkpoint::covered).unwrap_or_default();

    let progress_bar = if options.show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message("Starting sweep...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let executed_count = Arc::new(AtomicUsize::new(0));
    let mut outcomes = Vec::with_capacity(options.roles.len());
    let mut interrupted = Vec::new();

    for (idx, plan) in options.roles.iter().enumerate() {
        if let Some(ref callback) = progress_callback {
            callback(format!(
                "Traversing as {} ({}/{}) from {}",
                plan.role,
                idx + 1,
                options.roles.len(),
                plan.entry_points.join(", ")
            ));
        }

        let mut traversal_options = options.traversal.clone();
        traversal_options.role = plan.role.clone();
        traversal_options.entry_points = plan.entry_points.clone();
        traversal_options.covered_paths = covered.clone();

        let mut traversal = Traversal::new(options.base_url.clone(), traversal_options);
        if let Some(ref pb) = progress_bar {
            let pb = pb.clone();
            let count = executed_count.clone();
            let role = plan.role.clone();
            traversal = traversal.with_progress_callback(Arc::new(move |_executed: usize, step: String| {
                let total = count.fetch_add(1, Ordering::Relaxed) + 1;
                pb.set_message(format!("[{}] {} action(s): {}", role, total, step));
                pb.tick();
            }));
        }

        let artifacts = match run_pass(factory, auth, &options.base_url, &plan.role, &traversal).await {
            Ok(artifacts) => artifacts,
            Err(e) if outcomes.is_empty() => {
                if let Some(ref pb) = progress_bar {
                    pb.abandon_with_message(format!("Sweep aborted at {}", plan.role));
                }
                return Err(e);
            }
            Err(e) => {
                warn!("Pass for {} aborted, keeping earlier roles: {}", plan.role, e);
                interrupted.push(InterruptedRole {
                    role: plan.role.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let outcome = RoleOutcome::new(plan.role.clone(), plan.entry_points.clone(), artifacts);
        writer.write_role(&outcome)?;

        if let Some(ref callback) = progress_callback {
            callback(format!(
                "{}: {} page(s), {} edge(s), {} failure(s)",
                plan.role,
                outcome.artifacts.visited_paths.len(),
                outcome.artifacts.edges.len(),
                outcome.artifacts.failures.len()
            ));
        }
        outcomes.push(outcome);
    }

    if let Some(ref pb) = progress_bar {
        let total = executed_count.load(Ordering::Relaxed);
        pb.finish_with_message(format!("Sweep complete! {} action(s) executed", total));
    }

    writer.write_aggregate(&outcomes)?;

    let orphans = match options.app_dir.as_deref() {
        Some(app_dir) => match inventory::scan_app_dir(app_dir) {
            Ok(inv) => {
                let visited: BTreeSet<&str> = outcomes
                    .iter()
                    .flat_map(|o| o.artifacts.visited_paths.iter())
                    .chain(covered.iter())
                    .map(String::as_str)
                    .collect();
                Some(inventory::reconcile(&inv, visited))
            }
            Err(e) => {
                warn!("Skipping orphan report: {}", e);
                None
            }
        },
        None => None,
    };
    if let Some(ref report) = orphans {
        writer.write_orphans(report)?;
    }
    writer.write_summary(&outcomes, orphans.as_ref())?;

    let checkpoint_path = if options.checkpoint.save {
        let path = options.checkpoint_path();
        let mut current = checkpoint_from(&outcomes);
        if let Some(ref previous) = previous {
            current = current.absorb(previous);
        }
        checkpoint::save(&path, &current)?;
        Some(path)
    } else {
        None
    };

    Ok(SweepReport {
        outcomes,
        interrupted,
        orphans,
        out_dir: writer.out_dir().to_path_buf(),
        checkpoint_path,
    })
}

/// Opens a session for the role, authenticates it and runs the traversal.
async fn run_pass(
    factory: &dyn DriverFactory,
    auth: &dyn Authenticator,
    base: &Url,
    role: &Role,
    traversal: &Traversal,
) -> Result<TraversalArtifacts> {
    let mut driver = factory.open(role).await?;
    if let Err(e) = auth.authenticate(role, base, driver.as_mut()).await {
        close_quietly(driver.as_mut()).await;
        return Err(e);
    }

    let result = traversal.run(driver.as_mut()).await;
    close_quietly(driver.as_mut()).await;
    Ok(result?)
}

fn checkpoint_from(outcomes: &[RoleOutcome]) -> Checkpoint {
    let mut visited = BTreeSet::new();
    let mut depth_by_path: BTreeMap<String, u32> = BTreeMap::new();
    let mut seeds: Vec<String> = Vec::new();

    for outcome in outcomes {
        visited.extend(outcome.artifacts.visited_paths.iter().cloned());
        for (path, depth) in &outcome.artifacts.depth_by_path {
            depth_by_path
                .entry(path.clone())
                .and_modify(|d| *d = (*d).min(*depth))
                .or_insert(*depth);
        }
        for seed in &outcome.entry_points {
            if !seeds.contains(seed) {
                seeds.push(seed.clone());
            }
        }
    }

    let role = match outcomes {
        [only] => Some(only.role.to_string()),
        _ => None,
    };
    Checkpoint::new(visited, depth_by_path, seeds, role)
}

async fn close_quietly(driver: &mut dyn PageDriver) {
    if let Err(e) = driver.close().await {
        warn!("Failed to close session: {}", e);
    }
}
