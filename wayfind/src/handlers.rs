use anyhow::{Context, Result, anyhow, bail};
use clap::ArgMatches;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use url::Url;
use wayfind_core::inventory;
use wayfind_core::report::generate_text_summary;
use wayfind_core::sweep::{
    Authenticator, CheckpointPolicy, CookieFileAuth, DriverKind, GuestOnly, RolePlan,
    SweepOptions, SweepReport, execute_sweep,
};
use wayfind_scanner::traversal::DEFAULT_MAX_ACTIONS;
use wayfind_scanner::{
    ActionRules, ActionType, ChromeConfig, Role, StabilizeConfig, TraversalOptions,
};

pub const REMOTE_MAX_ACTIONS: usize = 250;

/// Exit code for configuration, preflight and authentication errors.
pub const EXIT_FATAL: i32 = 2;

// Helper functions for the sweep handler

/// Splits a comma-separated list of paths, adding a leading `/` where missing.
pub fn parse_seeds(raw: &str) -> Vec<String> {
    let mut seeds = Vec::new();
    for seed in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let seed = if seed.starts_with('/') {
            seed.to_string()
        } else {
            format!("/{}", seed)
        };
        if !seeds.contains(&seed) {
            seeds.push(seed);
        }
    }
    seeds
}

/// Role names end up in artifact file names, so only `[A-Za-z0-9_-]` is accepted.
pub fn parse_role_name(raw: &str) -> Result<Role> {
    let name = raw.trim();
    if name.is_empty() {
        bail!("empty role name");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        bail!("invalid role name '{}' (use letters, digits, '_' or '-')", name);
    }
    Ok(Role::new(name))
}

/// Parses `role=/a,/b`.
pub fn parse_role_seeds(raw: &str) -> Result<(Role, Vec<String>)> {
    let (role, seeds) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected ROLE=/path[,/path...], got '{}'", raw))?;

    if role.trim().is_empty() {
        bail!("missing role name in '{}'", raw);
    }
    let role = parse_role_name(role)?;
    let seeds = parse_seeds(seeds);
    if seeds.is_empty() {
        bail!("role '{}' has no entry points", role);
    }
    Ok((role, seeds))
}

pub fn parse_action_types(raw: &str) -> Result<Vec<ActionType>> {
    let mut types = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let action_type: ActionType = name
            .parse()
            .map_err(|_| anyhow!("unknown action type '{}' (expected link, button, menuitem or select)", name))?;
        if !types.contains(&action_type) {
            types.push(action_type);
        }
    }
    if types.is_empty() {
        bail!("no action types given");
    }
    Ok(types)
}

/// Anything other than a loopback host counts as remote.
pub fn is_remote_base_url(url: &Url) -> bool {
    !matches!(
        url.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
    )
}

/// Decides which roles run and where each one starts. Explicit `role=seeds`
/// pairs win; roles named only in the filter start from `default_seeds`.
pub fn plan_roles(
    role_filter: Option<&str>,
    default_seeds: &[String],
    role_seeds: Vec<(Role, Vec<String>)>,
) -> Result<Vec<RolePlan>> {
    let filter: Option<Vec<Role>> = role_filter
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(parse_role_name)
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    let mut plans: Vec<RolePlan> = Vec::new();
    for (role, seeds) in role_seeds {
        match plans.iter_mut().find(|p| p.role == role) {
            Some(existing) => existing.entry_points = seeds,
            None => plans.push(RolePlan::new(role, seeds)),
        }
    }

    match filter {
        Some(roles) => {
            let mut selected = Vec::new();
            for role in roles {
                if selected.iter().any(|p: &RolePlan| p.role == role) {
                    continue;
                }
                let plan = plans
                    .iter()
                    .find(|p| p.role == role)
                    .cloned()
                    .unwrap_or_else(|| RolePlan::new(role, default_seeds.to_vec()));
                selected.push(plan);
            }
            plans = selected;
        }
        None if plans.is_empty() => {
            plans.push(RolePlan::new(Role::guest(), default_seeds.to_vec()));
        }
        None => {}
    }

    if plans.is_empty() {
        bail!("no roles selected");
    }
    if let Some(plan) = plans.iter().find(|p| p.entry_points.is_empty()) {
        bail!("role '{}' has no entry points", plan.role);
    }
    Ok(plans)
}

/// Limits that depend on where the target runs and which driver is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDefaults {
    pub allowed_types: Option<Vec<ActionType>>,
    pub include_main_content: bool,
    pub max_actions: usize,
}

/// Remote targets get the conservative link/menuitem allow-list, no `<main>`
/// links and a lower action cap. The static driver cannot press buttons, so it
/// defaults to links only. Explicit values always win.
pub fn resolve_target_defaults(
    base: &Url,
    static_driver: bool,
    allowed_types: Option<Vec<ActionType>>,
    include_main_content: Option<bool>,
    max_actions: Option<usize>,
) -> TargetDefaults {
    let remote = is_remote_base_url(base);

    let allowed_types = allowed_types.or_else(|| {
        if static_driver {
            Some(vec![ActionType::Link])
        } else if remote {
            Some(vec![ActionType::Link, ActionType::Menuitem])
        } else {
            None
        }
    });

    TargetDefaults {
        allowed_types,
        include_main_content: include_main_content.unwrap_or(!remote),
        max_actions: max_actions.unwrap_or(if remote { REMOTE_MAX_ACTIONS } else { DEFAULT_MAX_ACTIONS }),
    }
}

pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

fn optional_path(args: &ArgMatches, id: &str) -> Option<PathBuf> {
    args.get_one::<String>(id).map(|raw| expand_path(raw))
}

fn millis(args: &ArgMatches, id: &str) -> Result<Duration> {
    args.get_one::<u64>(id)
        .copied()
        .map(Duration::from_millis)
        .ok_or_else(|| anyhow!("missing --{}", id))
}

/// Everything needed to start a sweep, resolved from the command line.
pub struct SweepPlan {
    pub options: SweepOptions,
    pub driver: DriverKind,
    pub auth: Box<dyn Authenticator>,
}

pub fn build_sweep_plan(args: &ArgMatches) -> Result<SweepPlan> {
    let base_url = args
        .get_one::<Url>("base-url")
        .cloned()
        .ok_or_else(|| anyhow!("missing --base-url"))?;
    let static_driver = args.get_one::<String>("driver").map(String::as_str) == Some("static");

    let default_seeds = parse_seeds(args.get_one::<String>("seeds").map(String::as_str).unwrap_or("/"));
    let role_seeds = args
        .get_many::<String>("role-seeds")
        .into_iter()
        .flatten()
        .map(|raw| parse_role_seeds(raw.as_str()))
        .collect::<Result<Vec<_>>>()?;
    let roles = plan_roles(
        args.get_one::<String>("role").map(String::as_str),
        &default_seeds,
        role_seeds,
    )?;

    let allowed_types = args
        .get_one::<String>("allowed-action-types")
        .map(|raw| parse_action_types(raw))
        .transpose()
        .context("invalid --allowed-action-types")?;
    let defaults = resolve_target_defaults(
        &base_url,
        static_driver,
        allowed_types,
        args.get_one::<bool>("include-main-content-links").copied(),
        args.get_one::<usize>("max-actions").copied(),
    );

    let mut rules = ActionRules::new();
    if let Some(types) = defaults.allowed_types.clone() {
        rules = rules.with_allowed_types(types);
    }

    let page_timeout = millis(args, "page-timeout-ms")?;
    let stabilize = StabilizeConfig::default()
        .with_timeout(millis(args, "stabilization-timeout-ms")?)
        .with_quiet_window(millis(args, "quiet-window-ms")?)
        .with_redirect_threshold(args.get_one::<usize>("redirect-threshold").copied().unwrap_or(10));

    let traversal = TraversalOptions::new(Role::guest(), Vec::new())
        .with_max_actions(defaults.max_actions)
        .with_max_pages(args.get_one::<usize>("max-pages").copied().unwrap_or(0))
        .with_max_depth(args.get_one::<i64>("max-depth").copied().unwrap_or(-1))
        .with_page_timeout(page_timeout)
        .with_stabilize(stabilize)
        .with_main_content(defaults.include_main_content)
        .with_rules(rules);

    let out_dir = optional_path(args, "out").unwrap_or_else(|| PathBuf::from("wayfind-artifacts"));
    let checkpoint = CheckpointPolicy {
        save: !args.get_flag("no-checkpoint"),
        path: optional_path(args, "checkpoint"),
        resume_from: optional_path(args, "resume-from"),
    };

    let driver = if static_driver {
        DriverKind::Static {
            timeout: page_timeout,
        }
    } else {
        let mut config = ChromeConfig::default();
        if args.get_flag("headful") {
            config = config.headful();
        }
        if let Some(path) = optional_path(args, "chrome-path") {
            config = config.with_chrome_path(path.to_string_lossy());
        }
        DriverKind::Chrome(config)
    };

    let auth: Box<dyn Authenticator> = match optional_path(args, "auth-cookies") {
        Some(path) => Box::new(
            CookieFileAuth::from_file(&path)
                .with_context(|| format!("failed to read cookie file {}", path.display()))?,
        ),
        None => Box::new(GuestOnly),
    };

    let options = SweepOptions {
        base_url,
        roles,
        traversal,
        out_dir,
        checkpoint,
        app_dir: optional_path(args, "app-dir"),
        health_path: args
            .get_one::<String>("health-path")
            .cloned()
            .unwrap_or_else(|| "/".to_string()),
        preflight_timeout: page_timeout,
        show_progress_bars: !args.get_flag("quiet"),
    };

    Ok(SweepPlan {
        options,
        driver,
        auth,
    })
}

fn print_configuration(options: &SweepOptions, driver: &DriverKind) {
    println!("\n{} Sweeping {}", "→".blue().bold(), options.base_url.as_str().bright_white());
    for plan in &options.roles {
        println!("  {} {} from {}", "•".cyan(), plan.role, plan.entry_points.join(", "));
    }
    let t = &options.traversal;
    println!(
        "  Driver: {}",
        match driver {
            DriverKind::Chrome(_) => "chrome",
            DriverKind::Static { .. } => "static",
        }
    );
    println!(
        "  Action types: {}",
        t.rules
            .allowed_types()
            .map(|types| types.iter().map(ActionType::as_str).collect::<Vec<_>>().join(","))
            .unwrap_or_else(|| "all".to_string())
    );
    println!(
        "  Limits: {} action(s), {} page(s), depth {}",
        t.max_actions,
        if t.max_pages == 0 { "unlimited".to_string() } else { t.max_pages.to_string() },
        if t.max_depth < 0 { "unlimited".to_string() } else { t.max_depth.to_string() }
    );
    println!("  Main content links: {}", t.include_main_content);
    println!("  Artifacts: {}\n", options.out_dir.display());
}

async fn run_sweep(args: &ArgMatches) -> Result<SweepReport> {
    let SweepPlan {
        options,
        driver,
        auth,
    } = build_sweep_plan(args)?;

    let quiet = args.get_flag("quiet");
    if !quiet {
        print_configuration(&options, &driver);
    }

    let progress_callback: Option<wayfind_core::sweep::SweepProgressCallback> = if quiet {
        None
    } else {
        Some(Arc::new(|msg: String| {
            println!("{} {}", "→".blue(), msg);
        }))
    };

    let report = execute_sweep(options, &driver, auth.as_ref(), progress_callback).await?;
    Ok(report)
}

/// Runs the `sweep` subcommand and returns the process exit code.
pub async fn handle_sweep(args: &ArgMatches) -> i32 {
    let report = match run_sweep(args).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} Sweep failed: {:#}", "✗".red().bold(), e);
            return EXIT_FATAL;
        }
    };

    if !args.get_flag("quiet") {
        println!();
        print!("{}", generate_text_summary(&report.outcomes, report.orphans.as_ref()));
    }

    for cut in &report.interrupted {
        eprintln!("{} Pass for {} did not run: {}", "✗".red().bold(), cut.role, cut.reason);
    }

    if report.has_failures() {
        println!(
            "{} {} runtime failure(s) recorded. See {}",
            "✗".red().bold(),
            report.failure_count(),
            report.out_dir.join("runtime-failures.json").display()
        );
    } else {
        println!("{} Sweep complete, no runtime failures", "✓".green().bold());
    }
    if let Some(ref path) = report.checkpoint_path {
        println!("{} Checkpoint saved to {}", "✓".green().bold(), path.display());
    }

    report.exit_code()
}

fn read_visited_paths(graph: &std::path::Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(graph)
        .with_context(|| format!("failed to read {}", graph.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", graph.display()))?;

    let paths = value
        .get("visitedPaths")
        .and_then(|v| v.as_array())
        .ok_or_else(|| anyhow!("{} has no visitedPaths", graph.display()))?;
    Ok(paths
        .iter()
        .filter_map(|p| p.as_str().map(str::to_string))
        .collect())
}

fn run_routes(args: &ArgMatches) -> Result<()> {
    let app_dir = optional_path(args, "app-dir").ok_or_else(|| anyhow!("missing --app-dir"))?;
    let inventory = inventory::scan_app_dir(&app_dir)?;

    println!("{} {} route(s) in {}", "✓".green().bold(), inventory.included.len(), app_dir.display());
    for route in &inventory.included {
        println!("  {} {}", route.pattern.bright_white(), route.source_file.dimmed());
    }
    for route in &inventory.excluded {
        println!("  {} {} (dev only)", route.pattern.dimmed(), route.source_file.dimmed());
    }

    if let Some(graph) = optional_path(args, "graph") {
        let visited = read_visited_paths(&graph)?;
        let report = inventory::reconcile(&inventory, visited.iter().map(String::as_str));
        println!(
            "\n{} {} of {} route(s) reached",
            "→".blue().bold(),
            report.reachable_patterns.len(),
            report.inventory.len()
        );
        for orphan in &report.orphans {
            println!("  {} {}", "•".yellow(), orphan.pattern);
        }
    }
    Ok(())
}

/// Runs the `routes` subcommand. Orphans never fail it.
pub fn handle_routes(args: &ArgMatches) -> i32 {
    match run_routes(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{} {:#}", "✗".red().bold(), e);
            EXIT_FATAL
        }
    }
}
