// Artifact generation for finished sweeps

use crate::error::Result;
use crate::inventory::OrphanReport;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;
use wayfind_scanner::result::RuntimeFailure;
use wayfind_scanner::{FailureKind, Role, TraversalArtifacts};

pub const NAVIGATION_GRAPH: &str = "navigation-graph";
pub const RUNTIME_FAILURES: &str = "runtime-failures";
pub const ORPHANS_FILE: &str = "navigation-orphans.json";
pub const SUMMARY_FILE: &str = "summary.md";

const SUMMARY_FAILURE_LIMIT: usize = 10;

/// The result of one role pass.
#[derive(Debug, Clone)]
pub struct RoleOutcome {
    pub role: Role,
    pub entry_points: Vec<String>,
    pub artifacts: TraversalArtifacts,
}

impl RoleOutcome {
    pub fn new(role: Role, entry_points: Vec<String>, artifacts: TraversalArtifacts) -> Self {
        Self {
            role,
            entry_points,
            artifacts,
        }
    }
}

pub fn role_file(stem: &str, role: &Role) -> String {
    format!("{}.{}.json", stem, role)
}

pub fn generate_role_graph(outcome: &RoleOutcome, base: &Url) -> serde_json::Value {
    serde_json::json!({
        "generatedAt": chrono::Utc::now().to_rfc3339(),
        "role": outcome.role,
        "start": base.as_str(),
        "entryPoints": outcome.entry_points,
        "visitedPaths": outcome.artifacts.visited_paths,
        "edges": outcome.artifacts.edges,
        "excludedActions": outcome.artifacts.excluded_actions,
        "executedActionIds": outcome.artifacts.executed_action_ids,
    })
}

pub fn generate_role_failures(outcome: &RoleOutcome) -> serde_json::Value {
    serde_json::json!({
        "generatedAt": chrono::Utc::now().to_rfc3339(),
        "role": outcome.role,
        "failures": outcome.artifacts.failures,
        "benignConsole": outcome.artifacts.benign_console,
    })
}

pub fn generate_aggregate_graph(outcomes: &[RoleOutcome], base: &Url) -> serde_json::Value {
    let roles: Vec<&Role> = outcomes.iter().map(|o| &o.role).collect();
    let visited: BTreeSet<&String> = outcomes
        .iter()
        .flat_map(|o| o.artifacts.visited_paths.iter())
        .collect();
    let edges: Vec<_> = outcomes.iter().flat_map(|o| o.artifacts.edges.iter()).collect();
    let excluded: Vec<_> = outcomes
        .iter()
        .flat_map(|o| o.artifacts.excluded_actions.iter())
        .collect();

    serde_json::json!({
        "generatedAt": chrono::Utc::now().to_rfc3339(),
        "start": base.as_str(),
        "roles": roles,
        "visitedPaths": visited,
        "edges": edges,
        "excludedActions": excluded,
    })
}

pub fn generate_aggregate_failures(outcomes: &[RoleOutcome]) -> serde_json::Value {
    let failures: Vec<_> = all_failures(outcomes).collect();
    let benign: Vec<_> = outcomes
        .iter()
        .flat_map(|o| o.artifacts.benign_console.iter())
        .collect();

    serde_json::json!({
        "generatedAt": chrono::Utc::now().to_rfc3339(),
        "failures": failures,
        "benignConsole": benign,
    })
}

fn all_failures(outcomes: &[RoleOutcome]) -> impl Iterator<Item = &RuntimeFailure> {
    outcomes.iter().flat_map(|o| o.artifacts.failures.iter())
}

pub fn failure_counts(outcomes: &[RoleOutcome]) -> BTreeMap<FailureKind, usize> {
    let mut counts = BTreeMap::new();
    for failure in all_failures(outcomes) {
        *counts.entry(failure.kind).or_insert(0) += 1;
    }
    counts
}

/// Markdown rollup written as `summary.md`.
pub fn generate_summary(outcomes: &[RoleOutcome], orphans: Option<&OrphanReport>, base: &Url) -> String {
    let edges: usize = outcomes.iter().map(|o| o.artifacts.edges.len()).sum();
    let failures: usize = outcomes.iter().map(|o| o.artifacts.failures.len()).sum();

    let mut md = String::new();
    md.push_str("## Navigation completeness + runtime sanity summary\n\n");
    md.push_str(&format!("- **Target**: {}\n", base));
    md.push_str(&format!("- **Generated at**: {}\n", chrono::Utc::now().to_rfc3339()));
    md.push_str(&format!("- **Edges recorded**: {}\n", edges));
    md.push_str(&format!("- **Runtime failures**: {}\n", failures));
    match orphans {
        Some(report) => {
            md.push_str(&format!("- **Route patterns (included)**: {}\n", report.inventory.len()));
            md.push_str(&format!("- **Orphan route patterns**: {}\n", report.orphans.len()));
        }
        None => md.push_str("- **Route inventory**: not scanned\n"),
    }

    md.push_str("\n### Roles\n\n");
    md.push_str("| Role | Entry points | Pages | Actions | Edges | Excluded | Failures | Benign |\n");
    md.push_str("|------|--------------|-------|---------|-------|----------|----------|--------|\n");
    for outcome in outcomes {
        let a = &outcome.artifacts;
        md.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} | {} | {} |\n",
            outcome.role,
            outcome.entry_points.join(", "),
            a.visited_paths.len(),
            a.executed_action_ids.len(),
            a.edges.len(),
            a.excluded_actions.len(),
            a.failures.len(),
            a.benign_console.len()
        ));
    }

    let counts = failure_counts(outcomes);
    if !counts.is_empty() {
        md.push_str("\n### Failures by type\n\n");
        for (kind, count) in &counts {
            md.push_str(&format!("- `{}`: {}\n", kind, count));
        }

        md.push_str(&format!("\n### Failures (first {})\n\n", SUMMARY_FAILURE_LIMIT));
        for f in all_failures(outcomes).take(SUMMARY_FAILURE_LIMIT) {
            md.push_str(&format!(
                "- **{}** {} at `{}`: {}\n",
                f.role,
                f.kind,
                f.to_path.as_deref().or(f.from_path.as_deref()).unwrap_or(&f.entry_point),
                single_line(&f.message)
            ));
        }
    }

    if let Some(report) = orphans
        && !report.orphans.is_empty()
    {
        md.push_str("\n### Orphan routes\n\n");
        for orphan in &report.orphans {
            md.push_str(&format!("- `{}` ({})\n", orphan.pattern, orphan.source_file));
        }
    }

    md
}

/// Plain-text rollup for the terminal.
pub fn generate_text_summary(outcomes: &[RoleOutcome], orphans: Option<&OrphanReport>) -> String {
    let mut out = String::new();

    out.push_str("━━━ ROLES ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
    for outcome in outcomes {
        let a = &outcome.artifacts;
        out.push_str(&format!(
            "  {:<12} {:>4} pages  {:>4} actions  {:>4} edges  {:>4} failures\n",
            outcome.role.as_str(),
            a.visited_paths.len(),
            a.executed_action_ids.len(),
            a.edges.len(),
            a.failures.len()
        ));
    }
    out.push('\n');

    let counts = failure_counts(outcomes);
    if !counts.is_empty() {
        out.push_str("━━━ FAILURES ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
        for (kind, count) in &counts {
            out.push_str(&format!("  {:<24} {}\n", kind.as_str(), count));
        }
        out.push('\n');
        for f in all_failures(outcomes).take(SUMMARY_FAILURE_LIMIT) {
            out.push_str(&format!("  [{}] {} {}\n", f.role, f.kind, f.url));
            out.push_str(&wrap_text(&single_line(&f.message), 74, "      "));
            out.push('\n');
        }
        out.push('\n');
    }

    if let Some(report) = orphans {
        out.push_str("━━━ ROUTES ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n\n");
        out.push_str(&format!(
            "  {} reachable of {} pattern(s), {} orphan(s)\n",
            report.reachable_patterns.len(),
            report.inventory.len(),
            report.orphans.len()
        ));
        for orphan in &report.orphans {
            out.push_str(&format!("    {}\n", orphan.pattern));
        }
        out.push('\n');
    }

    out
}

/// Writes every artifact for a sweep into `out_dir`.
pub struct ReportWriter {
    out_dir: PathBuf,
    base: Url,
}

impl ReportWriter {
    pub fn new(out_dir: impl Into<PathBuf>, base: Url) -> Result<Self> {
        let out_dir = out_dir.into();
        fs::create_dir_all(&out_dir)?;
        Ok(Self { out_dir, base })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    pub fn write_role(&self, outcome: &RoleOutcome) -> Result<()> {
        self.write_json(
            &role_file(NAVIGATION_GRAPH, &outcome.role),
            &generate_role_graph(outcome, &self.base),
        )?;
        self.write_json(
            &role_file(RUNTIME_FAILURES, &outcome.role),
            &generate_role_failures(outcome),
        )
    }

    pub fn write_aggregate(&self, outcomes: &[RoleOutcome]) -> Result<()> {
        self.write_json(
            &format!("{}.json", NAVIGATION_GRAPH),
            &generate_aggregate_graph(outcomes, &self.base),
        )?;
        self.write_json(
            &format!("{}.json", RUNTIME_FAILURES),
            &generate_aggregate_failures(outcomes),
        )
    }

    pub fn write_orphans(&self, report: &OrphanReport) -> Result<()> {
        self.write_json(ORPHANS_FILE, &serde_json::to_value(report)?)
    }

    pub fn write_summary(&self, outcomes: &[RoleOutcome], orphans: Option<&OrphanReport>) -> Result<()> {
        let path = self.out_dir.join(SUMMARY_FILE);
        save_report(&generate_summary(outcomes, orphans, &self.base), &path)?;
        Ok(())
    }

    fn write_json(&self, name: &str, value: &serde_json::Value) -> Result<()> {
        let path = self.out_dir.join(name);
        save_report(&serde_json::to_string_pretty(value)?, &path)?;
        info!("Wrote {}", path.display());
        Ok(())
    }
}

pub fn save_report(content: &str, path: &Path) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

fn single_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn wrap_text(text: &str, width: usize, indent: &str) -> String {
    let mut result = String::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + word.len() < width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            result.push_str(indent);
            result.push_str(&current_line);
            result.push('\n');
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        result.push_str(indent);
        result.push_str(&current_line);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_file_names() {
        let role = Role::new("admin");
        assert_eq!(role_file(NAVIGATION_GRAPH, &role), "navigation-graph.admin.json");
        assert_eq!(role_file(RUNTIME_FAILURES, &role), "runtime-failures.admin.json");
    }

    #[test]
    fn test_wrap_text_splits_long_messages() {
        let wrapped = wrap_text("one two three four", 9, "  ");
        assert_eq!(wrapped, "  one two\n  three\n  four");
    }

    #[test]
    fn test_single_line_collapses_newlines() {
        assert_eq!(single_line("Error:\n  at foo\n  at bar"), "Error: at foo at bar");
    }
}
