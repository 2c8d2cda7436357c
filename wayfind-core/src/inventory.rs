//! Static route inventory for file-system routed apps (Next.js `app/` layout)
//! and reconciliation of that inventory against traversal coverage.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path};
use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

const PAGE_FILES: &[&str] = &["page.tsx", "page.ts", "page.jsx", "page.js", "page.mdx"];
const DEV_GROUP: &str = "(dev)";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    pub pattern: String,
    pub source_file: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteInventory {
    pub included: Vec<RouteEntry>,
    /// Routes that exist only for development (`(dev)` group).
    pub excluded: Vec<RouteEntry>,
}

impl RouteInventory {
    pub fn patterns(&self) -> Vec<&str> {
        self.included.iter().map(|r| r.pattern.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanReport {
    pub generated_at: DateTime<Utc>,
    pub inventory: Vec<RouteEntry>,
    pub excluded_inventory: Vec<RouteEntry>,
    pub reachable_patterns: Vec<String>,
    pub orphans: Vec<RouteEntry>,
}

fn is_skipped_dir(entry: &DirEntry) -> bool {
    if entry.depth() == 0 || !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name == "api" || name.starts_with('_')
}

/// Walks `app_dir` and collects one entry per page file.
pub fn scan_app_dir(app_dir: &Path) -> Result<RouteInventory> {
    if !app_dir.is_dir() {
        return Err(CoreError::Inventory(format!(
            "{} is not a directory",
            app_dir.display()
        )));
    }

    let mut included: BTreeMap<String, RouteEntry> = BTreeMap::new();
    let mut excluded: BTreeMap<String, RouteEntry> = BTreeMap::new();

    let walker = WalkDir::new(app_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !is_skipped_dir(e));

    for entry in walker {
        let entry = entry.map_err(|e| CoreError::Inventory(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy();
        if !PAGE_FILES.contains(&file_name.as_ref()) {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(app_dir)
            .map_err(|e| CoreError::Inventory(e.to_string()))?;

        let mut segments = Vec::new();
        let mut dev_only = false;
        if let Some(parent) = relative.parent() {
            for component in parent.components() {
                let Component::Normal(part) = component else {
                    continue;
                };
                let part = part.to_string_lossy();
                if part == DEV_GROUP {
                    dev_only = true;
                }
                if is_group(&part) || part.starts_with('@') {
                    continue;
                }
                segments.push(part.into_owned());
            }
        }

        let pattern = format!("/{}", segments.join("/"));
        let source_file = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        debug!("Route {} from {}", pattern, source_file);

        let target = if dev_only { &mut excluded } else { &mut included };
        target.entry(pattern.clone()).or_insert(RouteEntry {
            pattern,
            source_file,
        });
    }

    // a pattern reachable outside (dev) is a real route
    excluded.retain(|pattern, _| !included.contains_key(pattern));

    info!(
        "Route inventory: {} pattern(s), {} dev-only",
        included.len(),
        excluded.len()
    );

    Ok(RouteInventory {
        included: included.into_values().collect(),
        excluded: excluded.into_values().collect(),
    })
}

fn is_group(segment: &str) -> bool {
    segment.starts_with('(') && segment.ends_with(')')
}

fn is_dynamic(segment: &str) -> bool {
    segment.starts_with('[') && segment.ends_with(']')
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

pub fn static_segments(pattern: &str) -> usize {
    split(pattern).into_iter().filter(|s| !is_dynamic(s)).count()
}

/// Whether a concrete path fits a route pattern.
pub fn matches_pattern(pattern: &str, path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let pattern_segments = split(pattern);
    let path_segments = split(path);

    pattern_segments.len() == path_segments.len()
        && pattern_segments
            .iter()
            .zip(&path_segments)
            .all(|(p, s)| is_dynamic(p) || p == s)
}

/// Picks the most specific pattern for `path`. Among equal matches the one
/// with more static segments wins, then the earliest.
pub fn match_path<'a>(path: &str, patterns: &[&'a str]) -> Option<&'a str> {
    let mut best: Option<(&'a str, usize)> = None;
    for pattern in patterns {
        if !matches_pattern(pattern, path) {
            continue;
        }
        let score = static_segments(pattern);
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((pattern, score));
        }
    }
    best.map(|(p, _)| p)
}

/// Compares the inventory with every path the sweep reached.
pub fn reconcile<'a, I>(inventory: &RouteInventory, visited: I) -> OrphanReport
where
    I: IntoIterator<Item = &'a str>,
{
    let patterns = inventory.patterns();
    let reachable: BTreeSet<String> = visited
        .into_iter()
        .filter_map(|path| match_path(path, &patterns))
        .map(str::to_string)
        .collect();

    let orphans: Vec<RouteEntry> = inventory
        .included
        .iter()
        .filter(|r| !reachable.contains(&r.pattern))
        .cloned()
        .collect();

    if !orphans.is_empty() {
        info!("{} route pattern(s) were never reached", orphans.len());
    }

    OrphanReport {
        generated_at: Utc::now(),
        inventory: inventory.included.clone(),
        excluded_inventory: inventory.excluded.clone(),
        reachable_patterns: reachable.into_iter().collect(),
        orphans,
    }
}
