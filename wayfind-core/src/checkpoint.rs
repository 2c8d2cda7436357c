// Persisted traversal progress

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const CHECKPOINT_FILE: &str = "crawl-checkpoint.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub visited_paths: Vec<String>,
    pub depth_by_path: BTreeMap<String, u32>,
    pub timestamp: DateTime<Utc>,
    pub total_pages: usize,
    pub seeds: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl Checkpoint {
    pub fn new(
        visited: BTreeSet<String>,
        depth_by_path: BTreeMap<String, u32>,
        seeds: Vec<String>,
        role: Option<String>,
    ) -> Self {
        let visited_paths: Vec<String> = visited.into_iter().collect();
        Self {
            total_pages: visited_paths.len(),
            visited_paths,
            depth_by_path,
            timestamp: Utc::now(),
            seeds,
            role,
        }
    }

    /// Folds an earlier checkpoint into this one so coverage only grows.
    /// Depths keep the shallower of the two.
    pub fn absorb(mut self, previous: &Checkpoint) -> Self {
        let mut visited: BTreeSet<String> = self.visited_paths.drain(..).collect();
        visited.extend(previous.visited_paths.iter().cloned());

        for (path, depth) in &previous.depth_by_path {
            self.depth_by_path
                .entry(path.clone())
                .and_modify(|d| *d = (*d).min(*depth))
                .or_insert(*depth);
        }
        for seed in &previous.seeds {
            if !self.seeds.contains(seed) {
                self.seeds.push(seed.clone());
            }
        }

        self.visited_paths = visited.into_iter().collect();
        self.total_pages = self.visited_paths.len();
        self
    }

    pub fn covered(&self) -> BTreeSet<String> {
        self.visited_paths.iter().cloned().collect()
    }
}

/// Reads a checkpoint. Missing or unreadable files are logged and yield `None`.
pub fn load(path: &Path) -> Option<Checkpoint> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Could not read checkpoint {}: {}. Starting fresh", path.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<Checkpoint>(&raw) {
        Ok(checkpoint) => {
            info!(
                "Resuming from {} with {} covered path(s)",
                path.display(),
                checkpoint.visited_paths.len()
            );
            Some(checkpoint)
        }
        Err(e) => {
            warn!("Ignoring corrupt checkpoint {}: {}", path.display(), e);
            None
        }
    }
}

pub fn save(path: &Path, checkpoint: &Checkpoint) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(checkpoint)?)?;
    info!("Saved checkpoint with {} page(s) to {}", checkpoint.total_pages, path.display());
    Ok(())
}
