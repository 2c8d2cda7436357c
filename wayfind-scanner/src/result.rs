use crate::model::{ActionMeta, ActionType, ExclusionReason, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One successful action execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraversalEdge {
    pub role: Role,
    pub entry_point: String,
    pub from_path: String,
    pub action_id: String,
    pub action_label: String,
    pub action_type: ActionType,
    pub action_meta: ActionMeta,
    pub to_path: String,
    pub to_url: String,
}

/// Audit record for a candidate that was never enqueued.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcludedAction {
    pub role: Role,
    pub entry_point: String,
    pub from_path: String,
    pub label: String,
    pub reason: ExclusionReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    #[serde(rename = "pageerror")]
    PageError,
    ConsoleError,
    HydrationMismatch,
    #[serde(rename = "http-5xx")]
    Http5xx,
    RedirectLoop,
    StabilizationTimeout,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::PageError => "pageerror",
            FailureKind::ConsoleError => "console-error",
            FailureKind::HydrationMismatch => "hydration-mismatch",
            FailureKind::Http5xx => "http-5xx",
            FailureKind::RedirectLoop => "redirect-loop",
            FailureKind::StabilizationTimeout => "stabilization-timeout",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A critical observation tied to the traversal step that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeFailure {
    pub role: Role,
    pub entry_point: String,
    pub action_id: Option<String>,
    pub from_path: Option<String>,
    pub to_path: Option<String>,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub meta: serde_json::Map<String, serde_json::Value>,
}

/// A tolerated console message, kept for the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenignConsole {
    pub role: Role,
    pub entry_point: String,
    pub action_id: Option<String>,
    pub from_path: Option<String>,
    pub url: String,
    pub text: String,
    pub rule: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything one role pass produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraversalArtifacts {
    pub edges: Vec<TraversalEdge>,
    pub visited_paths: Vec<String>,
    /// Executed action ids in execution order.
    pub executed_action_ids: Vec<String>,
    pub excluded_actions: Vec<ExcludedAction>,
    pub depth_by_path: BTreeMap<String, u32>,
    pub failures: Vec<RuntimeFailure>,
    pub benign_console: Vec<BenignConsole>,
}

impl TraversalArtifacts {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn failures_of(&self, kind: FailureKind) -> impl Iterator<Item = &RuntimeFailure> {
        self.failures.iter().filter(move |f| f.kind == kind)
    }
}
