//! Runtime sanity checks applied to everything a driver observes.
//!
//! The harness never talks to the page itself. The traversal engine drains
//! observations from the driver at step boundaries and hands them over
//! together with the URL the page was on; the harness attributes them to
//! the current [`StepContext`] and classifies them.

use crate::driver::{ConsoleLevel, Observation};
use crate::error::StepFault;
use crate::model::Role;
use crate::result::{BenignConsole, FailureKind, RuntimeFailure};
use chrono::Utc;
use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, warn};
use url::Url;

struct BenignRule {
    name: &'static str,
    pattern: Regex,
}

static BENIGN_RULES: LazyLock<Vec<BenignRule>> = LazyLock::new(|| {
    [
        (
            "auth-session-chatter",
            r"(?i)(auth session missing|AuthSessionMissingError|invalid refresh token|refresh token not found|jwt expired|session (has )?expired|not authenticated)",
        ),
        (
            "unauthorized-resource",
            r"(?i)failed to load resource: the server responded with a status of 40[13]\b",
        ),
        (
            "source-map",
            r"(?i)(source ?map|\.js\.map\b|\.css\.map\b)",
        ),
        (
            "favicon-or-manifest",
            r"(?i)(favicon\.ico|apple-touch-icon|manifest\.json|\.webmanifest)",
        ),
    ]
    .into_iter()
    .map(|(name, pattern)| BenignRule {
        name,
        pattern: Regex::new(pattern).expect("static benign pattern compiles"),
    })
    .collect()
});

static HYDRATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(hydration failed|hydration mismatch|did not match\. server|text content does not match server-rendered html|error while hydrating|minified react error #(418|423|425))",
    )
    .expect("static hydration pattern compiles")
});

/// How a console message is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleVerdict {
    Benign(&'static str),
    Critical(FailureKind),
    Ignored,
}

/// Classifies a console message. Only error and warning levels are looked at;
/// the benign allow-list wins over the hydration signature, which wins over
/// the plain error level.
pub fn classify_console(level: ConsoleLevel, text: &str, source: Option<&str>) -> ConsoleVerdict {
    if !matches!(level, ConsoleLevel::Error | ConsoleLevel::Warning) {
        return ConsoleVerdict::Ignored;
    }

    let benign = BENIGN_RULES.iter().find(|rule| {
        rule.pattern.is_match(text) || source.is_some_and(|s| rule.pattern.is_match(s))
    });
    if let Some(rule) = benign {
        return ConsoleVerdict::Benign(rule.name);
    }

    if HYDRATION.is_match(text) {
        return ConsoleVerdict::Critical(FailureKind::HydrationMismatch);
    }

    if level == ConsoleLevel::Error {
        return ConsoleVerdict::Critical(FailureKind::ConsoleError);
    }

    ConsoleVerdict::Ignored
}

/// Who gets blamed for an observation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepContext {
    pub entry_point: String,
    pub action_id: Option<String>,
    pub from_path: Option<String>,
    pub to_path: Option<String>,
}

impl StepContext {
    /// Context for loading an entry point, before any action runs.
    pub fn seed(entry_point: impl Into<String>) -> Self {
        Self {
            entry_point: entry_point.into(),
            ..Default::default()
        }
    }

    pub fn action(
        entry_point: impl Into<String>,
        action_id: impl Into<String>,
        from_path: impl Into<String>,
    ) -> Self {
        Self {
            entry_point: entry_point.into(),
            action_id: Some(action_id.into()),
            from_path: Some(from_path.into()),
            to_path: None,
        }
    }
}

pub struct SanityHarness {
    role: Role,
    base: Url,
    step: StepContext,
    failures: Vec<RuntimeFailure>,
    benign: Vec<BenignConsole>,
}

impl SanityHarness {
    pub fn new(role: Role, base: Url) -> Self {
        Self {
            role,
            base,
            step: StepContext::default(),
            failures: Vec::new(),
            benign: Vec::new(),
        }
    }

    /// Replaces the step context. Called before every seed load and action.
    pub fn begin_step(&mut self, step: StepContext) {
        self.step = step;
    }

    /// Records where the current step's navigation ended up.
    pub fn mark_destination(&mut self, to_path: Option<String>) {
        self.step.to_path = to_path;
    }

    pub fn step(&self) -> &StepContext {
        &self.step
    }

    /// Classifies and attributes a batch of observations made on `url`.
    pub fn ingest(&mut self, observations: Vec<Observation>, url: &str) {
        for observation in observations {
            match observation {
                Observation::Console { level, text, source } => {
                    match classify_console(level, &text, source.as_deref()) {
                        ConsoleVerdict::Benign(rule) => {
                            debug!("Benign console message ({}): {}", rule, text);
                            self.benign.push(BenignConsole {
                                role: self.role.clone(),
                                entry_point: self.step.entry_point.clone(),
                                action_id: self.step.action_id.clone(),
                                from_path: self.step.from_path.clone(),
                                url: url.to_string(),
                                text,
                                rule: rule.to_string(),
                                timestamp: Utc::now(),
                            });
                        }
                        ConsoleVerdict::Critical(kind) => {
                            let mut meta = serde_json::Map::new();
                            if let Some(source) = source {
                                meta.insert("source".to_string(), source.into());
                            }
                            self.push(kind, url.to_string(), text, None, meta);
                        }
                        ConsoleVerdict::Ignored => {}
                    }
                }
                Observation::PageError { message, stack } => {
                    self.push(FailureKind::PageError, url.to_string(), message, stack, Default::default());
                }
                Observation::Response { url: response_url, status } => {
                    if status >= 500 && self.is_same_origin(&response_url) {
                        let mut meta = serde_json::Map::new();
                        meta.insert("status".to_string(), status.into());
                        let message = format!("HTTP {} from {}", status, response_url);
                        self.push(FailureKind::Http5xx, response_url, message, None, meta);
                    }
                }
            }
        }
    }

    /// Records a step that could not complete.
    pub fn record_fault(&mut self, fault: &StepFault, url: &str, label: &str) {
        let kind = match fault {
            StepFault::ActionDisappeared { .. } | StepFault::StabilizationTimeout { .. } => {
                FailureKind::StabilizationTimeout
            }
            StepFault::RedirectLoop { .. } => FailureKind::RedirectLoop,
            StepFault::Driver(_) => FailureKind::PageError,
        };

        let mut meta = serde_json::Map::new();
        meta.insert("label".to_string(), label.into());
        if let StepFault::RedirectLoop { transitions, .. } = fault {
            meta.insert("transitions".to_string(), (*transitions).into());
        }

        self.push(kind, url.to_string(), fault.to_string(), None, meta);
    }

    fn push(
        &mut self,
        kind: FailureKind,
        url: String,
        message: String,
        stack: Option<String>,
        meta: serde_json::Map<String, serde_json::Value>,
    ) {
        warn!("[{}] {} at {}: {}", self.role, kind, url, message);
        self.failures.push(RuntimeFailure {
            role: self.role.clone(),
            entry_point: self.step.entry_point.clone(),
            action_id: self.step.action_id.clone(),
            from_path: self.step.from_path.clone(),
            to_path: self.step.to_path.clone(),
            url,
            kind,
            message,
            stack,
            timestamp: Utc::now(),
            meta,
        });
    }

    fn is_same_origin(&self, url: &str) -> bool {
        Url::parse(url)
            .map(|u| u.origin() == self.base.origin())
            .unwrap_or(false)
    }

    pub fn failures(&self) -> &[RuntimeFailure] {
        &self.failures
    }

    pub fn benign(&self) -> &[BenignConsole] {
        &self.benign
    }

    pub fn into_parts(self) -> (Vec<RuntimeFailure>, Vec<BenignConsole>) {
        (self.failures, self.benign)
    }
}
