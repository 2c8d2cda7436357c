use crate::error::ScanError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The identity a traversal pass runs as (guest, customer, vendor, admin...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn guest() -> Self {
        Self::new("guest")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_guest(&self) -> bool {
        self.0 == "guest"
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Role::new(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Link,
    Button,
    Menuitem,
    Select,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Link => "link",
            ActionType::Button => "button",
            ActionType::Menuitem => "menuitem",
            ActionType::Select => "select",
        }
    }
}

impl FromStr for ActionType {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "link" => Ok(ActionType::Link),
            "button" => Ok(ActionType::Button),
            "menuitem" => Ok(ActionType::Menuitem),
            "select" => Ok(ActionType::Select),
            other => Err(ScanError::ParseError(format!("unknown action type '{}'", other))),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminating attributes kept alongside an action id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_test: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_test_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
}

/// A discovered interactive element that may change the visible page.
///
/// Only the `action_id` and the descriptive fields survive a navigation. The
/// element itself is re-resolved from a fresh snapshot before every
/// interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigableAction {
    pub action_id: String,
    pub role: Role,
    pub entry_point: String,
    pub from_path: String,
    pub label: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub meta: ActionMeta,
}

/// Why a discovered candidate was never enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExclusionReason {
    ActionTypeExcluded,
    DestructiveOrAuthAction,
    ExternalOrNonPageLink,
    RoleSwitcherCrossesRoleScope,
}

impl ExclusionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionReason::ActionTypeExcluded => "action-type-excluded",
            ExclusionReason::DestructiveOrAuthAction => "destructive-or-auth-action",
            ExclusionReason::ExternalOrNonPageLink => "external-or-non-page-link",
            ExclusionReason::RoleSwitcherCrossesRoleScope => "role-switcher-crosses-role-scope",
        }
    }
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
