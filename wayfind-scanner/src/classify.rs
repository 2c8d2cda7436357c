// Exclusion rules for discovered candidates

use crate::model::{ActionType, ExclusionReason};
use regex::RegexSet;
use std::sync::LazyLock;

static DESTRUCTIVE_LABELS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)sign\s*out",
        r"(?i)log\s*out",
        r"(?i)logout",
        r"(?i)delete",
        r"(?i)remove",
        r"(?i)destroy",
        r"(?i)\brefund\b",
        r"(?i)\bcharge\b",
        r"(?i)\bpay\b",
        r"(?i)\bpurchase\b",
        r"(?i)\bsubscribe\b",
        r"(?i)\bcancel booking\b",
        r"(?i)\bconfirm booking\b",
    ])
    .expect("static label patterns compile")
});

static EXCLUDED_HREFS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)^mailto:",
        r"(?i)^tel:",
        r"(?i)^javascript:",
        r"(?i)^/api/",
        r"^#",
    ])
    .expect("static href patterns compile")
});

const ROLE_SWITCHER_PREFIX: &str = "role-switcher";

/// Facts about a candidate the rules look at.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub action_type: ActionType,
    pub label: &'a str,
    pub href: Option<&'a str>,
    pub data_test_id: Option<&'a str>,
}

#[derive(Debug, Clone, Default)]
pub struct ActionRules {
    allowed_types: Option<Vec<ActionType>>,
}

impl ActionRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts traversal to the given action types. Remote runs use
    /// `link` and `menuitem` only.
    pub fn with_allowed_types(mut self, types: Vec<ActionType>) -> Self {
        self.allowed_types = Some(types);
        self
    }

    pub fn allowed_types(&self) -> Option<&[ActionType]> {
        self.allowed_types.as_deref()
    }

    /// Applies the exclusion rules in order and returns the first that fires.
    pub fn classify(&self, candidate: &Candidate<'_>) -> Option<ExclusionReason> {
        if let Some(ref allowed) = self.allowed_types
            && !allowed.contains(&candidate.action_type)
        {
            return Some(ExclusionReason::ActionTypeExcluded);
        }

        if is_excluded_label(candidate.label) {
            return Some(ExclusionReason::DestructiveOrAuthAction);
        }

        if let Some(href) = candidate.href
            && (is_excluded_href(href) || !is_same_origin_href(href))
        {
            return Some(ExclusionReason::ExternalOrNonPageLink);
        }

        if candidate
            .data_test_id
            .is_some_and(|id| id.starts_with(ROLE_SWITCHER_PREFIX))
        {
            return Some(ExclusionReason::RoleSwitcherCrossesRoleScope);
        }

        None
    }
}

pub fn is_excluded_label(label: &str) -> bool {
    DESTRUCTIVE_LABELS.is_match(label)
}

pub fn is_excluded_href(href: &str) -> bool {
    EXCLUDED_HREFS.is_match(href.trim())
}

/// Only root-relative paths count as same-origin navigation. Protocol-relative
/// `//host/...` links do not.
pub fn is_same_origin_href(href: &str) -> bool {
    let href = href.trim();
    href.starts_with('/') && !href.starts_with("//")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link<'a>(label: &'a str, href: &'a str) -> Candidate<'a> {
        Candidate {
            action_type: ActionType::Link,
            label,
            href: Some(href),
            data_test_id: None,
        }
    }

    #[test]
    fn test_plain_link_is_allowed() {
        assert_eq!(ActionRules::new().classify(&link("About", "/about")), None);
    }

    #[test]
    fn test_destructive_labels() {
        let rules = ActionRules::new();
        for label in [
            "Sign out",
            "Log Out",
            "logout",
            "Delete account",
            "Remove vendor",
            "Pay now",
            "Purchase",
            "Subscribe",
            "Refund",
            "Confirm booking",
            "Cancel Booking",
        ] {
            assert_eq!(
                rules.classify(&link(label, "/x")),
                Some(ExclusionReason::DestructiveOrAuthAction),
                "label {label:?} should be excluded"
            );
        }
        // word boundaries: "Payments" and "Discharge" are not "pay"/"charge"
        assert_eq!(rules.classify(&link("Payments", "/payments")), None);
        assert_eq!(rules.classify(&link("Discharge notes", "/notes")), None);
    }

    #[test]
    fn test_excluded_hrefs() {
        let rules = ActionRules::new();
        for href in [
            "mailto:help@example.com",
            "tel:+15551234",
            "javascript:void(0)",
            "/api/health",
            "#top",
            "https://elsewhere.dev/",
            "//cdn.example.com/x",
            "relative/path",
        ] {
            assert_eq!(
                rules.classify(&link("Go", href)),
                Some(ExclusionReason::ExternalOrNonPageLink),
                "href {href:?} should be excluded"
            );
        }
    }

    #[test]
    fn test_allow_list_checked_first() {
        let rules = ActionRules::new().with_allowed_types(vec![ActionType::Link, ActionType::Menuitem]);
        let button = Candidate {
            action_type: ActionType::Button,
            label: "Delete",
            href: None,
            data_test_id: None,
        };
        assert_eq!(
            rules.classify(&button),
            Some(ExclusionReason::ActionTypeExcluded)
        );
    }

    #[test]
    fn test_role_switcher_excluded() {
        let switcher = Candidate {
            action_type: ActionType::Button,
            label: "Switch to vendor",
            href: None,
            data_test_id: Some("role-switcher-vendor"),
        };
        assert_eq!(
            ActionRules::new().classify(&switcher),
            Some(ExclusionReason::RoleSwitcherCrossesRoleScope)
        );
    }
}
