use crate::classify::{ActionRules, Candidate};
use crate::driver::{Container, DiscoveryScope, ElementSnapshot, PageDriver, ToggleOutcome};
use crate::error::Result;
use crate::identity::ActionKey;
use crate::model::{ActionMeta, ActionType, NavigableAction, Role};
use crate::result::ExcludedAction;
use std::collections::HashSet;
use tracing::{debug, warn};

const MAX_LABEL_CHARS: usize = 140;
const NO_TEXT_LABEL: &str = "(no-text)";

/// A discovered action together with the snapshot handle that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub action: NavigableAction,
    pub handle: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    /// Non-excluded actions, deduplicated by id and sorted by id.
    pub actions: Vec<Located>,
    pub excluded: Vec<ExcludedAction>,
}

impl Discovery {
    pub fn find(&self, action_id: &str) -> Option<&Located> {
        self.actions
            .binary_search_by(|l| l.action.action_id.as_str().cmp(action_id))
            .ok()
            .map(|i| &self.actions[i])
    }
}

/// Where the page being scanned sits in the traversal.
#[derive(Debug, Clone, Copy)]
pub struct PageContext<'a> {
    pub role: &'a Role,
    pub entry_point: &'a str,
    pub from_path: &'a str,
}

/// Expands collapsed navigation, snapshots the page and classifies every
/// candidate.
pub async fn discover<D>(
    driver: &mut D,
    page: PageContext<'_>,
    scope: DiscoveryScope,
    rules: &ActionRules,
) -> Result<Discovery>
where
    D: PageDriver + ?Sized,
{
    match driver.open_toggles().await {
        Ok(ToggleOutcome::Opened(n)) => debug!("Opened {} navigation toggle(s) on {}", n, page.from_path),
        Ok(ToggleOutcome::NothingToOpen) => {}
        Err(e) => warn!("Could not open navigation toggles on {}: {}", page.from_path, e),
    }

    let elements = driver.snapshot(scope).await?;
    let discovery = classify_snapshot(&elements, page, scope, rules);
    debug!(
        "Discovered {} action(s) and {} exclusion(s) on {}",
        discovery.actions.len(),
        discovery.excluded.len(),
        page.from_path
    );
    Ok(discovery)
}

/// Turns a snapshot into drafts. Duplicates keep the first DOM occurrence.
pub fn classify_snapshot(
    elements: &[ElementSnapshot],
    page: PageContext<'_>,
    scope: DiscoveryScope,
    rules: &ActionRules,
) -> Discovery {
    let mut seen = HashSet::new();
    let mut discovery = Discovery::default();

    for el in elements {
        if !el.visible || !el.enabled || !in_scope(el, scope) {
            continue;
        }

        let label = resolve_label(el);
        let action_type = resolve_type(el);
        let href = el.href.as_deref();

        let candidate = Candidate {
            action_type,
            label: &label,
            href,
            data_test_id: el.data_test_id.as_deref(),
        };

        if let Some(reason) = rules.classify(&candidate) {
            discovery.excluded.push(ExcludedAction {
                role: page.role.clone(),
                entry_point: page.entry_point.to_string(),
                from_path: page.from_path.to_string(),
                label,
                reason,
            });
            continue;
        }

        let action_id = ActionKey {
            role: page.role,
            entry_point: page.entry_point,
            from_path: page.from_path,
            action_type,
            label: &label,
            href,
        }
        .action_id();

        if !seen.insert(action_id.clone()) {
            continue;
        }

        discovery.actions.push(Located {
            action: NavigableAction {
                action_id,
                role: page.role.clone(),
                entry_point: page.entry_point.to_string(),
                from_path: page.from_path.to_string(),
                label,
                action_type,
                meta: ActionMeta {
                    href: el.href.clone(),
                    data_test: el.data_test.clone(),
                    data_test_id: el.data_test_id.clone(),
                    aria_label: el.aria_label.clone(),
                },
            },
            handle: el.handle,
        });
    }

    discovery
        .actions
        .sort_by(|a, b| a.action.action_id.cmp(&b.action.action_id));
    discovery
}

// Main-content candidates are plain links, and only when asked for.
fn in_scope(el: &ElementSnapshot, scope: DiscoveryScope) -> bool {
    match el.container {
        Container::Nav | Container::Aside => true,
        Container::Main => scope.include_main_content && el.tag == "a" && el.href.is_some(),
    }
}

/// `aria-label`, then `title`, then collapsed inner text, then `(no-text)`.
pub fn resolve_label(el: &ElementSnapshot) -> String {
    let explicit = [el.aria_label.as_deref(), el.title.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty());
    if let Some(label) = explicit {
        return label.to_string();
    }

    let collapsed = el.text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return NO_TEXT_LABEL.to_string();
    }
    collapsed.chars().take(MAX_LABEL_CHARS).collect()
}

pub fn resolve_type(el: &ElementSnapshot) -> ActionType {
    if el.tag == "a" {
        return ActionType::Link;
    }
    if el.role.as_deref().is_some_and(|r| r.starts_with("menuitem")) {
        return ActionType::Menuitem;
    }
    if el.tag == "select" {
        return ActionType::Select;
    }
    ActionType::Button
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExclusionReason;

    fn anchor(handle: usize, text: &str, href: &str) -> ElementSnapshot {
        ElementSnapshot {
            handle,
            tag: "a".to_string(),
            text: text.to_string(),
            href: Some(href.to_string()),
            visible: true,
            enabled: true,
            ..Default::default()
        }
    }

    fn scope(include_main_content: bool) -> DiscoveryScope {
        DiscoveryScope { include_main_content }
    }

    #[test]
    fn test_label_precedence() {
        let mut el = anchor(0, "  Go\n   home  ", "/");
        assert_eq!(resolve_label(&el), "Go home");

        el.title = Some("Home title".to_string());
        assert_eq!(resolve_label(&el), "Home title");

        el.aria_label = Some("Home".to_string());
        assert_eq!(resolve_label(&el), "Home");

        el.aria_label = Some("   ".to_string());
        assert_eq!(resolve_label(&el), "Home title");
    }

    #[test]
    fn test_label_cap_and_empty() {
        let long = "x".repeat(300);
        assert_eq!(resolve_label(&anchor(0, &long, "/")).chars().count(), 140);
        assert_eq!(resolve_label(&anchor(0, " \n ", "/")), "(no-text)");
    }

    #[test]
    fn test_type_resolution() {
        let mut el = ElementSnapshot {
            tag: "div".to_string(),
            ..Default::default()
        };
        assert_eq!(resolve_type(&el), ActionType::Button);
        el.role = Some("menuitemradio".to_string());
        assert_eq!(resolve_type(&el), ActionType::Menuitem);
        el.role = None;
        el.tag = "select".to_string();
        assert_eq!(resolve_type(&el), ActionType::Select);
        el.tag = "a".to_string();
        el.role = Some("menuitem".to_string());
        assert_eq!(resolve_type(&el), ActionType::Link);
    }

    #[test]
    fn test_hidden_and_disabled_dropped() {
        let role = Role::guest();
        let page = PageContext { role: &role, entry_point: "/", from_path: "/" };
        let mut hidden = anchor(0, "About", "/about");
        hidden.visible = false;
        let mut disabled = anchor(1, "Help", "/help");
        disabled.enabled = false;

        let found = classify_snapshot(&[hidden, disabled], page, scope(true), &ActionRules::new());
        assert!(found.actions.is_empty());
        assert!(found.excluded.is_empty());
    }

    #[test]
    fn test_dedup_keeps_first_and_sorts() {
        let role = Role::guest();
        let page = PageContext { role: &role, entry_point: "/", from_path: "/" };
        let elements = vec![
            anchor(0, "About", "/about"),
            anchor(1, "Help", "/help"),
            anchor(2, "About", "/about"),
            anchor(3, "Sign out", "/logout"),
        ];

        let found = classify_snapshot(&elements, page, scope(true), &ActionRules::new());
        assert_eq!(found.actions.len(), 2);
        let ids: Vec<_> = found.actions.iter().map(|l| l.action.action_id.clone()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);

        let about = found
            .actions
            .iter()
            .find(|l| l.action.label == "About")
            .unwrap();
        assert_eq!(about.handle, 0);
        assert!(found.find(&about.action.action_id).is_some());

        assert_eq!(found.excluded.len(), 1);
        assert_eq!(found.excluded[0].reason, ExclusionReason::DestructiveOrAuthAction);
    }

    #[test]
    fn test_main_content_links_toggle() {
        let role = Role::guest();
        let page = PageContext { role: &role, entry_point: "/", from_path: "/" };
        let mut link = anchor(0, "Read more", "/blog/1");
        link.container = Container::Main;
        let button = ElementSnapshot {
            handle: 1,
            tag: "button".to_string(),
            text: "Expand".to_string(),
            visible: true,
            enabled: true,
            container: Container::Main,
            ..Default::default()
        };
        let elements = vec![link, button];

        let off = classify_snapshot(&elements, page, scope(false), &ActionRules::new());
        assert!(off.actions.is_empty());

        let on = classify_snapshot(&elements, page, scope(true), &ActionRules::new());
        assert_eq!(on.actions.len(), 1);
        assert_eq!(on.actions[0].action.label, "Read more");
    }
}
