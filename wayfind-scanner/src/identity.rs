use crate::model::{ActionType, Role};
use sha2::{Digest, Sha256};

/// The stable composite key an action id is derived from.
///
/// Nothing about the DOM node that produced the action goes into the key, so
/// re-discovering the same logical action on a fresh page load yields the
/// same id. Two actions with identical type, label and href on one page
/// collide.
#[derive(Debug, Clone, Copy)]
pub struct ActionKey<'a> {
    pub role: &'a Role,
    pub entry_point: &'a str,
    pub from_path: &'a str,
    pub action_type: ActionType,
    pub label: &'a str,
    pub href: Option<&'a str>,
}

impl ActionKey<'_> {
    pub fn stable_key(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}:{}",
            self.role,
            self.entry_point,
            self.from_path,
            self.action_type,
            self.label,
            self.href.unwrap_or("")
        )
    }

    pub fn action_id(&self) -> String {
        hash_key(&self.stable_key())
    }
}

fn hash_key(key: &str) -> String {
    hex::encode(Sha256::digest(key.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key<'a>(role: &'a Role, label: &'a str, href: Option<&'a str>) -> ActionKey<'a> {
        ActionKey {
            role,
            entry_point: "/",
            from_path: "/",
            action_type: ActionType::Link,
            label,
            href,
        }
    }

    #[test]
    fn test_same_inputs_same_id() {
        let role = Role::guest();
        let a = key(&role, "About", Some("/about")).action_id();
        let b = key(&role, "About", Some("/about")).action_id();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_each_component_changes_id() {
        let guest = Role::guest();
        let admin = Role::new("admin");
        let base = key(&guest, "About", Some("/about")).action_id();

        assert_ne!(base, key(&admin, "About", Some("/about")).action_id());
        assert_ne!(base, key(&guest, "Help", Some("/about")).action_id());
        assert_ne!(base, key(&guest, "About", Some("/help")).action_id());
        assert_ne!(base, key(&guest, "About", None).action_id());

        let mut other_type = key(&guest, "About", Some("/about"));
        other_type.action_type = ActionType::Menuitem;
        assert_ne!(base, other_type.action_id());

        let mut other_page = key(&guest, "About", Some("/about"));
        other_page.from_path = "/main";
        assert_ne!(base, other_page.action_id());
    }

    #[test]
    fn test_stable_key_layout() {
        let role = Role::guest();
        assert_eq!(
            key(&role, "About", None).stable_key(),
            "guest:/:/:link:About:"
        );
    }
}
