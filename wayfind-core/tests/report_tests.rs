// Tests for sweep artifact generation

use chrono::Utc;
use std::collections::BTreeMap;
use tempfile::TempDir;
use url::Url;
use wayfind_core::inventory::{OrphanReport, RouteEntry};
use wayfind_core::report::{
    ReportWriter, RoleOutcome, failure_counts, generate_summary, generate_text_summary,
};
use wayfind_scanner::model::ActionMeta;
use wayfind_scanner::result::{BenignConsole, ExcludedAction};
use wayfind_scanner::{
    ActionType, ExclusionReason, FailureKind, Role, RuntimeFailure, TraversalArtifacts,
    TraversalEdge,
};

fn base() -> Url {
    Url::parse("http://localhost:3000").unwrap()
}

fn failure(role: &str, kind: FailureKind, message: &str) -> RuntimeFailure {
    RuntimeFailure {
        role: Role::new(role),
        entry_point: "/".to_string(),
        action_id: None,
        from_path: Some("/".to_string()),
        to_path: None,
        url: "http://localhost:3000/".to_string(),
        kind,
        message: message.to_string(),
        stack: None,
        timestamp: Utc::now(),
        meta: serde_json::Map::new(),
    }
}

fn guest_outcome() -> RoleOutcome {
    let role = Role::guest();
    let artifacts = TraversalArtifacts {
        edges: vec![TraversalEdge {
            role: role.clone(),
            entry_point: "/".to_string(),
            from_path: "/".to_string(),
            action_id: "abc".to_string(),
            action_label: "About".to_string(),
            action_type: ActionType::Link,
            action_meta: ActionMeta {
                href: Some("/about".to_string()),
                ..Default::default()
            },
            to_path: "/about".to_string(),
            to_url: "http://localhost:3000/about".to_string(),
        }],
        visited_paths: vec!["/".to_string(), "/about".to_string()],
        executed_action_ids: vec!["abc".to_string()],
        excluded_actions: vec![ExcludedAction {
            role: role.clone(),
            entry_point: "/".to_string(),
            from_path: "/".to_string(),
            label: "Sign out".to_string(),
            reason: ExclusionReason::DestructiveOrAuthAction,
        }],
        depth_by_path: BTreeMap::from([("/".to_string(), 0), ("/about".to_string(), 1)]),
        failures: Vec::new(),
        benign_console: vec![BenignConsole {
            role: role.clone(),
            entry_point: "/".to_string(),
            action_id: None,
            from_path: Some("/".to_string()),
            url: "http://localhost:3000/".to_string(),
            text: "Failed to load resource: the server responded with a status of 401".to_string(),
            rule: "unauthorized-resource".to_string(),
            timestamp: Utc::now(),
        }],
    };
    RoleOutcome::new(role, vec!["/".to_string()], artifacts)
}

fn admin_outcome() -> RoleOutcome {
    let artifacts = TraversalArtifacts {
        visited_paths: vec!["/admin".to_string()],
        failures: vec![
            failure("admin", FailureKind::HydrationMismatch, "Hydration failed because the initial UI does not match"),
            failure("admin", FailureKind::Http5xx, "GET /api/stats returned 500"),
            failure("admin", FailureKind::Http5xx, "GET /api/users returned 502"),
        ],
        ..Default::default()
    };
    RoleOutcome::new(Role::new("admin"), vec!["/admin".to_string()], artifacts)
}

fn read_json(dir: &TempDir, name: &str) -> serde_json::Value {
    let raw = std::fs::read_to_string(dir.path().join(name)).unwrap();
    serde_json::from_str(&raw).unwrap()
}

// ============================================================================
// Per-role Artifact Tests
// ============================================================================

#[test]
fn test_write_role_artifacts() {
    let dir = TempDir::new().unwrap();
    let writer = ReportWriter::new(dir.path(), base()).unwrap();
    writer.write_role(&guest_outcome()).unwrap();

    let graph = read_json(&dir, "navigation-graph.guest.json");
    assert_eq!(graph["role"], "guest");
    assert_eq!(graph["start"], "http://localhost:3000/");
    assert_eq!(graph["entryPoints"], serde_json::json!(["/"]));
    assert_eq!(graph["visitedPaths"], serde_json::json!(["/", "/about"]));
    assert_eq!(graph["executedActionIds"], serde_json::json!(["abc"]));
    assert_eq!(graph["edges"][0]["toPath"], "/about");
    assert_eq!(graph["edges"][0]["actionType"], "link");
    assert_eq!(graph["excludedActions"][0]["reason"], "destructive-or-auth-action");
    assert!(graph["generatedAt"].is_string());

    let failures = read_json(&dir, "runtime-failures.guest.json");
    assert_eq!(failures["failures"], serde_json::json!([]));
    assert_eq!(failures["benignConsole"][0]["rule"], "unauthorized-resource");
}

#[test]
fn test_failure_records_use_wire_names() {
    let dir = TempDir::new().unwrap();
    let writer = ReportWriter::new(dir.path(), base()).unwrap();
    writer.write_role(&admin_outcome()).unwrap();

    let failures = read_json(&dir, "runtime-failures.admin.json");
    let kinds: Vec<_> = failures["failures"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(kinds, vec!["hydration-mismatch", "http-5xx", "http-5xx"]);
}

// ============================================================================
// Aggregate Tests
// ============================================================================

#[test]
fn test_write_aggregate_merges_roles() {
    let dir = TempDir::new().unwrap();
    let writer = ReportWriter::new(dir.path(), base()).unwrap();
    writer.write_aggregate(&[guest_outcome(), admin_outcome()]).unwrap();

    let graph = read_json(&dir, "navigation-graph.json");
    assert_eq!(graph["roles"], serde_json::json!(["guest", "admin"]));
    assert_eq!(graph["visitedPaths"], serde_json::json!(["/", "/about", "/admin"]));
    assert_eq!(graph["edges"].as_array().unwrap().len(), 1);

    let failures = read_json(&dir, "runtime-failures.json");
    assert_eq!(failures["failures"].as_array().unwrap().len(), 3);
    assert_eq!(failures["benignConsole"].as_array().unwrap().len(), 1);
}

#[test]
fn test_zero_coverage_still_writes_artifacts() {
    let dir = TempDir::new().unwrap();
    let writer = ReportWriter::new(dir.path().join("out"), base()).unwrap();
    let empty = RoleOutcome::new(Role::guest(), vec!["/".to_string()], TraversalArtifacts::default());

    writer.write_role(&empty).unwrap();
    writer.write_aggregate(std::slice::from_ref(&empty)).unwrap();
    writer.write_summary(std::slice::from_ref(&empty), None).unwrap();

    for name in [
        "navigation-graph.guest.json",
        "runtime-failures.guest.json",
        "navigation-graph.json",
        "runtime-failures.json",
        "summary.md",
    ] {
        assert!(dir.path().join("out").join(name).exists(), "missing {}", name);
    }
}

// ============================================================================
// Summary Tests
// ============================================================================

fn orphan_report() -> OrphanReport {
    let entry = |p: &str, f: &str| RouteEntry {
        pattern: p.to_string(),
        source_file: f.to_string(),
    };
    OrphanReport {
        generated_at: Utc::now(),
        inventory: vec![entry("/", "page.tsx"), entry("/admin/[id]/edit", "admin/[id]/edit/page.tsx")],
        excluded_inventory: Vec::new(),
        reachable_patterns: vec!["/".to_string()],
        orphans: vec![entry("/admin/[id]/edit", "admin/[id]/edit/page.tsx")],
    }
}

#[test]
fn test_failure_counts_by_kind() {
    let counts = failure_counts(&[guest_outcome(), admin_outcome()]);
    assert_eq!(counts.get(&FailureKind::Http5xx), Some(&2));
    assert_eq!(counts.get(&FailureKind::HydrationMismatch), Some(&1));
    assert_eq!(counts.get(&FailureKind::PageError), None);
}

#[test]
fn test_summary_contains_rollup() {
    let orphans = orphan_report();
    let md = generate_summary(&[guest_outcome(), admin_outcome()], Some(&orphans), &base());

    assert!(md.contains("- **Edges recorded**: 1"));
    assert!(md.contains("- **Runtime failures**: 3"));
    assert!(md.contains("- **Orphan route patterns**: 1"));
    assert!(md.contains("| guest | / | 2 | 1 | 1 | 1 | 0 | 1 |"));
    assert!(md.contains("| admin | /admin | 1 | 0 | 0 | 0 | 3 | 0 |"));
    assert!(md.contains("- `http-5xx`: 2"));
    assert!(md.contains("**admin** hydration-mismatch"));
    assert!(md.contains("`/admin/[id]/edit`"));
}

#[test]
fn test_summary_lists_at_most_ten_failures() {
    let artifacts = TraversalArtifacts {
        failures: (0..15)
            .map(|i| failure("guest", FailureKind::PageError, &format!("boom {}", i)))
            .collect(),
        ..Default::default()
    };
    let outcome = RoleOutcome::new(Role::guest(), vec!["/".to_string()], artifacts);
    let md = generate_summary(&[outcome], None, &base());

    assert!(md.contains("boom 9"));
    assert!(!md.contains("boom 10"));
    assert!(md.contains("- `pageerror`: 15"));
    assert!(md.contains("not scanned"));
}

#[test]
fn test_text_summary_sections() {
    let orphans = orphan_report();
    let text = generate_text_summary(&[guest_outcome(), admin_outcome()], Some(&orphans));

    assert!(text.contains("━━━ ROLES"));
    assert!(text.contains("━━━ FAILURES"));
    assert!(text.contains("━━━ ROUTES"));
    assert!(text.contains("1 reachable of 2 pattern(s), 1 orphan(s)"));
}

#[test]
fn test_text_summary_omits_failures_when_clean() {
    let text = generate_text_summary(&[guest_outcome()], None);
    assert!(!text.contains("FAILURES"));
    assert!(!text.contains("ROUTES"));
}
