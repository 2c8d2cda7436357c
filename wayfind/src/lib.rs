// Include handlers module directly from handlers.rs
#[path = "handlers.rs"]
pub mod handlers;

// Re-export commonly used handler functions for convenience
pub use handlers::{
    is_remote_base_url, parse_action_types, parse_role_seeds, parse_seeds, plan_roles,
    resolve_target_defaults,
};
