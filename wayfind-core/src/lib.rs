pub mod checkpoint;
pub mod error;
pub mod inventory;
pub mod report;
pub mod sweep;

pub use checkpoint::Checkpoint;
pub use error::{CoreError, Result};
pub use inventory::{OrphanReport, RouteInventory};
pub use report::RoleOutcome;
pub use sweep::{
    Authenticator, CheckpointPolicy, CookieFileAuth, DriverFactory, DriverKind, GuestOnly,
    InterruptedRole, RolePlan, SweepOptions, SweepReport, execute_sweep, preflight,
};
