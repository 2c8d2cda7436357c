pub mod browser;
pub mod classify;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod fetch;
pub mod harness;
pub mod identity;
pub mod model;
pub mod path;
pub mod result;
pub mod stabilize;
pub mod traversal;

pub use browser::{ChromeConfig, ChromeDriver};
pub use classify::ActionRules;
pub use driver::{PageDriver, SessionCookie};
pub use error::{ScanError, StepFault};
pub use fetch::StaticDriver;
pub use harness::SanityHarness;
pub use model::{ActionType, ExclusionReason, NavigableAction, Role};
pub use path::PagePath;
pub use result::{FailureKind, RuntimeFailure, TraversalArtifacts, TraversalEdge};
pub use stabilize::StabilizeConfig;
pub use traversal::{ProgressCallback, Traversal, TraversalOptions};
