// ABOUTME: Blue-green deployment orchestration using the type state pattern.
// ABOUTME: Exports the Orchestrator, pipeline states, site locks, and deployment errors.

mod actions;
mod build_log;
mod error;
mod lock;
mod orchestrator;
mod pipeline;
mod state;

pub use actions::{ACTIONS_DIR, discover_actions};
pub use build_log::BuildLog;
pub use error::{DeployError, DeployErrorKind};
pub use lock::{LockInfo, SiteLockGuard, SiteLocks};
pub use orchestrator::{DeployOutcome, DeploySettings, Orchestrator};
pub use pipeline::{Deps, Pipeline, TransitionResult};
pub use state::{Built, Cloned, Completed, HealthChecked, Initialized, Started, Switched};
