// ABOUTME: Type-safe identifiers and validated domain types.
// ABOUTME: Uses phantom types to prevent ID confusion at compile time.

mod branch_name;
mod id;
mod site_name;

pub use branch_name::{BranchName, BranchNameError};
pub use id::{DeploymentId, Id, SessionId, SiteId, UserId};
pub use site_name::{SiteName, SiteNameError};
