pub mod builder;
pub mod copy;
pub mod error;
pub mod filter;
pub mod membership;
pub mod namespace;
pub mod plan;

// Re-export primary types for convenience
pub use builder::build_plan;
pub use copy::{CopyRows, Row};
pub use error::{PlanError, Result};
pub use filter::{filter_to_single_repo, RepoSelector};
pub use membership::{AccessTier, MembershipLedger};
pub use namespace::{GroupNamespace, NamespaceTree};
pub use plan::{
    IssuePlan, LabelPlan, MergeRequestPlan, NotePlan, Noteable, OrgPlan, Plan, RepoPlan,
    SshKeyPlan, UserPlan,
};
