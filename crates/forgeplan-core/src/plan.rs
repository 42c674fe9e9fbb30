//! The immutable migration plan and its entity records.
//!
//! Every record keeps the GitLab-origin ids (`gitlab_*` fields); those never
//! share a numbering space with ids assigned by Forgejo during apply.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One Forgejo organization to create, derived from a GitLab group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrgPlan {
    /// Flattened org name: the full group path with `/` replaced by `-`.
    pub name: String,
    pub full_path: String,
    pub gitlab_namespace_id: i64,
    pub description: Option<String>,
}

/// One repository to create, with the on-disk bundle locations to push from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoPlan {
    pub owner: String,
    pub name: String,
    pub gitlab_project_id: i64,
    /// Hashed storage path inside the backup, used to locate uploads.
    pub gitlab_disk_path: String,
    pub bundle_path: PathBuf,
    pub refs_path: PathBuf,
    pub wiki_bundle_path: PathBuf,
    pub wiki_refs_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPlan {
    pub gitlab_user_id: i64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub state: String,
    pub avatar: Option<String>,
    /// Bcrypt hash from GitLab, carried for the SQL fast-path rewrite.
    pub gitlab_encrypted_password: Option<String>,
    pub gitlab_otp_required_for_login: bool,
}

/// An SSH public key owned by a migrated user (DeployKey rows are excluded).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshKeyPlan {
    pub gitlab_key_id: i64,
    pub gitlab_user_id: i64,
    pub title: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelPlan {
    pub gitlab_label_id: i64,
    pub title: String,
    pub color: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuePlan {
    pub gitlab_issue_id: i64,
    pub gitlab_issue_iid: i64,
    pub gitlab_project_id: i64,
    pub title: String,
    pub description: String,
    pub author_id: i64,
    pub state_id: i64,
    pub created_unix: i64,
    pub updated_unix: i64,
    pub closed_unix: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequestPlan {
    pub gitlab_mr_id: i64,
    pub gitlab_mr_iid: i64,
    pub gitlab_target_project_id: i64,
    pub gitlab_source_project_id: Option<i64>,
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: String,
    pub author_id: i64,
    pub state_id: i64,
    /// Empty string when the MR had no resolvable diff.
    pub head_commit_sha: String,
    pub base_commit_sha: String,
    pub created_unix: i64,
    pub updated_unix: i64,
    pub closed_unix: i64,
}

/// The entity a note is attached to. Keeping this a sum type means issue
/// and merge request ids cannot be confused during resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "id")]
pub enum Noteable {
    Issue(i64),
    MergeRequest(i64),
}

impl Noteable {
    pub fn id(&self) -> i64 {
        match self {
            Noteable::Issue(id) | Noteable::MergeRequest(id) => *id,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Noteable::Issue(_) => "Issue",
            Noteable::MergeRequest(_) => "MergeRequest",
        }
    }
}

impl fmt::Display for Noteable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name(), self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotePlan {
    pub gitlab_note_id: i64,
    pub gitlab_project_id: i64,
    pub noteable: Noteable,
    pub author_id: i64,
    pub body: String,
    pub created_unix: i64,
    pub updated_unix: i64,
}

/// The fully resolved, self-contained migration plan.
///
/// Built once by [`crate::builder::build_plan`] and never mutated. Every
/// collection carries a deterministic sort order so that two builds over
/// the same backup compare equal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub backup_id: String,
    pub orgs: Vec<OrgPlan>,
    pub repos: Vec<RepoPlan>,
    pub users: Vec<UserPlan>,
    /// org name -> username -> effective (ancestor-inherited) access level.
    pub org_members: BTreeMap<String, BTreeMap<String, i64>>,
    pub issues: Vec<IssuePlan>,
    pub merge_requests: Vec<MergeRequestPlan>,
    pub notes: Vec<NotePlan>,
    pub labels: Vec<LabelPlan>,
    pub issue_label_ids_by_gitlab_issue_id: BTreeMap<i64, Vec<i64>>,
    pub mr_label_ids_by_gitlab_mr_id: BTreeMap<i64, Vec<i64>>,
    pub user_ssh_keys: Vec<SshKeyPlan>,
    pub uploads_tar_path: Option<PathBuf>,
}

impl Plan {
    /// JSON dump of the whole plan, for dry runs and diffable re-migrations.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
