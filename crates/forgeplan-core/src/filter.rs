//! Narrow a built plan down to a single repository.
//!
//! Useful for fast iteration: the narrowed plan keeps only the selected
//! repo's org, issues, MRs, notes, the labels those still reference, and
//! the users that still interact with something (or remain org members).

use std::collections::{BTreeMap, HashSet};

use crate::error::{PlanError, Result};
use crate::plan::Plan;

/// A repo selector: `owner/repo` (Forgejo form, owner already flattened)
/// or `group/subgroup/repo` (GitLab form, groups joined with `-`), or a
/// bare repo name when unambiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoSelector {
    pub owner: Option<String>,
    pub repo: String,
}

impl RepoSelector {
    pub fn parse(value: &str) -> Result<Self> {
        let raw = value.trim().trim_matches('/');
        let parts: Vec<&str> = raw.split('/').filter(|p| !p.is_empty()).collect();
        match parts.as_slice() {
            [] => Err(PlanError::InvalidArgument(
                "repo selector must not be empty".to_string(),
            )),
            [repo] => Ok(RepoSelector {
                owner: None,
                repo: repo.to_string(),
            }),
            [groups @ .., repo] => Ok(RepoSelector {
                owner: Some(groups.join("-")),
                repo: repo.to_string(),
            }),
        }
    }
}

/// Produce a new plan holding only the repo matched by `selector`.
///
/// Errors when nothing matches, or when a bare repo name matches repos
/// under several owners.
pub fn filter_to_single_repo(plan: &Plan, selector: &RepoSelector) -> Result<Plan> {
    let matches: Vec<_> = plan
        .repos
        .iter()
        .filter(|r| {
            r.name == selector.repo
                && selector.owner.as_ref().map_or(true, |owner| &r.owner == owner)
        })
        .collect();

    if matches.is_empty() {
        let hint = match &selector.owner {
            Some(owner) => format!("{owner}/{}", selector.repo),
            None => selector.repo.clone(),
        };
        return Err(PlanError::InvalidArgument(format!(
            "repo selector {hint:?} did not match any planned repo"
        )));
    }
    if matches.len() > 1 {
        let mut options: Vec<String> = matches
            .iter()
            .map(|r| format!("{}/{}", r.owner, r.name))
            .collect();
        options.sort();
        options.dedup();
        return Err(PlanError::InvalidArgument(format!(
            "repo selector {:?} is ambiguous; choose one of: {}",
            selector.repo,
            options.join(", ")
        )));
    }

    let selected = matches[0];
    let project_id = selected.gitlab_project_id;
    let owner = selected.owner.clone();

    let orgs: Vec<_> = plan.orgs.iter().filter(|o| o.name == owner).cloned().collect();
    let repos: Vec<_> = plan
        .repos
        .iter()
        .filter(|r| r.gitlab_project_id == project_id)
        .cloned()
        .collect();
    let org_members: BTreeMap<_, _> = plan
        .org_members
        .iter()
        .filter(|(name, _)| **name == owner)
        .map(|(name, members)| (name.clone(), members.clone()))
        .collect();
    let issues: Vec<_> = plan
        .issues
        .iter()
        .filter(|i| i.gitlab_project_id == project_id)
        .cloned()
        .collect();
    let merge_requests: Vec<_> = plan
        .merge_requests
        .iter()
        .filter(|mr| mr.gitlab_target_project_id == project_id)
        .cloned()
        .collect();
    let notes: Vec<_> = plan
        .notes
        .iter()
        .filter(|n| n.gitlab_project_id == project_id)
        .cloned()
        .collect();

    let issue_ids: HashSet<i64> = issues.iter().map(|i| i.gitlab_issue_id).collect();
    let mr_ids: HashSet<i64> = merge_requests.iter().map(|mr| mr.gitlab_mr_id).collect();

    let issue_label_ids: BTreeMap<i64, Vec<i64>> = plan
        .issue_label_ids_by_gitlab_issue_id
        .iter()
        .filter(|(id, _)| issue_ids.contains(id))
        .map(|(id, labels)| (*id, labels.clone()))
        .collect();
    let mr_label_ids: BTreeMap<i64, Vec<i64>> = plan
        .mr_label_ids_by_gitlab_mr_id
        .iter()
        .filter(|(id, _)| mr_ids.contains(id))
        .map(|(id, labels)| (*id, labels.clone()))
        .collect();

    let referenced_label_ids: HashSet<i64> = issue_label_ids
        .values()
        .chain(mr_label_ids.values())
        .flatten()
        .copied()
        .collect();
    let labels: Vec<_> = plan
        .labels
        .iter()
        .filter(|l| referenced_label_ids.contains(&l.gitlab_label_id))
        .cloned()
        .collect();

    let member_usernames: HashSet<&str> = org_members
        .values()
        .flat_map(|members| members.keys().map(String::as_str))
        .collect();
    let interacting_user_ids: HashSet<i64> = issues
        .iter()
        .map(|i| i.author_id)
        .chain(merge_requests.iter().map(|mr| mr.author_id))
        .chain(notes.iter().map(|n| n.author_id))
        .collect();
    let users: Vec<_> = plan
        .users
        .iter()
        .filter(|u| {
            interacting_user_ids.contains(&u.gitlab_user_id)
                || member_usernames.contains(u.username.as_str())
        })
        .cloned()
        .collect();

    let kept_user_ids: HashSet<i64> = users.iter().map(|u| u.gitlab_user_id).collect();
    let user_ssh_keys: Vec<_> = plan
        .user_ssh_keys
        .iter()
        .filter(|k| kept_user_ids.contains(&k.gitlab_user_id))
        .cloned()
        .collect();

    // Source lists are already sorted and filtering preserves order.
    Ok(Plan {
        backup_id: plan.backup_id.clone(),
        orgs,
        repos,
        users,
        org_members,
        issues,
        merge_requests,
        notes,
        labels,
        issue_label_ids_by_gitlab_issue_id: issue_label_ids,
        mr_label_ids_by_gitlab_mr_id: mr_label_ids,
        user_ssh_keys,
        uploads_tar_path: plan.uploads_tar_path.clone(),
    })
}
