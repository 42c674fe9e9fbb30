//! Builds a [`Plan`] from an extracted GitLab backup directory.
//!
//! The database dump cannot be rewound or queried, so the plan is assembled
//! in sequential linear passes over the same file:
//!
//! 1. structure: `shards` + `project_repositories` + `namespaces` + `projects`
//! 2. entities: `members`, `issues`, `merge_requests`, `notes`, `users`,
//!    `labels`, `keys`
//! 2.5. `label_links`, against the id sets staged by pass 2
//! 3. `merge_request_diffs`, against the diff ids staged by pass 2
//!
//! Each pass only reads the lookup tables produced by earlier passes, never
//! mutates them. `build_plan` is a pure function of its arguments: calling
//! it twice over the same backup yields equal plans.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime};

use crate::copy::{table_set, CopyRows};
use crate::error::{PlanError, Result};
use crate::membership::MembershipLedger;
use crate::namespace::{GroupNamespace, NamespaceTree};
use crate::plan::{
    IssuePlan, LabelPlan, MergeRequestPlan, NotePlan, Noteable, OrgPlan, Plan, RepoPlan,
    SshKeyPlan, UserPlan,
};

/// Build the migration plan for everything under `root_group_path`.
#[cfg_attr(feature = "observability", tracing::instrument(skip(backup_root)))]
pub fn build_plan(backup_root: &Path, root_group_path: &str) -> Result<Plan> {
    let backup_id = read_backup_id(backup_root)?;
    let db_path = locate_dump(backup_root)?;

    let structure = resolve_structure(&db_path, backup_root, &backup_id, root_group_path)?;
    let entities = collect_entities(&db_path, &structure)?;
    let (issue_label_ids, mr_label_ids) = resolve_label_links(&db_path, &entities)?;
    let sha_by_diff_id = resolve_diff_shas(&db_path, &entities.merge_request_diff_ids)?;

    assemble(backup_root, backup_id, structure, entities, issue_label_ids, mr_label_ids, sha_by_diff_id)
}

fn read_backup_id(backup_root: &Path) -> Result<String> {
    let info_path = backup_root.join("backup_information.yml");
    let contents = fs::read(&info_path)?;
    let contents = String::from_utf8_lossy(&contents);
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix(":backup_id:") {
            let value = rest.trim();
            if !value.is_empty() && !value.chars().any(char::is_whitespace) {
                return Ok(value.to_string());
            }
        }
    }
    Err(PlanError::MissingBackupId { path: info_path })
}

fn locate_dump(backup_root: &Path) -> Result<PathBuf> {
    let gz = backup_root.join("db/database.sql.gz");
    if gz.exists() {
        return Ok(gz);
    }
    let plain = backup_root.join("db/database.sql");
    if plain.exists() {
        return Ok(plain);
    }
    Err(PlanError::MissingDump {
        backup_root: backup_root.to_path_buf(),
    })
}

/// Parse a PostgreSQL `int[]` literal like `{1,5,9}`.
fn parse_pg_int_array(raw: Option<&str>) -> Result<Vec<i64>> {
    let raw = match raw {
        None | Some("") | Some("{}") => return Ok(Vec::new()),
        Some(raw) => raw,
    };
    let inner = raw
        .strip_prefix('{')
        .and_then(|r| r.strip_suffix('}'))
        .ok_or_else(|| PlanError::ArrayLiteral {
            raw: raw.to_string(),
        })?;
    inner
        .split(',')
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse().map_err(|_| PlanError::ArrayLiteral {
                raw: raw.to_string(),
            })
        })
        .collect()
}

/// Parse an ISO-ish dump timestamp into Unix seconds; absent or
/// unparseable values become 0.
///
/// GitLab dumps mix bare literals (UTC implied), `Z`, `+HH:MM`, `+HHMM`,
/// and `+HH` offsets.
fn parse_timestamp_unix(raw: Option<&str>) -> i64 {
    let Some(raw) = raw else { return 0 };
    let value = raw.trim();
    if value.is_empty() {
        return 0;
    }

    let bytes = value.as_bytes();
    let normalized = if let Some(stripped) = value.strip_suffix('Z') {
        format!("{stripped}+00:00")
    } else if bytes.len() >= 5
        && matches!(bytes[bytes.len() - 5], b'+' | b'-')
        && bytes[bytes.len() - 4..].iter().all(u8::is_ascii_digit)
    {
        // +HHMM -> +HH:MM
        format!("{}:{}", &value[..value.len() - 2], &value[value.len() - 2..])
    } else if bytes.len() >= 3
        && matches!(bytes[bytes.len() - 3], b'+' | b'-')
        && bytes[bytes.len() - 2..].iter().all(u8::is_ascii_digit)
    {
        // +HH -> +HH:00
        format!("{value}:00")
    } else {
        value.to_string()
    };

    for fmt in ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%:z"] {
        if let Ok(parsed) = DateTime::parse_from_str(&normalized, fmt) {
            return parsed.timestamp();
        }
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&normalized, fmt) {
            return parsed.and_utc().timestamp();
        }
    }
    0
}

/// Closed-state and timestamp defaulting shared by issues and MRs.
///
/// State ids 0 (unset) and 1 (open) count as open; anything else is closed.
fn normalize_times(state_id: i64, created: i64, updated: i64, closed: i64) -> (i64, i64, i64) {
    let is_closed = state_id != 0 && state_id != 1;
    let mut created = created;
    let mut updated = updated;
    if updated <= 0 {
        updated = created;
    }
    if created <= 0 {
        created = updated;
    }
    let closed = if !is_closed {
        0
    } else if closed <= 0 {
        if updated > 0 {
            updated
        } else {
            created
        }
    } else {
        closed
    };
    (created, updated, closed)
}

/// Output of pass 1: org scope and repository locations.
struct StructurePass {
    tree: NamespaceTree,
    descendant_group_ids: BTreeSet<i64>,
    org_name_by_ns_id: HashMap<i64, String>,
    orgs: Vec<OrgPlan>,
    repos: Vec<RepoPlan>,
    selected_project_ids: HashSet<i64>,
}

#[cfg_attr(feature = "observability", tracing::instrument(skip_all))]
fn resolve_structure(
    db_path: &Path,
    backup_root: &Path,
    backup_id: &str,
    root_group_path: &str,
) -> Result<StructurePass> {
    let mut shards: HashMap<i64, String> = HashMap::new();
    let mut project_repos: HashMap<i64, (i64, String)> = HashMap::new();
    let mut tree = NamespaceTree::new();

    // Filled lazily on the first projects row: namespaces must be complete
    // before the org scope can be derived, and in dump order they are.
    let mut descendant_group_ids: Option<BTreeSet<i64>> = None;
    let mut org_name_by_ns_id: HashMap<i64, String> = HashMap::new();
    let mut orgs: Vec<OrgPlan> = Vec::new();
    let mut repos: Vec<RepoPlan> = Vec::new();
    let mut selected_project_ids: HashSet<i64> = HashSet::new();

    let tables = table_set(&["shards", "project_repositories", "namespaces", "projects"]);
    for item in CopyRows::open(db_path, Some(tables))? {
        let (table, row) = item?;
        match table.as_str() {
            "shards" => {
                let id = row.require_i64("shards", "id")?;
                shards.insert(id, row.get_or_empty("name").to_string());
            }
            "project_repositories" => {
                let project_id = row.require_i64("project_repositories", "project_id")?;
                let shard_id = row.require_i64("project_repositories", "shard_id")?;
                let disk_path = row.get_or_empty("disk_path").to_string();
                project_repos.insert(project_id, (shard_id, disk_path));
            }
            "namespaces" => {
                if row.get("type") != Some("Group") {
                    continue;
                }
                let ns_id = row.require_i64("namespaces", "id")?;
                tree.insert(GroupNamespace {
                    id: ns_id,
                    name: row.get_or_empty("name").to_string(),
                    path: row.get_or_empty("path").to_string(),
                    parent_id: row.opt_i64("parent_id"),
                    traversal_ids: parse_pg_int_array(row.get("traversal_ids"))?,
                    description: row.get("description").map(str::to_string),
                });
            }
            "projects" => {
                let scope: &BTreeSet<i64> = match &mut descendant_group_ids {
                    Some(scope) => scope,
                    slot @ None => {
                        let root_id = tree.find_root(root_group_path)?;
                        let scope = tree.descendants_of(root_id);
                        for &gid in &scope {
                            let org_name = tree.org_name(gid);
                            org_name_by_ns_id.insert(gid, org_name);
                        }
                        let mut scoped: Vec<i64> = scope.iter().copied().collect();
                        scoped.sort_by_key(|&gid| tree.full_path(gid));
                        for gid in scoped {
                            orgs.push(OrgPlan {
                                name: org_name_by_ns_id[&gid].clone(),
                                full_path: tree.full_path(gid),
                                gitlab_namespace_id: gid,
                                description: tree
                                    .get(gid)
                                    .and_then(|g| g.description.clone()),
                            });
                        }
                        slot.insert(scope)
                    }
                };

                let namespace_id = row.require_i64("projects", "namespace_id")?;
                if !scope.contains(&namespace_id) {
                    continue;
                }

                let project_id = row.require_i64("projects", "id")?;
                let Some((shard_id, disk_path)) = project_repos.get(&project_id) else {
                    // Projects without a repository row (never pushed to)
                    // have nothing to migrate.
                    continue;
                };
                let storage = shards
                    .get(shard_id)
                    .cloned()
                    .unwrap_or_else(|| "default".to_string());

                let repo_dir = backup_root.join("repositories").join(&storage);
                let bundle_path = repo_dir
                    .join(format!("{disk_path}.git"))
                    .join(backup_id)
                    .join("001.bundle");
                let wiki_bundle_path = repo_dir
                    .join(format!("{disk_path}.wiki.git"))
                    .join(backup_id)
                    .join("001.bundle");

                selected_project_ids.insert(project_id);
                repos.push(RepoPlan {
                    owner: org_name_by_ns_id[&namespace_id].clone(),
                    name: row.get_or_empty("path").to_string(),
                    gitlab_project_id: project_id,
                    gitlab_disk_path: disk_path.clone(),
                    refs_path: bundle_path.with_extension("refs"),
                    wiki_refs_path: wiki_bundle_path.with_extension("refs"),
                    bundle_path,
                    wiki_bundle_path,
                });
            }
            _ => {}
        }
    }

    let descendant_group_ids = descendant_group_ids.ok_or(PlanError::NoProjects)?;
    Ok(StructurePass {
        tree,
        descendant_group_ids,
        org_name_by_ns_id,
        orgs,
        repos,
        selected_project_ids,
    })
}

/// A merge request waiting for its diff SHAs from pass 3.
struct StagedMergeRequest {
    mr: MergeRequestPlan,
    diff_id: Option<i64>,
}

/// Output of pass 2: everything except label links and diff SHAs.
struct EntityPass {
    ledger: MembershipLedger,
    issues: Vec<IssuePlan>,
    staged_mrs: Vec<StagedMergeRequest>,
    notes: Vec<NotePlan>,
    users_by_id: HashMap<i64, UserPlan>,
    labels_by_id: HashMap<i64, LabelPlan>,
    issue_project_by_issue_id: HashMap<i64, i64>,
    target_project_by_mr_id: HashMap<i64, i64>,
    merge_request_diff_ids: HashSet<i64>,
    ssh_keys: Vec<SshKeyPlan>,
}

#[cfg_attr(feature = "observability", tracing::instrument(skip_all))]
fn collect_entities(db_path: &Path, structure: &StructurePass) -> Result<EntityPass> {
    let mut ledger = MembershipLedger::new();
    let mut interacting_user_ids: HashSet<i64> = HashSet::new();

    let mut issues: Vec<IssuePlan> = Vec::new();
    let mut staged_mrs: Vec<StagedMergeRequest> = Vec::new();
    let mut notes: Vec<NotePlan> = Vec::new();
    let mut users_by_id: HashMap<i64, UserPlan> = HashMap::new();
    let mut labels_by_id: HashMap<i64, LabelPlan> = HashMap::new();
    let mut issue_project_by_issue_id: HashMap<i64, i64> = HashMap::new();
    let mut target_project_by_mr_id: HashMap<i64, i64> = HashMap::new();
    let mut merge_request_diff_ids: HashSet<i64> = HashSet::new();
    let mut key_candidates: Vec<SshKeyPlan> = Vec::new();

    let tables = table_set(&[
        "members",
        "issues",
        "merge_requests",
        "notes",
        "users",
        "labels",
        "keys",
    ]);
    for item in CopyRows::open(db_path, Some(tables))? {
        let (table, row) = item?;
        match table.as_str() {
            "members" => {
                if row.get("source_type") != Some("Namespace") {
                    continue;
                }
                let source_id = row.require_i64("members", "source_id")?;
                if !structure.descendant_group_ids.contains(&source_id) {
                    continue;
                }
                // Invited members (email-only) have no user id; pending
                // rows can lack an access level. Neither is an error.
                let (Some(user_id), Some(access_level)) =
                    (row.opt_i64("user_id"), row.opt_i64("access_level"))
                else {
                    continue;
                };
                ledger.record(source_id, user_id, access_level);
                interacting_user_ids.insert(user_id);
            }
            "issues" => {
                let project_id = row.require_i64("issues", "project_id")?;
                if !structure.selected_project_ids.contains(&project_id) {
                    continue;
                }
                let issue_id = row.require_i64("issues", "id")?;
                let author_id = row.require_i64("issues", "author_id")?;
                issue_project_by_issue_id.insert(issue_id, project_id);
                interacting_user_ids.insert(author_id);

                let state_id = row.opt_i64("state_id").unwrap_or(0);
                let (created_unix, updated_unix, closed_unix) = normalize_times(
                    state_id,
                    parse_timestamp_unix(row.get("created_at")),
                    parse_timestamp_unix(row.get("updated_at")),
                    parse_timestamp_unix(row.get("closed_at")),
                );
                issues.push(IssuePlan {
                    gitlab_issue_id: issue_id,
                    gitlab_issue_iid: row.require_i64("issues", "iid")?,
                    gitlab_project_id: project_id,
                    title: row.get_or_empty("title").to_string(),
                    description: row.get_or_empty("description").to_string(),
                    author_id,
                    state_id,
                    created_unix,
                    updated_unix,
                    closed_unix,
                });
            }
            "merge_requests" => {
                let target_project_id = row.require_i64("merge_requests", "target_project_id")?;
                if !structure.selected_project_ids.contains(&target_project_id) {
                    continue;
                }
                let mr_id = row.require_i64("merge_requests", "id")?;
                let author_id = row.require_i64("merge_requests", "author_id")?;
                target_project_by_mr_id.insert(mr_id, target_project_id);
                interacting_user_ids.insert(author_id);

                let diff_id = row.opt_i64("latest_merge_request_diff_id");
                if let Some(diff_id) = diff_id {
                    merge_request_diff_ids.insert(diff_id);
                }

                let state_id = row.opt_i64("state_id").unwrap_or(0);
                let closed_raw = match parse_timestamp_unix(row.get("closed_at")) {
                    0 => parse_timestamp_unix(row.get("merged_at")),
                    ts => ts,
                };
                let (created_unix, updated_unix, closed_unix) = normalize_times(
                    state_id,
                    parse_timestamp_unix(row.get("created_at")),
                    parse_timestamp_unix(row.get("updated_at")),
                    closed_raw,
                );
                staged_mrs.push(StagedMergeRequest {
                    mr: MergeRequestPlan {
                        gitlab_mr_id: mr_id,
                        gitlab_mr_iid: row.require_i64("merge_requests", "iid")?,
                        gitlab_target_project_id: target_project_id,
                        gitlab_source_project_id: row.opt_i64("source_project_id"),
                        source_branch: row.get_or_empty("source_branch").to_string(),
                        target_branch: row.get_or_empty("target_branch").to_string(),
                        title: row.get_or_empty("title").to_string(),
                        description: row.get_or_empty("description").to_string(),
                        author_id,
                        state_id,
                        head_commit_sha: String::new(),
                        base_commit_sha: String::new(),
                        created_unix,
                        updated_unix,
                        closed_unix,
                    },
                    diff_id,
                });
            }
            "notes" => {
                // System notes are GitLab's automated activity log, not
                // user content.
                if row.get("system") == Some("t") {
                    continue;
                }
                let (Some(note_id), Some(author_id), Some(noteable_id)) = (
                    row.opt_i64("id"),
                    row.opt_i64("author_id"),
                    row.opt_i64("noteable_id"),
                ) else {
                    continue;
                };
                let noteable = match row.get("noteable_type") {
                    Some("Issue") => Noteable::Issue(noteable_id),
                    Some("MergeRequest") => Noteable::MergeRequest(noteable_id),
                    _ => continue,
                };

                // Older rows leave project_id null; infer it from the
                // noteable, which in dump order has already streamed by.
                let project_id = row.opt_i64("project_id").or_else(|| match noteable {
                    Noteable::Issue(id) => issue_project_by_issue_id.get(&id).copied(),
                    Noteable::MergeRequest(id) => target_project_by_mr_id.get(&id).copied(),
                });
                let Some(project_id) = project_id else { continue };
                if !structure.selected_project_ids.contains(&project_id) {
                    continue;
                }

                interacting_user_ids.insert(author_id);
                notes.push(NotePlan {
                    gitlab_note_id: note_id,
                    gitlab_project_id: project_id,
                    noteable,
                    author_id,
                    body: row.get_or_empty("note").to_string(),
                    created_unix: parse_timestamp_unix(row.get("created_at")),
                    updated_unix: parse_timestamp_unix(row.get("updated_at")),
                });
            }
            "users" => {
                let user_id = row.require_i64("users", "id")?;
                if !interacting_user_ids.contains(&user_id) {
                    continue;
                }
                users_by_id.insert(
                    user_id,
                    UserPlan {
                        gitlab_user_id: user_id,
                        username: row.get_or_empty("username").to_string(),
                        email: row.get_or_empty("email").to_string(),
                        full_name: row.get_or_empty("name").to_string(),
                        state: row.get_or_empty("state").to_string(),
                        avatar: row
                            .get("avatar")
                            .filter(|v| !v.is_empty())
                            .map(str::to_string),
                        gitlab_encrypted_password: row
                            .get("encrypted_password")
                            .filter(|v| !v.is_empty())
                            .map(str::to_string),
                        gitlab_otp_required_for_login: row.get("otp_required_for_login")
                            == Some("t"),
                    },
                );
            }
            "labels" => {
                let Some(label_id) = row.opt_i64("id") else { continue };
                let in_scope = row
                    .opt_i64("project_id")
                    .map(|pid| structure.selected_project_ids.contains(&pid))
                    .unwrap_or(false)
                    || row
                        .opt_i64("group_id")
                        .map(|gid| structure.descendant_group_ids.contains(&gid))
                        .unwrap_or(false);
                if !in_scope {
                    continue;
                }
                labels_by_id.insert(
                    label_id,
                    LabelPlan {
                        gitlab_label_id: label_id,
                        title: row.get_or_empty("title").to_string(),
                        color: row.get_or_empty("color").to_string(),
                        description: row.get_or_empty("description").to_string(),
                    },
                );
            }
            "keys" => {
                // DeployKey rows carry a type tag; user SSH keys do not.
                if row.get("type").is_some() {
                    continue;
                }
                let (Some(key_id), Some(user_id), Some(key)) = (
                    row.opt_i64("id"),
                    row.opt_i64("user_id"),
                    row.get("key"),
                ) else {
                    continue;
                };
                // Buffered until the pass ends: key rows can interleave
                // with users rows, so scope is decided afterwards.
                key_candidates.push(SshKeyPlan {
                    gitlab_key_id: key_id,
                    gitlab_user_id: user_id,
                    title: row.get_or_empty("title").to_string(),
                    key: key.to_string(),
                });
            }
            _ => {}
        }
    }

    let ssh_keys: Vec<SshKeyPlan> = key_candidates
        .into_iter()
        .filter(|k| users_by_id.contains_key(&k.gitlab_user_id))
        .collect();

    Ok(EntityPass {
        ledger,
        issues,
        staged_mrs,
        notes,
        users_by_id,
        labels_by_id,
        issue_project_by_issue_id,
        target_project_by_mr_id,
        merge_request_diff_ids,
        ssh_keys,
    })
}

type LabelAssignments = (BTreeMap<i64, Vec<i64>>, BTreeMap<i64, Vec<i64>>);

/// Pass 2.5: attach kept labels to kept issues/MRs via `label_links`.
fn resolve_label_links(db_path: &Path, entities: &EntityPass) -> Result<LabelAssignments> {
    let mut issue_label_ids: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
    let mut mr_label_ids: BTreeMap<i64, Vec<i64>> = BTreeMap::new();

    if entities.issue_project_by_issue_id.is_empty()
        && entities.target_project_by_mr_id.is_empty()
    {
        return Ok((issue_label_ids, mr_label_ids));
    }

    for item in CopyRows::open(db_path, Some(table_set(&["label_links"])))? {
        let (_, row) = item?;
        let target_type = row.get_or_empty("target_type").trim().to_string();
        let (Some(target_id), Some(label_id)) =
            (row.opt_i64("target_id"), row.opt_i64("label_id"))
        else {
            continue;
        };
        if !entities.labels_by_id.contains_key(&label_id) {
            continue;
        }

        match target_type.as_str() {
            "Issue" if entities.issue_project_by_issue_id.contains_key(&target_id) => {
                issue_label_ids.entry(target_id).or_default().push(label_id);
            }
            "MergeRequest" if entities.target_project_by_mr_id.contains_key(&target_id) => {
                mr_label_ids.entry(target_id).or_default().push(label_id);
            }
            _ => {}
        }
    }

    for ids in issue_label_ids.values_mut().chain(mr_label_ids.values_mut()) {
        ids.sort_unstable();
        ids.dedup();
    }
    Ok((issue_label_ids, mr_label_ids))
}

/// Pass 3: resolve staged diff ids to (head, base) commit SHAs.
fn resolve_diff_shas(
    db_path: &Path,
    diff_ids: &HashSet<i64>,
) -> Result<HashMap<i64, (String, String)>> {
    let mut sha_by_diff_id: HashMap<i64, (String, String)> = HashMap::new();
    if diff_ids.is_empty() {
        return Ok(sha_by_diff_id);
    }

    for item in CopyRows::open(db_path, Some(table_set(&["merge_request_diffs"])))? {
        let (_, row) = item?;
        let Some(diff_id) = row.opt_i64("id") else { continue };
        if !diff_ids.contains(&diff_id) {
            continue;
        }
        sha_by_diff_id.insert(
            diff_id,
            (
                row.get_or_empty("head_commit_sha").to_string(),
                row.get_or_empty("base_commit_sha").to_string(),
            ),
        );
        if sha_by_diff_id.len() >= diff_ids.len() {
            break;
        }
    }
    Ok(sha_by_diff_id)
}

fn assemble(
    backup_root: &Path,
    backup_id: String,
    structure: StructurePass,
    entities: EntityPass,
    issue_label_ids: BTreeMap<i64, Vec<i64>>,
    mr_label_ids: BTreeMap<i64, Vec<i64>>,
    sha_by_diff_id: HashMap<i64, (String, String)>,
) -> Result<Plan> {
    let StructurePass {
        tree,
        descendant_group_ids,
        org_name_by_ns_id,
        mut orgs,
        mut repos,
        ..
    } = structure;
    let EntityPass {
        ledger,
        mut issues,
        staged_mrs,
        mut notes,
        users_by_id,
        labels_by_id,
        merge_request_diff_ids: _,
        issue_project_by_issue_id: _,
        target_project_by_mr_id: _,
        mut ssh_keys,
    } = entities;

    let mut merge_requests: Vec<MergeRequestPlan> = staged_mrs
        .into_iter()
        .map(|staged| {
            let mut mr = staged.mr;
            if let Some((head, base)) = staged.diff_id.and_then(|id| sha_by_diff_id.get(&id)) {
                mr.head_commit_sha = head.clone();
                mr.base_commit_sha = base.clone();
            }
            mr
        })
        .collect();

    // Effective membership per org, keyed by resolved usernames. Users
    // whose rows never materialized are dropped here, not earlier.
    let mut org_members: BTreeMap<String, BTreeMap<String, i64>> = BTreeMap::new();
    for &gid in &descendant_group_ids {
        let mut by_username: BTreeMap<String, i64> = BTreeMap::new();
        for (user_id, level) in ledger.effective_for(&tree, gid) {
            if let Some(user) = users_by_id.get(&user_id) {
                by_username.insert(user.username.clone(), level);
            }
        }
        org_members.insert(org_name_by_ns_id[&gid].clone(), by_username);
    }

    let mut users: Vec<UserPlan> = users_by_id.into_values().collect();
    let mut labels: Vec<LabelPlan> = labels_by_id.into_values().collect();

    orgs.sort_by(|a, b| a.name.cmp(&b.name));
    repos.sort_by(|a, b| (&a.owner, &a.name).cmp(&(&b.owner, &b.name)));
    users.sort_by(|a, b| a.username.cmp(&b.username));
    issues.sort_by_key(|i| (i.gitlab_project_id, i.gitlab_issue_iid));
    merge_requests.sort_by_key(|mr| (mr.gitlab_target_project_id, mr.gitlab_mr_iid));
    notes.sort_by_key(|n| (n.gitlab_project_id, n.noteable));
    labels.sort_by(|a, b| {
        (a.title.to_lowercase(), a.gitlab_label_id).cmp(&(b.title.to_lowercase(), b.gitlab_label_id))
    });
    ssh_keys.sort_by_key(|k| (k.gitlab_user_id, k.gitlab_key_id));

    let uploads_tar_path = Some(backup_root.join("uploads.tar.gz")).filter(|p| p.exists());

    Ok(Plan {
        backup_id,
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
        user_ssh_keys: ssh_keys,
        uploads_tar_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pg_int_array() {
        assert_eq!(parse_pg_int_array(None).unwrap(), Vec::<i64>::new());
        assert_eq!(parse_pg_int_array(Some("")).unwrap(), Vec::<i64>::new());
        assert_eq!(parse_pg_int_array(Some("{}")).unwrap(), Vec::<i64>::new());
        assert_eq!(parse_pg_int_array(Some("{1,5,9}")).unwrap(), vec![1, 5, 9]);
        assert!(parse_pg_int_array(Some("1,5")).is_err());
        assert!(parse_pg_int_array(Some("{a}")).is_err());
    }

    #[test]
    fn test_parse_timestamp_bare_is_utc() {
        assert_eq!(
            parse_timestamp_unix(Some("2020-02-23 18:11:52")),
            1582481512
        );
        assert_eq!(
            parse_timestamp_unix(Some("2020-02-23 18:11:52.11909")),
            1582481512
        );
    }

    #[test]
    fn test_parse_timestamp_offsets() {
        let base = parse_timestamp_unix(Some("2020-02-23 18:11:52+00:00"));
        assert_eq!(base, 1582481512);
        assert_eq!(parse_timestamp_unix(Some("2020-02-23 18:11:52Z")), base);
        assert_eq!(parse_timestamp_unix(Some("2020-02-23 18:11:52+0000")), base);
        assert_eq!(parse_timestamp_unix(Some("2020-02-23 18:11:52+00")), base);
        // One hour east of UTC.
        assert_eq!(
            parse_timestamp_unix(Some("2020-02-23 19:11:52+01:00")),
            base
        );
        assert_eq!(parse_timestamp_unix(Some("2020-02-23 19:11:52+01")), base);
    }

    #[test]
    fn test_parse_timestamp_absent_or_garbage() {
        assert_eq!(parse_timestamp_unix(None), 0);
        assert_eq!(parse_timestamp_unix(Some("")), 0);
        assert_eq!(parse_timestamp_unix(Some("  ")), 0);
        assert_eq!(parse_timestamp_unix(Some("not a time")), 0);
    }

    #[test]
    fn test_normalize_times_open() {
        // Open entity: closed is always forced to 0.
        assert_eq!(normalize_times(1, 100, 200, 300), (100, 200, 0));
        assert_eq!(normalize_times(0, 100, 200, 0), (100, 200, 0));
    }

    #[test]
    fn test_normalize_times_defaulting_chain() {
        // Missing updated falls back to created, and vice versa.
        assert_eq!(normalize_times(1, 100, 0, 0), (100, 100, 0));
        assert_eq!(normalize_times(1, 0, 200, 0), (200, 200, 0));
        // Closed with no closed time uses updated, then created.
        assert_eq!(normalize_times(2, 100, 200, 0), (100, 200, 200));
        assert_eq!(normalize_times(2, 100, 0, 0), (100, 100, 100));
        // Closed with an explicit time keeps it.
        assert_eq!(normalize_times(2, 100, 200, 300), (100, 200, 300));
    }
}
