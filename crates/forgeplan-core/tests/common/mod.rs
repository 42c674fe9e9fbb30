//! Shared synthetic-backup fixture for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::Path;

pub const BACKUP_ID: &str = "1770000000_2026_02_04_18.4.6";

// 2020-02-23 18:11:52 UTC etc., precomputed.
pub const ISSUE_CREATED: i64 = 1_582_481_512;
pub const ISSUE_UPDATED: i64 = 1_583_676_272;
pub const MR_CREATED: i64 = 1_583_680_243;
pub const MR_MERGED: i64 = 1_583_683_366;

/// Write `backup_information.yml` and `db/database.sql` under `root`.
pub fn write_backup(root: &Path, sql: &str) {
    fs::create_dir_all(root.join("db")).unwrap();
    fs::write(
        root.join("backup_information.yml"),
        format!(":backup_id: {BACKUP_ID}\n:db_version: '18.4.6'\n"),
    )
    .unwrap();
    fs::write(root.join("db/database.sql"), sql).unwrap();
}

/// A two-group, three-project dump exercising every table the planner reads.
///
/// Scope is the group "pleroma" (id 3) with subgroup "elixir-libraries"
/// (id 4); group "other" (id 9) and its project are out of scope.
pub fn standard_dump() -> String {
    let lines: Vec<String> = vec![
        "COPY public.shards (id, name) FROM stdin;".into(),
        "1\tdefault".into(),
        "\\.".into(),
        "".into(),
        "COPY public.namespaces (id, name, path, type, parent_id, traversal_ids, description) FROM stdin;".into(),
        "3\tPleroma\tpleroma\tGroup\t\\N\t{3}\tAll Pleroma development".into(),
        "4\tElixir libraries\telixir-libraries\tGroup\t3\t{3,4}\t\\N".into(),
        "9\tOther\tother\tGroup\t\\N\t{9}\t\\N".into(),
        "43\tLanodan\tlanodan\t\\N\t\\N\t{43}\t\\N".into(),
        "\\.".into(),
        "".into(),
        "COPY public.project_repositories (id, shard_id, disk_path, project_id) FROM stdin;".into(),
        "1\t1\t@hashed/f4/46/f446docs\t673".into(),
        "2\t1\t@hashed/82/9f/829fpool\t821".into(),
        "3\t1\t@hashed/00/11/0011other\t900".into(),
        "\\.".into(),
        "".into(),
        "COPY public.projects (id, path, namespace_id) FROM stdin;".into(),
        "673\tdocs\t3".into(),
        "821\tpool-benchmark\t4".into(),
        "900\tother-repo\t9".into(),
        "\\.".into(),
        "".into(),
        "COPY public.members (source_type, source_id, user_id, access_level) FROM stdin;".into(),
        "Namespace\t3\t2\t50".into(),
        "Namespace\t3\t43\t30".into(),
        "Namespace\t3\t43\t20".into(),
        "Namespace\t4\t43\t40".into(),
        "Namespace\t9\t99\t50".into(),
        "Project\t673\t7\t30".into(),
        "\\.".into(),
        "".into(),
        "COPY public.issues (id, iid, project_id, title, description, author_id, state_id, created_at, updated_at, closed_at) FROM stdin;".into(),
        "2978\t1\t673\tProvide a link to the main site\tSee title.\\n\\nThanks!\t7\t1\t2020-02-23 18:11:52.11909\t2020-03-08 14:04:32.974976\t\\N".into(),
        "3000\t1\t821\tBenchmark is slow\t\\N\t7\t1\t2020-02-23 18:11:52.11909\t2020-03-08 14:04:32.974976\t\\N".into(),
        "4000\t1\t900\tOut of scope\t\\N\t99\t1\t2020-02-23 18:11:52.11909\t\\N\t\\N".into(),
        "\\.".into(),
        "".into(),
        "COPY public.merge_requests (id, iid, target_project_id, source_project_id, source_branch, target_branch, title, description, author_id, state_id, latest_merge_request_diff_id, created_at, updated_at, closed_at, merged_at) FROM stdin;".into(),
        "3973\t1\t673\t673\tdropdown-menu\tmaster\tAdd dropdown menu\tMR body\t7\t3\t5000\t2020-03-08 15:10:43.272445\t2020-03-08 16:02:46.115598\t\\N\t2020-03-08 16:02:46.115598".into(),
        "\\.".into(),
        "".into(),
        "COPY public.notes (id, note, noteable_type, noteable_id, author_id, project_id, system, created_at, updated_at) FROM stdin;".into(),
        "501\tfirst!\tIssue\t2978\t2\t673\tf\t2020-03-08 14:04:32.951042\t2020-03-08 14:04:32.951042".into(),
        "502\tchanged the description\tIssue\t2978\t2\t673\tt\t2020-03-08 14:04:33\t2020-03-08 14:04:33".into(),
        "503\tlooks good\tMergeRequest\t3973\t99\t\\N\tf\t2020-03-08 15:30:00\t2020-03-08 15:30:00".into(),
        "504\tcommit comment\tCommit\t3973\t2\t673\tf\t2020-03-08 15:30:00\t2020-03-08 15:30:00".into(),
        "\\.".into(),
        "".into(),
        "COPY public.users (id, username, email, name, state, avatar, encrypted_password, otp_required_for_login) FROM stdin;".into(),
        "2\tlambadalambda\tlain@example.test\tLain\tactive\tavatar.png\t\\N\tf".into(),
        "7\trinpatch\trin@example.test\tRin\tactive\t\\N\t\\N\tf".into(),
        "43\tlanodan\tlanodan@example.test\tLanodan\tactive\tavatar.png\t$2a$10$abcdefghijklmnopqrstuv\tt".into(),
        "99\tlurker\tlurker@example.test\tLurker\tblocked\t\\N\t\\N\tf".into(),
        "\\.".into(),
        "".into(),
        "COPY public.labels (id, title, color, project_id, description, group_id) FROM stdin;".into(),
        "10\tbug\t#ff0000\t673\tSomething broke\t\\N".into(),
        "11\tdiscussion\t#00ff00\t\\N\tGroup-wide label\t3".into(),
        "12\tout-of-scope\t#0000ff\t900\t\\N\t\\N".into(),
        "13\tperformance\t#ffaa00\t821\t\\N\t\\N".into(),
        "\\.".into(),
        "".into(),
        "COPY public.label_links (id, label_id, target_id, target_type) FROM stdin;".into(),
        "1\t10\t2978\tIssue".into(),
        "2\t11\t3973\tMergeRequest".into(),
        "3\t12\t2978\tIssue".into(),
        "4\t13\t3000\tIssue".into(),
        "5\t10\t2978\tCommit".into(),
        "\\.".into(),
        "".into(),
        "COPY public.merge_request_diffs (id, head_commit_sha, base_commit_sha) FROM stdin;".into(),
        "4999\tdeadbeefdeadbeefdeadbeefdeadbeefdeadbeef\tffffffffffffffffffffffffffffffffffffffff".into(),
        "5000\t8d363825a9a6a94a4db1bc8da1be5b3afd2441fb\t4b825dc642cb6eb9a060e54bf8d69288fbee4904".into(),
        "\\.".into(),
        "".into(),
        "COPY public.keys (id, user_id, title, key, type) FROM stdin;".into(),
        "100001\t43\tlanodan-laptop\tssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIFakeKeyValue== lanodan@example.test\t\\N".into(),
        "100002\t43\tdeploy-key\tssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAIDeployKey== deploy@example.test\tDeployKey".into(),
        "100003\t999999\tno-such-user\tssh-ed25519 AAAAC3NzaC1lZDI1NTE5AAAAINotInScope== ghost@example.test\t\\N".into(),
        "\\.".into(),
        "".into(),
    ];
    lines.join("\n")
}
