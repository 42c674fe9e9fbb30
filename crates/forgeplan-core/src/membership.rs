//! Effective group membership with ancestor inheritance.
//!
//! GitLab access levels are plain integers (10 guest .. 50 owner). A member
//! of a parent group is implicitly a member of every subgroup, so the
//! effective level for an org is a max-wins fold over the group's ancestor
//! chain.

use std::collections::HashMap;

use crate::namespace::NamespaceTree;

pub const ACCESS_OWNER: i64 = 50;
pub const ACCESS_MAINTAINER: i64 = 40;
pub const ACCESS_DEVELOPER: i64 = 30;

/// Coarse role tier for an access level, matching Forgejo's team model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTier {
    Owner,
    Maintainer,
    Developer,
    Reporter,
}

impl AccessTier {
    pub fn for_level(level: i64) -> Self {
        if level >= ACCESS_OWNER {
            AccessTier::Owner
        } else if level >= ACCESS_MAINTAINER {
            AccessTier::Maintainer
        } else if level >= ACCESS_DEVELOPER {
            AccessTier::Developer
        } else {
            AccessTier::Reporter
        }
    }
}

/// Direct memberships per group, deduplicated with a max-wins combinator.
#[derive(Debug, Clone, Default)]
pub struct MembershipLedger {
    direct: HashMap<i64, HashMap<i64, i64>>,
}

impl MembershipLedger {
    pub fn new() -> Self {
        MembershipLedger {
            direct: HashMap::new(),
        }
    }

    /// Record one direct `members` row. Duplicate (group, user) pairs keep
    /// the maximum access level seen.
    pub fn record(&mut self, group_id: i64, user_id: i64, access_level: i64) {
        let level = self
            .direct
            .entry(group_id)
            .or_default()
            .entry(user_id)
            .or_insert(access_level);
        *level = (*level).max(access_level);
    }

    /// Effective user -> level mapping for `group_id`: the union of the
    /// group's own members and every strict ancestor's, max level winning.
    pub fn effective_for(&self, tree: &NamespaceTree, group_id: i64) -> HashMap<i64, i64> {
        let mut effective: HashMap<i64, i64> = HashMap::new();
        for ancestor_id in tree.ancestors(group_id) {
            if let Some(members) = self.direct.get(&ancestor_id) {
                for (&user_id, &level) in members {
                    let cur = effective.entry(user_id).or_insert(level);
                    *cur = (*cur).max(level);
                }
            }
        }
        effective
    }
}
