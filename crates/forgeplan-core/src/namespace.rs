//! Group namespace hierarchy from the `namespaces` table.
//!
//! GitLab stores groups as a self-referential tree. The tree is built once
//! from pass 1 rows and queried for the root group, the descendant closure,
//! and full slash-paths; it is not part of the public plan.

use std::collections::{BTreeSet, HashMap};

use crate::error::{PlanError, Result};

/// One `namespaces` row of type "Group". Personal namespaces are never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupNamespace {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub parent_id: Option<i64>,
    /// Precomputed ancestor-chain cache from GitLab; may be empty.
    pub traversal_ids: Vec<i64>,
    pub description: Option<String>,
}

/// In-memory group tree keyed by namespace id.
#[derive(Debug, Clone, Default)]
pub struct NamespaceTree {
    groups: HashMap<i64, GroupNamespace>,
}

impl NamespaceTree {
    pub fn new() -> Self {
        NamespaceTree {
            groups: HashMap::new(),
        }
    }

    pub fn insert(&mut self, group: GroupNamespace) {
        self.groups.insert(group.id, group);
    }

    pub fn get(&self, id: i64) -> Option<&GroupNamespace> {
        self.groups.get(&id)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Resolve the root group by its path segment.
    ///
    /// When several groups share the leaf segment, prefers a true top-level
    /// group (no parent), then the lowest id.
    pub fn find_root(&self, root_group_path: &str) -> Result<i64> {
        let mut candidates: Vec<&GroupNamespace> = self
            .groups
            .values()
            .filter(|g| g.path == root_group_path)
            .collect();
        if candidates.is_empty() {
            return Err(PlanError::RootGroupNotFound {
                path: root_group_path.to_string(),
            });
        }
        candidates.sort_by_key(|g| (g.parent_id.is_some(), g.id));
        Ok(candidates[0].id)
    }

    /// True when `group` is the root itself or nested (at any depth) under it.
    ///
    /// Uses the traversal-ids cache when present; otherwise walks parent
    /// links until the root is found or an ancestor is missing.
    pub fn is_descendant(&self, root_id: i64, group: &GroupNamespace) -> bool {
        if group.id == root_id {
            return true;
        }
        if !group.traversal_ids.is_empty() {
            return group.traversal_ids.contains(&root_id);
        }

        let mut cur = group.parent_id;
        while let Some(id) = cur {
            if id == root_id {
                return true;
            }
            match self.groups.get(&id) {
                Some(parent) => cur = parent.parent_id,
                None => break,
            }
        }
        false
    }

    /// The root group plus every group nested beneath it.
    pub fn descendants_of(&self, root_id: i64) -> BTreeSet<i64> {
        self.groups
            .values()
            .filter(|g| self.is_descendant(root_id, g))
            .map(|g| g.id)
            .collect()
    }

    /// Slash-joined path from the top-level ancestor down to `id`.
    ///
    /// A group whose parent is missing from the table is its own root.
    pub fn full_path(&self, id: i64) -> String {
        let Some(group) = self.groups.get(&id) else {
            return String::new();
        };
        match group.parent_id {
            Some(parent_id) if self.groups.contains_key(&parent_id) => {
                format!("{}/{}", self.full_path(parent_id), group.path)
            }
            _ => group.path.clone(),
        }
    }

    /// Flat, URL-safe org name for a group: full path with `/` as `-`.
    pub fn org_name(&self, id: i64) -> String {
        self.full_path(id).replace('/', "-")
    }

    /// The group itself followed by its known ancestors, nearest first.
    pub fn ancestors(&self, id: i64) -> Vec<i64> {
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(gid) = cur {
            chain.push(gid);
            match self.groups.get(&gid) {
                Some(group) => {
                    cur = group.parent_id;
                    if let Some(parent_id) = cur {
                        if !self.groups.contains_key(&parent_id) {
                            break;
                        }
                    }
                }
                None => break,
            }
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: i64, path: &str, parent_id: Option<i64>, traversal: &[i64]) -> GroupNamespace {
        GroupNamespace {
            id,
            name: path.to_string(),
            path: path.to_string(),
            parent_id,
            traversal_ids: traversal.to_vec(),
            description: None,
        }
    }

    fn three_level_tree() -> NamespaceTree {
        let mut tree = NamespaceTree::new();
        tree.insert(group(1, "root", None, &[1]));
        tree.insert(group(2, "mid", Some(1), &[1, 2]));
        tree.insert(group(3, "leaf", Some(2), &[1, 2, 3]));
        tree
    }

    #[test]
    fn test_find_root_simple() {
        let tree = three_level_tree();
        assert_eq!(tree.find_root("root").unwrap(), 1);
    }

    #[test]
    fn test_find_root_missing() {
        let tree = three_level_tree();
        assert!(tree.find_root("nope").is_err());
    }

    #[test]
    fn test_find_root_prefers_top_level_then_lowest_id() {
        let mut tree = NamespaceTree::new();
        tree.insert(group(5, "dev", Some(9), &[]));
        tree.insert(group(9, "other", None, &[]));
        tree.insert(group(7, "dev", None, &[]));
        tree.insert(group(3, "dev", Some(9), &[]));
        // 7 is the only parentless "dev".
        assert_eq!(tree.find_root("dev").unwrap(), 7);

        let mut nested_only = NamespaceTree::new();
        nested_only.insert(group(5, "dev", Some(9), &[]));
        nested_only.insert(group(3, "dev", Some(9), &[]));
        nested_only.insert(group(9, "other", None, &[]));
        assert_eq!(nested_only.find_root("dev").unwrap(), 3);
    }

    #[test]
    fn test_descendant_closure_three_levels() {
        let tree = three_level_tree();
        let descendants = tree.descendants_of(1);
        assert_eq!(descendants.into_iter().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_is_descendant_without_traversal_ids_walks_parents() {
        let mut tree = NamespaceTree::new();
        tree.insert(group(1, "root", None, &[]));
        tree.insert(group(2, "mid", Some(1), &[]));
        tree.insert(group(3, "leaf", Some(2), &[]));
        let leaf = tree.get(3).unwrap().clone();
        assert!(tree.is_descendant(1, &leaf));
        assert!(!tree.is_descendant(99, &leaf));
    }

    #[test]
    fn test_is_descendant_stops_at_missing_ancestor() {
        let mut tree = NamespaceTree::new();
        tree.insert(group(3, "leaf", Some(42), &[]));
        let leaf = tree.get(3).unwrap().clone();
        assert!(!tree.is_descendant(1, &leaf));
    }

    #[test]
    fn test_full_path_and_org_name() {
        let tree = three_level_tree();
        assert_eq!(tree.full_path(3), "root/mid/leaf");
        assert_eq!(tree.org_name(3), "root-mid-leaf");
        assert_eq!(tree.org_name(1), "root");
    }

    #[test]
    fn test_full_path_orphan_is_its_own_root() {
        let mut tree = NamespaceTree::new();
        tree.insert(group(3, "leaf", Some(42), &[]));
        assert_eq!(tree.full_path(3), "leaf");
    }

    #[test]
    fn test_ancestors_nearest_first() {
        let tree = three_level_tree();
        assert_eq!(tree.ancestors(3), vec![3, 2, 1]);
        assert_eq!(tree.ancestors(1), vec![1]);
    }
}
