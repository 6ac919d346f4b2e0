//! Shared fixtures for the merge scenario tests.

#![allow(dead_code)]

use std::collections::BTreeMap;

use treemerge::{FileMode, MemoryStore, MergeOutcome, ObjectId, ObjectStore};

/// Build a tree of regular files from `(path, content)` pairs.
pub fn tree(store: &mut MemoryStore, files: &[(&str, &str)]) -> ObjectId {
    let full: Vec<(&str, FileMode, &[u8])> = files
        .iter()
        .map(|(path, content)| (*path, FileMode::REGULAR, content.as_bytes()))
        .collect();
    store.insert_tree(&full).unwrap()
}

/// Build a tree with explicit modes.
pub fn tree_full(store: &mut MemoryStore, files: &[(&str, FileMode, &[u8])]) -> ObjectId {
    store.insert_tree(files).unwrap()
}

/// Flatten a tree into `path → blob bytes` (submodules keep their commit
/// id as the "content").
pub fn flatten(store: &MemoryStore, tree: &ObjectId) -> BTreeMap<String, Vec<u8>> {
    let mut out = BTreeMap::new();
    let mut stack = vec![(String::new(), *tree)];
    while let Some((prefix, oid)) = stack.pop() {
        for entry in store.read_tree(&oid).unwrap() {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            if entry.mode.is_tree() {
                stack.push((path, entry.oid));
            } else if entry.mode.is_submodule() {
                out.insert(path, entry.oid.to_hex().into_bytes());
            } else {
                out.insert(path, store.read_blob(&entry.oid).unwrap());
            }
        }
    }
    out
}

/// The paths of all unmerged entries, deduplicated.
pub fn unmerged_paths(outcome: &MergeOutcome) -> Vec<String> {
    let mut paths: Vec<String> = outcome.unmerged.iter().map(|e| e.path.clone()).collect();
    paths.dedup();
    paths
}

/// All messages joined, for coarse "mentions X" assertions.
pub fn all_messages(outcome: &MergeOutcome) -> String {
    outcome
        .messages
        .values()
        .cloned()
        .collect::<Vec<_>>()
        .join("")
}
