//! End-to-end merge scenarios over the in-memory store.
//!
//! Covers the classic conflict shapes (renames, modify/delete, directory
//! renames, file/directory collisions, content conflicts) plus the
//! engine-level guarantees: identity and fast-forward merges,
//! commutativity of clean merges, directory-rename splits, and rename
//! cache reuse across sequential merges.

mod common;

use common::{all_messages, flatten, tree, tree_full, unmerged_paths};
use treemerge::merge::{DirectoryRenames, MergeOptions};
use treemerge::{FileMode, MemoryStore, Merger, ObjectStore};

fn opts() -> MergeOptions {
    MergeOptions {
        side1_label: "SIDE1".to_owned(),
        side2_label: "SIDE2".to_owned(),
        detect_directory_renames: DirectoryRenames::Enabled,
        ..MergeOptions::default()
    }
}

// ---------------------------------------------------------------------------
// Clean rename on one side
// ---------------------------------------------------------------------------

#[test]
fn clean_rename_on_one_side() {
    let mut store = MemoryStore::new();
    let base = tree(&mut store, &[("a/foo", "one\n")]);
    let side1 = tree(&mut store, &[("a/foo", "one changed\n")]);
    let side2 = tree(&mut store, &[("a/bar", "one\n")]);

    let mut merger = Merger::new(opts());
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();

    assert!(outcome.clean, "messages: {:?}", outcome.messages);
    assert!(outcome.unmerged.is_empty());
    let contents = flatten(&store, &outcome.tree);
    assert_eq!(contents.len(), 1);
    assert_eq!(contents["a/bar"], b"one changed\n");
}

// ---------------------------------------------------------------------------
// Modify/delete
// ---------------------------------------------------------------------------

#[test]
fn modify_delete_leaves_stages() {
    let mut store = MemoryStore::new();
    let base = tree(&mut store, &[("x", "a\n")]);
    let side1 = tree(&mut store, &[("x", "a modified\n")]);
    let side2 = tree(&mut store, &[]);

    let mut merger = Merger::new(opts());
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();

    assert!(!outcome.clean);
    assert_eq!(unmerged_paths(&outcome), vec!["x".to_owned()]);
    let stages: Vec<u8> = outcome.unmerged.iter().map(|e| e.stage).collect();
    assert_eq!(stages, vec![1, 2], "stage 1 = base, stage 2 = modified side");

    let msg = &outcome.messages["x"];
    assert!(msg.contains("SIDE1") && msg.contains("SIDE2"), "{msg}");
}

// ---------------------------------------------------------------------------
// Directory renames
// ---------------------------------------------------------------------------

#[test]
fn directory_rename_pulls_new_file_along() {
    let mut store = MemoryStore::new();
    let base = tree(
        &mut store,
        &[("olddir/a", "aaa\n"), ("olddir/b", "bbb\n"), ("olddir/c", "ccc\n")],
    );
    let side1 = tree(
        &mut store,
        &[("newdir/a", "aaa\n"), ("newdir/b", "bbb\n"), ("newdir/c", "ccc\n")],
    );
    let side2 = tree(
        &mut store,
        &[
            ("olddir/a", "aaa\n"),
            ("olddir/b", "bbb\n"),
            ("olddir/c", "ccc\n"),
            ("olddir/d", "new\n"),
        ],
    );

    let mut merger = Merger::new(opts());
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();

    assert!(outcome.clean, "messages: {:?}", outcome.messages);
    let contents = flatten(&store, &outcome.tree);
    let paths: Vec<&str> = contents.keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["newdir/a", "newdir/b", "newdir/c", "newdir/d"]);
    assert_eq!(contents["newdir/d"], b"new\n");
    assert!(outcome.messages["newdir/d"].contains("Path updated"));
}

#[test]
fn directory_rename_conflict_mode_moves_but_marks_unresolved() {
    let mut store = MemoryStore::new();
    let base = tree(&mut store, &[("olddir/a", "aaa\n"), ("olddir/b", "bbb\n")]);
    let side1 = tree(&mut store, &[("newdir/a", "aaa\n"), ("newdir/b", "bbb\n")]);
    let side2 = tree(
        &mut store,
        &[("olddir/a", "aaa\n"), ("olddir/b", "bbb\n"), ("olddir/d", "new\n")],
    );

    let mut conflict_opts = opts();
    conflict_opts.detect_directory_renames = DirectoryRenames::Conflict;
    let mut merger = Merger::new(conflict_opts);
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();

    assert!(!outcome.clean);
    let contents = flatten(&store, &outcome.tree);
    assert!(contents.contains_key("newdir/d"), "file is still moved");
    assert!(unmerged_paths(&outcome).contains(&"newdir/d".to_owned()));
    assert!(outcome.messages["newdir/d"].contains("CONFLICT (file location)"));
}

// ---------------------------------------------------------------------------
// Rename/rename(1→2)
// ---------------------------------------------------------------------------

#[test]
fn rename_rename_one_to_two() {
    let mut store = MemoryStore::new();
    let base = tree(&mut store, &[("f", "shared content\n")]);
    let side1 = tree(&mut store, &[("g", "shared content\n")]);
    let side2 = tree(&mut store, &[("h", "shared content\n")]);

    let mut merger = Merger::new(opts());
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();

    assert!(!outcome.clean);
    let paths = unmerged_paths(&outcome);
    assert!(paths.contains(&"g".to_owned()), "unmerged: {paths:?}");
    assert!(paths.contains(&"h".to_owned()), "unmerged: {paths:?}");

    let msg = all_messages(&outcome);
    assert!(
        msg.contains("renamed to g in SIDE1 and to h in SIDE2"),
        "{msg}"
    );
}

// ---------------------------------------------------------------------------
// File/directory conflict
// ---------------------------------------------------------------------------

#[test]
fn file_directory_conflict() {
    let mut store = MemoryStore::new();
    let base = tree(&mut store, &[]);
    let side1 = tree(&mut store, &[("p", "file\n")]);
    let side2 = tree(&mut store, &[("p/inside", "dir\n")]);

    let mut merger = Merger::new(opts());
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();

    assert!(!outcome.clean);
    let contents = flatten(&store, &outcome.tree);
    assert_eq!(contents["p~SIDE1"], b"file\n");
    assert_eq!(contents["p/inside"], b"dir\n");
    assert!(all_messages(&outcome).contains("directory in the way"));
}

// ---------------------------------------------------------------------------
// Content merge conflict
// ---------------------------------------------------------------------------

#[test]
fn content_merge_conflict() {
    let mut store = MemoryStore::new();
    let base = tree(&mut store, &[("f", "1\n2\n3\n")]);
    let side1 = tree(&mut store, &[("f", "1\n2a\n3\n")]);
    let side2 = tree(&mut store, &[("f", "1\n2b\n3\n")]);

    let mut merger = Merger::new(opts());
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();

    assert!(!outcome.clean);
    // filemask 7: all three stages in the unmerged entry.
    let stages: Vec<u8> = outcome.unmerged.iter().map(|e| e.stage).collect();
    assert_eq!(stages, vec![1, 2, 3]);

    let contents = flatten(&store, &outcome.tree);
    let text = String::from_utf8(contents["f"].clone()).unwrap();
    assert!(text.contains("<<<<<<< SIDE1"), "{text}");
    assert!(text.contains("2a\n") && text.contains("2b\n"));
    assert!(text.contains(">>>>>>> SIDE2"));
}

// ---------------------------------------------------------------------------
// Identity, fast-forward, commutativity
// ---------------------------------------------------------------------------

#[test]
fn merging_a_tree_with_itself_is_identity() {
    let mut store = MemoryStore::new();
    let t = tree(
        &mut store,
        &[("a", "1\n"), ("d/b", "2\n"), ("d/e/c", "3\n"), ("z", "4\n")],
    );
    let mut merger = Merger::new(opts());
    let outcome = merger.merge_nonrecursive(&mut store, &t, &t, &t).unwrap();
    assert!(outcome.clean);
    assert_eq!(outcome.tree, t);
}

#[test]
fn one_sided_changes_fast_forward() {
    let mut store = MemoryStore::new();
    let base = tree(&mut store, &[("f", "old\n"), ("d/g", "keep\n")]);
    let changed = tree(&mut store, &[("f", "new\n"), ("d/g", "keep\n"), ("d/h", "add\n")]);

    let mut merger = Merger::new(opts());
    let ff1 = merger
        .merge_nonrecursive(&mut store, &base, &changed, &base)
        .unwrap();
    assert!(ff1.clean);
    assert_eq!(ff1.tree, changed);

    let mut merger = Merger::new(opts());
    let ff2 = merger
        .merge_nonrecursive(&mut store, &base, &base, &changed)
        .unwrap();
    assert!(ff2.clean);
    assert_eq!(ff2.tree, changed);
}

#[test]
fn clean_merges_commute() {
    let mut store = MemoryStore::new();
    let base = tree(&mut store, &[("a", "base\n"), ("b", "base\n")]);
    let x = tree(&mut store, &[("a", "changed\n"), ("b", "base\n")]);
    let y = tree(&mut store, &[("a", "base\n"), ("b", "base\n"), ("c", "new\n")]);

    let mut merger = Merger::new(opts());
    let xy = merger.merge_nonrecursive(&mut store, &base, &x, &y).unwrap();
    let mut merger = Merger::new(opts());
    let yx = merger.merge_nonrecursive(&mut store, &base, &y, &x).unwrap();

    assert!(xy.clean && yx.clean);
    assert_eq!(xy.tree, yx.tree);
}

// ---------------------------------------------------------------------------
// Directory rename split
// ---------------------------------------------------------------------------

#[test]
fn directory_rename_split_is_unclean_and_unapplied() {
    let mut store = MemoryStore::new();
    let base = tree(&mut store, &[("old/a", "A\n"), ("old/b", "B\n")]);
    let side1 = tree(&mut store, &[("new1/a", "A\n"), ("new2/b", "B\n")]);
    let side2 = tree(
        &mut store,
        &[("old/a", "A\n"), ("old/b", "B\n"), ("old/c", "C\n")],
    );

    let mut merger = Merger::new(opts());
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();

    assert!(!outcome.clean);
    assert!(all_messages(&outcome).contains("directory rename split"));
    let contents = flatten(&store, &outcome.tree);
    let paths: Vec<&str> = contents.keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["new1/a", "new2/b", "old/c"]);
}

// ---------------------------------------------------------------------------
// Cache correctness across sequential merges
// ---------------------------------------------------------------------------

#[test]
fn cached_renames_match_detection_from_scratch() {
    let mut store = MemoryStore::new();
    let base = tree(&mut store, &[("old/f", "line1\nline2\n"), ("other", "x\n")]);
    let side1 = tree(&mut store, &[("new/f", "line1\nline2\n"), ("other", "x\n")]);
    let side2 = tree(&mut store, &[("old/f", "line1\nCHANGED\n"), ("other", "x\n")]);

    let mut merger = Merger::new(opts());
    let first = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();
    assert!(first.clean, "messages: {:?}", first.messages);
    assert_eq!(flatten(&store, &first.tree)["new/f"], b"line1\nCHANGED\n");

    // Next step of the sequence: base is the previous side 2, side 1 is
    // the previous result (cache for side 1 is valid), side 2 moved on.
    let side2_next = tree(
        &mut store,
        &[("old/f", "line1\nCHANGED\n"), ("other", "y\n")],
    );

    let cached = merger
        .merge_nonrecursive(&mut store, &side2, &first.tree, &side2_next)
        .unwrap();

    let mut fresh_merger = Merger::new(opts());
    let fresh = fresh_merger
        .merge_nonrecursive(&mut store, &side2, &first.tree, &side2_next)
        .unwrap();

    assert_eq!(cached.tree, fresh.tree);
    assert_eq!(cached.clean, fresh.clean);
    let contents = flatten(&store, &cached.tree);
    assert_eq!(contents["new/f"], b"line1\nCHANGED\n");
    assert_eq!(contents["other"], b"y\n");
}

// ---------------------------------------------------------------------------
// Rename limit
// ---------------------------------------------------------------------------

#[test]
fn rename_limit_overflow_reports_needed_limit() {
    let mut store = MemoryStore::new();
    let base = tree(
        &mut store,
        &[
            ("s1", "alpha\nbeta\ngamma\ndelta\n"),
            ("s2", "one\ntwo\nthree\nfour\n"),
        ],
    );
    // Side 1 renames both files, touching only their last lines.
    let side1 = tree(
        &mut store,
        &[
            ("d1", "alpha\nbeta\ngamma\nDELTA\n"),
            ("d2", "one\ntwo\nthree\nFOUR\n"),
        ],
    );
    // Side 2 edits only the first lines in place.
    let side2 = tree(
        &mut store,
        &[
            ("s1", "ALPHA\nbeta\ngamma\ndelta\n"),
            ("s2", "ONE\ntwo\nthree\nfour\n"),
        ],
    );

    let mut limited = opts();
    limited.rename_limit = 1;
    let mut merger = Merger::new(limited);
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();

    assert_eq!(outcome.needed_rename_limit, 2);
    assert!(!outcome.clean, "missed renames degrade to delete conflicts");

    // With an adequate limit the renames are found and the merge is clean.
    let mut merger = Merger::new(opts());
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();
    assert!(outcome.clean, "messages: {:?}", outcome.messages);
    let contents = flatten(&store, &outcome.tree);
    assert_eq!(contents["d1"], b"ALPHA\nbeta\ngamma\nDELTA\n");
    assert_eq!(contents["d2"], b"ONE\ntwo\nthree\nFOUR\n");
}

// ---------------------------------------------------------------------------
// Recursive merges
// ---------------------------------------------------------------------------

#[test]
fn recursive_merge_with_criss_cross_history() {
    let mut store = MemoryStore::new();
    let t_root = tree(&mut store, &[("f", "0\n")]);
    let t_a = tree(&mut store, &[("f", "a\n")]);
    let t_b = tree(&mut store, &[("f", "b\n")]);
    let t_merged = tree(&mut store, &[("f", "ab\n")]);
    let t_tip1 = tree(&mut store, &[("f", "ab\n"), ("x", "1\n")]);
    let t_tip2 = tree(&mut store, &[("f", "ab\n"), ("y", "2\n")]);

    let root = store.add_commit(t_root, vec![]);
    let a = store.add_commit(t_a, vec![root]);
    let b = store.add_commit(t_b, vec![root]);
    let m1 = store.add_commit(t_merged, vec![a, b]);
    let m2 = store.add_commit(t_merged, vec![b, a]);
    let tip1 = store.add_commit(t_tip1, vec![m1]);
    let tip2 = store.add_commit(t_tip2, vec![m2]);

    let mut merger = Merger::new(opts());
    let outcome = merger.merge_recursive(&mut store, &tip1, &tip2).unwrap();

    assert!(outcome.clean, "messages: {:?}", outcome.messages);
    let contents = flatten(&store, &outcome.tree);
    let paths: Vec<&str> = contents.keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["f", "x", "y"]);
    assert_eq!(contents["f"], b"ab\n");
}

#[test]
fn recursive_merge_without_common_ancestor_uses_empty_tree() {
    let mut store = MemoryStore::new();
    let t1 = tree(&mut store, &[("left", "1\n")]);
    let t2 = tree(&mut store, &[("right", "2\n")]);
    let c1 = store.add_commit(t1, vec![]);
    let c2 = store.add_commit(t2, vec![]);

    let mut merger = Merger::new(opts());
    let outcome = merger.merge_recursive(&mut store, &c1, &c2).unwrap();

    assert!(outcome.clean);
    let contents = flatten(&store, &outcome.tree);
    let paths: Vec<&str> = contents.keys().map(String::as_str).collect();
    assert_eq!(paths, vec!["left", "right"]);
}

// ---------------------------------------------------------------------------
// Submodules
// ---------------------------------------------------------------------------

#[test]
fn submodule_fast_forward_merges_clean() {
    let mut store = MemoryStore::new();
    let sub_tree = tree(&mut store, &[("inner", "sub\n")]);
    let c1 = store.add_commit(sub_tree, vec![]);
    let c2 = store.add_commit(sub_tree, vec![c1]);
    let c3 = store.add_commit(sub_tree, vec![c2]);

    let base = tree_full(
        &mut store,
        &[("sub", FileMode::SUBMODULE, c1.to_hex().as_bytes())],
    );
    let side1 = tree_full(
        &mut store,
        &[("sub", FileMode::SUBMODULE, c2.to_hex().as_bytes())],
    );
    let side2 = tree_full(
        &mut store,
        &[("sub", FileMode::SUBMODULE, c3.to_hex().as_bytes())],
    );

    let mut merger = Merger::new(opts());
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();

    assert!(outcome.clean, "messages: {:?}", outcome.messages);
    let contents = flatten(&store, &outcome.tree);
    assert_eq!(contents["sub"], c3.to_hex().into_bytes());
    assert!(all_messages(&outcome).contains("Fast-forwarding submodule"));
}

#[test]
fn submodule_divergence_is_unclean_with_candidates() {
    let mut store = MemoryStore::new();
    let sub_tree = tree(&mut store, &[("inner", "sub\n")]);
    let c1 = store.add_commit(sub_tree, vec![]);
    let c2 = store.add_commit(sub_tree, vec![c1]);
    let c3 = store.add_commit(sub_tree, vec![c1]);
    let resolution = store.add_commit(sub_tree, vec![c2, c3]);

    let base = tree_full(
        &mut store,
        &[("sub", FileMode::SUBMODULE, c1.to_hex().as_bytes())],
    );
    let side1 = tree_full(
        &mut store,
        &[("sub", FileMode::SUBMODULE, c2.to_hex().as_bytes())],
    );
    let side2 = tree_full(
        &mut store,
        &[("sub", FileMode::SUBMODULE, c3.to_hex().as_bytes())],
    );

    let mut merger = Merger::new(opts());
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();

    assert!(!outcome.clean);
    assert!(all_messages(&outcome).contains("possible merge resolution"));
    assert!(all_messages(&outcome).contains(&resolution.to_hex()[..12]));
    assert!(unmerged_paths(&outcome).contains(&"sub".to_owned()));
}

// ---------------------------------------------------------------------------
// Renormalization
// ---------------------------------------------------------------------------

#[test]
fn renormalize_treats_crlf_only_changes_as_unchanged() {
    let mut store = MemoryStore::new();
    let base = tree(&mut store, &[("doc", "line\r\nother\r\n")]);
    let side1 = tree(&mut store, &[("doc", "line\nother\n")]);
    let side2 = tree(&mut store, &[]);

    // Without renormalization: modify/delete conflict.
    let mut merger = Merger::new(opts());
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();
    assert!(!outcome.clean);

    // With renormalization: the "modification" is only line endings, so
    // the deletion wins cleanly.
    let mut renorm = opts();
    renorm.renormalize = true;
    let mut merger = Merger::new(renorm);
    let outcome = merger
        .merge_nonrecursive(&mut store, &base, &side1, &side2)
        .unwrap();
    assert!(outcome.clean, "messages: {:?}", outcome.messages);
    assert!(flatten(&store, &outcome.tree).is_empty());
}

// ---------------------------------------------------------------------------
// Empty inputs
// ---------------------------------------------------------------------------

#[test]
fn merging_empty_trees_yields_empty_tree() {
    let mut store = MemoryStore::new();
    let empty = tree(&mut store, &[]);
    let mut merger = Merger::new(opts());
    let outcome = merger
        .merge_nonrecursive(&mut store, &empty, &empty, &empty)
        .unwrap();
    assert!(outcome.clean);
    assert!(store.read_tree(&outcome.tree).unwrap().is_empty());
}
