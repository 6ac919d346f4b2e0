//! Resolve step: per-path conflict classification.
//!
//! Paths are visited in reverse "directories next to their children"
//! order, so by the time a directory's own record comes up every child has
//! already been handed to the tree builder. Each non-clean record is
//! classified:
//!
//! - some roles still agree → resolved to the disagreeing side,
//! - both sides present but with different kinds of object → "distinct
//!   types", relocated onto uniquified names,
//! - both sides present with matching kinds → content merge,
//! - present on base and one side → modify/delete,
//! - present on one side only → add (clean unless a D/F or path dispute),
//! - present on base only → deleted on both sides,
//! - plus the aftermath of file/directory collisions, where the surviving
//!   directory forces the file onto a uniquified name.
//!
//! Unresolved records are registered in the unmerged set; every record's
//! result feeds the tree builder.

use crate::error::MergeError;
use crate::merge::build::{
    finish_tree, record_entry_for_tree, write_completed_directories, DirectoryVersions,
};
use crate::merge::content::{blob_unchanged, handle_content_merge, ContentMerger};
use crate::merge::options::MergeOptions;
use crate::merge::types::{cmp_dirs_next_to_children, unique_path, MergeState, VersionInfo};
use crate::model::types::{FileMode, ObjectId, ObjectKind};
use crate::store::ObjectStore;

// ---------------------------------------------------------------------------
// process_entries
// ---------------------------------------------------------------------------

/// Resolve every path and build the result tree, returning its id.
pub(crate) fn process_entries<S: ObjectStore>(
    state: &mut MergeState,
    opts: &MergeOptions,
    store: &mut S,
    content: &dyn ContentMerger,
) -> Result<ObjectId, MergeError> {
    if state.paths.is_empty() {
        return store.write_object(ObjectKind::Tree, b"");
    }

    let mut plist: Vec<String> = state.paths.keys().cloned().collect();
    plist.sort_by(|a, b| cmp_dirs_next_to_children(a, b));

    tracing::debug!(paths = plist.len(), "processing entries");
    let mut dir_metadata = DirectoryVersions::new();
    for path in plist.iter().rev() {
        let Some(info) = state.paths.get(path) else {
            // Removed while relocating an earlier entry.
            continue;
        };
        let dir = info.merged.dir;
        let clean = info.merged.clean;
        write_completed_directories(state, store, dir, &mut dir_metadata)?;
        if clean {
            let info = &state.paths[path];
            record_entry_for_tree(&mut dir_metadata, path, info);
        } else {
            process_entry(state, opts, store, content, path, &mut dir_metadata)?;
        }
    }

    finish_tree(store, &mut dir_metadata)
}

// ---------------------------------------------------------------------------
// process_entry
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_lines)]
fn process_entry<S: ObjectStore>(
    state: &mut MergeState,
    opts: &MergeOptions,
    store: &mut S,
    content: &dyn ContentMerger,
    path: &str,
    dir_metadata: &mut DirectoryVersions,
) -> Result<(), MergeError> {
    let Some(mut ci) = state.paths.get(path).cloned() else {
        return Ok(());
    };
    debug_assert!(!ci.merged.clean);
    debug_assert!(ci.filemask <= 7);

    // Pure directory placeholders were handled as their children closed.
    if ci.filemask == 0 {
        return Ok(());
    }

    let mut path = path.to_owned();
    let mut df_file_index = 0usize;

    if ci.df_conflict && ci.merged.result.mode.is_absent() {
        // The competing directory merged away to nothing; scrub the
        // directory half of the record and treat the file normally.
        ci.df_conflict = false;
        ci.merged.clean = false;
        ci.merged.is_null = false;
        ci.match_mask &= !ci.dirmask;
        ci.dirmask = 0;
        for role in 0..3 {
            if ci.filemask & (1 << role) == 0 {
                ci.stages[role] = VersionInfo::NULL;
            }
        }
    } else if ci.df_conflict {
        // The directory survived (the builder put a tree in result); the
        // file must move aside.
        debug_assert_eq!(ci.merged.result.mode, FileMode::TREE);

        if ci.filemask == 1 {
            // Deleted on both sides; just keep the directory.
            if let Some(rec) = state.paths.get_mut(&path) {
                rec.filemask = 0;
            }
            return Ok(());
        }

        let mut new_ci = ci.clone();
        new_ci.match_mask &= !new_ci.dirmask;
        new_ci.dirmask = 0;
        for role in 0..3 {
            if new_ci.filemask & (1 << role) == 0 {
                new_ci.stages[role] = VersionInfo::NULL;
            }
        }

        // Renames can push filemask back up to 7, so use dirmask to tell
        // which side brought the file.
        df_file_index = if ci.dirmask & (1 << 1) != 0 { 2 } else { 1 };
        let branch = state.labels.side(df_file_index).to_owned();
        let old_path = path.clone();
        let relocated = unique_path(&state.paths, &path, &branch);

        state.path_msg(
            &relocated,
            &format!(
                "CONFLICT (file/directory): directory in the way of {old_path} from \
                 {branch}; moving it to {relocated} instead."
            ),
        );

        // The original record stays as the directory's entry.
        if let Some(rec) = state.paths.get_mut(&path) {
            rec.filemask = 0;
        }
        state.paths.insert(relocated.clone(), new_ci.clone());
        ci = new_ci;
        path = relocated;
    }

    if ci.match_mask != 0 {
        ci.merged.clean = true;
        if ci.match_mask == 6 {
            // Both sides agree and differ from base.
            ci.merged.result = ci.stages[1];
        } else {
            // One side matches base; the other side wins.
            let othermask = 7 & !ci.match_mask;
            let side = if othermask == 4 { 2 } else { 1 };
            ci.merged.is_null = ci.filemask == ci.match_mask;
            ci.merged.result = ci.stages[side];
            debug_assert!(othermask == 2 || othermask == 4);
            debug_assert!(ci.merged.is_null == ci.merged.result.mode.is_absent());
        }
    } else if ci.filemask >= 6
        && ci.stages[1].mode.object_type() != ci.stages[2].mode.object_type()
    {
        // Distinct kinds of object (file/symlink/submodule) on each side.
        if state.call_depth > 0 {
            // Inside virtual-ancestor construction just keep the base.
            ci.merged.clean = false;
            ci.merged.result = ci.stages[0];
            ci.merged.is_null = ci.merged.result.mode.is_absent();
        } else {
            let o_type = ci.stages[0].mode.object_type();
            let a_regular = ci.stages[1].mode.is_regular();
            let b_regular = ci.stages[2].mode.is_regular();
            let (rename_a, rename_b) = if a_regular {
                (true, false)
            } else if b_regular {
                (false, true)
            } else {
                (true, true)
            };

            state.path_msg(
                &path,
                &format!(
                    "CONFLICT (distinct types): {path} had different types on each \
                     side; renamed {} of them so each can be recorded somewhere.",
                    if rename_a && rename_b { "both" } else { "one" }
                ),
            );
            ci.merged.clean = false;

            // Split: b goes to new_ci, a stays in ci.
            let mut new_ci = ci.clone();
            new_ci.merged.result = new_ci.stages[2];
            new_ci.stages[1] = VersionInfo::NULL;
            new_ci.filemask = 5;
            if new_ci.stages[2].mode.object_type() != o_type {
                new_ci.stages[0] = VersionInfo::NULL;
                new_ci.filemask = 4;
            }

            ci.merged.result = ci.stages[1];
            ci.stages[2] = VersionInfo::NULL;
            ci.filemask = 3;
            if ci.stages[1].mode.object_type() != o_type {
                ci.stages[0] = VersionInfo::NULL;
                ci.filemask = 2;
            }

            let a_path = if rename_a {
                let renamed = unique_path(&state.paths, &path, &state.labels.side1.clone());
                state.paths.insert(renamed.clone(), ci.clone());
                renamed
            } else {
                path.clone()
            };
            let b_path = if rename_b {
                unique_path(&state.paths, &path, &state.labels.side2.clone())
            } else {
                path.clone()
            };
            state.paths.insert(b_path.clone(), new_ci.clone());
            if rename_a && rename_b {
                state.paths.remove(&path);
            }

            // b_path is not revisited by the walk; finish it here.
            state.unmerged.insert(b_path.clone());
            record_entry_for_tree(dir_metadata, &b_path, &new_ci);

            path = a_path;
        }
    } else if ci.filemask >= 6 {
        // Two- or three-way content merge.
        let mut merged_file = VersionInfo::NULL;
        let stages = ci.stages;
        let pathnames = ci.pathnames.clone();
        let clean_merge = handle_content_merge(
            state,
            opts,
            store,
            content,
            &path,
            &stages[0],
            &stages[1],
            &stages[2],
            &pathnames,
            2 * state.call_depth as usize,
            &mut merged_file,
        )?;

        ci.merged.clean = clean_merge && !ci.df_conflict && !ci.path_conflict;
        ci.merged.result = merged_file;
        ci.merged.is_null = merged_file.mode.is_absent();
        if clean_merge && ci.df_conflict {
            debug_assert!(df_file_index == 1 || df_file_index == 2);
            ci.filemask = 1 << df_file_index;
            ci.stages[df_file_index] = merged_file;
        }
        if !clean_merge {
            let reason = if ci.filemask == 6 {
                "add/add"
            } else if merged_file.mode.is_submodule() {
                "submodule"
            } else {
                "content"
            };
            state.path_msg(&path, &format!("CONFLICT ({reason}): Merge conflict in {path}"));
        }
    } else if ci.filemask == 3 || ci.filemask == 5 {
        // Modify/delete.
        let side = if ci.filemask == 5 { 2 } else { 1 };
        let index = if state.call_depth > 0 { 0 } else { side };
        ci.merged.result = ci.stages[index];
        ci.merged.clean = false;

        let modify_branch = state.labels.side(side).to_owned();
        let delete_branch = state.labels.side(3 - side).to_owned();

        if opts.renormalize && blob_unchanged(store, opts, &ci.stages[0], &ci.stages[side])? {
            // Only line endings changed; honor the deletion.
            ci.merged.is_null = true;
            ci.merged.clean = true;
            ci.merged.result = VersionInfo::NULL;
        } else if ci.path_conflict && ci.stages[0].oid == ci.stages[side].oid {
            // Came from rename/delete; that message already covers it.
        } else {
            state.path_msg(
                &path,
                &format!(
                    "CONFLICT (modify/delete): {path} deleted in {delete_branch} and \
                     modified in {modify_branch}.  Version {modify_branch} of {path} \
                     left in tree."
                ),
            );
        }
    } else if ci.filemask == 2 || ci.filemask == 4 {
        // Added on one side.
        let side = if ci.filemask == 4 { 2 } else { 1 };
        ci.merged.result = ci.stages[side];
        ci.merged.clean = !ci.df_conflict && !ci.path_conflict;
    } else if ci.filemask == 1 {
        // Deleted on both sides.
        ci.merged.is_null = true;
        ci.merged.result = VersionInfo::NULL;
        ci.merged.clean = !ci.path_conflict;
    }

    if !ci.merged.clean {
        state.unmerged.insert(path.clone());
    }
    record_entry_for_tree(dir_metadata, &path, &ci);
    state.paths.insert(path, ci);
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::collect::collect_merge_info;
    use crate::merge::content::TextMerger;
    use crate::merge::types::Labels;
    use crate::store::MemoryStore;

    fn labels() -> Labels {
        Labels {
            ancestor: "base".to_owned(),
            side1: "LEFT".to_owned(),
            side2: "RIGHT".to_owned(),
        }
    }

    fn run(
        store: &mut MemoryStore,
        base: ObjectId,
        side1: ObjectId,
        side2: ObjectId,
    ) -> (MergeState, ObjectId) {
        let mut state = MergeState::new(labels());
        let opts = MergeOptions::default();
        collect_merge_info(&mut state, store, &base, &side1, &side2).unwrap();
        let tree = process_entries(&mut state, &opts, store, &TextMerger).unwrap();
        (state, tree)
    }

    fn tree_paths(store: &MemoryStore, tree: &ObjectId) -> Vec<(String, Vec<u8>)> {
        let mut out = Vec::new();
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
                } else {
                    out.push((path, store.read_blob(&entry.oid).unwrap()));
                }
            }
        }
        out.sort();
        out
    }

    #[test]
    fn identical_inputs_rebuild_identical_tree() {
        let mut store = MemoryStore::new();
        let t = store
            .insert_tree(&[
                ("a", FileMode::REGULAR, b"1"),
                ("d/b", FileMode::REGULAR, b"2"),
                ("d/e/c", FileMode::REGULAR, b"3"),
            ])
            .unwrap();
        let (state, tree) = run(&mut store, t, t, t);
        assert!(state.unmerged.is_empty());
        assert_eq!(tree, t);
    }

    #[test]
    fn one_sided_change_takes_that_side() {
        let mut store = MemoryStore::new();
        let base = store.insert_tree(&[("f", FileMode::REGULAR, b"old")]).unwrap();
        let side2 = store.insert_tree(&[("f", FileMode::REGULAR, b"new")]).unwrap();
        let (state, tree) = run(&mut store, base, base, side2);
        assert!(state.unmerged.is_empty());
        assert_eq!(tree, side2);
    }

    #[test]
    fn modify_delete_keeps_modified_version_unclean() {
        let mut store = MemoryStore::new();
        let base = store.insert_tree(&[("x", FileMode::REGULAR, b"a\n")]).unwrap();
        let modified = store
            .insert_tree(&[("x", FileMode::REGULAR, b"a modified\n")])
            .unwrap();
        let deleted = store.insert_tree(&[]).unwrap();
        let (state, tree) = run(&mut store, base, modified, deleted);

        assert!(state.unmerged.contains("x"));
        let contents = tree_paths(&store, &tree);
        assert_eq!(contents, vec![("x".to_owned(), b"a modified\n".to_vec())]);
        let msg = &state.output["x"];
        assert!(msg.contains("modify/delete"));
        assert!(msg.contains("LEFT"));
        assert!(msg.contains("RIGHT"));
    }

    #[test]
    fn content_conflict_writes_markers() {
        let mut store = MemoryStore::new();
        let base = store.insert_tree(&[("f", FileMode::REGULAR, b"1\n2\n3\n")]).unwrap();
        let s1 = store.insert_tree(&[("f", FileMode::REGULAR, b"1\n2a\n3\n")]).unwrap();
        let s2 = store.insert_tree(&[("f", FileMode::REGULAR, b"1\n2b\n3\n")]).unwrap();
        let (state, tree) = run(&mut store, base, s1, s2);

        assert!(state.unmerged.contains("f"));
        let info = &state.paths["f"];
        assert_eq!(info.filemask, 7);
        assert!(!info.merged.is_null);
        let contents = tree_paths(&store, &tree);
        let text = String::from_utf8(contents[0].1.clone()).unwrap();
        assert!(text.contains("<<<<<<< LEFT"));
        assert!(text.contains(">>>>>>> RIGHT"));
        assert!(state.output["f"].contains("CONFLICT (content)"));
    }

    #[test]
    fn both_sides_deleting_is_clean() {
        let mut store = MemoryStore::new();
        let base = store.insert_tree(&[("f", FileMode::REGULAR, b"x")]).unwrap();
        let empty = store.insert_tree(&[]).unwrap();
        let (state, tree) = run(&mut store, base, empty, empty);
        assert!(state.unmerged.is_empty());
        assert!(tree_paths(&store, &tree).is_empty());
    }

    #[test]
    fn file_directory_conflict_moves_file_aside() {
        let mut store = MemoryStore::new();
        let base = store.insert_tree(&[]).unwrap();
        let file_side = store
            .insert_tree(&[("p", FileMode::REGULAR, b"file\n")])
            .unwrap();
        let dir_side = store
            .insert_tree(&[("p/inside", FileMode::REGULAR, b"dir\n")])
            .unwrap();
        let (state, tree) = run(&mut store, base, file_side, dir_side);

        let contents = tree_paths(&store, &tree);
        assert_eq!(
            contents,
            vec![
                ("p/inside".to_owned(), b"dir\n".to_vec()),
                ("p~LEFT".to_owned(), b"file\n".to_vec()),
            ]
        );
        assert!(state.unmerged.contains("p~LEFT"));
        assert!(state.output["p~LEFT"].contains("directory in the way"));
    }

    #[test]
    fn distinct_types_split_onto_unique_paths() {
        let mut store = MemoryStore::new();
        let base = store.insert_tree(&[]).unwrap();
        let s1 = store
            .insert_tree(&[("thing", FileMode::REGULAR, b"regular\n")])
            .unwrap();
        let s2 = store
            .insert_tree(&[("thing", FileMode::SYMLINK, b"target")])
            .unwrap();
        let (state, tree) = run(&mut store, base, s1, s2);

        // The regular file moved aside; the symlink kept the path.
        let contents = tree_paths(&store, &tree);
        let paths: Vec<&str> = contents.iter().map(|(p, _)| p.as_str()).collect();
        assert!(paths.contains(&"thing~LEFT"));
        assert!(paths.contains(&"thing"));
        assert!(state.output["thing"].contains("distinct types"));
        assert!(state.unmerged.contains("thing~LEFT"));
        assert!(state.unmerged.contains("thing"));
    }

    #[test]
    fn add_add_same_content_resolves_clean() {
        let mut store = MemoryStore::new();
        let base = store.insert_tree(&[]).unwrap();
        let added = store.insert_tree(&[("new", FileMode::REGULAR, b"same\n")]).unwrap();
        let (state, tree) = run(&mut store, base, added, added);
        assert!(state.unmerged.is_empty());
        assert_eq!(
            tree_paths(&store, &tree),
            vec![("new".to_owned(), b"same\n".to_vec())]
        );
    }
}
