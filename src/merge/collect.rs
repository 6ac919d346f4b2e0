//! Collect step: the joint three-tree walk.
//!
//! Walks base, side 1, and side 2 simultaneously in lexical order and
//! populates the path map with one record per path seen in any tree,
//! enqueueing rename candidates along the way. The walk is an explicit FIFO
//! work queue of directories; for every queued directory all entries are
//! unified by name before any subdirectory is descended, which is what lets
//! `dir_rename_mask` be raised by a newly-added file before its siblings
//! are examined.
//!
//! Short-circuits:
//! - all three versions equal → resolved with the base version,
//! - three files with both sides equal → resolved with the side-1 version,
//! - three files with one side matching base → resolved with the other side,
//! - a directory where one side matches base → parked in
//!   `possible_trivial_merges` and only expanded afterwards if a rename
//!   target might live inside it.
//!
//! Deferred handling may conclude that the walk expanded so much that a
//! rerun with primed rename caches would be cheaper; it then requests the
//! redo via `redo_after_renames`.

use std::collections::VecDeque;

use crate::error::MergeError;
use crate::merge::types::{
    parent_dir, FilePair, FileSpec, MergeState, PathInfo, Relevance, VersionInfo,
};
use crate::model::types::{ObjectId, TreeEntry};
use crate::store::ObjectStore;

// ---------------------------------------------------------------------------
// Work queue
// ---------------------------------------------------------------------------

/// One directory level awaiting the joint walk.
#[derive(Debug)]
struct WorkItem {
    /// Directory path ("" for the root).
    dir: String,
    /// Tree ids per role; `None` where the role lacks this directory.
    trees: [Option<ObjectId>; 3],
    /// Inherited rename-source-elision state.
    dir_rename_mask: u8,
}

/// A name unified across the three trees.
#[derive(Debug)]
struct JointEntry {
    name: String,
    versions: [VersionInfo; 3],
    mask: u8,
    dirmask: u8,
}

impl JointEntry {
    fn filemask(&self) -> u8 {
        self.mask & !self.dirmask
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Populate the path map from the three root trees.
pub(crate) fn collect_merge_info<S: ObjectStore>(
    state: &mut MergeState,
    store: &S,
    base: &ObjectId,
    side1: &ObjectId,
    side2: &ObjectId,
) -> Result<(), MergeError> {
    tracing::debug!(%base, %side1, %side2, "collecting merge info");
    let mut queue = VecDeque::new();
    queue.push_back(WorkItem {
        dir: String::new(),
        trees: [Some(*base), Some(*side1), Some(*side2)],
        dir_rename_mask: 0,
    });
    drain_queue(state, store, &mut queue)?;
    handle_deferred_entries(state, store)?;
    Ok(())
}

fn drain_queue<S: ObjectStore>(
    state: &mut MergeState,
    store: &S,
    queue: &mut VecDeque<WorkItem>,
) -> Result<(), MergeError> {
    while let Some(item) = queue.pop_front() {
        process_dir_item(state, store, queue, item)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Per-directory processing
// ---------------------------------------------------------------------------

fn process_dir_item<S: ObjectStore>(
    state: &mut MergeState,
    store: &S,
    queue: &mut VecDeque<WorkItem>,
    item: WorkItem,
) -> Result<(), MergeError> {
    let mut lists: [Vec<TreeEntry>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for (i, tree) in item.trees.iter().enumerate() {
        if let Some(oid) = tree {
            lists[i] = store.read_tree(oid)?;
        }
    }
    let entries = join_entries(lists);

    // With an inherited mask of 2 or 4, any file that exists only on the
    // side that still has this directory means rename sources below here
    // must all be kept; decide that before touching a single entry.
    let mut mask = item.dir_rename_mask;
    if (mask == 2 || mask == 4) && entries.iter().any(|e| e.filemask() == mask) {
        mask = 0x07;
    }

    for entry in entries {
        process_joint_entry(state, queue, &item.dir, mask, entry);
    }
    Ok(())
}

/// Merge three sorted entry lists by name.
fn join_entries(lists: [Vec<TreeEntry>; 3]) -> Vec<JointEntry> {
    let mut iters: Vec<std::iter::Peekable<std::vec::IntoIter<TreeEntry>>> = lists
        .into_iter()
        .map(|l| l.into_iter().peekable())
        .collect();

    let mut joint = Vec::new();
    loop {
        let next_name = iters
            .iter_mut()
            .filter_map(|it| it.peek().map(|e| e.name.clone()))
            .min();
        let Some(name) = next_name else { break };

        let mut versions = [VersionInfo::NULL; 3];
        let mut mask = 0u8;
        let mut dirmask = 0u8;
        for (i, it) in iters.iter_mut().enumerate() {
            if let Some(entry) = it.next_if(|e| e.name == name) {
                versions[i] = VersionInfo {
                    oid: entry.oid,
                    mode: entry.mode,
                };
                mask |= 1 << i;
                if entry.mode.is_tree() {
                    dirmask |= 1 << i;
                }
            }
        }
        joint.push(JointEntry {
            name,
            versions,
            mask,
            dirmask,
        });
    }
    joint
}

// ---------------------------------------------------------------------------
// Per-entry processing
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_lines)]
fn process_joint_entry(
    state: &mut MergeState,
    queue: &mut VecDeque<WorkItem>,
    dirname: &str,
    inherited_mask: u8,
    entry: JointEntry,
) {
    let filemask = entry.filemask();
    let dirmask = entry.dirmask;
    let versions = entry.versions;

    let mbase_null = entry.mask & 1 == 0;
    let side1_null = entry.mask & 2 == 0;
    let side2_null = entry.mask & 4 == 0;
    let side1_matches_mbase = !side1_null && !mbase_null && versions[0] == versions[1];
    let side2_matches_mbase = !side2_null && !mbase_null && versions[0] == versions[2];
    let sides_match = !side1_null && !side2_null && versions[1] == versions[2];

    // Only files get df_conflict; directories stay put and files move out
    // of their way, so a parent-level D/F does not taint children.
    let df_conflict = filemask != 0 && dirmask != 0;

    let match_mask = if side1_matches_mbase {
        if side2_matches_mbase {
            7
        } else {
            3
        }
    } else if side2_matches_mbase {
        5
    } else if sides_match {
        6
    } else {
        0
    };

    let fullpath = if dirname.is_empty() {
        entry.name.clone()
    } else {
        format!("{}/{}", dirname, entry.name)
    };
    let dir_id = state.dirs.intern(dirname);
    let basename_offset = if dirname.is_empty() {
        0
    } else {
        dirname.len() + 1
    };

    // All three match: resolve with base; nothing underneath can rename.
    if side1_matches_mbase && side2_matches_mbase {
        let info = PathInfo::resolved(dir_id, basename_offset, versions[0], mbase_null);
        state.paths.insert(fullpath, info);
        return;
    }

    // Three files with identical sides: either side is the resolution.
    if filemask == 7 && sides_match {
        let info = PathInfo::resolved(dir_id, basename_offset, versions[1], false);
        state.paths.insert(fullpath, info);
        return;
    }

    // Record rename candidates even for paths we can early-resolve below;
    // exact renames are cheap and can remove a source and a target at once.
    let mut entry_mask = inherited_mask;
    collect_rename_info(
        state,
        &versions,
        dirname,
        &fullpath,
        filemask,
        dirmask,
        match_mask,
        &mut entry_mask,
    );

    // A file matching base on one side resolves to the other side. Trees
    // cannot take this shortcut here: the other side may hold rename
    // targets we still have to see.
    if side1_matches_mbase && filemask == 0x07 {
        let info = PathInfo::resolved(dir_id, basename_offset, versions[2], side2_null);
        state.paths.insert(fullpath, info);
        return;
    }
    if side2_matches_mbase && filemask == 0x07 {
        let info = PathInfo::resolved(dir_id, basename_offset, versions[1], side1_null);
        state.paths.insert(fullpath, info);
        return;
    }

    // Provisional conflict; renames may still clean it up.
    let mut info = PathInfo::pending(
        dir_id,
        basename_offset,
        &fullpath,
        versions,
        filemask,
        dirmask,
        df_conflict,
    );
    info.match_mask = match_mask;

    if dirmask != 0 {
        // One side matching base means only the other side can hold rename
        // targets; brand-new directories likewise have a single interesting
        // side.
        let mut side = if side1_matches_mbase {
            2
        } else if side2_matches_mbase {
            1
        } else {
            0
        };
        if filemask == 0 && (dirmask == 2 || dirmask == 4) {
            info.match_mask = 7 - dirmask;
            side = usize::from(dirmask / 2);
        }

        if entry_mask != 0x07
            && side != 0
            && state.renames.trivial_merges_okay[side]
            && !state.renames.target_dirs[side].contains(&fullpath)
        {
            state.renames.possible_trivial_merges[side].insert(fullpath.clone(), entry_mask);
            state.paths.insert(fullpath, info);
            return;
        }

        info.match_mask &= filemask;
        let mut trees = [None; 3];
        for (i, tree) in trees.iter_mut().enumerate() {
            if dirmask & (1 << i) != 0 {
                *tree = Some(versions[i].oid);
            }
        }
        queue.push_back(WorkItem {
            dir: fullpath.clone(),
            trees,
            dir_rename_mask: entry_mask,
        });
    }

    state.paths.insert(fullpath, info);
}

// ---------------------------------------------------------------------------
// Rename-candidate collection
// ---------------------------------------------------------------------------

#[allow(clippy::too_many_arguments)]
fn collect_rename_info(
    state: &mut MergeState,
    versions: &[VersionInfo; 3],
    dirname: &str,
    fullname: &str,
    filemask: u8,
    dirmask: u8,
    match_mask: u8,
    mask: &mut u8,
) {
    // A directory present in base and exactly one side may be a rename
    // source; sources under it can only be elided if no new file shows up
    // on the surviving side (mask 2/4), and not at all once that happens
    // (mask 7).
    if *mask != 0x07 && (dirmask == 3 || dirmask == 5) {
        debug_assert!(*mask == 0 || *mask == (dirmask & !1));
        *mask = dirmask & !1;
    }

    if dirmask == 1 || dirmask == 3 || dirmask == 5 {
        let sides = (7 - dirmask) / 2;
        let full_reconstruction = u8::from(*mask == 0x07);
        if sides & 1 != 0 {
            state.renames.dirs_removed[1].insert(fullname.to_owned(), full_reconstruction);
        }
        if sides & 2 != 0 {
            state.renames.dirs_removed[2].insert(fullname.to_owned(), full_reconstruction);
        }
    }

    if *mask == 0x07 && (filemask == 2 || filemask == 4) {
        // A new file on one side means the other side's rename of the
        // containing directory needs its sources in full.
        let side = 3 - usize::from(filemask >> 1);
        state.renames.dirs_removed[side].insert(dirname.to_owned(), 2);
    }

    if filemask == 0 || filemask == 7 {
        return;
    }

    for side in 1..=2usize {
        let side_bit = 1u8 << side;
        if (filemask & 1) != 0 && (filemask & side_bit) == 0 {
            add_pair(
                state,
                versions,
                fullname,
                side,
                false,
                match_mask & filemask,
                *mask,
            );
        }
        if (filemask & 1) == 0 && (filemask & side_bit) != 0 {
            add_pair(
                state,
                versions,
                fullname,
                side,
                true,
                match_mask & filemask,
                *mask,
            );
        }
    }
}

fn add_pair(
    state: &mut MergeState,
    versions: &[VersionInfo; 3],
    pathname: &str,
    side: usize,
    is_add: bool,
    match_mask: u8,
    dir_rename_mask: u8,
) {
    let renames = &mut state.renames;
    let names_idx = if is_add { side } else { 0 };

    if is_add {
        debug_assert!(match_mask == 0 || match_mask == 6);
        if renames.cached_target_names[side].contains(pathname) {
            return;
        }
    } else {
        debug_assert!(match_mask == 0 || match_mask == 3 || match_mask == 5);
        let content_relevant = match_mask == 0;
        let location_relevant = dir_rename_mask == 0x07;

        // A previous pick may have cached this source as irrelevant, but
        // for this merge its content matters again.
        if content_relevant {
            renames.cached_irrelevant[side].remove(pathname);
        }

        if content_relevant || location_relevant {
            let relevance = if content_relevant {
                Relevance::Content
            } else {
                Relevance::Location
            };
            renames.relevant_sources[side].insert(pathname.to_owned(), relevance);
        }

        // Cached pairings need no re-detection. Relevance was recorded
        // above regardless, because deferred handling walks the union of
        // relevant sources and cached pairs.
        if renames.cached_pairs[side].contains_key(pathname)
            || renames.cached_irrelevant[side].contains(pathname)
        {
            return;
        }
    }

    let spec = FileSpec {
        path: pathname.to_owned(),
        oid: versions[names_idx].oid,
        mode: versions[names_idx].mode,
    };
    let pair = if is_add {
        FilePair {
            one: FileSpec::absent(pathname),
            two: spec,
            status: crate::merge::types::PairStatus::Pending,
            score: 0,
            target_side: 0,
        }
    } else {
        FilePair {
            one: spec,
            two: FileSpec::absent(pathname),
            status: crate::merge::types::PairStatus::Pending,
            score: 0,
            target_side: 0,
        }
    };
    renames.pairs[side].push(pair);
}

// ---------------------------------------------------------------------------
// Deferred trivial merges
// ---------------------------------------------------------------------------

fn resolve_trivial_directory_merge(state: &mut MergeState, path: &str, side: usize) {
    let Some(ci) = state.paths.get_mut(path) else {
        return;
    };
    debug_assert!(
        (side == 1 && ci.match_mask == 5) || (side == 2 && ci.match_mask == 3),
        "trivial merge with inconsistent match mask at {path}"
    );
    ci.merged.result = ci.stages[side];
    ci.merged.is_null = ci.stages[side].oid.is_null();
    ci.match_mask = 0;
    ci.merged.clean = true;
}

fn handle_deferred_entries<S: ObjectStore>(
    state: &mut MergeState,
    store: &S,
) -> Result<(), MergeError> {
    let path_count_before = state.paths.len();
    let mut path_count_after = 0usize;

    for side in 1..=2usize {
        let mut optimization_okay = true;

        // A deferred directory may only be adopted wholesale if we already
        // know, for every relevant source, whether it renames and where the
        // target landed.
        let sources: Vec<String> = state.renames.relevant_sources[side]
            .keys()
            .cloned()
            .collect();
        for src in sources {
            if state.renames.cached_irrelevant[side].contains(&src) {
                continue;
            }
            let Some(cached) = state.renames.cached_pairs[side].get(&src) else {
                optimization_okay = false;
                break;
            };
            let Some(target) = cached.clone() else {
                continue; // a delete needs no target walk
            };
            if state.paths.contains_key(&target) {
                continue;
            }
            // Mark every not-yet-known ancestor of the target as a
            // directory that must be expanded.
            let mut dir = parent_dir(&target).to_owned();
            while !dir.is_empty() {
                if state.renames.target_dirs[side].contains(&dir) {
                    break;
                }
                state.renames.target_dirs[side].insert(dir.clone());
                dir = parent_dir(&dir).to_owned();
            }
        }
        state.renames.trivial_merges_okay[side] = optimization_okay;

        // Expanding a deferred directory can defer more directories, so
        // iterate over a drained copy and sweep the stragglers afterwards.
        let parked = std::mem::take(&mut state.renames.possible_trivial_merges[side]);
        for (path, dir_rename_mask) in parked {
            if optimization_okay && !state.renames.target_dirs[side].contains(&path) {
                resolve_trivial_directory_merge(state, &path, side);
                continue;
            }

            let Some(ci) = state.paths.get_mut(&path) else {
                continue;
            };
            ci.match_mask &= ci.filemask;
            let dirmask = ci.dirmask;
            let mut trees = [None; 3];
            for (i, tree) in trees.iter_mut().enumerate() {
                if dirmask & (1 << i) != 0 {
                    *tree = Some(ci.stages[i].oid);
                }
            }
            let mut queue = VecDeque::new();
            queue.push_back(WorkItem {
                dir: path,
                trees,
                dir_rename_mask,
            });
            drain_queue(state, store, &mut queue)?;
        }

        let stragglers = std::mem::take(&mut state.renames.possible_trivial_merges[side]);
        for (path, _) in stragglers {
            resolve_trivial_directory_merge(state, &path, side);
        }

        if !optimization_okay || path_count_after != 0 {
            path_count_after = state.paths.len();
        }
    }

    if path_count_after != 0 {
        // Expanding deferred directories can blow the path count up by a
        // couple of orders of magnitude on big directory renames. Once the
        // rename cache exists, redoing collection lets most of those paths
        // resolve trivially, so a rerun pays for itself past this factor.
        const WANTED_FACTOR: usize = 10;
        debug_assert_eq!(state.renames.redo_after_renames, 0);
        if state.renames.redo_after_renames == 0
            && path_count_before > 0
            && path_count_after / path_count_before > WANTED_FACTOR
        {
            tracing::debug!(
                before = path_count_before,
                after = path_count_after,
                "scheduling collection redo after rename detection"
            );
            state.renames.redo_after_renames = 1;
            state.renames.cached_pairs_valid_side = -1;
        }
    } else if state.renames.redo_after_renames == 2 {
        state.renames.redo_after_renames = 0;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
