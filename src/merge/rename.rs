//! Rename engine: regular renames, directory renames, and the cache.
//!
//! Phase one runs the similarity detector per side over the candidate
//! pairs the collector queued, limited to relevant sources. Phase two
//! aggregates individual renames into old-directory → new-directory moves,
//! invalidates the bogus ones, and applies implicit renames to surviving
//! adds — relocating records inside the path map, synthesizing ancestor
//! placeholders, and merging complementary records when both sides put
//! something at the same target.
//!
//! The detected pairs from both sides are then processed in old-path
//! order, which puts the two halves of a rename/rename(1→2) next to each
//! other; each pair updates the path-map records so the resolver sees a
//! coherent three-way picture at the rename target.
//!
//! Detection results are cached per side so a sequence of merges (rebase,
//! cherry-pick) can replay them: between merges the caller's new inputs
//! are compared against the previous merge's trees to decide which side's
//! cache is still valid.

use std::collections::BTreeMap;

use crate::error::MergeError;
use crate::merge::content::{handle_content_merge, ContentMerger};
use crate::merge::options::{DirectoryRenames, MergeOptions};
use crate::merge::similarity::detect_renames;
use crate::merge::types::{
    parent_dir, resolve_pair_statuses, FilePair, FileSpec, MergeState, PairStatus, PathInfo,
    VersionInfo,
};
use crate::model::types::{FileMode, ObjectId};
use crate::store::ObjectStore;

// ---------------------------------------------------------------------------
// Cache reuse between merges
// ---------------------------------------------------------------------------

/// Decide whether a side's rename cache survives into the next merge.
///
/// The cache for side `s` is valid when the new base equals the previous
/// other side and the new side `s` equals the previous result tree — the
/// shape every step of a cherry-pick or rebase sequence has.
pub(crate) fn check_renames_reusable(
    state: &mut MergeState,
    previous_result: Option<ObjectId>,
    base: &ObjectId,
    side1: &ObjectId,
    side2: &ObjectId,
) {
    let renames = &mut state.renames;
    let (Some(prev), Some(result)) = (renames.merge_trees, previous_result) else {
        renames.cached_pairs_valid_side = 0;
        return;
    };
    if *base == prev[2] && *side1 == result {
        renames.cached_pairs_valid_side = 1;
    } else if *base == prev[1] && *side2 == result {
        renames.cached_pairs_valid_side = 2;
    } else {
        renames.cached_pairs_valid_side = 0;
    }
}

// ---------------------------------------------------------------------------
// Cache plumbing
// ---------------------------------------------------------------------------

/// Drop already-cached sources from the relevant set before detection.
fn prune_cached_from_relevant(state: &mut MergeState, side: usize) {
    let renames = &mut state.renames;
    let cached: Vec<String> = renames.cached_pairs[side].keys().cloned().collect();
    for key in cached {
        renames.relevant_sources[side].remove(&key);
    }
    let irrelevant: Vec<String> = renames.cached_irrelevant[side].iter().cloned().collect();
    for key in irrelevant {
        renames.relevant_sources[side].remove(&key);
    }
}

/// Replay cached pairings as ready-made pairs.
fn use_cached_pairs(state: &mut MergeState, side: usize) {
    let cached: Vec<(String, Option<String>)> = state.renames.cached_pairs[side]
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    for (old_name, new_name) in cached {
        let status = if new_name.is_some() {
            PairStatus::Renamed
        } else {
            PairStatus::Deleted
        };
        let new_name = new_name.unwrap_or_else(|| old_name.clone());
        // Only names and status matter for replayed pairs.
        state.renames.pairs[side].push(FilePair {
            one: FileSpec {
                path: old_name,
                oid: ObjectId::NULL,
                mode: FileMode::REGULAR,
            },
            two: FileSpec {
                path: new_name,
                oid: ObjectId::NULL,
                mode: FileMode::REGULAR,
            },
            status,
            score: 0,
            target_side: 0,
        });
    }
}

/// Record a pair into the cache for reuse by a later merge.
fn possibly_cache_new_pair(
    state: &mut MergeState,
    pair: &FilePair,
    side: usize,
    new_path: Option<&str>,
) {
    let renames = &mut state.renames;
    if new_path.is_none() {
        let relevant = renames.relevant_sources[side].contains_key(&pair.one.path);
        if !relevant {
            // A source nobody needed: remember that so later merges skip it.
            if pair.status == PairStatus::Deleted {
                renames.cached_irrelevant[side].insert(pair.one.path.clone());
            }
            return;
        }
    }
    match pair.status {
        PairStatus::Deleted => {
            renames.cached_pairs[side].insert(pair.one.path.clone(), None);
        }
        PairStatus::Renamed => {
            let target = new_path.unwrap_or(&pair.two.path).to_owned();
            renames.cached_pairs[side]
                .insert(pair.one.path.clone(), Some(target.clone()));
            renames.cached_target_names[side].insert(target);
        }
        PairStatus::Added => {
            if let Some(target) = new_path {
                renames.cached_pairs[side]
                    .insert(pair.two.path.clone(), Some(target.to_owned()));
                renames.cached_target_names[side].insert(target.to_owned());
            }
        }
        PairStatus::Pending => {}
    }
}

// ---------------------------------------------------------------------------
// Regular rename detection
// ---------------------------------------------------------------------------

/// Run similarity detection for one side. Returns whether detection ran.
fn detect_regular_renames<S: ObjectStore>(
    state: &mut MergeState,
    opts: &MergeOptions,
    store: &S,
    side: usize,
) -> Result<bool, MergeError> {
    prune_cached_from_relevant(state, side);
    if !state.renames.possible_uncached_renames(side) {
        // No detection needed, but adds still need their status for the
        // directory-rename pass.
        resolve_pair_statuses(&mut state.renames.pairs[side]);
        return Ok(false);
    }

    state.renames.dir_rename_count[side].clear();
    let limit = opts.effective_rename_limit();
    let min_score = opts.effective_rename_score();

    let renames = &mut state.renames;
    let needed = detect_renames(
        store,
        &mut renames.pairs[side],
        &renames.relevant_sources[side],
        &renames.dirs_removed[side],
        &mut renames.dir_rename_count[side],
        limit,
        min_score,
    )?;
    if needed > state.needed_rename_limit {
        state.needed_rename_limit = needed;
    }
    tracing::debug!(
        side,
        pairs = state.renames.pairs[side].len(),
        "regular rename detection complete"
    );

    if state.renames.redo_after_renames != 0 {
        state.renames.redo_after_renames = 2;
        let snapshot = state.renames.pairs[side].clone();
        for pair in &snapshot {
            possibly_cache_new_pair(state, pair, side, None);
        }
    }
    Ok(true)
}

// ---------------------------------------------------------------------------
// Directory renames
// ---------------------------------------------------------------------------

/// Collapse per-directory counts into old → best-new mappings.
fn get_directory_renames(
    state: &mut MergeState,
    side: usize,
    clean: &mut bool,
) -> BTreeMap<String, String> {
    let mut decisions: Vec<(String, Option<String>)> = Vec::new();
    for (source_dir, counts) in &state.renames.dir_rename_count[side] {
        let mut max = 0u32;
        let mut bad_max = 0u32;
        let mut best: Option<&String> = None;
        for (target_dir, &count) in counts {
            if count == max {
                bad_max = max;
            } else if count > max {
                max = count;
                best = Some(target_dir);
            }
        }
        if max == 0 {
            continue;
        }
        if bad_max == max {
            decisions.push((source_dir.clone(), None));
        } else if let Some(best) = best {
            decisions.push((source_dir.clone(), Some(best.clone())));
        }
    }

    let mut dir_renames = BTreeMap::new();
    for (source_dir, target) in decisions {
        match target {
            Some(target) => {
                dir_renames.insert(source_dir, target);
            }
            None => {
                state.path_msg(
                    &source_dir,
                    &format!(
                        "CONFLICT (directory rename split): Unclear where to rename \
                         {source_dir} to; it was renamed to multiple other directories, \
                         with no destination getting a majority of the files."
                    ),
                );
                *clean = false;
            }
        }
    }
    dir_renames
}

/// Drop directory renames that cannot or need not apply.
fn remove_invalid_dir_renames(
    state: &MergeState,
    dir_renames: &mut BTreeMap<String, String>,
    side_mask: u8,
) {
    dir_renames.retain(|old_dir, _| {
        match state.paths.get(old_dir) {
            // Unchanged on the other side and gone from ours: no detection
            // needed.
            None => false,
            Some(ci) => {
                // Resolved trivially on the redo pass, or the source
                // directory still exists on this side.
                !(ci.merged.clean || (ci.dirmask & side_mask) != 0)
            }
        }
    });
}

/// Resolve cross-side duplicates and per-side invalid entries.
fn handle_directory_level_conflicts(
    state: &MergeState,
    side1_dir_renames: &mut BTreeMap<String, String>,
    side2_dir_renames: &mut BTreeMap<String, String>,
) {
    let duplicated: Vec<String> = side1_dir_renames
        .keys()
        .filter(|k| side2_dir_renames.contains_key(*k))
        .cloned()
        .collect();
    for key in duplicated {
        side1_dir_renames.remove(&key);
        side2_dir_renames.remove(&key);
    }
    remove_invalid_dir_renames(state, side1_dir_renames, 2);
    remove_invalid_dir_renames(state, side2_dir_renames, 4);
}

/// The deepest renamed ancestor directory of `path`, if any.
fn check_dir_renamed<'a>(
    path: &str,
    dir_renames: &'a BTreeMap<String, String>,
) -> Option<(&'a String, &'a String)> {
    let mut dir = parent_dir(path);
    while !dir.is_empty() {
        if let Some((old, new)) = dir_renames.get_key_value(dir) {
            return Some((old, new));
        }
        dir = parent_dir(dir);
    }
    None
}

/// Rewrite `old_path` under the `old_dir` → `new_dir` mapping.
///
/// `old_path` must start with `old_dir` followed by `/`. A rename into the
/// root directory (empty `new_dir`) drops the prefix entirely.
fn apply_dir_rename(old_dir: &str, new_dir: &str, old_path: &str) -> String {
    debug_assert!(old_path.len() > old_dir.len() && old_path.starts_with(old_dir));
    if new_dir.is_empty() {
        old_path[old_dir.len() + 1..].to_owned()
    } else {
        format!("{new_dir}{}", &old_path[old_dir.len()..])
    }
}

// ---------------------------------------------------------------------------
// Collision handling
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct CollisionInfo {
    source_files: Vec<String>,
    reported_already: bool,
}

/// Count, per rewritten target, how many candidate sources would land
/// there if the other side's directory renames were applied.
fn compute_collisions(
    dir_renames: &BTreeMap<String, String>,
    pairs: &[FilePair],
) -> BTreeMap<String, CollisionInfo> {
    let mut collisions: BTreeMap<String, CollisionInfo> = BTreeMap::new();
    if dir_renames.is_empty() {
        return collisions;
    }
    for pair in pairs {
        if pair.status != PairStatus::Added && pair.status != PairStatus::Renamed {
            continue;
        }
        let Some((old_dir, new_dir)) = check_dir_renamed(&pair.two.path, dir_renames) else {
            continue;
        };
        let new_path = apply_dir_rename(old_dir, new_dir, &pair.two.path);
        collisions
            .entry(new_path)
            .or_default()
            .source_files
            .push(pair.two.path.clone());
    }
    collisions
}

/// Something already occupies `path` for the given side, so an implicit
/// rename cannot move anything there.
fn path_in_way(state: &MergeState, path: &str, side_mask: u8) -> bool {
    match state.paths.get(path) {
        None => false,
        Some(ci) => ci.merged.clean || (side_mask & (ci.filemask | ci.dirmask)) != 0,
    }
}

/// Apply the directory rename to `path` unless the target location is
/// contested; returns the rewritten path when it is safe.
fn handle_path_level_conflicts(
    state: &mut MergeState,
    path: &str,
    side: usize,
    old_dir: &str,
    new_dir: &str,
    collisions: &mut BTreeMap<String, CollisionInfo>,
) -> Option<String> {
    let new_path = apply_dir_rename(old_dir, new_dir, path);
    let Some(c_info) = collisions.get_mut(&new_path) else {
        debug_assert!(false, "collisions not precomputed for {new_path}");
        return None;
    };

    if c_info.reported_already {
        return None;
    }
    if path_in_way(state, &new_path, 1 << side) {
        c_info.reported_already = true;
        let mut sources = c_info.source_files.clone();
        sources.sort();
        let listing = sources.join(", ");
        state.path_msg(
            &new_path,
            &format!(
                "CONFLICT (implicit dir rename): Existing file/dir at {new_path} in the \
                 way of implicit directory rename(s) putting the following path(s) \
                 there: {listing}."
            ),
        );
        return None;
    }
    if c_info.source_files.len() > 1 {
        c_info.reported_already = true;
        let mut sources = c_info.source_files.clone();
        sources.sort();
        let listing = sources.join(", ");
        state.path_msg(
            &new_path,
            &format!(
                "CONFLICT (implicit dir rename): Cannot map more than one path to \
                 {new_path}; implicit directory renames tried to put these paths \
                 there: {listing}"
            ),
        );
        return None;
    }
    Some(new_path)
}

/// Find the implicit-rename target for `path`, honoring exclusions.
#[allow(clippy::too_many_arguments)]
fn check_for_directory_rename(
    state: &mut MergeState,
    path: &str,
    side: usize,
    dir_renames: &BTreeMap<String, String>,
    dir_rename_exclusions: &BTreeMap<String, String>,
    collisions: &mut BTreeMap<String, CollisionInfo>,
    clean: &mut bool,
) -> Option<String> {
    if dir_renames.is_empty() {
        return None;
    }
    let (old_dir, new_dir) = check_dir_renamed(path, dir_renames)?;
    let (old_dir, new_dir) = (old_dir.clone(), new_dir.clone());

    // Do not rename into a directory this side itself renamed away: the
    // other side's transitive rename would otherwise manufacture a
    // spurious rename/rename(1to2).
    if dir_rename_exclusions.contains_key(&new_dir) {
        state.path_msg(
            &old_dir,
            &format!(
                "WARNING: Avoiding applying {old_dir} -> {new_dir} rename to {path}, \
                 because {new_dir} itself was renamed."
            ),
        );
        return None;
    }

    let new_path = handle_path_level_conflicts(state, path, side, &old_dir, &new_dir, collisions);
    *clean &= new_path.is_some();
    new_path
}

/// Move a record to its implicit-rename target inside the path map.
fn apply_directory_rename_modifications(
    state: &mut MergeState,
    opts: &MergeOptions,
    pair: &mut FilePair,
    new_path: &str,
) {
    let old_path = pair.two.path.clone();
    let Some(ci) = state.paths.remove(&old_path) else {
        debug_assert!(false, "no record for rename source {old_path}");
        return;
    };
    debug_assert!(ci.filemask == 2 || ci.filemask == 4);
    debug_assert_eq!(ci.dirmask, 0);

    // Synthesize any ancestor directories the target needs, deepest known
    // ancestor outward, each pointing at its own parent.
    let mut missing: Vec<String> = Vec::new();
    let mut parent_name = String::new();
    let mut cursor: &str = new_path;
    loop {
        let parent = parent_dir(cursor);
        if parent.is_empty() {
            parent_name.clear();
            break;
        }
        if state.paths.contains_key(parent) {
            parent_name = parent.to_owned();
            break;
        }
        missing.push(parent.to_owned());
        cursor = parent;
    }
    for dir in missing.iter().rev() {
        let parent_id = state.dirs.intern(&parent_name);
        let offset = if parent_name.is_empty() {
            0
        } else {
            parent_name.len() + 1
        };
        let mut dir_ci = PathInfo::pending(
            parent_id,
            offset,
            dir,
            [VersionInfo::NULL; 3],
            0,
            ci.filemask,
            false,
        );
        dir_ci.pathnames = [String::new(), String::new(), String::new()];
        state.paths.insert(dir.clone(), dir_ci);
        parent_name.clone_from(dir);
    }

    let side = usize::from(ci.filemask >> 1);
    let branch_with_new_path = state.labels.side(side).to_owned();
    let branch_with_dir_rename = state.labels.side(3 - side).to_owned();

    // Re-home the record under its new parent.
    let mut ci = ci;
    ci.merged.dir = state.dirs.intern(&parent_name);
    ci.merged.basename_offset = if parent_name.is_empty() {
        0
    } else {
        parent_name.len() + 1
    };

    if let Some(existing) = state.paths.get_mut(new_path) {
        // Both sides put something here; the records must be for
        // complementary sides.
        debug_assert_eq!(existing.filemask & ci.filemask, 0);
        debug_assert!(!existing.merged.clean);
        existing.filemask |= ci.filemask;
        if existing.dirmask != 0 {
            existing.df_conflict = true;
        }
        let index = usize::from(ci.filemask >> 1);
        existing.pathnames[index] = ci.pathnames[index].clone();
        existing.stages[index] = ci.stages[index];
    } else {
        state.paths.insert(new_path.to_owned(), ci);
    }

    let renamed_pair = pair.status == PairStatus::Renamed;
    if opts.detect_directory_renames == DirectoryRenames::Enabled {
        let msg = if renamed_pair {
            format!(
                "Path updated: {} renamed to {old_path} in {branch_with_new_path}, inside \
                 a directory that was renamed in {branch_with_dir_rename}; moving it to \
                 {new_path}.",
                pair.one.path
            )
        } else {
            format!(
                "Path updated: {old_path} added in {branch_with_new_path} inside a \
                 directory that was renamed in {branch_with_dir_rename}; moving it to \
                 {new_path}."
            )
        };
        state.path_msg(new_path, &msg);
    } else {
        if let Some(rec) = state.paths.get_mut(new_path) {
            rec.path_conflict = true;
        }
        let msg = if renamed_pair {
            format!(
                "CONFLICT (file location): {} renamed to {old_path} in \
                 {branch_with_new_path}, inside a directory that was renamed in \
                 {branch_with_dir_rename}, suggesting it should perhaps be moved to \
                 {new_path}.",
                pair.one.path
            )
        } else {
            format!(
                "CONFLICT (file location): {old_path} added in {branch_with_new_path} \
                 inside a directory that was renamed in {branch_with_dir_rename}, \
                 suggesting it should perhaps be moved to {new_path}."
            )
        };
        state.path_msg(new_path, &msg);
    }

    pair.two.path = new_path.to_owned();
}

// ---------------------------------------------------------------------------
// Combined pair collection
// ---------------------------------------------------------------------------

/// Fold one side's pairs into the combined queue, applying the *other*
/// side's directory renames to this side's adds and renames.
fn collect_renames(
    state: &mut MergeState,
    opts: &MergeOptions,
    side: usize,
    dir_renames_for_side: &BTreeMap<String, String>,
    rename_exclusions: &BTreeMap<String, String>,
    combined: &mut Vec<FilePair>,
    clean: &mut bool,
) {
    let side_pairs = std::mem::take(&mut state.renames.pairs[side]);
    let mut collisions = compute_collisions(dir_renames_for_side, &side_pairs);

    for mut pair in side_pairs {
        possibly_cache_new_pair(state, &pair, side, None);
        if pair.status != PairStatus::Added && pair.status != PairStatus::Renamed {
            continue;
        }
        let new_path = check_for_directory_rename(
            state,
            &pair.two.path.clone(),
            side,
            dir_renames_for_side,
            rename_exclusions,
            &mut collisions,
            clean,
        );
        if pair.status != PairStatus::Renamed && new_path.is_none() {
            continue;
        }
        possibly_cache_new_pair(state, &pair, side, new_path.as_deref());
        if let Some(new_path) = new_path {
            apply_directory_rename_modifications(state, opts, &mut pair, &new_path);
        }
        pair.target_side = side as u8;
        combined.push(pair);
    }
}

// ---------------------------------------------------------------------------
// Pair processing
// ---------------------------------------------------------------------------

/// Update path-map records from the combined rename queue.
#[allow(clippy::too_many_lines)]
fn process_renames<S: ObjectStore>(
    state: &mut MergeState,
    opts: &MergeOptions,
    store: &mut S,
    content: &dyn ContentMerger,
    combined: &mut [FilePair],
) -> Result<bool, MergeError> {
    let mut clean_merge = true;
    let mut i = 0;
    while i < combined.len() {
        let pair = combined[i].clone();
        let oldpath = pair.one.path.clone();
        let newpath = pair.two.path.clone();

        // A resolved (or vanished) source means the other side had no
        // changes there; the rename is irrelevant.
        let skip = match state.paths.get(&oldpath) {
            None => true,
            Some(ci) => ci.merged.clean,
        };
        if skip {
            i += 1;
            continue;
        }

        if i + 1 < combined.len() && combined[i + 1].one.path == oldpath {
            let second_target = combined[i + 1].two.path.clone();
            if newpath == second_target {
                // rename/rename(1to1): both sides moved it to the same
                // place. Stage the base alongside and resolve the source
                // by removal; the second pair skips on the clean source.
                let base_stage = state.paths[&oldpath].stages[0];
                if let Some(target) = state.paths.get_mut(&newpath) {
                    target.stages[0] = base_stage;
                    target.filemask |= 1;
                }
                if let Some(source) = state.paths.get_mut(&oldpath) {
                    source.merged.is_null = true;
                    source.merged.clean = true;
                }
                i += 1;
                continue;
            }

            // rename/rename(1to2): the sides disagree where it went.
            let pathnames = [oldpath.clone(), newpath.clone(), second_target.clone()];
            let base_stage = state.paths[&pathnames[0]].stages[0];
            let Some(side1_stage) = state.paths.get(&pathnames[1]).map(|ci| ci.stages[1])
            else {
                debug_assert!(false, "rename target {} has no record", pathnames[1]);
                i += 2;
                continue;
            };
            let Some(side2_stage) = state.paths.get(&pathnames[2]).map(|ci| ci.stages[2])
            else {
                debug_assert!(false, "rename target {} has no record", pathnames[2]);
                i += 2;
                continue;
            };

            let mut merged = VersionInfo::NULL;
            let content_clean = handle_content_merge(
                state,
                opts,
                store,
                content,
                &oldpath,
                &base_stage,
                &side1_stage,
                &side2_stage,
                &pathnames,
                1 + 2 * state.call_depth as usize,
                &mut merged,
            )?;
            clean_merge = content_clean;

            // A failed binary merge hands back one side's content; do not
            // duplicate it onto both destinations.
            let was_binary_blob = !content_clean && merged == side1_stage;
            if let Some(rec) = state.paths.get_mut(&pathnames[1]) {
                rec.stages[1] = merged;
                rec.path_conflict = true;
            }
            let side2_value = if was_binary_blob { side2_stage } else { merged };
            if let Some(rec) = state.paths.get_mut(&pathnames[2]) {
                rec.stages[2] = side2_value;
                rec.path_conflict = true;
            }
            if let Some(rec) = state.paths.get_mut(&oldpath) {
                // The source stays visible at stage 1 rather than being
                // resolved by removal; longstanding observable behavior.
                rec.path_conflict = true;
            }
            let msg = format!(
                "CONFLICT (rename/rename): {} renamed to {} in {} and to {} in {}.",
                pathnames[0],
                pathnames[1],
                state.labels.side1,
                pathnames[2],
                state.labels.side2
            );
            state.path_msg(&oldpath, &msg);

            i += 2;
            continue;
        }

        // Single-side rename of this source.
        let target_index = usize::from(pair.target_side);
        debug_assert!(target_index == 1 || target_index == 2);
        let other_source_index = 3 - target_index;
        let old_sidemask = 1u8 << other_source_index;

        let (old_filemask, old_other_stage) = {
            let old = &state.paths[&oldpath];
            (old.filemask, old.stages[other_source_index])
        };
        let Some((new_filemask, new_target_mode)) = state
            .paths
            .get(&newpath)
            .map(|new| (new.filemask, new.stages[target_index].mode))
        else {
            debug_assert!(false, "rename target {newpath} has no record");
            i += 1;
            continue;
        };

        let source_deleted = old_filemask == 1;
        let mut collision = (new_filemask & old_sidemask) != 0;
        let type_changed = !source_deleted
            && (old_other_stage.mode.is_regular() != new_target_mode.is_regular());
        if type_changed {
            // The "collision" is really the undetected half of a double
            // rename (a new file of a different type sits at the source);
            // treat it as a plain rename and let the content merge cope.
            collision = false;
        }
        debug_assert!(source_deleted || (old_filemask & old_sidemask) != 0);

        let (rename_branch, delete_branch) = if target_index == 1 {
            (state.labels.side1.clone(), state.labels.side2.clone())
        } else {
            (state.labels.side2.clone(), state.labels.side1.clone())
        };

        if !type_changed {
            // Mark the source resolved by removal.
            if let Some(old) = state.paths.get_mut(&oldpath) {
                old.merged.is_null = true;
                old.merged.clean = true;
            }
        }

        if collision && !source_deleted {
            // rename/add or rename/rename(2to1): merge the contents that
            // collided at the target.
            let mut pathnames = [oldpath.clone(), oldpath.clone(), oldpath.clone()];
            pathnames[target_index].clone_from(&newpath);
            let base_stage = state.paths[&pathnames[0]].stages[0];
            let side1_stage = state.paths[&pathnames[1]].stages[1];
            let side2_stage = state.paths[&pathnames[2]].stages[2];
            // pathnames[other] aliases oldpath, which was checked above;
            // pathnames[target] aliases newpath, checked with new_filemask.

            let mut merged = VersionInfo::NULL;
            let content_clean = handle_content_merge(
                state,
                opts,
                store,
                content,
                &oldpath,
                &base_stage,
                &side1_stage,
                &side2_stage,
                &pathnames,
                1 + 2 * state.call_depth as usize,
                &mut merged,
            )?;
            if let Some(rec) = state.paths.get_mut(&newpath) {
                rec.stages[target_index] = merged;
            }
            if !content_clean {
                let msg = format!(
                    "CONFLICT (rename involved in collision): rename of {oldpath} -> \
                     {newpath} has content conflicts AND collides with another path; \
                     this may result in nested conflict markers."
                );
                state.path_msg(&newpath, &msg);
            }
        } else if collision && source_deleted {
            // rename/add/delete: the source is already resolved away;
            // what remains looks like add/add at the target.
            if let Some(rec) = state.paths.get_mut(&newpath) {
                rec.path_conflict = true;
            }
            let msg = format!(
                "CONFLICT (rename/delete): {oldpath} renamed to {newpath} in \
                 {rename_branch}, but deleted in {delete_branch}."
            );
            state.path_msg(&newpath, &msg);
        } else {
            // Normal rename (possibly rename/delete): carry the source's
            // base stage (and unrenamed-side stage) over to the target.
            let base_stage = state.paths[&oldpath].stages[0];
            if let Some(rec) = state.paths.get_mut(&newpath) {
                rec.stages[0] = base_stage;
                rec.filemask |= 1;
                rec.pathnames[0].clone_from(&oldpath);
            }
            if type_changed {
                // The source slot now belongs to the different-typed file.
                if let Some(old) = state.paths.get_mut(&oldpath) {
                    old.stages[0] = VersionInfo::NULL;
                    old.filemask &= 0x06;
                }
            } else if source_deleted {
                if let Some(rec) = state.paths.get_mut(&newpath) {
                    rec.path_conflict = true;
                }
                let msg = format!(
                    "CONFLICT (rename/delete): {oldpath} renamed to {newpath} in \
                     {rename_branch}, but deleted in {delete_branch}."
                );
                state.path_msg(&newpath, &msg);
            } else {
                if let Some(rec) = state.paths.get_mut(&newpath) {
                    rec.stages[other_source_index] = old_other_stage;
                    rec.filemask |= old_sidemask;
                    rec.pathnames[other_source_index].clone_from(&oldpath);
                }
            }
        }
        i += 1;
    }
    Ok(clean_merge)
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// Run both rename phases. Returns whether the merge stayed clean.
pub(crate) fn detect_and_process_renames<S: ObjectStore>(
    state: &mut MergeState,
    opts: &MergeOptions,
    store: &mut S,
    content: &dyn ContentMerger,
) -> Result<bool, MergeError> {
    let mut clean = true;
    if !state.renames.possible_renames() {
        for side in 1..=2 {
            state.renames.pairs[side].clear();
        }
        return Ok(clean);
    }

    tracing::debug!("detecting renames");
    let mut detection_run = false;
    detection_run |= detect_regular_renames(state, opts, store, 1)?;
    detection_run |= detect_regular_renames(state, opts, store, 2)?;
    if state.renames.redo_after_renames != 0 && detection_run {
        // The collection pass will be redone with the cache primed; pair
        // processing belongs to that second pass.
        for side in 1..=2 {
            state.renames.pairs[side].clear();
        }
        return Ok(clean);
    }
    use_cached_pairs(state, 1);
    use_cached_pairs(state, 2);

    let need_dir_renames =
        state.call_depth == 0 && opts.detect_directory_renames != DirectoryRenames::Disabled;
    let (mut dir_renames1, mut dir_renames2) = if need_dir_renames {
        let a = get_directory_renames(state, 1, &mut clean);
        let b = get_directory_renames(state, 2, &mut clean);
        (a, b)
    } else {
        (BTreeMap::new(), BTreeMap::new())
    };
    if need_dir_renames {
        handle_directory_level_conflicts(state, &mut dir_renames1, &mut dir_renames2);
    }

    let mut combined: Vec<FilePair> = Vec::new();
    collect_renames(
        state,
        opts,
        1,
        &dir_renames2,
        &dir_renames1,
        &mut combined,
        &mut clean,
    );
    collect_renames(
        state,
        opts,
        2,
        &dir_renames1,
        &dir_renames2,
        &mut combined,
        &mut clean,
    );
    combined.sort_by(|a, b| {
        a.one
            .path
            .cmp(&b.one.path)
            .then(a.target_side.cmp(&b.target_side))
    });

    tracing::debug!(pairs = combined.len(), "processing renames");
    clean &= process_renames(state, opts, store, content, &mut combined)?;
    Ok(clean)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
