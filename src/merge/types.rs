//! Shared data structures for the merge pipeline.
//!
//! One record per path flows through collect → rename → resolve → build.
//! Role indexing is positional throughout: 0 = base, 1 = side 1, 2 = side 2,
//! and the three-bit masks (`filemask`, `dirmask`, `match_mask`) use bit
//! `1 << role`. Tests depend on the raw mask values, so they stay plain
//! small integers rather than anything more structured.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::model::intern::{DirId, DirPool};
use crate::model::types::{FileMode, ObjectId};

// ---------------------------------------------------------------------------
// VersionInfo
// ---------------------------------------------------------------------------

/// One version of a path: object id plus file mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VersionInfo {
    /// The object id; null when absent.
    pub oid: ObjectId,
    /// The file mode; zero when absent.
    pub mode: FileMode,
}

impl VersionInfo {
    /// The absent version.
    pub const NULL: VersionInfo = VersionInfo {
        oid: ObjectId::NULL,
        mode: FileMode::ABSENT,
    };

    /// Returns `true` when this version is absent.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.mode.is_absent()
    }
}

impl Default for VersionInfo {
    fn default() -> Self {
        Self::NULL
    }
}

// ---------------------------------------------------------------------------
// MergedInfo
// ---------------------------------------------------------------------------

/// The resolved portion of a per-path record.
#[derive(Clone, Debug)]
pub struct MergedInfo {
    /// The merge result for this path.
    pub result: VersionInfo,
    /// The path is absent from the result.
    pub is_null: bool,
    /// The path merged without conflict.
    pub clean: bool,
    /// Offset of the basename within the full path.
    pub basename_offset: usize,
    /// Interned containing-directory name; handle equality is directory
    /// identity.
    pub dir: DirId,
}

// ---------------------------------------------------------------------------
// PathInfo
// ---------------------------------------------------------------------------

/// The full per-path record.
///
/// Every record carries the conflict fields; when `merged.clean` is true
/// the stages and masks are meaningless and only `merged` matters.
#[derive(Clone, Debug)]
pub struct PathInfo {
    /// Resolved header, valid for every record.
    pub merged: MergedInfo,
    /// Per-role versions (0 = base, 1 = side 1, 2 = side 2).
    pub stages: [VersionInfo; 3],
    /// Per-role path names; these differ between roles after renames.
    pub pathnames: [String; 3],
    /// Bit `1 << role` set iff that role has a file here.
    pub filemask: u8,
    /// Bit `1 << role` set iff that role has a directory here.
    pub dirmask: u8,
    /// Pairwise-equality mask: 3 = base==side1, 5 = base==side2,
    /// 6 = sides equal, 7 = all equal.
    pub match_mask: u8,
    /// A file on one side collides with a directory on another.
    pub df_conflict: bool,
    /// A rename-level naming dispute involves this path.
    pub path_conflict: bool,
}

impl PathInfo {
    /// A record resolved at collection time.
    #[must_use]
    pub fn resolved(
        dir: DirId,
        basename_offset: usize,
        result: VersionInfo,
        is_null: bool,
    ) -> Self {
        Self {
            merged: MergedInfo {
                result,
                is_null,
                clean: true,
                basename_offset,
                dir,
            },
            stages: [VersionInfo::NULL; 3],
            pathnames: [String::new(), String::new(), String::new()],
            filemask: 0,
            dirmask: 0,
            match_mask: 0,
            df_conflict: false,
            path_conflict: false,
        }
    }

    /// A pending record carrying the three observed versions.
    #[must_use]
    pub fn pending(
        dir: DirId,
        basename_offset: usize,
        fullpath: &str,
        stages: [VersionInfo; 3],
        filemask: u8,
        dirmask: u8,
        df_conflict: bool,
    ) -> Self {
        Self {
            merged: MergedInfo {
                result: VersionInfo::NULL,
                is_null: false,
                clean: false,
                basename_offset,
                dir,
            },
            stages,
            pathnames: [
                fullpath.to_owned(),
                fullpath.to_owned(),
                fullpath.to_owned(),
            ],
            filemask,
            dirmask,
            match_mask: 0,
            df_conflict,
            path_conflict: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Candidate pairs
// ---------------------------------------------------------------------------

/// One endpoint of a candidate pair.
#[derive(Clone, Debug)]
pub struct FileSpec {
    /// Full path of this endpoint.
    pub path: String,
    /// Object id; null for the invalid endpoint of an add/delete.
    pub oid: ObjectId,
    /// Mode; zero for the invalid endpoint.
    pub mode: FileMode,
}

impl FileSpec {
    /// The invalid endpoint for a given path.
    #[must_use]
    pub fn absent(path: &str) -> Self {
        Self {
            path: path.to_owned(),
            oid: ObjectId::NULL,
            mode: FileMode::ABSENT,
        }
    }

    /// Returns `true` when this endpoint carries a version.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.mode.is_absent()
    }
}

/// Status of a candidate pair after detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairStatus {
    /// Not yet classified.
    Pending,
    /// Only the new side is valid.
    Added,
    /// Only the old side is valid.
    Deleted,
    /// Old and new sides were paired by the detector.
    Renamed,
}

/// An add/delete candidate or a detected rename.
#[derive(Clone, Debug)]
pub struct FilePair {
    /// The old (pre-image) endpoint.
    pub one: FileSpec,
    /// The new (post-image) endpoint.
    pub two: FileSpec,
    /// Classification after detection.
    pub status: PairStatus,
    /// Similarity score for renames, in `[0, MAX_SCORE]`.
    pub score: u32,
    /// Which side's history performed this change (1 or 2); filled when the
    /// pair enters combined processing.
    pub target_side: u8,
}

/// Derive add/delete statuses for pairs the detector did not touch.
pub fn resolve_pair_statuses(pairs: &mut [FilePair]) {
    for pair in pairs {
        if pair.status != PairStatus::Pending {
            continue;
        }
        if !pair.one.is_valid() {
            pair.status = PairStatus::Added;
        } else if !pair.two.is_valid() {
            pair.status = PairStatus::Deleted;
        }
    }
}

// ---------------------------------------------------------------------------
// Relevance
// ---------------------------------------------------------------------------

/// Why a rename source must be detected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Relevance {
    /// Content changed on the unrenamed side; the merge needs the pairing.
    Content,
    /// Needed only to infer a directory rename.
    Location,
}

// ---------------------------------------------------------------------------
// RenameState
// ---------------------------------------------------------------------------

/// Rename-detection inputs, outputs, and the cross-merge cache.
///
/// Side arrays are indexed 1/2; index 0 is unused, mirroring the role
/// numbering used everywhere else.
#[derive(Debug, Default)]
pub struct RenameState {
    /// Candidate pairs per side.
    pub pairs: [Vec<FilePair>; 3],
    /// Sources whose pairing the merge actually needs.
    pub relevant_sources: [BTreeMap<String, Relevance>; 3],
    /// Directories absent on this side; value 2 means full rename-source
    /// reconstruction is required for the directory.
    pub dirs_removed: [BTreeMap<String, u8>; 3],
    /// old directory → (new directory → number of renamed files).
    pub dir_rename_count: [BTreeMap<String, BTreeMap<String, u32>>; 3],
    /// Directories parked because one side matches base; value is the
    /// walk's rename-source-elision mask in effect when they were parked,
    /// so a later expansion can resume with the same state.
    pub possible_trivial_merges: [BTreeMap<String, u8>; 3],
    /// Directories known to receive rename targets.
    pub target_dirs: [BTreeSet<String>; 3],
    /// Whether deferred directories may be adopted wholesale.
    pub trivial_merges_okay: [bool; 3],

    /// The trees of the merge in progress, for cache-validity checks.
    pub merge_trees: Option<[ObjectId; 3]>,
    /// Side whose caches survive into this merge: 0 none, 1/2 that side,
    /// -1 both (redo restart).
    pub cached_pairs_valid_side: i8,
    /// old path → new path (rename) or None (delete), per side.
    pub cached_pairs: [BTreeMap<String, Option<String>>; 3],
    /// Sources known not to matter, per side.
    pub cached_irrelevant: [BTreeSet<String>; 3],
    /// Known rename targets, per side.
    pub cached_target_names: [BTreeSet<String>; 3],
    /// 0 = normal, 1 = restart requested, 2 = caches primed for restart.
    pub redo_after_renames: u8,
}

impl RenameState {
    /// Fresh state with the "maybe" trivial-merge default.
    #[must_use]
    pub fn new() -> Self {
        let mut state = Self::default();
        state.trivial_merges_okay = [true; 3];
        state
    }

    /// Are there any renames left to detect or replay?
    #[must_use]
    pub fn possible_renames(&self) -> bool {
        self.possible_uncached_renames(1)
            || self.possible_uncached_renames(2)
            || !self.cached_pairs[1].is_empty()
            || !self.cached_pairs[2].is_empty()
    }

    /// Does this side have candidate pairs that still need detection?
    #[must_use]
    pub fn possible_uncached_renames(&self, side: usize) -> bool {
        !self.pairs[side].is_empty() && !self.relevant_sources[side].is_empty()
    }
}

// ---------------------------------------------------------------------------
// Labels / MergeState
// ---------------------------------------------------------------------------

/// The three human-readable names used in messages and uniquified paths.
#[derive(Clone, Debug)]
pub struct Labels {
    /// Ancestor name.
    pub ancestor: String,
    /// Side 1 name.
    pub side1: String,
    /// Side 2 name.
    pub side2: String,
}

impl Labels {
    /// The label for a side index (1 or 2).
    #[must_use]
    pub fn side(&self, side: usize) -> &str {
        if side == 1 {
            &self.side1
        } else {
            &self.side2
        }
    }
}

/// All mutable state of one merge invocation.
///
/// This is the single owning arena of the design: every per-merge
/// allocation lives in these maps, and [`MergeState::clear`] is the one
/// lifetime control point. A reinitializing clear (between merges in a
/// sequence, or across the internal redo restart) keeps the rename caches
/// on the side(s) declared valid and drops everything else.
#[derive(Debug)]
pub struct MergeState {
    /// The path map: one record per path seen in any tree.
    pub paths: BTreeMap<String, PathInfo>,
    /// Paths left unresolved after resolution; subset of `paths`.
    pub unmerged: BTreeSet<String>,
    /// Interned directory names.
    pub dirs: DirPool,
    /// Accumulated user-visible messages per path.
    pub output: BTreeMap<String, String>,
    /// Message labels for the merge in progress.
    pub labels: Labels,
    /// Depth of virtual-ancestor construction; 0 for caller-visible merges.
    pub call_depth: u32,
    /// Largest rename-matrix dimension that was skipped over the limit.
    pub needed_rename_limit: usize,
    /// Rename-detection state and caches.
    pub renames: RenameState,
}

impl MergeState {
    /// Fresh state with the given labels.
    #[must_use]
    pub fn new(labels: Labels) -> Self {
        Self {
            paths: BTreeMap::new(),
            unmerged: BTreeSet::new(),
            dirs: DirPool::new(),
            output: BTreeMap::new(),
            labels,
            call_depth: 0,
            needed_rename_limit: 0,
            renames: RenameState::new(),
        }
    }

    /// Append a user-visible message line for a path.
    pub fn path_msg(&mut self, path: &str, msg: &str) {
        let entry = self.output.entry(path.to_owned()).or_default();
        entry.push_str(msg);
        entry.push('\n');
    }

    /// Drop per-merge state.
    ///
    /// With `reinitialize` the rename caches on the valid side(s) survive
    /// (−1 keeps both, for the redo restart) and accumulated messages are
    /// kept; without it everything goes.
    pub fn clear(&mut self, reinitialize: bool) {
        self.paths.clear();
        self.unmerged.clear();
        self.dirs.clear();
        if !reinitialize {
            self.output.clear();
        }

        let renames = &mut self.renames;
        for side in 1..3 {
            renames.pairs[side].clear();
            renames.relevant_sources[side].clear();
            renames.dirs_removed[side].clear();
            renames.possible_trivial_merges[side].clear();
            renames.target_dirs[side].clear();
            renames.trivial_merges_okay[side] = true;
            let keep = renames.cached_pairs_valid_side == -1
                || renames.cached_pairs_valid_side == side as i8;
            if !keep {
                renames.cached_pairs[side].clear();
                renames.cached_irrelevant[side].clear();
                renames.cached_target_names[side].clear();
                renames.dir_rename_count[side].clear();
            }
        }
        renames.cached_pairs_valid_side = 0;
        if !reinitialize {
            renames.redo_after_renames = 0;
            renames.merge_trees = None;
            for side in 1..3 {
                renames.cached_pairs[side].clear();
                renames.cached_irrelevant[side].clear();
                renames.cached_target_names[side].clear();
                renames.dir_rename_count[side].clear();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// The containing directory of a path (`""` for top-level names).
#[must_use]
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// The basename of a path.
#[must_use]
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Append `label` to `out` with every `/` flattened to `_`.
fn add_flattened_label(out: &mut String, label: &str) {
    for c in label.chars() {
        out.push(if c == '/' { '_' } else { c });
    }
}

/// A name not yet present in `existing`: `path~LABEL`, with a numeric
/// `_N` suffix when taken.
#[must_use]
pub fn unique_path(
    existing: &BTreeMap<String, PathInfo>,
    path: &str,
    label: &str,
) -> String {
    let mut candidate = format!("{path}~");
    add_flattened_label(&mut candidate, label);
    let base_len = candidate.len();
    let mut suffix = 0;
    while existing.contains_key(&candidate) {
        candidate.truncate(base_len);
        candidate.push_str(&format!("_{suffix}"));
        suffix += 1;
    }
    candidate
}

/// Compare paths so that a directory sorts immediately before its own
/// children and after unrelated names that share its prefix.
///
/// Byte-wise comparison, except that running off the end of either string
/// compares as `'/'`. This yields `foo.txt`, `foo`, `foo/bar` instead of
/// the natural `foo`, `foo.txt`, `foo/bar`. Implemented directly — the
/// stdlib order is exactly what we must avoid.
#[must_use]
pub fn cmp_dirs_next_to_children(a: &str, b: &str) -> Ordering {
    let ab = a.as_bytes();
    let bb = b.as_bytes();
    let mut i = 0;
    while i < ab.len() && i < bb.len() && ab[i] == bb[i] {
        i += 1;
    }
    if i == ab.len() && i == bb.len() {
        return Ordering::Equal;
    }
    let c1 = if i < ab.len() { ab[i] } else { b'/' };
    let c2 = if i < bb.len() { bb[i] } else { b'/' };
    if c1 == c2 {
        // One string is a leading directory of the other.
        return if i < ab.len() {
            Ordering::Greater
        } else {
            Ordering::Less
        };
    }
    c1.cmp(&c2)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
