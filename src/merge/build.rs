//! Tree builder: bottom-up directory aggregation.
//!
//! The resolver hands over entries in an order where every directory
//! arrives right after all of its children. Two stacks are enough to emit
//! tree objects bottom-up: `versions` holds the entries of every directory
//! still open, `offsets` marks where each open directory's entries begin.
//! When the walk leaves a directory, its slice of `versions` is serialized
//! as a tree object and replaced by a single entry in its parent.
//!
//! A directory whose slice came up empty is not emitted at all; its
//! placeholder record is marked absent instead.

use crate::error::MergeError;
use crate::merge::types::{basename, MergeState, PathInfo, VersionInfo};
use crate::model::intern::DirId;
use crate::model::types::{FileMode, ObjectId, ObjectKind, TreeEntry};
use crate::store::memory::serialize_tree;
use crate::store::ObjectStore;

// ---------------------------------------------------------------------------
// DirectoryVersions
// ---------------------------------------------------------------------------

/// The two stacks driving bottom-up tree emission.
#[derive(Debug, Default)]
pub(crate) struct DirectoryVersions {
    /// Entries of all currently-open directories, innermost last.
    versions: Vec<(String, VersionInfo)>,
    /// Start index in `versions` for each open directory.
    offsets: Vec<(DirId, usize)>,
    /// The directory the previous entry belonged to.
    last_dir: Option<DirId>,
}

impl DirectoryVersions {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

// ---------------------------------------------------------------------------
// Entry recording
// ---------------------------------------------------------------------------

/// Queue a resolved entry for its containing directory's tree.
pub(crate) fn record_entry_for_tree(dv: &mut DirectoryVersions, path: &str, info: &PathInfo) {
    if info.merged.is_null {
        return;
    }
    // Unclean directory placeholders are emitted when their directory
    // closes, not here.
    if !info.merged.clean && info.filemask == 0 {
        return;
    }
    let name = &path[info.merged.basename_offset..];
    debug_assert!(!name.contains('/'));
    dv.versions.push((name.to_owned(), info.merged.result));
}

// ---------------------------------------------------------------------------
// Directory closing
// ---------------------------------------------------------------------------

/// Serialize one directory's queued entries into a tree object.
pub(crate) fn write_tree_object<S: ObjectStore>(
    store: &mut S,
    entries: &mut [(String, VersionInfo)],
) -> Result<ObjectId, MergeError> {
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let tree_entries: Vec<TreeEntry> = entries
        .iter()
        .map(|(name, version)| TreeEntry {
            name: name.clone(),
            mode: version.mode,
            oid: version.oid,
        })
        .collect();
    let bytes = serialize_tree(&tree_entries);
    store.write_object(ObjectKind::Tree, &bytes)
}

/// React to the walk moving from one directory to another.
///
/// Opens the new directory when the previous one is an ancestor; otherwise
/// closes the innermost open directory, writes its tree, and records it as
/// an entry of its parent. The resolver's ordering guarantees transitions
/// only ever need a single close.
pub(crate) fn write_completed_directories<S: ObjectStore>(
    state: &mut MergeState,
    store: &mut S,
    new_dir: DirId,
    dv: &mut DirectoryVersions,
) -> Result<(), MergeError> {
    if dv.last_dir == Some(new_dir) {
        return Ok(());
    }

    let Some(last) = dv.last_dir else {
        dv.offsets.push((new_dir, dv.versions.len()));
        dv.last_dir = Some(new_dir);
        return Ok(());
    };

    let new_name = state.dirs.name(new_dir).to_owned();
    let last_name = state.dirs.name(last).to_owned();
    if new_name.starts_with(&last_name) {
        // Descending: the previous directory stays open underneath.
        dv.offsets.push((new_dir, dv.versions.len()));
        dv.last_dir = Some(new_dir);
        return Ok(());
    }

    // Close the innermost open directory.
    let Some(&(_, offset)) = dv.offsets.last() else {
        debug_assert!(false, "closing a directory with no open offsets");
        return Ok(());
    };
    let mut written: Option<VersionInfo> = None;
    if offset == dv.versions.len() {
        if let Some(dir_info) = state.paths.get_mut(&last_name) {
            dir_info.merged.is_null = true;
        }
    } else {
        let oid = write_tree_object(store, &mut dv.versions[offset..])?;
        let version = VersionInfo {
            oid,
            mode: FileMode::TREE,
        };
        if let Some(dir_info) = state.paths.get_mut(&last_name) {
            dir_info.merged.result = version;
        }
        written = Some(version);
    }

    dv.offsets.pop();
    dv.versions.truncate(offset);

    let prev_dir = dv.offsets.last().map(|&(dir, _)| dir);
    if prev_dir != Some(new_dir) {
        dv.offsets.push((new_dir, dv.versions.len()));
    }

    if let Some(version) = written {
        dv.versions.push((basename(&last_name).to_owned(), version));
    }
    dv.last_dir = Some(new_dir);
    Ok(())
}

/// Write the root tree from whatever remains queued.
pub(crate) fn finish_tree<S: ObjectStore>(
    store: &mut S,
    dv: &mut DirectoryVersions,
) -> Result<ObjectId, MergeError> {
    debug_assert!(
        dv.offsets.len() <= 1 && dv.offsets.first().map_or(true, |&(_, off)| off == 0),
        "directory accounting out of balance"
    );
    write_tree_object(store, &mut dv.versions[..])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
