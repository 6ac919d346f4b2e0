//! Content-level merging.
//!
//! The engine treats line-level text merging as a collaborator behind the
//! [`ContentMerger`] trait; [`TextMerger`] is the default implementation,
//! built on the `merge3` crate. Conflicting hunks are rendered with sized
//! markers and a labeled base section. Binary content (NUL bytes or
//! invalid UTF-8) is taken whole from one side and the merge is unclean.
//!
//! This module also owns the pieces that sit right next to the text merge:
//! the mode-merging rule, the trivial oid shortcuts, symlink variant
//! handling, renormalized blob comparison, and the submodule fast-forward
//! merge with its 0/1/many candidate search.

use merge3::{Merge3, MergeGroup};

use crate::error::MergeError;
use crate::merge::options::{MergeOptions, MergeVariant};
use crate::merge::types::{MergeState, VersionInfo};
use crate::model::types::{ObjectId, ObjectKind};
use crate::store::ObjectStore;

// ---------------------------------------------------------------------------
// ContentMerger trait
// ---------------------------------------------------------------------------

/// Inputs for one three-way content merge.
pub struct ContentMergeRequest<'a> {
    /// Base content, or `None` for a two-way merge.
    pub base: Option<&'a [u8]>,
    /// Side-1 content.
    pub ours: &'a [u8],
    /// Side-2 content.
    pub theirs: &'a [u8],
    /// The target path (informational).
    pub path: &'a str,
    /// Label for the base section of conflict markers.
    pub base_label: &'a str,
    /// Label for the side-1 conflict marker.
    pub ours_label: &'a str,
    /// Label for the side-2 conflict marker.
    pub theirs_label: &'a str,
    /// Length of the marker runs (`<<<`, `===`, `>>>`).
    pub marker_size: usize,
    /// Conflict-favoring variant.
    pub variant: MergeVariant,
    /// Normalize CRLF line endings before comparing and merging.
    pub renormalize: bool,
    /// Opaque passthrough flags.
    pub xdl_opts: u32,
}

/// Result of a content merge: the merged bytes and whether they are
/// conflict-free.
pub struct ContentMergeOutcome {
    /// The merged content (with markers when unclean).
    pub bytes: Vec<u8>,
    /// No conflicting hunks remained.
    pub clean: bool,
}

/// A pluggable three-way content merger.
pub trait ContentMerger {
    /// Merge one file's contents.
    fn merge(&self, request: &ContentMergeRequest<'_>) -> ContentMergeOutcome;
}

// ---------------------------------------------------------------------------
// TextMerger
// ---------------------------------------------------------------------------

/// The default line-level merger.
#[derive(Clone, Copy, Debug, Default)]
pub struct TextMerger;

impl ContentMerger for TextMerger {
    fn merge(&self, request: &ContentMergeRequest<'_>) -> ContentMergeOutcome {
        let _ = request.xdl_opts;
        let (base, ours, theirs) = if request.renormalize {
            (
                normalize_crlf(request.base.unwrap_or(b"")),
                normalize_crlf(request.ours),
                normalize_crlf(request.theirs),
            )
        } else {
            (
                request.base.unwrap_or(b"").to_vec(),
                request.ours.to_vec(),
                request.theirs.to_vec(),
            )
        };
        let texts = if looks_binary(&base) || looks_binary(&ours) || looks_binary(&theirs) {
            None
        } else {
            match (
                std::str::from_utf8(&base),
                std::str::from_utf8(&ours),
                std::str::from_utf8(&theirs),
            ) {
                (Ok(b), Ok(o), Ok(t)) => Some((b, o, t)),
                _ => None,
            }
        };
        let Some((base_text, ours_text, theirs_text)) = texts else {
            // Binary content cannot be line-merged; take one side whole.
            let bytes = match request.variant {
                MergeVariant::Theirs => request.theirs.to_vec(),
                _ => request.ours.to_vec(),
            };
            return ContentMergeOutcome {
                bytes,
                clean: false,
            };
        };

        let base_lines = split_lines(base_text);
        let ours_lines = split_lines(ours_text);
        let theirs_lines = split_lines(theirs_text);
        let m3 = Merge3::new(&base_lines, &ours_lines, &theirs_lines);
        let groups = m3.merge_groups();

        let mut bytes = Vec::new();
        let mut clean = true;
        for group in &groups {
            match group {
                MergeGroup::Unchanged(lines)
                | MergeGroup::Same(lines)
                | MergeGroup::A(lines)
                | MergeGroup::B(lines) => push_lines(&mut bytes, lines),
                MergeGroup::Conflict(base, a_lines, b_lines) => match request.variant {
                    MergeVariant::Ours => push_lines(&mut bytes, a_lines),
                    MergeVariant::Theirs => push_lines(&mut bytes, b_lines),
                    MergeVariant::Normal => {
                        clean = false;
                        push_marker(&mut bytes, b'<', request.marker_size, Some(request.ours_label));
                        push_lines_terminated(&mut bytes, a_lines);
                        if let Some(base_lines) = base {
                            push_marker(
                                &mut bytes,
                                b'|',
                                request.marker_size,
                                Some(request.base_label),
                            );
                            push_lines_terminated(&mut bytes, base_lines);
                        }
                        push_marker(&mut bytes, b'=', request.marker_size, None);
                        push_lines_terminated(&mut bytes, b_lines);
                        push_marker(&mut bytes, b'>', request.marker_size, Some(request.theirs_label));
                    }
                },
            }
        }
        ContentMergeOutcome { bytes, clean }
    }
}

/// NUL bytes mark content we refuse to line-merge.
fn looks_binary(bytes: &[u8]) -> bool {
    bytes.contains(&0)
}

/// Split text into lines, each keeping its trailing newline.
fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, c) in text.char_indices() {
        if c == '\n' {
            lines.push(&text[start..=i]);
            start = i + 1;
        }
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

fn push_lines(out: &mut Vec<u8>, lines: &[&str]) {
    for line in lines {
        out.extend_from_slice(line.as_bytes());
    }
}

/// Like [`push_lines`] but guarantees a trailing newline per line, so the
/// following conflict marker starts its own line.
fn push_lines_terminated(out: &mut Vec<u8>, lines: &[&str]) {
    for line in lines {
        out.extend_from_slice(line.as_bytes());
        if !line.ends_with('\n') {
            out.push(b'\n');
        }
    }
}

fn push_marker(out: &mut Vec<u8>, marker: u8, size: usize, label: Option<&str>) {
    out.extend(std::iter::repeat(marker).take(size));
    if let Some(label) = label {
        out.push(b' ');
        out.extend_from_slice(label.as_bytes());
    }
    out.push(b'\n');
}

// ---------------------------------------------------------------------------
// handle_content_merge
// ---------------------------------------------------------------------------

/// Merge one path's three versions into a result version.
///
/// Both sides must hold the same kind of object (file / symlink /
/// submodule); conflicting kinds are handled earlier by the resolver.
/// Returns whether the merge was clean; the merged object (for regular
/// files) is written back to the store.
#[allow(clippy::too_many_arguments)]
pub(crate) fn handle_content_merge<S: ObjectStore>(
    state: &mut MergeState,
    opts: &MergeOptions,
    store: &mut S,
    content: &dyn ContentMerger,
    path: &str,
    o: &VersionInfo,
    a: &VersionInfo,
    b: &VersionInfo,
    pathnames: &[String; 3],
    extra_marker_size: usize,
    result: &mut VersionInfo,
) -> Result<bool, MergeError> {
    debug_assert_eq!(a.mode.object_type(), b.mode.object_type());
    let mut clean = true;

    // Merge modes.
    if a.mode == b.mode || a.mode == o.mode {
        result.mode = b.mode;
    } else {
        // Only the 100644/100755 pair can get here.
        debug_assert!(a.mode.is_regular());
        result.mode = a.mode;
        clean = b.mode == o.mode;
    }

    // Trivial oid merges. Renames do not always leave match_mask behind,
    // so these shortcuts still fire here.
    if a.oid == b.oid || a.oid == o.oid {
        result.oid = b.oid;
    } else if b.oid == o.oid {
        result.oid = a.oid;
    } else if a.mode.is_regular() {
        // A base of a different kind is no base at all.
        let two_way = o.mode.object_type() != a.mode.object_type();
        let base_bytes = if two_way || o.oid.is_null() {
            None
        } else {
            Some(store.read_blob(&o.oid)?)
        };
        let ours = store.read_blob(&a.oid)?;
        let theirs = store.read_blob(&b.oid)?;

        let same_paths = pathnames[0] == pathnames[1] && pathnames[1] == pathnames[2];
        let (base_label, ours_label, theirs_label) = if same_paths {
            (
                state.labels.ancestor.clone(),
                state.labels.side1.clone(),
                state.labels.side2.clone(),
            )
        } else {
            (
                format!("{}:{}", state.labels.ancestor, pathnames[0]),
                format!("{}:{}", state.labels.side1, pathnames[1]),
                format!("{}:{}", state.labels.side2, pathnames[2]),
            )
        };

        let variant = if state.call_depth > 0 {
            MergeVariant::Normal
        } else {
            opts.recursive_variant
        };
        let outcome = content.merge(&ContentMergeRequest {
            base: base_bytes.as_deref(),
            ours: &ours,
            theirs: &theirs,
            path,
            base_label: &base_label,
            ours_label: &ours_label,
            theirs_label: &theirs_label,
            marker_size: 7 + extra_marker_size,
            variant,
            renormalize: opts.renormalize,
            xdl_opts: opts.xdl_opts,
        });

        result.oid = store.write_object(ObjectKind::Blob, &outcome.bytes)?;
        clean &= outcome.clean;
        state.path_msg(path, &format!("Auto-merging {path}"));
    } else if a.mode.is_submodule() {
        let two_way = o.mode.object_type() != a.mode.object_type();
        let base_oid = if two_way { None } else { Some(&o.oid) };
        let (merged_oid, sub_clean) =
            merge_submodule(state, store, &pathnames[0], base_oid, &a.oid, &b.oid)?;
        result.oid = merged_oid;
        clean = sub_clean;
        if state.call_depth > 0 && two_way && !clean {
            result.mode = o.mode;
            result.oid = o.oid;
        }
    } else if a.mode.is_symlink() {
        if state.call_depth > 0 {
            clean = false;
            result.mode = o.mode;
            result.oid = o.oid;
        } else {
            match opts.recursive_variant {
                MergeVariant::Normal => {
                    clean = false;
                    result.oid = a.oid;
                }
                MergeVariant::Ours => result.oid = a.oid,
                MergeVariant::Theirs => result.oid = b.oid,
            }
        }
    } else {
        unreachable!("unsupported object type {:o} for {path}", a.mode.0);
    }

    Ok(clean)
}

// ---------------------------------------------------------------------------
// Renormalized comparison
// ---------------------------------------------------------------------------

/// Did this blob stay unchanged between base and side, modulo CRLF
/// normalization when `renormalize` is on?
pub(crate) fn blob_unchanged<S: ObjectStore>(
    store: &S,
    opts: &MergeOptions,
    base: &VersionInfo,
    side: &VersionInfo,
) -> Result<bool, MergeError> {
    if base.mode != side.mode {
        return Ok(false);
    }
    if base.oid == side.oid {
        return Ok(true);
    }
    if !opts.renormalize || !base.mode.is_regular() {
        return Ok(false);
    }
    let base_bytes = store.read_blob(&base.oid)?;
    let side_bytes = store.read_blob(&side.oid)?;
    Ok(normalize_crlf(&base_bytes) == normalize_crlf(&side_bytes))
}

fn normalize_crlf(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\r' && bytes.get(i + 1) == Some(&b'\n') {
            i += 1;
        }
        out.push(bytes[i]);
        i += 1;
    }
    out
}

// ---------------------------------------------------------------------------
// Submodule merge
// ---------------------------------------------------------------------------

fn find_first_merges<S: ObjectStore>(
    store: &S,
    a: &ObjectId,
    b: &ObjectId,
) -> Result<Vec<ObjectId>, MergeError> {
    let mut merges = Vec::new();
    for candidate in store.merges_containing(a)? {
        if store.in_merge_bases(b, &candidate)? {
            merges.push(candidate);
        }
    }

    // Keep only the earliest merges: drop any that contain another.
    let mut result = Vec::new();
    for m1 in &merges {
        let mut contains_another = false;
        for m2 in &merges {
            if m1 != m2 && store.in_merge_bases(m2, m1)? {
                contains_another = true;
                break;
            }
        }
        if !contains_another {
            result.push(*m1);
        }
    }
    Ok(result)
}

fn short_hex(oid: &ObjectId) -> String {
    oid.to_hex()[..12].to_owned()
}

/// Merge three submodule commit pointers.
///
/// Fast-forwards when one side contains the other; otherwise searches for
/// existing merges of the two and reports 0, 1, or many candidates, leaving
/// the path unresolved. Returns the result oid and cleanliness.
pub(crate) fn merge_submodule<S: ObjectStore>(
    state: &mut MergeState,
    store: &S,
    path: &str,
    o: Option<&ObjectId>,
    a: &ObjectId,
    b: &ObjectId,
) -> Result<(ObjectId, bool), MergeError> {
    let null = ObjectId::NULL;
    let o = o.unwrap_or(&null);
    // Fallback answer in case nothing below improves on it.
    let fallback = if state.call_depth > 0 { *o } else { *a };

    // Deletion conflicts are not handled here.
    if o.is_null() || a.is_null() || b.is_null() {
        return Ok((fallback, false));
    }

    let commits_present = store.parse_commit(o).is_ok()
        && store.parse_commit(a).is_ok()
        && store.parse_commit(b).is_ok();
    if !commits_present {
        state.path_msg(
            path,
            &format!("Failed to merge submodule {path} (commits not present)"),
        );
        return Ok((fallback, false));
    }

    // Both changes must be fast-forward from the base.
    if !store.in_merge_bases(o, a)? || !store.in_merge_bases(o, b)? {
        state.path_msg(
            path,
            &format!("Failed to merge submodule {path} (commits don't follow merge-base)"),
        );
        return Ok((fallback, false));
    }

    if store.in_merge_bases(a, b)? {
        state.path_msg(
            path,
            &format!("Note: Fast-forwarding submodule {path} to {}", short_hex(b)),
        );
        return Ok((*b, true));
    }
    if store.in_merge_bases(b, a)? {
        state.path_msg(
            path,
            &format!("Note: Fast-forwarding submodule {path} to {}", short_hex(a)),
        );
        return Ok((*a, true));
    }

    // A candidate search makes no sense inside virtual-ancestor merges.
    if state.call_depth > 0 {
        return Ok((fallback, false));
    }

    let merges = find_first_merges(store, a, b)?;
    match merges.len() {
        0 => state.path_msg(path, &format!("Failed to merge submodule {path}")),
        1 => {
            state.path_msg(
                path,
                &format!(
                    "Failed to merge submodule {path}, but a possible merge resolution exists:\n    {}",
                    short_hex(&merges[0])
                ),
            );
            state.path_msg(
                path,
                &format!(
                    "If this is correct simply record {} as the resolution for {path}.",
                    merges[0].to_hex()
                ),
            );
        }
        _ => {
            let listing: Vec<String> = merges.iter().map(|m| format!("    {}", short_hex(m))).collect();
            state.path_msg(
                path,
                &format!(
                    "Failed to merge submodule {path}, but multiple possible merges exist:\n{}",
                    listing.join("\n")
                ),
            );
        }
    }
    Ok((fallback, false))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::types::Labels;
    use crate::model::types::{FileMode, ObjectKind};
    use crate::store::MemoryStore;

    fn labels() -> Labels {
        Labels {
            ancestor: "base".to_owned(),
            side1: "ours".to_owned(),
            side2: "theirs".to_owned(),
        }
    }

    fn request<'a>(
        base: Option<&'a [u8]>,
        ours: &'a [u8],
        theirs: &'a [u8],
        variant: MergeVariant,
        marker_size: usize,
    ) -> ContentMergeRequest<'a> {
        ContentMergeRequest {
            base,
            ours,
            theirs,
            path: "file.txt",
            base_label: "BASE",
            ours_label: "LEFT",
            theirs_label: "RIGHT",
            marker_size,
            variant,
            renormalize: false,
            xdl_opts: 0,
        }
    }

    // -----------------------------------------------------------------------
    // TextMerger
    // -----------------------------------------------------------------------

    #[test]
    fn non_overlapping_edits_merge_clean() {
        let out = TextMerger.merge(&request(
            Some(b"one\ntwo\nthree\n"),
            b"ONE\ntwo\nthree\n",
            b"one\ntwo\nTHREE\n",
            MergeVariant::Normal,
            7,
        ));
        assert!(out.clean);
        assert_eq!(out.bytes, b"ONE\ntwo\nTHREE\n");
    }

    #[test]
    fn overlapping_edits_conflict_with_markers() {
        let out = TextMerger.merge(&request(
            Some(b"1\n2\n3\n"),
            b"1\n2a\n3\n",
            b"1\n2b\n3\n",
            MergeVariant::Normal,
            7,
        ));
        assert!(!out.clean);
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(text.contains("<<<<<<< LEFT"));
        assert!(text.contains("2a\n"));
        assert!(text.contains("||||||| BASE"));
        assert!(text.contains("2\n"));
        assert!(text.contains("=======\n"));
        assert!(text.contains("2b\n"));
        assert!(text.contains(">>>>>>> RIGHT"));
    }

    #[test]
    fn marker_size_is_respected() {
        let out = TextMerger.merge(&request(
            Some(b"x\n"),
            b"a\n",
            b"b\n",
            MergeVariant::Normal,
            9,
        ));
        let text = String::from_utf8(out.bytes).unwrap();
        assert!(text.contains(&format!("{} LEFT", "<".repeat(9))));
        assert!(!text.contains(&format!("{} LEFT", "<".repeat(10))));
    }

    #[test]
    fn ours_variant_takes_our_hunks() {
        let out = TextMerger.merge(&request(
            Some(b"1\n2\n3\n"),
            b"1\n2a\n3\n",
            b"1\n2b\n3\n",
            MergeVariant::Ours,
            7,
        ));
        assert!(out.clean);
        assert_eq!(out.bytes, b"1\n2a\n3\n");
    }

    #[test]
    fn theirs_variant_takes_their_hunks() {
        let out = TextMerger.merge(&request(
            Some(b"1\n2\n3\n"),
            b"1\n2a\n3\n",
            b"1\n2b\n3\n",
            MergeVariant::Theirs,
            7,
        ));
        assert!(out.clean);
        assert_eq!(out.bytes, b"1\n2b\n3\n");
    }

    #[test]
    fn binary_content_takes_one_side_unclean() {
        let out = TextMerger.merge(&request(
            Some(b"\x00\x01"),
            b"\x00ours",
            b"\x00theirs",
            MergeVariant::Normal,
            7,
        ));
        assert!(!out.clean);
        assert_eq!(out.bytes, b"\x00ours");
    }

    #[test]
    fn two_way_merge_without_base() {
        let out = TextMerger.merge(&request(
            None,
            b"same\n",
            b"same\n",
            MergeVariant::Normal,
            7,
        ));
        assert!(out.clean);
        assert_eq!(out.bytes, b"same\n");
    }

    // -----------------------------------------------------------------------
    // Mode merging via handle_content_merge
    // -----------------------------------------------------------------------

    fn vi(oid: ObjectId, mode: FileMode) -> VersionInfo {
        VersionInfo { oid, mode }
    }

    fn run_content_merge(
        store: &mut MemoryStore,
        o: VersionInfo,
        a: VersionInfo,
        b: VersionInfo,
    ) -> (VersionInfo, bool) {
        let mut state = MergeState::new(labels());
        let opts = MergeOptions::default();
        let mut result = VersionInfo::NULL;
        let pathnames = ["f".to_owned(), "f".to_owned(), "f".to_owned()];
        let clean = handle_content_merge(
            &mut state,
            &opts,
            store,
            &TextMerger,
            "f",
            &o,
            &a,
            &b,
            &pathnames,
            0,
            &mut result,
        )
        .unwrap();
        (result, clean)
    }

    #[test]
    fn mode_follows_side2_when_side1_matches_base() {
        let mut store = MemoryStore::new();
        let blob = store.write_object(ObjectKind::Blob, b"c\n").unwrap();
        let (result, clean) = run_content_merge(
            &mut store,
            vi(blob, FileMode::REGULAR),
            vi(blob, FileMode::REGULAR),
            vi(blob, FileMode::EXECUTABLE),
        );
        assert!(clean);
        assert_eq!(result.mode, FileMode::EXECUTABLE);
        assert_eq!(result.oid, blob);
    }

    #[test]
    fn conflicting_mode_changes_take_side1_unclean() {
        // Base regular; side1 made it executable; side2 kept... no — for a
        // conflict both must differ from each other and side1 from base.
        let mut store = MemoryStore::new();
        let base = store.write_object(ObjectKind::Blob, b"c\n").unwrap();
        // Contents identical so only modes are in play.
        let (result, clean) = run_content_merge(
            &mut store,
            vi(base, FileMode::SYMLINK),
            vi(base, FileMode::EXECUTABLE),
            vi(base, FileMode::REGULAR),
        );
        // side1 mode differs from both: result takes side1, unclean.
        assert!(!clean);
        assert_eq!(result.mode, FileMode::EXECUTABLE);
    }

    #[test]
    fn content_merge_writes_result_blob() {
        let mut store = MemoryStore::new();
        let o = store.write_object(ObjectKind::Blob, b"1\n2\n3\n").unwrap();
        let a = store.write_object(ObjectKind::Blob, b"1a\n2\n3\n").unwrap();
        let b = store.write_object(ObjectKind::Blob, b"1\n2\n3b\n").unwrap();
        let (result, clean) = run_content_merge(
            &mut store,
            vi(o, FileMode::REGULAR),
            vi(a, FileMode::REGULAR),
            vi(b, FileMode::REGULAR),
        );
        assert!(clean);
        assert_eq!(store.read_blob(&result.oid).unwrap(), b"1a\n2\n3b\n");
    }

    // -----------------------------------------------------------------------
    // Renormalization
    // -----------------------------------------------------------------------

    #[test]
    fn blob_unchanged_modulo_crlf() {
        let mut store = MemoryStore::new();
        let crlf = store.write_object(ObjectKind::Blob, b"a\r\nb\r\n").unwrap();
        let lf = store.write_object(ObjectKind::Blob, b"a\nb\n").unwrap();
        let base = vi(crlf, FileMode::REGULAR);
        let side = vi(lf, FileMode::REGULAR);

        let mut opts = MergeOptions::default();
        assert!(!blob_unchanged(&store, &opts, &base, &side).unwrap());
        opts.renormalize = true;
        assert!(blob_unchanged(&store, &opts, &base, &side).unwrap());
    }

    // -----------------------------------------------------------------------
    // Submodule merge
    // -----------------------------------------------------------------------

    fn commit(store: &mut MemoryStore, parents: Vec<ObjectId>) -> ObjectId {
        let tree = store.write_object(ObjectKind::Tree, b"").unwrap();
        store.add_commit(tree, parents)
    }

    #[test]
    fn submodule_fast_forward() {
        let mut store = MemoryStore::new();
        let base = commit(&mut store, vec![]);
        let ahead = commit(&mut store, vec![base]);

        let mut state = MergeState::new(labels());
        let (result, clean) =
            merge_submodule(&mut state, &store, "sub", Some(&base), &base, &ahead).unwrap();
        assert!(clean);
        assert_eq!(result, ahead);
        assert!(state.output["sub"].contains("Fast-forwarding"));
    }

    #[test]
    fn submodule_divergence_suggests_existing_merge() {
        let mut store = MemoryStore::new();
        let base = commit(&mut store, vec![]);
        let a = commit(&mut store, vec![base]);
        let b = commit(&mut store, vec![base]);
        let merged = commit(&mut store, vec![a, b]);

        let mut state = MergeState::new(labels());
        let (result, clean) =
            merge_submodule(&mut state, &store, "sub", Some(&base), &a, &b).unwrap();
        assert!(!clean);
        assert_eq!(result, a, "fallback answer is side1 at depth 0");
        let msg = &state.output["sub"];
        assert!(msg.contains("possible merge resolution"));
        assert!(msg.contains(&merged.to_hex()[..12]));
    }

    #[test]
    fn submodule_missing_commits_is_unclean_with_message() {
        let store = MemoryStore::new();
        let fake = ObjectId::from_hex(&"11".repeat(32)).unwrap();
        let other = ObjectId::from_hex(&"22".repeat(32)).unwrap();
        let third = ObjectId::from_hex(&"33".repeat(32)).unwrap();

        let mut state = MergeState::new(labels());
        let (_, clean) =
            merge_submodule(&mut state, &store, "sub", Some(&fake), &other, &third).unwrap();
        assert!(!clean);
        assert!(state.output["sub"].contains("commits not present"));
    }
}
