//! Rename similarity detection.
//!
//! Turns add/delete candidate pairs into rename pairs. Exact matches
//! (identical object id and mode) are found first and cost nothing per
//! byte, so every candidate participates; content scoring runs only for
//! sources the merge actually flagged as relevant, and only while the
//! matrix stays under the rename limit.
//!
//! A score is common-line bytes scaled to [0, 60000] against the larger of
//! the two files; candidates at or above the threshold are paired greedily
//! from the best score down, with path ties broken lexically so detection
//! is deterministic.
//!
//! Every detected rename also feeds the directory-rename counts: matching
//! ancestor directories of source and destination are paired and counted,
//! walking upward while the source ancestor is a removed directory.

use std::collections::BTreeMap;

use crate::error::MergeError;
use crate::merge::options::MAX_SCORE;
use crate::merge::types::{parent_dir, FilePair, FileSpec, PairStatus, Relevance};
use crate::store::ObjectStore;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Run rename detection over one side's candidate pairs.
///
/// Rewrites `pairs` in place: matched delete/add pairs collapse into
/// `Renamed` pairs, everything else gets its `Added`/`Deleted` status.
/// Returns the rename limit that would have been needed when inexact
/// detection was skipped, `0` otherwise.
#[allow(clippy::too_many_arguments)]
pub(crate) fn detect_renames<S: ObjectStore>(
    store: &S,
    pairs: &mut Vec<FilePair>,
    relevant_sources: &BTreeMap<String, Relevance>,
    dirs_removed: &BTreeMap<String, u8>,
    dir_rename_count: &mut BTreeMap<String, BTreeMap<String, u32>>,
    rename_limit: usize,
    min_score: u32,
) -> Result<usize, MergeError> {
    let candidates = std::mem::take(pairs);
    let mut sources: Vec<FileSpec> = Vec::new();
    let mut dests: Vec<FileSpec> = Vec::new();
    for pair in candidates {
        if pair.one.is_valid() && !pair.two.is_valid() {
            sources.push(pair.one);
        } else if !pair.one.is_valid() && pair.two.is_valid() {
            dests.push(pair.two);
        }
        // Pairs that already carry both endpoints (cached replays) never
        // reach the detector.
    }

    let mut src_used = vec![false; sources.len()];
    let mut dst_used = vec![false; dests.len()];
    let mut renames: Vec<(usize, usize, u32)> = Vec::new();

    // Exact matches: identical content and mode, first source wins.
    let mut by_identity: BTreeMap<(crate::model::types::ObjectId, u32), Vec<usize>> =
        BTreeMap::new();
    for (i, src) in sources.iter().enumerate() {
        by_identity.entry((src.oid, src.mode.0)).or_default().push(i);
    }
    for (j, dst) in dests.iter().enumerate() {
        if let Some(slots) = by_identity.get(&(dst.oid, dst.mode.0)) {
            if let Some(pos) = slots.iter().position(|&idx| !src_used[idx]) {
                let i = slots[pos];
                src_used[i] = true;
                dst_used[j] = true;
                renames.push((i, j, MAX_SCORE));
            }
        }
    }

    // Inexact matches, for relevant sources only.
    let mut needed_rename_limit = 0usize;
    let pending_sources: Vec<usize> = (0..sources.len())
        .filter(|&i| !src_used[i] && relevant_sources.contains_key(&sources[i].path))
        .collect();
    let pending_dests: Vec<usize> = (0..dests.len()).filter(|&j| !dst_used[j]).collect();

    if !pending_sources.is_empty() && !pending_dests.is_empty() {
        if pending_sources.len() * pending_dests.len() > rename_limit * rename_limit {
            needed_rename_limit = pending_sources.len().max(pending_dests.len());
            tracing::warn!(
                sources = pending_sources.len(),
                dests = pending_dests.len(),
                limit = rename_limit,
                "skipping inexact rename detection over the rename limit"
            );
        } else {
            let mut scored: Vec<(u32, usize, usize)> = Vec::new();
            for &i in &pending_sources {
                // Submodules have no blob to score; only exact moves of
                // those are ever detected.
                if sources[i].mode.is_submodule() {
                    continue;
                }
                let src_bytes = store.read_blob(&sources[i].oid)?;
                if src_bytes.is_empty() {
                    continue; // empty files pair with anything; never rename them
                }
                for &j in &pending_dests {
                    if sources[i].mode.object_type() != dests[j].mode.object_type() {
                        continue;
                    }
                    let dst_bytes = store.read_blob(&dests[j].oid)?;
                    if dst_bytes.is_empty() {
                        continue;
                    }
                    let score = similarity_score(&src_bytes, &dst_bytes);
                    if score >= min_score {
                        scored.push((score, i, j));
                    }
                }
            }
            scored.sort_by(|a, b| {
                b.0.cmp(&a.0)
                    .then_with(|| sources[a.1].path.cmp(&sources[b.1].path))
                    .then_with(|| dests[a.2].path.cmp(&dests[b.2].path))
            });
            for (score, i, j) in scored {
                if src_used[i] || dst_used[j] {
                    continue;
                }
                src_used[i] = true;
                dst_used[j] = true;
                renames.push((i, j, score));
            }
        }
    }

    // Feed the directory-rename counts and rebuild the pair list.
    let mut rebuilt: Vec<FilePair> = Vec::new();
    for &(i, j, score) in &renames {
        update_dir_rename_counts(
            dir_rename_count,
            dirs_removed,
            &sources[i].path,
            &dests[j].path,
        );
        rebuilt.push(FilePair {
            one: sources[i].clone(),
            two: dests[j].clone(),
            status: PairStatus::Renamed,
            score,
            target_side: 0,
        });
    }
    for (i, src) in sources.into_iter().enumerate() {
        if !src_used[i] {
            let path = src.path.clone();
            rebuilt.push(FilePair {
                one: src,
                two: FileSpec::absent(&path),
                status: PairStatus::Deleted,
                score: 0,
                target_side: 0,
            });
        }
    }
    for (j, dst) in dests.into_iter().enumerate() {
        if !dst_used[j] {
            let path = dst.path.clone();
            rebuilt.push(FilePair {
                one: FileSpec::absent(&path),
                two: dst,
                status: PairStatus::Added,
                score: 0,
                target_side: 0,
            });
        }
    }
    rebuilt.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
    *pairs = rebuilt;

    Ok(needed_rename_limit)
}

fn sort_key(pair: &FilePair) -> (&str, &str) {
    match pair.status {
        PairStatus::Added => (&pair.two.path, ""),
        _ => (&pair.one.path, &pair.two.path),
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Similarity of two non-empty blobs on the `[0, MAX_SCORE]` scale.
#[must_use]
pub(crate) fn similarity_score(a: &[u8], b: &[u8]) -> u32 {
    let lines_a = line_multiset(a);
    let lines_b = line_multiset(b);

    let mut common_bytes: u64 = 0;
    for (line, &count_a) in &lines_a {
        if let Some(&count_b) = lines_b.get(line) {
            common_bytes += count_a.min(count_b) * line.len() as u64;
        }
    }
    let larger = a.len().max(b.len()) as u64;
    if larger == 0 {
        return MAX_SCORE;
    }
    u32::try_from(common_bytes * u64::from(MAX_SCORE) / larger).unwrap_or(MAX_SCORE)
}

fn line_multiset(bytes: &[u8]) -> BTreeMap<&[u8], u64> {
    let mut lines: BTreeMap<&[u8], u64> = BTreeMap::new();
    let mut start = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'\n' {
            *lines.entry(&bytes[start..=i]).or_insert(0) += 1;
            start = i + 1;
        }
    }
    if start < bytes.len() {
        *lines.entry(&bytes[start..]).or_insert(0) += 1;
    }
    lines
}

// ---------------------------------------------------------------------------
// Directory-rename counting
// ---------------------------------------------------------------------------

/// Pair matching ancestor directories of a rename and count them, walking
/// upward while the source ancestor is one of the removed directories.
fn update_dir_rename_counts(
    counts: &mut BTreeMap<String, BTreeMap<String, u32>>,
    dirs_removed: &BTreeMap<String, u8>,
    old_path: &str,
    new_path: &str,
) {
    let mut old_dir = parent_dir(old_path);
    let mut new_dir = parent_dir(new_path);
    loop {
        if old_dir == new_dir {
            break;
        }
        if !dirs_removed.contains_key(old_dir) {
            break;
        }
        *counts
            .entry(old_dir.to_owned())
            .or_default()
            .entry(new_dir.to_owned())
            .or_insert(0) += 1;
        old_dir = parent_dir(old_dir);
        new_dir = parent_dir(new_dir);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
