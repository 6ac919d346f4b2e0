//! The three-way tree merge engine.
//!
//! Implements the collect → rename → resolve → build pipeline. Each phase
//! is a separate module:
//!
//! - **collect**: walk the three trees in lockstep and build the path map.
//! - **similarity** / **rename**: pair deleted and added files, infer
//!   directory renames, and relocate records accordingly.
//! - **resolve**: classify every remaining path into a clean result or a
//!   staged conflict.
//! - **build**: emit tree objects bottom-up and return the root id.
//!
//! [`Merger`] owns the options, the pluggable content merger, and the
//! state retained between merges in a sequence (the rename caches). The
//! same engine instance run over the same inputs always produces the same
//! result tree: paths are processed in deterministic orders throughout and
//! content identity, never timestamps, drives every decision.

pub mod build;
pub mod collect;
pub mod content;
pub mod options;
pub mod rename;
pub mod resolve;
pub mod similarity;
pub mod types;


use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MergeError;
use crate::model::types::{FileMode, ObjectId, ObjectKind};
use crate::store::ObjectStore;

pub use content::{ContentMergeOutcome, ContentMergeRequest, ContentMerger, TextMerger};
pub use options::{DirectoryRenames, MergeOptions, MergeVariant};

use types::{Labels, MergeState};

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// One stage of an unresolved path, index-style.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmergedEntry {
    /// The conflicted path.
    pub path: String,
    /// 1 = base, 2 = side 1, 3 = side 2.
    pub stage: u8,
    /// Mode of this stage's version.
    pub mode: FileMode,
    /// Object id of this stage's version.
    pub oid: ObjectId,
}

/// The result of one merge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// The merged root tree.
    pub tree: ObjectId,
    /// Every path resolved without conflict.
    pub clean: bool,
    /// Stage entries for the paths that did not resolve, in path order.
    pub unmerged: Vec<UnmergedEntry>,
    /// Accumulated user-facing messages per path.
    pub messages: BTreeMap<String, String>,
    /// When nonzero, rename detection was skipped for being over the
    /// limit; this is the limit that would have sufficed.
    pub needed_rename_limit: usize,
}

// ---------------------------------------------------------------------------
// CommitRef — real or virtual commits for recursive merging
// ---------------------------------------------------------------------------

/// A commit that either exists in the store or was synthesized while
/// folding multiple merge bases.
#[derive(Clone, Debug)]
enum CommitRef {
    Real(ObjectId),
    Virtual {
        tree: ObjectId,
        parents: Vec<CommitRef>,
    },
}

impl CommitRef {
    fn tree<S: ObjectStore>(&self, store: &S) -> Result<ObjectId, MergeError> {
        match self {
            Self::Real(oid) => Ok(store.parse_commit(oid)?.tree),
            Self::Virtual { tree, .. } => Ok(*tree),
        }
    }

    /// The real commits reachable without passing through the store: the
    /// commit itself, or a virtual commit's real ancestors.
    fn tips(&self, out: &mut Vec<ObjectId>) {
        match self {
            Self::Real(oid) => {
                if !out.contains(oid) {
                    out.push(*oid);
                }
            }
            Self::Virtual { parents, .. } => {
                for parent in parents {
                    parent.tips(out);
                }
            }
        }
    }
}

/// Merge bases of two possibly-virtual commits: the maximal elements of
/// the pairwise merge bases of their real tips.
fn merge_bases_of<S: ObjectStore>(
    store: &S,
    a: &CommitRef,
    b: &CommitRef,
) -> Result<Vec<ObjectId>, MergeError> {
    if let (CommitRef::Real(a), CommitRef::Real(b)) = (a, b) {
        return store.merge_bases(a, b);
    }
    let mut tips_a = Vec::new();
    a.tips(&mut tips_a);
    let mut tips_b = Vec::new();
    b.tips(&mut tips_b);

    let mut candidates: Vec<ObjectId> = Vec::new();
    for ta in &tips_a {
        for tb in &tips_b {
            for base in store.merge_bases(ta, tb)? {
                if !candidates.contains(&base) {
                    candidates.push(base);
                }
            }
        }
    }
    let mut maximal = Vec::new();
    for c in &candidates {
        let mut dominated = false;
        for d in &candidates {
            if c != d && store.in_merge_bases(c, d)? {
                dominated = true;
                break;
            }
        }
        if !dominated {
            maximal.push(*c);
        }
    }
    maximal.sort();
    Ok(maximal)
}

// ---------------------------------------------------------------------------
// Merger
// ---------------------------------------------------------------------------

/// The merge engine.
///
/// One instance serves one sequence of merges; rename-detection caches are
/// kept between calls and replayed automatically when the new inputs line
/// up with the previous merge (base equals the previous other side and one
/// side equals the previous result tree).
pub struct Merger {
    opts: MergeOptions,
    content: Box<dyn ContentMerger>,
    state: Option<MergeState>,
    last_result_tree: Option<ObjectId>,
}

impl Merger {
    /// Create an engine with the default text merger.
    #[must_use]
    pub fn new(opts: MergeOptions) -> Self {
        Self::with_content_merger(opts, Box::new(TextMerger))
    }

    /// Create an engine with a caller-supplied content merger.
    #[must_use]
    pub fn with_content_merger(opts: MergeOptions, content: Box<dyn ContentMerger>) -> Self {
        Self {
            opts,
            content,
            state: None,
            last_result_tree: None,
        }
    }

    /// The options this engine was built with.
    #[must_use]
    pub fn options(&self) -> &MergeOptions {
        &self.opts
    }

    fn labels(&self) -> Labels {
        Labels {
            ancestor: self.opts.ancestor_label.clone(),
            side1: self.opts.side1_label.clone(),
            side2: self.opts.side2_label.clone(),
        }
    }

    /// Prepare state for a fresh caller-visible merge, keeping whatever
    /// rename caches were declared valid.
    fn merge_start(&mut self) -> MergeState {
        let mut state = self
            .state
            .take()
            .unwrap_or_else(|| MergeState::new(self.labels()));
        state.clear(true);
        state.output.clear();
        state.labels = self.labels();
        state.call_depth = 0;
        state.needed_rename_limit = 0;
        state
    }

    /// Merge a base tree and two side trees.
    ///
    /// # Errors
    /// Fatal store problems only; conflicts are reported in the outcome.
    pub fn merge_nonrecursive<S: ObjectStore>(
        &mut self,
        store: &mut S,
        base: &ObjectId,
        side1: &ObjectId,
        side2: &ObjectId,
    ) -> Result<MergeOutcome, MergeError> {
        // Cache validity must be judged before the caches are cleared.
        {
            let last = self.last_result_tree;
            if let Some(state) = self.state.as_mut() {
                rename::check_renames_reusable(state, last, base, side1, side2);
            }
        }
        let mut state = self.merge_start();
        state.renames.merge_trees = Some([*base, *side1, *side2]);

        let (tree, clean) = merge_trees_internal(
            &mut state,
            &self.opts,
            store,
            self.content.as_ref(),
            base,
            side1,
            side2,
        )?;

        let outcome = build_outcome(&state, tree, clean);
        self.last_result_tree = Some(tree);
        self.state = Some(state);
        Ok(outcome)
    }

    /// Merge two commits, synthesizing an ancestor from their merge bases
    /// when history is criss-crossed.
    ///
    /// # Errors
    /// Fatal store problems only; conflicts are reported in the outcome.
    pub fn merge_recursive<S: ObjectStore>(
        &mut self,
        store: &mut S,
        side1_commit: &ObjectId,
        side2_commit: &ObjectId,
    ) -> Result<MergeOutcome, MergeError> {
        let mut state = self.merge_start();
        let bases: Vec<CommitRef> = store
            .merge_bases(side1_commit, side2_commit)?
            .into_iter()
            .map(CommitRef::Real)
            .collect();

        let (tree, clean) = merge_ort_internal(
            &mut state,
            &self.opts,
            store,
            self.content.as_ref(),
            bases,
            &CommitRef::Real(*side1_commit),
            &CommitRef::Real(*side2_commit),
        )?;

        let outcome = build_outcome(&state, tree, clean);
        self.last_result_tree = Some(tree);
        self.state = Some(state);
        Ok(outcome)
    }

    /// Drop all retained state, caches included.
    pub fn finalize(&mut self) {
        self.state = None;
        self.last_result_tree = None;
    }
}

// ---------------------------------------------------------------------------
// Internal drivers
// ---------------------------------------------------------------------------

/// The non-recursive pipeline, including the redo-after-renames restart.
fn merge_trees_internal<S: ObjectStore>(
    state: &mut MergeState,
    opts: &MergeOptions,
    store: &mut S,
    content: &dyn ContentMerger,
    base: &ObjectId,
    side1: &ObjectId,
    side2: &ObjectId,
) -> Result<(ObjectId, bool), MergeError> {
    loop {
        collect::collect_merge_info(state, store, base, side1, side2)?;
        let clean = rename::detect_and_process_renames(state, opts, store, content)?;
        if state.renames.redo_after_renames == 2 {
            // Rename results are cached now; a second collection pass can
            // resolve the deferred directories trivially.
            tracing::debug!("redoing collection with primed rename cache");
            state.clear(true);
            continue;
        }
        let tree = resolve::process_entries(state, opts, store, content)?;
        let clean = clean && state.unmerged.is_empty();
        return Ok((tree, clean));
    }
}

/// The recursive driver: fold all merge bases into one virtual ancestor,
/// then run the tree merge.
fn merge_ort_internal<S: ObjectStore>(
    state: &mut MergeState,
    opts: &MergeOptions,
    store: &mut S,
    content: &dyn ContentMerger,
    mut bases: Vec<CommitRef>,
    h1: &CommitRef,
    h2: &CommitRef,
) -> Result<(ObjectId, bool), MergeError> {
    let mut merged_base = if bases.is_empty() {
        let empty = store.write_object(ObjectKind::Tree, b"")?;
        state.labels.ancestor = "empty tree".to_owned();
        CommitRef::Virtual {
            tree: empty,
            parents: Vec::new(),
        }
    } else {
        bases.remove(0)
    };

    if !bases.is_empty() {
        state.labels.ancestor = "merged common ancestors".to_owned();
    }

    for next in bases {
        let prev = merged_base.clone();
        state.call_depth += 1;
        let saved_side1 = std::mem::replace(
            &mut state.labels.side1,
            "Temporary merge branch 1".to_owned(),
        );
        let saved_side2 = std::mem::replace(
            &mut state.labels.side2,
            "Temporary merge branch 2".to_owned(),
        );

        let inner_bases: Vec<CommitRef> = merge_bases_of(store, &prev, &next)?
            .into_iter()
            .map(CommitRef::Real)
            .collect();
        let (tree, _clean) =
            merge_ort_internal(state, opts, store, content, inner_bases, &prev, &next)?;

        state.labels.side1 = saved_side1;
        state.labels.side2 = saved_side2;
        state.call_depth -= 1;

        merged_base = CommitRef::Virtual {
            tree,
            parents: vec![prev, next],
        };
        state.clear(true);
    }

    let base_tree = merged_base.tree(store)?;
    let tree1 = h1.tree(store)?;
    let tree2 = h2.tree(store)?;
    merge_trees_internal(state, opts, store, content, &base_tree, &tree1, &tree2)
}

/// Assemble the caller-facing outcome from the final state.
fn build_outcome(state: &MergeState, tree: ObjectId, clean: bool) -> MergeOutcome {
    let mut unmerged = Vec::new();
    for path in &state.unmerged {
        let Some(ci) = state.paths.get(path) else {
            continue;
        };
        for role in 0..3u8 {
            if ci.filemask & (1 << role) == 0 {
                continue;
            }
            unmerged.push(UnmergedEntry {
                path: path.clone(),
                stage: role + 1,
                mode: ci.stages[role as usize].mode,
                oid: ci.stages[role as usize].oid,
            });
        }
    }
    MergeOutcome {
        tree,
        clean,
        unmerged,
        messages: state.output.clone(),
        needed_rename_limit: state.needed_rename_limit,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
