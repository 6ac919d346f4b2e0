//! treemerge — an in-memory three-way tree merge engine.
//!
//! Given a common-ancestor tree and two side trees in a content-addressed
//! object store, the engine produces a merged tree plus the set of paths
//! that could not be resolved, without touching any working directory.
//! It is built to be invoked repeatedly (cherry-pick and rebase sequences)
//! and reuses rename-detection work across calls.
//!
//! The pipeline is collect → rename → resolve → build; each phase is a
//! module under [`merge`]. The object store and the line-level content
//! merger are pluggable via the [`store::ObjectStore`] and
//! [`merge::ContentMerger`] traits; [`store::MemoryStore`] and the
//! `merge3`-backed default merger make the crate usable standalone.

pub mod error;
pub mod model;
pub mod store;

pub mod merge;

pub use error::MergeError;
pub use merge::{MergeOutcome, Merger, UnmergedEntry};
pub use model::types::{CommitInfo, FileMode, ObjectId, ObjectKind, TreeEntry};
pub use store::{MemoryStore, ObjectStore};
