//! In-memory content-addressed object store.
//!
//! Objects are addressed by SHA-256 over `"<kind> <len>\0<bytes>"`. Trees
//! are stored in their serialized form (`"<octal mode> <name>\0"` followed
//! by 32 raw oid bytes per entry, entries sorted bytewise by name) and
//! parsed on read. Commit-graph queries walk parent lists with plain BFS —
//! object counts here are test-sized, not repository-sized.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use sha2::{Digest, Sha256};

use crate::error::MergeError;
use crate::model::types::{CommitInfo, FileMode, ObjectId, ObjectKind, TreeEntry};
use crate::store::ObjectStore;

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
enum StoredObject {
    Blob(Vec<u8>),
    Tree(Vec<u8>),
    Commit(CommitInfo),
}

/// The in-memory reference [`ObjectStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: BTreeMap<ObjectId, StoredObject>,
    commits: BTreeSet<ObjectId>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hash bytes under a kind header without storing anything.
    #[must_use]
    pub fn hash_object(kind: &str, bytes: &[u8]) -> ObjectId {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        hasher.update(b" ");
        hasher.update(bytes.len().to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
        ObjectId::from_bytes(hasher.finalize().into())
    }

    /// Store a commit object, returning its id.
    ///
    /// Commits are not part of the [`ObjectStore`] write surface (the merge
    /// engine only writes blobs and trees); tests and callers construct
    /// history through this method.
    pub fn add_commit(&mut self, tree: ObjectId, parents: Vec<ObjectId>) -> ObjectId {
        let mut body = format!("tree {tree}\n");
        for parent in &parents {
            body.push_str(&format!("parent {parent}\n"));
        }
        let oid = Self::hash_object("commit", body.as_bytes());
        self.objects
            .insert(oid, StoredObject::Commit(CommitInfo { tree, parents }));
        self.commits.insert(oid);
        oid
    }

    /// Build (and store) a nested tree from a flat, `/`-separated path list.
    ///
    /// Blob content is written for every non-tree entry. Intended for
    /// fixtures and plumbing callers; paths may be given in any order.
    ///
    /// # Errors
    /// Propagates write failures (never for this store, but the signature
    /// matches the trait's write path).
    pub fn insert_tree(
        &mut self,
        files: &[(&str, FileMode, &[u8])],
    ) -> Result<ObjectId, MergeError> {
        let mut sorted: Vec<(&str, FileMode, &[u8])> = files.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        self.insert_tree_level(&sorted)
    }

    fn insert_tree_level(
        &mut self,
        files: &[(&str, FileMode, &[u8])],
    ) -> Result<ObjectId, MergeError> {
        // Group immediate children; recurse for subdirectories.
        let mut entries: Vec<TreeEntry> = Vec::new();
        let mut i = 0;
        while i < files.len() {
            let (path, mode, content) = files[i];
            match path.split_once('/') {
                None => {
                    let oid = if mode.is_submodule() {
                        // Submodule entries carry a commit id as "content".
                        ObjectId::from_hex(std::str::from_utf8(content).unwrap_or(""))
                            .unwrap_or(ObjectId::NULL)
                    } else {
                        self.write_object(ObjectKind::Blob, content)?
                    };
                    entries.push(TreeEntry {
                        name: path.to_owned(),
                        mode,
                        oid,
                    });
                    i += 1;
                }
                Some((dir, _)) => {
                    let prefix = format!("{dir}/");
                    let mut children: Vec<(&str, FileMode, &[u8])> = Vec::new();
                    while i < files.len() && files[i].0.starts_with(&prefix) {
                        let (p, m, c) = files[i];
                        children.push((&p[prefix.len()..], m, c));
                        i += 1;
                    }
                    let sub = self.insert_tree_level(&children)?;
                    entries.push(TreeEntry {
                        name: dir.to_owned(),
                        mode: FileMode::TREE,
                        oid: sub,
                    });
                }
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        let bytes = serialize_tree(&entries);
        self.write_object(ObjectKind::Tree, &bytes)
    }

    /// All ancestors of a commit, the commit itself included.
    fn ancestors(&self, start: &ObjectId) -> Result<BTreeSet<ObjectId>, MergeError> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(*start);
        while let Some(oid) = queue.pop_front() {
            if !seen.insert(oid) {
                continue;
            }
            let info = self.parse_commit(&oid)?;
            for parent in info.parents {
                queue.push_back(parent);
            }
        }
        Ok(seen)
    }
}

/// Serialize tree entries into the canonical byte format.
#[must_use]
pub fn serialize_tree(entries: &[TreeEntry]) -> Vec<u8> {
    let mut buf = Vec::new();
    for entry in entries {
        buf.extend_from_slice(format!("{:o} {}", entry.mode.0, entry.name).as_bytes());
        buf.push(0);
        buf.extend_from_slice(entry.oid.as_bytes());
    }
    buf
}

impl ObjectStore for MemoryStore {
    fn read_tree(&self, oid: &ObjectId) -> Result<Vec<TreeEntry>, MergeError> {
        let bytes = match self.objects.get(oid) {
            None => return Err(MergeError::ObjectMissing { oid: *oid }),
            Some(StoredObject::Tree(bytes)) => bytes,
            Some(_) => {
                return Err(MergeError::WrongObjectType {
                    oid: *oid,
                    expected: "tree",
                })
            }
        };

        let mut entries = Vec::new();
        let mut rest: &[u8] = bytes;
        while !rest.is_empty() {
            let nul = rest.iter().position(|&b| b == 0).ok_or_else(|| {
                MergeError::MalformedTree {
                    oid: *oid,
                    reason: "entry header missing NUL terminator".to_owned(),
                }
            })?;
            let header =
                std::str::from_utf8(&rest[..nul]).map_err(|_| MergeError::MalformedTree {
                    oid: *oid,
                    reason: "entry header is not UTF-8".to_owned(),
                })?;
            let (mode_str, name) =
                header
                    .split_once(' ')
                    .ok_or_else(|| MergeError::MalformedTree {
                        oid: *oid,
                        reason: "entry header missing mode separator".to_owned(),
                    })?;
            let mode = u32::from_str_radix(mode_str, 8).map_err(|_| MergeError::MalformedTree {
                oid: *oid,
                reason: format!("bad octal mode '{mode_str}'"),
            })?;
            rest = &rest[nul + 1..];
            if rest.len() < ObjectId::RAW_LEN {
                return Err(MergeError::MalformedTree {
                    oid: *oid,
                    reason: "truncated object id".to_owned(),
                });
            }
            let mut raw = [0u8; 32];
            raw.copy_from_slice(&rest[..ObjectId::RAW_LEN]);
            rest = &rest[ObjectId::RAW_LEN..];
            entries.push(TreeEntry {
                name: name.to_owned(),
                mode: FileMode(mode),
                oid: ObjectId::from_bytes(raw),
            });
        }
        Ok(entries)
    }

    fn read_blob(&self, oid: &ObjectId) -> Result<Vec<u8>, MergeError> {
        match self.objects.get(oid) {
            None => Err(MergeError::ObjectMissing { oid: *oid }),
            Some(StoredObject::Blob(bytes)) => Ok(bytes.clone()),
            Some(_) => Err(MergeError::WrongObjectType {
                oid: *oid,
                expected: "blob",
            }),
        }
    }

    fn write_object(&mut self, kind: ObjectKind, bytes: &[u8]) -> Result<ObjectId, MergeError> {
        let oid = Self::hash_object(kind.as_str(), bytes);
        let stored = match kind {
            ObjectKind::Blob => StoredObject::Blob(bytes.to_vec()),
            ObjectKind::Tree => StoredObject::Tree(bytes.to_vec()),
        };
        self.objects.insert(oid, stored);
        Ok(oid)
    }

    fn parse_commit(&self, oid: &ObjectId) -> Result<CommitInfo, MergeError> {
        match self.objects.get(oid) {
            None => Err(MergeError::ObjectMissing { oid: *oid }),
            Some(StoredObject::Commit(info)) => Ok(info.clone()),
            Some(_) => Err(MergeError::WrongObjectType {
                oid: *oid,
                expected: "commit",
            }),
        }
    }

    fn in_merge_bases(
        &self,
        ancestor: &ObjectId,
        descendant: &ObjectId,
    ) -> Result<bool, MergeError> {
        Ok(self.ancestors(descendant)?.contains(ancestor))
    }

    fn merge_bases(&self, a: &ObjectId, b: &ObjectId) -> Result<Vec<ObjectId>, MergeError> {
        let anc_a = self.ancestors(a)?;
        let anc_b = self.ancestors(b)?;
        let common: Vec<ObjectId> = anc_a.intersection(&anc_b).copied().collect();

        // Keep only maximal elements: drop any candidate that is a strict
        // ancestor of another candidate.
        let mut maximal = Vec::new();
        for c in &common {
            let mut dominated = false;
            for d in &common {
                if c != d && self.in_merge_bases(c, d)? {
                    dominated = true;
                    break;
                }
            }
            if !dominated {
                maximal.push(*c);
            }
        }
        Ok(maximal)
    }

    fn merges_containing(&self, commit: &ObjectId) -> Result<Vec<ObjectId>, MergeError> {
        let mut result = Vec::new();
        for candidate in &self.commits {
            let info = self.parse_commit(candidate)?;
            if info.parents.len() < 2 {
                continue;
            }
            if self.in_merge_bases(commit, candidate)? {
                result.push(*candidate);
            }
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
