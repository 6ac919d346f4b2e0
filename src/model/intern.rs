//! Interned directory names.
//!
//! Every per-path record carries the name of its containing directory, and
//! the tree builder compares those names constantly while deciding when a
//! directory closes. Interning each directory name once and handing out
//! integer handles turns that comparison into an integer equality check,
//! and guarantees that two records in the same directory agree on identity,
//! not just on spelling.

use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// DirId
// ---------------------------------------------------------------------------

/// Handle to an interned directory name.
///
/// Equal handles always refer to equal names; equal names always produce
/// equal handles within one [`DirPool`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DirId(u32);

impl DirId {
    /// The root directory (empty name), interned by [`DirPool::new`].
    pub const ROOT: DirId = DirId(0);
}

// ---------------------------------------------------------------------------
// DirPool
// ---------------------------------------------------------------------------

/// The interning table for directory names.
#[derive(Debug, Default)]
pub struct DirPool {
    names: Vec<String>,
    index: BTreeMap<String, u32>,
}

impl DirPool {
    /// Create a pool with the root directory pre-interned as [`DirId::ROOT`].
    #[must_use]
    pub fn new() -> Self {
        let mut pool = Self {
            names: Vec::new(),
            index: BTreeMap::new(),
        };
        let root = pool.intern("");
        debug_assert_eq!(root, DirId::ROOT);
        pool
    }

    /// Intern a directory name, returning its stable handle.
    pub fn intern(&mut self, name: &str) -> DirId {
        if let Some(&id) = self.index.get(name) {
            return DirId(id);
        }
        let id = u32::try_from(self.names.len()).unwrap_or(u32::MAX);
        self.names.push(name.to_owned());
        self.index.insert(name.to_owned(), id);
        DirId(id)
    }

    /// Look up the name for a handle.
    #[must_use]
    pub fn name(&self, id: DirId) -> &str {
        &self.names[id.0 as usize]
    }

    /// Drop every interned name except the root.
    pub fn clear(&mut self) {
        self.names.clear();
        self.index.clear();
        let root = self.intern("");
        debug_assert_eq!(root, DirId::ROOT);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
