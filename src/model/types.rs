//! Core object-model types.
//!
//! Object ids, file modes, tree entries, and parsed commit headers — the
//! vocabulary shared by the object store and the merge engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ObjectId
// ---------------------------------------------------------------------------

/// A content address: 32 raw SHA-256 bytes.
///
/// Displayed and serialized as 64 lowercase hex characters. The all-zero id
/// is the "null" id used for absent versions.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId([u8; 32]);

impl ObjectId {
    /// The number of raw bytes in an id.
    pub const RAW_LEN: usize = 32;

    /// The all-zero id, used for absent versions.
    pub const NULL: ObjectId = ObjectId([0; 32]);

    /// Wrap raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character lowercase hex string.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 64 lowercase hex
    /// characters.
    pub fn from_hex(s: &str) -> Result<Self, OidParseError> {
        if s.len() != 64 {
            return Err(OidParseError {
                value: s.to_owned(),
                reason: format!("expected 64 hex characters, got {}", s.len()),
            });
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let pair = &s[2 * i..2 * i + 2];
            *byte = u8::from_str_radix(pair, 16).map_err(|_| OidParseError {
                value: s.to_owned(),
                reason: "must contain only hex characters (0-9, a-f)".to_owned(),
            })?;
        }
        if s.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(OidParseError {
                value: s.to_owned(),
                reason: "hex must be lowercase".to_owned(),
            });
        }
        Ok(Self(bytes))
    }

    /// The raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Render as lowercase hex.
    #[must_use]
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            s.push_str(&format!("{b:02x}"));
        }
        s
    }

    /// Returns `true` for the all-zero id.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == [0; 32]
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = OidParseError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = OidParseError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::from_hex(&s)
    }
}

impl From<ObjectId> for String {
    fn from(oid: ObjectId) -> Self {
        oid.to_hex()
    }
}

// ---------------------------------------------------------------------------
// OidParseError
// ---------------------------------------------------------------------------

/// Why a string failed to parse as an [`ObjectId`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OidParseError {
    /// The string that failed validation.
    pub value: String,
    /// Why it is invalid.
    pub reason: String,
}

impl fmt::Display for OidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid object id '{}': {}", self.value, self.reason)
    }
}

impl std::error::Error for OidParseError {}

// ---------------------------------------------------------------------------
// FileMode
// ---------------------------------------------------------------------------

/// A file mode as stored in tree entries.
///
/// Encodes the object type (regular / executable / symlink / submodule /
/// tree) plus permission bits; `0` means the version is absent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileMode(pub u32);

impl FileMode {
    /// Absent version.
    pub const ABSENT: FileMode = FileMode(0);
    /// Regular non-executable file.
    pub const REGULAR: FileMode = FileMode(0o100_644);
    /// Regular executable file.
    pub const EXECUTABLE: FileMode = FileMode(0o100_755);
    /// Symbolic link.
    pub const SYMLINK: FileMode = FileMode(0o120_000);
    /// Submodule (commit reference).
    pub const SUBMODULE: FileMode = FileMode(0o160_000);
    /// Directory.
    pub const TREE: FileMode = FileMode(0o040_000);

    const TYPE_MASK: u32 = 0o170_000;

    /// Returns `true` when the mode is zero (no version).
    #[must_use]
    pub const fn is_absent(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` for regular files (either permission variant).
    #[must_use]
    pub const fn is_regular(self) -> bool {
        self.0 & Self::TYPE_MASK == 0o100_000
    }

    /// Returns `true` for symbolic links.
    #[must_use]
    pub const fn is_symlink(self) -> bool {
        self.0 & Self::TYPE_MASK == 0o120_000
    }

    /// Returns `true` for submodule entries.
    #[must_use]
    pub const fn is_submodule(self) -> bool {
        self.0 & Self::TYPE_MASK == 0o160_000
    }

    /// Returns `true` for directory entries.
    #[must_use]
    pub const fn is_tree(self) -> bool {
        self.0 & Self::TYPE_MASK == 0o040_000
    }

    /// The type bits alone, for "same kind of thing" comparisons.
    #[must_use]
    pub const fn object_type(self) -> u32 {
        self.0 & Self::TYPE_MASK
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:o}", self.0)
    }
}

// ---------------------------------------------------------------------------
// ObjectKind / TreeEntry / CommitInfo
// ---------------------------------------------------------------------------

/// The kinds of objects the merge engine writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    /// File content.
    Blob,
    /// Serialized directory listing.
    Tree,
}

impl ObjectKind {
    /// The kind's name as used in the object header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Blob => "blob",
            Self::Tree => "tree",
        }
    }
}

/// One entry of a tree object, in storage order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// Entry name (single path component).
    pub name: String,
    /// Entry mode; `FileMode::TREE` for subdirectories.
    pub mode: FileMode,
    /// The referenced object.
    pub oid: ObjectId,
}

/// The parts of a commit the merge engine needs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    /// The commit's root tree.
    pub tree: ObjectId,
    /// Parent commits, first parent first.
    pub parents: Vec<ObjectId>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
