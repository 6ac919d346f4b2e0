//! Unified error type for merge operations.
//!
//! Only conditions that abort a merge become a [`MergeError`]: a missing
//! object, an unparseable tree or commit, or an I/O failure while writing a
//! result object. Everything else (rename limits, submodule fallbacks,
//! content conflicts) is recorded per path in the merge output and never
//! interrupts processing of other paths.

use std::fmt;

use crate::model::types::ObjectId;

// ---------------------------------------------------------------------------
// MergeError
// ---------------------------------------------------------------------------

/// A fatal condition encountered while merging.
#[derive(Debug)]
pub enum MergeError {
    /// An object id was not present in the store.
    ObjectMissing {
        /// The id that could not be found.
        oid: ObjectId,
    },

    /// A tree object could not be parsed.
    MalformedTree {
        /// The tree's object id.
        oid: ObjectId,
        /// What was wrong with the bytes.
        reason: String,
    },

    /// An object was found but has the wrong type for the operation.
    WrongObjectType {
        /// The object id.
        oid: ObjectId,
        /// The type the operation required (e.g. `"blob"`, `"commit"`).
        expected: &'static str,
    },

    /// An I/O error occurred while writing a result object.
    Io(std::io::Error),
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ObjectMissing { oid } => {
                write!(f, "object {oid} is missing from the store")
            }
            Self::MalformedTree { oid, reason } => {
                write!(f, "tree {oid} could not be parsed: {reason}")
            }
            Self::WrongObjectType { oid, expected } => {
                write!(f, "object {oid} is not a {expected}")
            }
            Self::Io(err) => write!(f, "I/O error while writing object: {err}"),
        }
    }
}

impl std::error::Error for MergeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MergeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
