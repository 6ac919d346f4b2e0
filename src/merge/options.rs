//! Merge configuration surface.

use serde::{Deserialize, Serialize};

/// Highest possible similarity score (a rename with identical content).
pub const MAX_SCORE: u32 = 60_000;

/// Similarity threshold used when [`MergeOptions::rename_score`] is zero.
pub const DEFAULT_RENAME_SCORE: u32 = 30_000;

/// Rename limit used when [`MergeOptions::rename_limit`] is not positive.
pub const DEFAULT_RENAME_LIMIT: i32 = 1000;

// ---------------------------------------------------------------------------
// DirectoryRenames
// ---------------------------------------------------------------------------

/// What to do when one side moved a whole directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectoryRenames {
    /// Do not infer directory renames.
    Disabled,
    /// Infer them, but report affected paths as conflicts.
    #[default]
    Conflict,
    /// Infer them and move affected paths, reporting a note.
    Enabled,
}

// ---------------------------------------------------------------------------
// MergeVariant
// ---------------------------------------------------------------------------

/// Conflict-favoring variant passed through to the content merger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeVariant {
    /// Emit conflict markers.
    #[default]
    Normal,
    /// Resolve conflicting hunks in favor of side 1.
    Ours,
    /// Resolve conflicting hunks in favor of side 2.
    Theirs,
}

// ---------------------------------------------------------------------------
// MergeOptions
// ---------------------------------------------------------------------------

/// Options for one engine instance.
///
/// The three labels appear in conflict messages and in uniquified paths
/// (`path~LABEL`); they should be short branch-like names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Human-readable name for the common ancestor.
    pub ancestor_label: String,
    /// Human-readable name for side 1 ("ours").
    pub side1_label: String,
    /// Human-readable name for side 2 ("theirs").
    pub side2_label: String,
    /// Directory-rename inference mode.
    pub detect_directory_renames: DirectoryRenames,
    /// Maximum rename-matrix dimension; `<= 0` means the default of 1000.
    pub rename_limit: i32,
    /// Minimum similarity score in `[0, MAX_SCORE]`; `0` means the default.
    pub rename_score: u32,
    /// Conflict-favoring variant for content merges.
    pub recursive_variant: MergeVariant,
    /// Compare blobs after CRLF→LF normalization in modify/delete cases.
    pub renormalize: bool,
    /// Opaque flags passed through to the content merger.
    pub xdl_opts: u32,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            ancestor_label: "ancestor".to_owned(),
            side1_label: "side1".to_owned(),
            side2_label: "side2".to_owned(),
            detect_directory_renames: DirectoryRenames::default(),
            rename_limit: 0,
            rename_score: 0,
            recursive_variant: MergeVariant::default(),
            renormalize: false,
            xdl_opts: 0,
        }
    }
}

impl MergeOptions {
    /// The effective rename limit (default substituted for `<= 0`).
    #[must_use]
    pub fn effective_rename_limit(&self) -> usize {
        if self.rename_limit <= 0 {
            DEFAULT_RENAME_LIMIT as usize
        } else {
            self.rename_limit as usize
        }
    }

    /// The effective similarity threshold (default substituted for `0`).
    #[must_use]
    pub fn effective_rename_score(&self) -> u32 {
        if self.rename_score == 0 || self.rename_score > MAX_SCORE {
            DEFAULT_RENAME_SCORE
        } else {
            self.rename_score
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
