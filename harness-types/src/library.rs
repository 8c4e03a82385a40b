//! Library/loader data model.

use std::time::SystemTime;

/// Descriptor of a library on disk, as discovered by a loader scan.
///
/// Invariant: exactly one descriptor per logical name has `is_primary =
/// true`; duplicates are recorded in that primary record's
/// `duplicate_paths`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LibraryInfo {
    /// Canonical name (stem), e.g. `"cudart"`.
    pub name: String,
    pub absolute_path: String,
    /// Detected version, or `"unknown"` if it could not be determined.
    pub version: String,
    pub file_size: u64,
    /// Fingerprint, not a cryptographic digest: currently `size+mtime`
    /// composed into one string.
    pub checksum: String,
    pub last_modified: String,
    pub is_primary: bool,
    pub duplicate_paths: Vec<String>,
}

impl LibraryInfo {
    pub fn new(name: impl Into<String>, absolute_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            absolute_path: absolute_path.into(),
            version: "unknown".to_string(),
            file_size: 0,
            checksum: String::new(),
            last_modified: String::new(),
            is_primary: true,
            duplicate_paths: Vec::new(),
        }
    }
}

/// File metadata collected during a scan, prior to being folded into a
/// [`LibraryInfo`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Summary of the loader's current in-memory state, surfaced by the
/// `info` CLI subcommand and used by tests asserting idempotence.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoaderDiagnostics {
    pub loaded_count: usize,
    pub loaded_paths: Vec<String>,
}
