// rust/datasets-core/src/incomplete.rs

//! Build-then-publish for version directories.
//!
//! Generation writes into `<final>.incomplete` and the directory is renamed
//! to its final name only after the build succeeds, so a version directory
//! that exists under its final name is always complete.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, Result};
use crate::storage::StorageBackend;

/// Suffix marking a version directory that is still being generated.
pub const INCOMPLETE_SUFFIX: &str = ".incomplete";

/// Staging path for `final_dir`.
pub fn incomplete_dir(final_dir: &Path) -> PathBuf {
    let mut name = final_dir
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(INCOMPLETE_SUFFIX);
    final_dir.with_file_name(name)
}

/// Whether a directory entry name is a staging directory.
pub fn is_incomplete(name: &str) -> bool {
    name.contains(INCOMPLETE_SUFFIX)
}

/// Runs `build` against a fresh staging directory and publishes it as
/// `final_dir` on success.
///
/// A leftover staging directory from an interrupted run is discarded first.
/// If `build` fails the staging directory is left in place for inspection
/// and `final_dir` is not created.
///
/// # Errors
///
/// `VersionExists` if `final_dir` already exists. Otherwise propagates
/// errors from `build` or from the storage backend.
pub fn with_incomplete_dir<T, F>(storage: &dyn StorageBackend, final_dir: &Path, build: F) -> Result<T>
where
    F: FnOnce(&Path) -> Result<T>,
{
    if storage.exists(final_dir)? {
        return Err(DatasetError::VersionExists {
            path: final_dir.to_path_buf(),
        });
    }

    let tmp_dir = incomplete_dir(final_dir);
    if storage.exists(&tmp_dir)? {
        tracing::warn!(path = %tmp_dir.display(), "Removing stale incomplete directory");
        storage.delete(&tmp_dir)?;
    }
    storage.create_dir_all(&tmp_dir)?;

    let value = build(&tmp_dir)?;

    storage.rename(&tmp_dir, final_dir)?;
    tracing::debug!(path = %final_dir.display(), "Published directory");
    Ok(value)
}
