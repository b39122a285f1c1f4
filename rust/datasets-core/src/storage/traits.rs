// rust/datasets-core/src/storage/traits.rs

//! The seam between dataset logic and the bytes on disk.
//!
//! Builders, format adapters and the download manager reach the data
//! directory tree only through [`StorageBackend`]. Version publishing relies
//! on `rename` of a whole directory being atomic on the backend.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Size, mtime and kind of one entry.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub size: u64,
    pub modified: Option<std::time::SystemTime>,
    pub is_dir: bool,
}

/// Open shard or cached download.
pub trait StorageReader: Read + Send {
    /// Length in bytes of the underlying object.
    fn size(&self) -> u64;
}

/// Sink for a shard or download being written.
pub trait StorageWriter: Write + Send {
    /// Flushes and makes the bytes durable. Consumes the writer.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Filesystem-like operations over the data directory tree.
///
/// Object-safe; shared as `Arc<dyn StorageBackend>` between a builder, its
/// download manager and the readers it hands out.
pub trait StorageBackend: Send + Sync {
    /// `Ok(false)` for a missing entry; `Err` only when the check itself fails.
    fn exists(&self, path: &Path) -> Result<bool>;

    fn metadata(&self, path: &Path) -> Result<ObjectMeta>;

    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>>;

    /// Creates or truncates `path`, creating missing parent directories.
    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>>;

    /// Removes a file, or a directory together with its contents.
    fn delete(&self, path: &Path) -> Result<()>;

    /// Entry names directly below `dir`, sorted. A missing `dir` lists as
    /// empty; a `dir` that is a file is an error.
    fn list(&self, dir: &Path) -> Result<Vec<String>>;

    /// Moves a file or directory; parents of `to` are created as needed.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// True iff every path exists. Vacuously true for an empty slice.
    fn exists_all(&self, paths: &[PathBuf]) -> Result<bool> {
        for path in paths {
            if !self.exists(path)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
