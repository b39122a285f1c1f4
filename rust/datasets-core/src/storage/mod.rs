// rust/datasets-core/src/storage/mod.rs

//! Byte-level access to the data directory tree
//! (`<root>/<dataset>/<version>/<shards>`) and the download cache.
//!
//! ```no_run
//! use datasets_core::storage::{temp_path, LocalStorage, StorageBackend};
//! use std::io::Write;
//! use std::path::Path;
//!
//! # fn main() -> datasets_core::Result<()> {
//! let storage = LocalStorage::default();
//! let shard = Path::new("/tmp/mnist/v_1/mnist-train.jsonl-00000-of-00001");
//!
//! let mut w = storage.open_write(&temp_path(shard))?;
//! w.write_all(b"{\"label\": 3}\n").map_err(|e| {
//!     datasets_core::DatasetError::storage_with_source(shard, "write", e)
//! })?;
//! w.finish()?;
//! storage.rename(&temp_path(shard), shard)?;
//! # Ok(())
//! # }
//! ```

mod local;
mod traits;

use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub use local::LocalStorage;
pub use traits::{ObjectMeta, StorageBackend, StorageReader, StorageWriter};

/// Sibling path an object is written to before being renamed into place.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
