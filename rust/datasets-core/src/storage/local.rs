// rust/datasets-core/src/storage/local.rs

//! [`StorageBackend`] over the local filesystem.
//!
//! Shards at or above `mmap_threshold` bytes are memory-mapped; everything
//! else goes through a `BufReader`. Writers are buffered and `fsync`ed on
//! `finish`.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::traits::{ObjectMeta, StorageBackend, StorageReader, StorageWriter};
use crate::config::StorageConfig;
use crate::error::{DatasetError, Result};

/// Local filesystem backend. Relative paths resolve against the working
/// directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    buffer_size: usize,
    use_mmap: bool,
    mmap_threshold: u64,
}

impl LocalStorage {
    /// # Errors
    ///
    /// `Config` if `storage.buffer_size` is zero.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        if config.buffer_size == 0 {
            return Err(DatasetError::config(
                "storage.buffer_size must be greater than 0",
            ));
        }
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: &StorageConfig) -> Self {
        Self {
            buffer_size: config.buffer_size,
            use_mmap: config.use_mmap,
            mmap_threshold: config.mmap_threshold,
        }
    }

    fn should_map(&self, size: u64) -> bool {
        self.use_mmap && size > 0 && size >= self.mmap_threshold
    }
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::from_valid(&StorageConfig::default())
    }
}

fn io_err(path: &Path, message: &str) -> impl FnOnce(io::Error) -> DatasetError {
    let (path, message) = (path.to_path_buf(), message.to_string());
    move |e| DatasetError::storage_with_source(path, message, e)
}

fn make_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_err(parent, "failed to create parent directories"))
        }
        _ => Ok(()),
    }
}

impl StorageBackend for LocalStorage {
    fn exists(&self, path: &Path) -> Result<bool> {
        path.try_exists().map_err(io_err(path, "failed to check existence"))
    }

    fn metadata(&self, path: &Path) -> Result<ObjectMeta> {
        let meta = fs::metadata(path).map_err(io_err(path, "failed to read metadata"))?;
        Ok(ObjectMeta {
            size: meta.len(),
            modified: meta.modified().ok(),
            is_dir: meta.is_dir(),
        })
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>> {
        let file = File::open(path).map_err(io_err(path, "failed to open file"))?;
        let size = file
            .metadata()
            .map_err(io_err(path, "failed to read file metadata"))?
            .len();

        if !self.should_map(size) {
            return Ok(Box::new(FileReader {
                inner: BufReader::with_capacity(self.buffer_size, file),
                size,
            }));
        }

        // SAFETY: read-only map owned by the reader. Shards are immutable
        // once their version directory is published.
        let map = unsafe { Mmap::map(&file) }.map_err(io_err(path, "failed to memory-map file"))?;
        Ok(Box::new(MappedReader { map, pos: 0 }))
    }

    fn open_write(&self, path: &Path) -> Result<Box<dyn StorageWriter>> {
        make_parent(path)?;
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(io_err(path, "failed to create file"))?;

        Ok(Box::new(FileWriter {
            inner: BufWriter::with_capacity(self.buffer_size, file),
            path: path.to_path_buf(),
        }))
    }

    fn delete(&self, path: &Path) -> Result<()> {
        if path.is_dir() {
            fs::remove_dir_all(path).map_err(io_err(path, "failed to delete directory"))
        } else {
            fs::remove_file(path).map_err(io_err(path, "failed to delete file"))
        }
    }

    fn list(&self, dir: &Path) -> Result<Vec<String>> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        if !dir.is_dir() {
            return Err(DatasetError::storage(dir, "path is not a directory"));
        }

        let mut names = fs::read_dir(dir)
            .map_err(io_err(dir, "failed to read directory"))?
            .map(|entry| {
                entry
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .map_err(io_err(dir, "failed to read directory entry"))
            })
            .collect::<Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        make_parent(to)?;
        let message = format!("failed to rename to {}", to.display());
        fs::rename(from, to).map_err(io_err(from, &message))
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(io_err(path, "failed to create directories"))
    }
}

struct FileReader {
    inner: BufReader<File>,
    size: u64,
}

impl Read for FileReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl StorageReader for FileReader {
    fn size(&self) -> u64 {
        self.size
    }
}

struct MappedReader {
    map: Mmap,
    pos: usize,
}

impl Read for MappedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let rest = self.map.get(self.pos..).unwrap_or_default();
        let n = rest.len().min(buf.len());
        buf[..n].copy_from_slice(&rest[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl StorageReader for MappedReader {
    fn size(&self) -> u64 {
        self.map.len() as u64
    }
}

struct FileWriter {
    inner: BufWriter<File>,
    path: PathBuf,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl StorageWriter for FileWriter {
    fn finish(mut self: Box<Self>) -> Result<()> {
        self.inner
            .flush()
            .map_err(io_err(&self.path, "failed to flush writer"))?;
        self.inner
            .get_ref()
            .sync_all()
            .map_err(io_err(&self.path, "failed to sync file to disk"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // mmap kicks in at 1 KiB so both read paths get exercised.
    fn storage() -> (LocalStorage, TempDir) {
        let config = StorageConfig {
            buffer_size: 4096,
            use_mmap: true,
            mmap_threshold: 1024,
            ..Default::default()
        };
        (LocalStorage::new(&config).unwrap(), TempDir::new().unwrap())
    }

    fn put(storage: &LocalStorage, path: &Path, data: &[u8]) {
        let mut w = storage.open_write(path).unwrap();
        w.write_all(data).unwrap();
        w.finish().unwrap();
    }

    fn get(storage: &LocalStorage, path: &Path) -> Vec<u8> {
        let mut r = storage.open_read(path).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(r.size(), out.len() as u64);
        out
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let config = StorageConfig {
            buffer_size: 0,
            ..Default::default()
        };
        assert!(LocalStorage::new(&config).is_err());
    }

    #[test]
    fn test_shard_presence() {
        let (storage, dir) = storage();
        let shards = [dir.path().join("s0"), dir.path().join("s1")];

        assert!(!storage.exists(&shards[0]).unwrap());
        put(&storage, &shards[0], b"a");
        assert!(!storage.exists_all(&shards).unwrap());
        put(&storage, &shards[1], b"b");
        assert!(storage.exists_all(&shards).unwrap());
        assert!(storage.exists_all(&[]).unwrap());
    }

    #[test]
    fn test_buffered_and_mapped_reads() {
        let (storage, dir) = storage();

        let small = dir.path().join("small");
        put(&storage, &small, b"hello world");
        assert_eq!(get(&storage, &small), b"hello world");

        let large = dir.path().join("large");
        let data: Vec<u8> = (0..4096).map(|i| (i % 251) as u8).collect();
        put(&storage, &large, &data);
        assert_eq!(get(&storage, &large), data);
    }

    #[test]
    fn test_rewrite_truncates() {
        let (storage, dir) = storage();
        let path = dir.path().join("f");
        put(&storage, &path, b"initial");
        put(&storage, &path, b"new");
        assert_eq!(get(&storage, &path), b"new");
    }

    #[test]
    fn test_metadata_kinds() {
        let (storage, dir) = storage();
        let path = dir.path().join("meta");
        put(&storage, &path, b"12345");

        let meta = storage.metadata(&path).unwrap();
        assert_eq!(meta.size, 5);
        assert!(!meta.is_dir);
        assert!(storage.metadata(dir.path()).unwrap().is_dir);
        assert!(storage.metadata(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_list_versions() {
        let (storage, dir) = storage();
        let root = dir.path().join("mnist");
        for v in ["v_2", "v_1.incomplete", "v_1"] {
            storage.create_dir_all(&root.join(v)).unwrap();
        }

        assert_eq!(storage.list(&root).unwrap(), vec!["v_1", "v_1.incomplete", "v_2"]);
        assert!(storage.list(&dir.path().join("absent")).unwrap().is_empty());

        put(&storage, &root.join("file"), b"");
        assert!(storage.list(&root.join("file")).is_err());
    }

    #[test]
    fn test_publish_directory_by_rename() {
        let (storage, dir) = storage();
        let staging = dir.path().join("v_1.incomplete");
        let published = dir.path().join("ds/v_1");
        put(&storage, &staging.join("shard"), b"data");

        storage.rename(&staging, &published).unwrap();

        assert!(!storage.exists(&staging).unwrap());
        assert_eq!(get(&storage, &published.join("shard")), b"data");
    }

    #[test]
    fn test_delete_file_then_tree() {
        let (storage, dir) = storage();
        let tree = dir.path().join("tree");
        let leaf = tree.join("a/b/leaf");
        put(&storage, &leaf, b"x");

        storage.delete(&leaf).unwrap();
        assert!(!storage.exists(&leaf).unwrap());
        assert!(storage.exists(&tree.join("a/b")).unwrap());

        storage.delete(&tree).unwrap();
        assert!(!storage.exists(&tree).unwrap());
        assert!(storage.delete(&tree).is_err());
    }

    #[test]
    fn test_usable_as_trait_object() {
        let (storage, dir) = storage();
        let backend: std::sync::Arc<dyn StorageBackend> = std::sync::Arc::new(storage);
        backend.create_dir_all(&dir.path().join("x/y")).unwrap();
        assert!(backend.exists(&dir.path().join("x/y")).unwrap());
    }
}
