// rust/datasets-core/src/config.rs

//! Settings for where datasets live and how they are written and read.
//!
//! Loaded from TOML (every section and field optional), then optionally
//! overridden from `DATASETS_*` environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::download::GenerateMode;
use crate::error::{DatasetError, Result};

/// Default root under which every dataset gets its own directory.
pub const DEFAULT_DATA_DIR: &str = "~/tensorflow_datasets";

/// Default number of records buffered ahead of the consumer.
pub const DEFAULT_PREFETCH_BUFFER: usize = 128;

const VALID_COMPRESSION: [&str; 3] = ["none", "lz4", "zstd"];

/// Library-wide settings, one section per component.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetsConfig {
    pub storage: StorageConfig,
    pub download: DownloadConfig,
    pub reader: ReaderConfig,
    pub writer: WriterConfig,
}

/// Data directory and local I/O tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root of the data directory tree; `~` is expanded.
    pub data_dir: PathBuf,
    pub buffer_size: usize,
    pub use_mmap: bool,
    /// Shards at least this large (bytes) are memory-mapped.
    pub mmap_threshold: u64,
}

/// Download cache configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Download cache directory. Defaults to `<data_dir>/tmp`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// What to reuse from previous runs.
    pub mode: GenerateMode,
}

/// Read-back configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Number of records read ahead of the consumer in `numpy_iterator`.
    pub prefetch_buffer: usize,
    /// Whether read-ahead runs on a background reader.
    pub prefetch_enabled: bool,
    /// Optional seed for reproducible file shuffling.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shuffle_seed: Option<u64>,
}

/// Shard writer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Record-file codec: `none`, `lz4` or `zstd`.
    pub compression: String,
    /// Only used by zstd.
    pub compression_level: i32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            buffer_size: 1 << 16,
            use_mmap: true,
            mmap_threshold: 8 << 20,
        }
    }
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            prefetch_buffer: DEFAULT_PREFETCH_BUFFER,
            prefetch_enabled: true,
            shuffle_seed: None,
        }
    }
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            compression: "none".to_string(),
            compression_level: 1,
        }
    }
}

/// Expands a leading `~` to the current user's home directory.
///
/// Paths without a leading `~`, or hosts without a home directory, are
/// returned unchanged.
pub fn expand_user(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

impl FromStr for DatasetsConfig {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| DatasetError::config_with_source("failed to parse TOML config", e))
    }
}

fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.parse().ok()
}

impl DatasetsConfig {
    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config: Self = std::fs::read_to_string(path)
            .map_err(|e| DatasetError::storage_with_source(path, "failed to read config file", e))?
            .parse()?;
        config.validate()?;
        Ok(config)
    }

    /// Resolved data directory root with `~` expanded.
    pub fn data_dir(&self) -> PathBuf {
        expand_user(&self.storage.data_dir)
    }

    /// Resolved download cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        match &self.download.cache_dir {
            Some(dir) => expand_user(dir),
            None => self.data_dir().join("tmp"),
        }
    }

    /// Applies `DATASETS_<SECTION>_<FIELD>` environment variables on top of
    /// `self`, e.g. `DATASETS_STORAGE_DATA_DIR` or `DATASETS_DOWNLOAD_MODE`.
    /// Values that do not parse are skipped.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(v) = env_var("DATASETS_STORAGE_DATA_DIR") {
            self.storage.data_dir = v;
        }
        if let Some(v) = env_var("DATASETS_STORAGE_BUFFER_SIZE") {
            self.storage.buffer_size = v;
        }
        if let Some(v) = env_var("DATASETS_STORAGE_USE_MMAP") {
            self.storage.use_mmap = v;
        }
        if let Some(v) = env_var("DATASETS_STORAGE_MMAP_THRESHOLD") {
            self.storage.mmap_threshold = v;
        }

        if let Some(v) = env_var::<PathBuf>("DATASETS_DOWNLOAD_CACHE_DIR") {
            self.download.cache_dir = Some(v);
        }
        if let Some(v) = env_var("DATASETS_DOWNLOAD_MODE") {
            self.download.mode = v;
        }

        if let Some(v) = env_var("DATASETS_READER_PREFETCH_BUFFER") {
            self.reader.prefetch_buffer = v;
        }
        if let Some(v) = env_var("DATASETS_READER_PREFETCH_ENABLED") {
            self.reader.prefetch_enabled = v;
        }
        if let Some(v) = env_var::<u64>("DATASETS_READER_SHUFFLE_SEED") {
            self.reader.shuffle_seed = Some(v);
        }

        if let Some(v) = env_var("DATASETS_WRITER_COMPRESSION") {
            self.writer.compression = v;
        }
        if let Some(v) = env_var("DATASETS_WRITER_COMPRESSION_LEVEL") {
            self.writer.compression_level = v;
        }

        self
    }

    /// Rejects values no component could work with.
    pub fn validate(&self) -> Result<()> {
        if self.storage.buffer_size == 0 {
            return Err(DatasetError::config("storage.buffer_size must be positive"));
        }

        if self.storage.data_dir.as_os_str().is_empty() {
            return Err(DatasetError::config("storage.data_dir must not be empty"));
        }

        if self.reader.prefetch_buffer == 0 {
            return Err(DatasetError::config("reader.prefetch_buffer must be positive"));
        }

        if !VALID_COMPRESSION.contains(&self.writer.compression.as_str()) {
            return Err(DatasetError::config(format!(
                "writer.compression must be one of: {}",
                VALID_COMPRESSION.join(", ")
            )));
        }

        Ok(())
    }
}
