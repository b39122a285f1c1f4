// rust/datasets-core/src/download.rs

//! Download cache handed to `prepare` hooks.
//!
//! Resources land under `<cache_dir>/downloads/`, keyed by the URL's file
//! name plus an xxhash64 of the full URL so two URLs sharing a base name
//! never collide. Gzip archives can be extracted into
//! `<cache_dir>/extracted/`. Whether an existing cache entry is reused is
//! decided by the [`GenerateMode`].

use std::fmt;
use std::fs::File;
use std::hash::Hasher;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

use crate::error::{DatasetError, Result};
use crate::storage::{temp_path, StorageBackend};

/// Policy for reusing previous work when preparing a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerateMode {
    /// Keep an already-generated dataset version and its downloads.
    #[default]
    ReuseDatasetIfExists,
    /// Regenerate the dataset but keep cached downloads.
    ReuseCacheIfExists,
    /// Regenerate everything, downloading again.
    ForceRedownload,
}

impl GenerateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerateMode::ReuseDatasetIfExists => "reuse_dataset_if_exists",
            GenerateMode::ReuseCacheIfExists => "reuse_cache_if_exists",
            GenerateMode::ForceRedownload => "force_redownload",
        }
    }

    /// Whether a cached download may be returned instead of fetching.
    pub fn reuses_downloads(&self) -> bool {
        !matches!(self, GenerateMode::ForceRedownload)
    }

    /// Whether an existing generated version short-circuits preparation.
    pub fn reuses_dataset(&self) -> bool {
        matches!(self, GenerateMode::ReuseDatasetIfExists)
    }
}

impl fmt::Display for GenerateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenerateMode {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "reuse_dataset_if_exists" => Ok(GenerateMode::ReuseDatasetIfExists),
            "reuse_cache_if_exists" => Ok(GenerateMode::ReuseCacheIfExists),
            "force_redownload" => Ok(GenerateMode::ForceRedownload),
            other => Err(DatasetError::config(format!(
                "unknown generate mode '{other}' (expected reuse_dataset_if_exists, \
                 reuse_cache_if_exists or force_redownload)"
            ))),
        }
    }
}

/// Retrieves the bytes behind a URL.
pub trait Fetcher: Send + Sync {
    /// Streams the resource at `url` into `dest`, returning the byte count.
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<u64>;
}

/// Fetches `file://` URLs and plain filesystem paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetcher;

impl Fetcher for LocalFetcher {
    fn fetch(&self, url: &str, dest: &mut dyn Write) -> Result<u64> {
        let path = match url.split_once("://") {
            None => url,
            Some(("file", rest)) => rest,
            Some((scheme, _)) => {
                return Err(DatasetError::download(
                    url,
                    format!("no fetcher for scheme '{scheme}'"),
                ))
            }
        };

        let mut src = File::open(path).map_err(|e| DatasetError::download(url, e.to_string()))?;
        io::copy(&mut src, dest).map_err(|e| DatasetError::download(url, e.to_string()))
    }
}

/// Hex xxhash64 of a URL, used to key cache entries.
fn url_key(url: &str) -> String {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(url.as_bytes());
    format!("{:016x}", hasher.finish())
}

/// Last path segment of a URL with any query or fragment removed.
fn url_basename(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    match without_query.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => "download",
    }
}

/// Fetches and caches the external resources a dataset is built from.
pub struct DownloadManager {
    storage: Arc<dyn StorageBackend>,
    cache_dir: PathBuf,
    mode: GenerateMode,
    fetcher: Arc<dyn Fetcher>,
}

impl DownloadManager {
    pub fn new(storage: Arc<dyn StorageBackend>, cache_dir: impl Into<PathBuf>, mode: GenerateMode) -> Self {
        Self {
            storage,
            cache_dir: cache_dir.into(),
            mode,
            fetcher: Arc::new(LocalFetcher),
        }
    }

    /// Replaces the fetcher used for cache misses.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn mode(&self) -> GenerateMode {
        self.mode
    }

    pub fn downloads_dir(&self) -> PathBuf {
        self.cache_dir.join("downloads")
    }

    pub fn extracted_dir(&self) -> PathBuf {
        self.cache_dir.join("extracted")
    }

    /// Cache location for `url`, whether or not it has been fetched yet.
    pub fn cached_path(&self, url: &str) -> PathBuf {
        self.downloads_dir()
            .join(format!("{}_{}", url_basename(url), url_key(url)))
    }

    /// Returns a local path holding the resource at `url`, fetching it on a
    /// cache miss or when the mode forces a fresh download.
    pub fn fetch(&self, url: &str) -> Result<PathBuf> {
        let path = self.cached_path(url);

        if self.mode.reuses_downloads() && self.storage.exists(&path)? {
            tracing::debug!(url, path = %path.display(), "Reusing cached download");
            return Ok(path);
        }

        self.storage.create_dir_all(&self.downloads_dir())?;
        let tmp = temp_path(&path);

        let mut writer = self.storage.open_write(&tmp)?;
        let bytes = match self.fetcher.fetch(url, &mut writer) {
            Ok(bytes) => bytes,
            Err(e) => {
                drop(writer);
                let _ = self.storage.delete(&tmp);
                return Err(e);
            }
        };
        writer.finish()?;

        if self.storage.exists(&path)? {
            self.storage.delete(&path)?;
        }
        self.storage.rename(&tmp, &path)?;

        tracing::info!(url, bytes, path = %path.display(), "Downloaded resource");
        Ok(path)
    }

    /// Fetches `url` and, for `.gz` resources, decompresses it into the
    /// extraction directory. Other resources are returned as downloaded.
    pub fn fetch_and_extract(&self, url: &str) -> Result<PathBuf> {
        let downloaded = self.fetch(url)?;

        let basename = url_basename(url);
        let Some(stem) = basename.strip_suffix(".gz") else {
            return Ok(downloaded);
        };

        let target = self
            .extracted_dir()
            .join(format!("{}_{}", stem, url_key(url)));
        if self.mode.reuses_downloads() && self.storage.exists(&target)? {
            tracing::debug!(url, path = %target.display(), "Reusing extracted resource");
            return Ok(target);
        }

        self.storage.create_dir_all(&self.extracted_dir())?;
        let tmp = temp_path(&target);

        let reader = self.storage.open_read(&downloaded)?;
        let mut decoder = GzDecoder::new(reader);
        let mut writer = self.storage.open_write(&tmp)?;
        let copied = copy_decoded(&mut decoder, &mut writer, url);
        if let Err(e) = copied {
            drop(writer);
            let _ = self.storage.delete(&tmp);
            return Err(e);
        }
        writer.finish()?;

        if self.storage.exists(&target)? {
            self.storage.delete(&target)?;
        }
        self.storage.rename(&tmp, &target)?;

        tracing::info!(url, path = %target.display(), "Extracted resource");
        Ok(target)
    }
}

fn copy_decoded(src: &mut dyn Read, dest: &mut dyn Write, url: &str) -> Result<u64> {
    io::copy(src, dest).map_err(|e| DatasetError::download(url, format!("extraction failed: {e}")))
}

impl fmt::Debug for DownloadManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadManager")
            .field("cache_dir", &self.cache_dir)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}
