// rust/datasets-core/src/builder.rs

//! Dataset builders and the prepare/read lifecycle.
//!
//! A concrete dataset implements [`GeneratorBasedBuilder`] (or, for full
//! control, [`DatasetBuilder`] directly). [`Builder`] owns one dataset plus
//! its on-disk state and drives the lifecycle:
//!
//! ```text
//! <data_dir_root>/<dataset>/<version>/<dataset>-<split>.<suffix>-<i>-of-<n>
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use datasets_core::builder::{BuildContext, Builder, GeneratorBasedBuilder, PrepareOptions};
//! use datasets_core::download::DownloadManager;
//! use datasets_core::features::{example, ExampleStream, FeatureValue};
//! use datasets_core::format::{FileFormatAdapter, JsonLinesAdapter};
//! use datasets_core::split::{Split, SplitGenerator};
//! use datasets_core::Result;
//!
//! #[derive(Clone)]
//! struct Squares;
//!
//! impl GeneratorBasedBuilder for Squares {
//!     fn name(&self) -> &str {
//!         "squares"
//!     }
//!
//!     fn split_generators(&self, ctx: &BuildContext, _dl: &DownloadManager) -> Result<Vec<SplitGenerator>> {
//!         let rows = |n: i64| -> ExampleStream {
//!             Box::new((0..n).map(|i| Ok(example([("x", FeatureValue::Int(i * i))]))))
//!         };
//!         Ok(vec![
//!             SplitGenerator::from_fn(move || Ok(rows(100)), vec![ctx.split_files(Split::Train, 2)]),
//!             SplitGenerator::from_fn(move || Ok(rows(10)), vec![ctx.split_files(Split::Test, 1)]),
//!         ])
//!     }
//!
//!     fn file_format_adapter(&self) -> Arc<dyn FileFormatAdapter> {
//!         Arc::new(JsonLinesAdapter::new())
//!     }
//! }
//!
//! let mut builder = Builder::new(Squares, Some("/tmp/datasets".into())).unwrap();
//! builder.download_and_prepare(PrepareOptions::default()).unwrap();
//! for example in builder.numpy_iterator(Split::Test, None).unwrap() {
//!     println!("{:?}", example.unwrap()["x"]);
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, TimeZone};

use crate::config::{expand_user, DatasetsConfig};
use crate::download::DownloadManager;
use crate::error::{DatasetError, Result};
use crate::features::{Example, ExampleStream};
use crate::format::FileFormatAdapter;
use crate::incomplete::{is_incomplete, with_incomplete_dir};
use crate::prefetch::{PrefetchConfig, Prefetcher};
use crate::reader::build_stream;
use crate::split::{Split, SplitFiles, SplitGenerator};
use crate::storage::{LocalStorage, StorageBackend};
use crate::tensor::Array;

/// Format of version tokens; lexicographic order is chronological order.
pub const VERSION_FORMAT: &str = "v_%Y%m%d_%H%M";

/// Name of one prepared snapshot of a dataset, e.g. `v_20180601_1200`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version(String);

impl Version {
    /// Accepts any token usable as a single directory name.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty()
            || token.contains(['/', '\\'])
            || token == "."
            || token == ".."
            || is_incomplete(&token)
        {
            return Err(DatasetError::invalid_argument(format!(
                "invalid version token '{token}'"
            )));
        }
        Ok(Self(token))
    }

    /// Token for the current local wall-clock minute.
    pub fn now() -> Self {
        Self::from_datetime(&Local::now())
    }

    pub fn from_datetime<Tz: TimeZone>(time: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(time.format(VERSION_FORMAT).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shuffle policy when the caller does not choose: only training data is
/// shuffled.
pub fn default_shuffle(split: Split) -> bool {
    split == Split::Train
}

/// What a dataset hook can see of the builder it runs under.
pub struct BuildContext {
    name: String,
    data_dir: PathBuf,
    storage: Arc<dyn StorageBackend>,
    filetype_suffix: Option<String>,
    config: DatasetsConfig,
}

impl BuildContext {
    pub fn new(
        name: impl Into<String>,
        data_dir: impl Into<PathBuf>,
        storage: Arc<dyn StorageBackend>,
        filetype_suffix: Option<String>,
        config: DatasetsConfig,
    ) -> Self {
        Self {
            name: name.into(),
            data_dir: data_dir.into(),
            storage,
            filetype_suffix,
            config,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory shards are written to or read from. During preparation
    /// this is the staging directory.
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    pub fn filetype_suffix(&self) -> Option<&str> {
        self.filetype_suffix.as_deref()
    }

    pub fn config(&self) -> &DatasetsConfig {
        &self.config
    }

    /// Split descriptor for this dataset and directory.
    pub fn split_files(&self, split: Split, num_shards: impl Into<Option<u32>>) -> SplitFiles {
        SplitFiles::new(
            self.name.clone(),
            split,
            num_shards.into(),
            self.data_dir.clone(),
            self.filetype_suffix.clone(),
        )
    }
}

/// The hooks a dataset provides to [`Builder`].
///
/// Both hooks are optional at compile time; a dataset that leaves one out
/// fails with `NotImplemented` when that hook is first needed.
pub trait DatasetBuilder: Send + Sync {
    /// Canonical dataset name; namespaces the data directory and shard files.
    fn name(&self) -> &str;

    /// Suffix inserted into shard file names.
    fn filetype_suffix(&self) -> Option<String> {
        None
    }

    /// Downloads sources and writes every split into `ctx.data_dir()`.
    fn prepare_hook(&self, _ctx: &BuildContext, _dl: &DownloadManager) -> Result<()> {
        Err(DatasetError::not_implemented(self.name(), "prepare_hook"))
    }

    /// Opens one prepared split. `shuffle_files` of `None` means the
    /// dataset's default policy.
    fn as_dataset_hook(
        &self,
        _ctx: &BuildContext,
        _split: Split,
        _shuffle_files: Option<bool>,
    ) -> Result<ExampleStream> {
        Err(DatasetError::not_implemented(self.name(), "as_dataset_hook"))
    }
}

/// A dataset described by its split generators and on-disk format.
///
/// Every `GeneratorBasedBuilder` is a [`DatasetBuilder`]: preparation runs
/// each generator whose output shards are not all present and hands its
/// examples to the format adapter; reading globs the split's shards and
/// passes every example through [`preprocess`](Self::preprocess).
pub trait GeneratorBasedBuilder: Send + Sync {
    fn name(&self) -> &str;

    /// Generators for every split. Called once per preparation.
    fn split_generators(&self, ctx: &BuildContext, dl: &DownloadManager) -> Result<Vec<SplitGenerator>>;

    fn file_format_adapter(&self) -> Arc<dyn FileFormatAdapter>;

    /// Applied to each example on read.
    fn preprocess(&self, example: Example) -> Result<Example> {
        Ok(example)
    }
}

impl<T> DatasetBuilder for T
where
    T: GeneratorBasedBuilder + Clone + 'static,
{
    fn name(&self) -> &str {
        GeneratorBasedBuilder::name(self)
    }

    fn filetype_suffix(&self) -> Option<String> {
        let adapter = self.file_format_adapter();
        let suffix = adapter.filetype_suffix();
        (!suffix.is_empty()).then(|| suffix.to_string())
    }

    fn prepare_hook(&self, ctx: &BuildContext, dl: &DownloadManager) -> Result<()> {
        let storage = ctx.storage().as_ref();
        storage.create_dir_all(ctx.data_dir())?;

        let adapter = self.file_format_adapter();
        for generator in self.split_generators(ctx, dl)? {
            let splits = generator.splits();
            if generator.output_files_exist(adapter.as_ref(), storage)? {
                tracing::info!(dataset = ctx.name(), ?splits, "Skipping splits, files already exist");
                continue;
            }

            let paths = generator.output_files()?;
            tracing::info!(
                dataset = ctx.name(),
                ?splits,
                shards = paths.len(),
                "Generating splits"
            );
            let examples = generator.generate()?;
            let summary = adapter.write_from_generator(storage, examples, &paths)?;
            tracing::info!(
                dataset = ctx.name(),
                ?splits,
                examples = summary.total(),
                "Wrote splits"
            );
        }
        Ok(())
    }

    fn as_dataset_hook(
        &self,
        ctx: &BuildContext,
        split: Split,
        shuffle_files: Option<bool>,
    ) -> Result<ExampleStream> {
        let pattern = ctx.split_files(split, None).pattern();
        let adapter = self.file_format_adapter();
        let this = self.clone();

        build_stream(
            ctx.storage().clone(),
            &pattern,
            move |storage, path| adapter.dataset_from_filename(storage, path),
            move |example| this.preprocess(example),
            shuffle_files.unwrap_or_else(|| default_shuffle(split)),
            ctx.config().reader.shuffle_seed,
        )
    }
}

/// Inputs to [`Builder::download_and_prepare`].
#[derive(Debug, Default)]
pub struct PrepareOptions {
    /// Download cache to use. Conflicts with `download_manager`.
    pub cache_dir: Option<PathBuf>,
    /// Pre-built download manager. Conflicts with `cache_dir`.
    pub download_manager: Option<DownloadManager>,
    /// Version token to create instead of the current minute.
    pub version: Option<Version>,
}

/// Result of [`Builder::download_and_prepare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// An existing version was kept; nothing was generated.
    Reused(PathBuf),
    /// A new version directory was generated and published.
    Generated(PathBuf),
}

impl PrepareOutcome {
    pub fn data_dir(&self) -> &Path {
        match self {
            PrepareOutcome::Reused(p) | PrepareOutcome::Generated(p) => p,
        }
    }
}

/// One example converted to plain arrays.
pub type NumpyExample = BTreeMap<String, Array>;

/// Converts every feature of `example` into an [`Array`].
pub fn to_numpy(example: &Example) -> NumpyExample {
    example
        .iter()
        .map(|(name, value)| (name.clone(), value.to_array()))
        .collect()
}

/// Owns a dataset and its versioned data directory.
pub struct Builder {
    dataset: Box<dyn DatasetBuilder>,
    data_dir_root: PathBuf,
    data_dir: Option<PathBuf>,
    storage: Arc<dyn StorageBackend>,
    config: DatasetsConfig,
}

impl Builder {
    /// Creates a builder with default configuration.
    ///
    /// `data_dir_root` defaults to the configured data directory; a leading
    /// `~` is expanded. The latest existing version, if any, is selected.
    pub fn new<D>(dataset: D, data_dir_root: Option<PathBuf>) -> Result<Self>
    where
        D: DatasetBuilder + 'static,
    {
        Self::from_boxed(Box::new(dataset), data_dir_root)
    }

    pub fn from_boxed(dataset: Box<dyn DatasetBuilder>, data_dir_root: Option<PathBuf>) -> Result<Self> {
        Self::with_config(dataset, data_dir_root, DatasetsConfig::default())
    }

    /// Creates a builder over local storage configured by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if `config` is invalid or the latest version cannot
    /// be resolved.
    pub fn with_config(
        dataset: Box<dyn DatasetBuilder>,
        data_dir_root: Option<PathBuf>,
        config: DatasetsConfig,
    ) -> Result<Self> {
        config.validate()?;
        let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(&config.storage)?);
        Self::with_storage(dataset, data_dir_root, config, storage)
    }

    /// Creates a builder over an explicit storage backend.
    pub fn with_storage(
        dataset: Box<dyn DatasetBuilder>,
        data_dir_root: Option<PathBuf>,
        config: DatasetsConfig,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        let data_dir_root = match data_dir_root {
            Some(root) => expand_user(root),
            None => config.data_dir(),
        };

        let mut builder = Self {
            dataset,
            data_dir_root,
            data_dir: None,
            storage,
            config,
        };
        builder.data_dir = builder.latest_data_dir()?;
        if let Some(dir) = &builder.data_dir {
            tracing::debug!(dataset = builder.name(), path = %dir.display(), "Resolved existing version");
        }
        Ok(builder)
    }

    pub fn name(&self) -> &str {
        self.dataset.name()
    }

    pub fn data_dir_root(&self) -> &Path {
        &self.data_dir_root
    }

    /// Currently selected version directory, if any.
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    pub fn config(&self) -> &DatasetsConfig {
        &self.config
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Directory holding every version of this dataset.
    pub fn dataset_root(&self) -> PathBuf {
        self.data_dir_root.join(self.name())
    }

    /// Path of `version`, whether or not it exists.
    pub fn data_dir_for(&self, version: &Version) -> PathBuf {
        self.dataset_root().join(version.as_str())
    }

    /// Lexicographically last complete version directory, or `None`.
    pub fn latest_data_dir(&self) -> Result<Option<PathBuf>> {
        let root = self.dataset_root();
        let mut latest = None;
        for name in self.storage.list(&root)? {
            if is_incomplete(&name) {
                continue;
            }
            let path = root.join(&name);
            if self.storage.metadata(&path)?.is_dir {
                latest = Some(path);
            }
        }
        Ok(latest)
    }

    /// Downloads and prepares the dataset unless a usable version exists.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if both `cache_dir` and `download_manager` are set.
    /// - `VersionExists` if the target version directory already exists.
    /// - Any error from the dataset's hook; the staging directory is left
    ///   behind and no version is published.
    pub fn download_and_prepare(&mut self, options: PrepareOptions) -> Result<PrepareOutcome> {
        let PrepareOptions {
            cache_dir,
            download_manager,
            version,
        } = options;

        let dl = match (cache_dir, download_manager) {
            (Some(_), Some(_)) => {
                return Err(DatasetError::invalid_argument(
                    "only one of cache_dir or download_manager may be given",
                ))
            }
            (None, Some(dl)) => dl,
            (cache_dir, None) => {
                let cache_dir = cache_dir
                    .map(expand_user)
                    .or_else(|| self.config.download.cache_dir.as_ref().map(expand_user))
                    .unwrap_or_else(|| self.data_dir_root.join("tmp"));
                DownloadManager::new(self.storage.clone(), cache_dir, self.config.download.mode)
            }
        };

        if let Some(dir) = &self.data_dir {
            if dl.mode().reuses_dataset() && self.storage.exists(dir)? {
                tracing::info!(
                    dataset = self.name(),
                    path = %dir.display(),
                    "Reusing dataset (already generated)"
                );
                return Ok(PrepareOutcome::Reused(dir.clone()));
            }
        }

        let version = version.unwrap_or_else(Version::now);
        let target = self.data_dir_for(&version);
        tracing::info!(
            dataset = self.name(),
            %version,
            path = %target.display(),
            mode = %dl.mode(),
            "Generating dataset"
        );

        let dataset = self.dataset.as_ref();
        let storage = self.storage.clone();
        let config = &self.config;
        with_incomplete_dir(self.storage.as_ref(), &target, |tmp| {
            let ctx = BuildContext::new(
                dataset.name(),
                tmp,
                storage,
                dataset.filetype_suffix(),
                config.clone(),
            );
            dataset.prepare_hook(&ctx, &dl)
        })?;

        tracing::info!(dataset = self.name(), path = %target.display(), "Dataset ready");
        self.data_dir = Some(target.clone());
        Ok(PrepareOutcome::Generated(target))
    }

    fn read_context(&self) -> Result<BuildContext> {
        let data_dir = self.data_dir.clone().ok_or_else(|| {
            DatasetError::invalid_state(format!(
                "dataset '{}' has no prepared version under {}; call download_and_prepare first",
                self.name(),
                self.data_dir_root.display()
            ))
        })?;
        Ok(BuildContext::new(
            self.name(),
            data_dir,
            self.storage.clone(),
            self.dataset.filetype_suffix(),
            self.config.clone(),
        ))
    }

    /// Lazy stream over one split. `shuffle_files` defaults to true only for
    /// [`Split::Train`].
    pub fn as_dataset(&self, split: Split, shuffle_files: Option<bool>) -> Result<ExampleStream> {
        let ctx = self.read_context()?;
        self.dataset.as_dataset_hook(&ctx, split, shuffle_files)
    }

    /// Like [`as_dataset`](Self::as_dataset), read ahead on a background
    /// thread and converted to plain arrays.
    pub fn numpy_iterator(
        &self,
        split: Split,
        shuffle_files: Option<bool>,
    ) -> Result<impl Iterator<Item = Result<NumpyExample>>> {
        let stream = self.as_dataset(split, shuffle_files)?;
        let prefetcher = Prefetcher::new(stream, PrefetchConfig::from(&self.config.reader));
        Ok(prefetcher.map(|example| example.map(|ex| to_numpy(&ex))))
    }
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("name", &self.name())
            .field("data_dir_root", &self.data_dir_root)
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}
