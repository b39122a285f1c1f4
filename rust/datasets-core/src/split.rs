// rust/datasets-core/src/split.rs

//! Splits, their on-disk shard sets, and the generators that fill them.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};
use crate::features::ExampleStream;
use crate::format::FileFormatAdapter;
use crate::naming;
use crate::storage::StorageBackend;

/// A named partition of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Validation, Split::Test];

    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Validation => "validation",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Split {
    type Err = DatasetError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "train" => Ok(Split::Train),
            "validation" => Ok(Split::Validation),
            "test" => Ok(Split::Test),
            other => Err(DatasetError::invalid_argument(format!(
                "unknown split '{other}' (expected train, validation or test)"
            ))),
        }
    }
}

/// The shard files backing one split of one dataset version.
///
/// `num_shards` is only needed on the write side. A reader that knows the
/// split but not how many shards were written leaves it unset and goes
/// through [`SplitFiles::pattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitFiles {
    pub dataset_name: String,
    pub split: Split,
    pub num_shards: Option<u32>,
    pub data_dir: PathBuf,
    pub filetype_suffix: Option<String>,
}

impl SplitFiles {
    pub fn new(
        dataset_name: impl Into<String>,
        split: Split,
        num_shards: Option<u32>,
        data_dir: impl Into<PathBuf>,
        filetype_suffix: Option<String>,
    ) -> Self {
        Self {
            dataset_name: dataset_name.into(),
            split,
            num_shards,
            data_dir: data_dir.into(),
            filetype_suffix,
        }
    }

    /// Concrete shard paths.
    ///
    /// # Errors
    ///
    /// `InvalidState` if the shard count was never set, `InvalidArgument`
    /// if it is zero.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let num_shards = self.num_shards.ok_or_else(|| {
            DatasetError::invalid_state(format!(
                "shard count unknown for {}/{}; read through the file pattern instead",
                self.dataset_name, self.split
            ))
        })?;
        naming::filepaths_for_split(
            &self.dataset_name,
            self.split,
            num_shards,
            &self.data_dir,
            self.filetype_suffix.as_deref(),
        )
    }

    /// Glob pattern matching every shard of this split.
    pub fn pattern(&self) -> PathBuf {
        naming::filepattern_for_split(
            &self.dataset_name,
            self.split,
            &self.data_dir,
            self.filetype_suffix.as_deref(),
        )
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Whether every shard is present, as judged by the format adapter.
    pub fn exists(&self, adapter: &dyn FileFormatAdapter, storage: &dyn StorageBackend) -> Result<bool> {
        adapter.do_files_exist(storage, &self.files()?)
    }
}

/// Produces examples on demand. Called at most once per generator.
pub type GeneratorFn = Box<dyn FnOnce() -> Result<ExampleStream> + Send>;

/// One generation pass and the splits it writes into.
///
/// A single generator may feed several splits. The writer spreads its output
/// over the union of their shards, so each split receives a share
/// proportional to its shard count.
pub struct SplitGenerator {
    generator: GeneratorFn,
    split_files: Vec<SplitFiles>,
}

impl SplitGenerator {
    pub fn new(generator: GeneratorFn, split_files: Vec<SplitFiles>) -> Self {
        Self {
            generator,
            split_files,
        }
    }

    pub fn from_fn<F>(generator: F, split_files: Vec<SplitFiles>) -> Self
    where
        F: FnOnce() -> Result<ExampleStream> + Send + 'static,
    {
        Self::new(Box::new(generator), split_files)
    }

    pub fn split_files(&self) -> &[SplitFiles] {
        &self.split_files
    }

    pub fn splits(&self) -> Vec<Split> {
        self.split_files.iter().map(|sf| sf.split).collect()
    }

    /// Every output path, concatenated in split order.
    pub fn output_files(&self) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for sf in &self.split_files {
            out.extend(sf.files()?);
        }
        Ok(out)
    }

    /// True once every split this generator feeds reports all its shards.
    pub fn output_files_exist(
        &self,
        adapter: &dyn FileFormatAdapter,
        storage: &dyn StorageBackend,
    ) -> Result<bool> {
        for sf in &self.split_files {
            if !sf.exists(adapter, storage)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Runs the generator, consuming it.
    pub fn generate(self) -> Result<ExampleStream> {
        (self.generator)()
    }
}

impl fmt::Debug for SplitGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SplitGenerator")
            .field("split_files", &self.split_files)
            .finish_non_exhaustive()
    }
}
