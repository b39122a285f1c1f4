// rust/datasets-core/src/lib.rs

//! Datasets - Core Library
//!
//! Prepares datasets for training: downloads raw sources, writes them as
//! versioned, sharded record files, and reads splits back as lazy example
//! streams.

pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::DatasetsConfig;
pub use error::{DatasetError, Result};
pub use storage::{LocalStorage, ObjectMeta, StorageBackend, StorageReader, StorageWriter};

pub mod features;
pub mod naming;
pub mod split;
pub mod tensor;
pub use features::{Example, ExampleStream, FeatureSchema, FeatureSpec, FeatureValue};
pub use split::{Split, SplitFiles, SplitGenerator};
pub use tensor::{assert_shape_match, Array, ArrayData, DType, Shape};

pub mod format;
pub use format::{FileFormatAdapter, JsonLinesAdapter, RecordFileAdapter, WriteSummary};

pub mod download;
pub mod incomplete;
pub mod prefetch;
pub mod reader;
pub use download::{DownloadManager, GenerateMode};

pub mod builder;
pub mod registry;
pub use builder::{
    BuildContext, Builder, DatasetBuilder, GeneratorBasedBuilder, PrepareOptions, PrepareOutcome,
    Version,
};
pub use registry::DatasetRegistry;

pub mod graph_runner;
pub use graph_runner::{ExecutionMode, GraphFn, GraphRunner};
