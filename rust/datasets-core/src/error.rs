// rust/datasets-core/src/error.rs

//! The one error type every fallible operation in the crate returns.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    /// I/O against the data directory, a shard or the download cache.
    #[error("Storage error at '{path}': {message}")]
    Storage {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Invalid argument: {message}")]
    InvalidArgument {
        message: String,
    },

    #[error("Invalid state: {message}")]
    InvalidState {
        message: String,
    },

    /// A builder hook was called but the dataset never provided it.
    #[error("Dataset '{dataset}' does not implement '{hook}'")]
    NotImplemented {
        dataset: String,
        hook: &'static str,
    },

    #[error("Shape {actual} does not match {expected}")]
    ShapeMismatch {
        actual: String,
        expected: String,
    },

    #[error("Shapes should have same rank: {actual} - {expected}")]
    RankMismatch {
        actual: usize,
        expected: usize,
    },

    #[error("Expected dtype {expected}, got {actual}")]
    DTypeMismatch {
        actual: String,
        expected: String,
    },

    #[error("Feature '{feature}': {message}")]
    Schema {
        feature: String,
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Download of '{url}' failed: {message}")]
    Download {
        url: String,
        message: String,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
    },

    #[error("Unknown dataset '{name}' (registered: {registered})")]
    UnknownDataset {
        name: String,
        registered: String,
    },

    /// Preparing would overwrite an already published version.
    #[error("Version directory already exists: {path}")]
    VersionExists {
        path: PathBuf,
    },
}

pub type Result<T> = std::result::Result<T, DatasetError>;

impl DatasetError {
    pub fn storage(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: None,
        }
    }

    pub fn storage_with_source(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Storage {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    pub fn not_implemented(dataset: impl Into<String>, hook: &'static str) -> Self {
        Self::NotImplemented {
            dataset: dataset.into(),
            hook,
        }
    }

    pub fn schema(feature: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Schema {
            feature: feature.into(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_names_both_shapes() {
        let err = DatasetError::ShapeMismatch {
            actual: "(64, 64, 3)".to_string(),
            expected: "(64, 64, 4)".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("(64, 64, 3)"));
        assert!(msg.contains("(64, 64, 4)"));
    }

    #[test]
    fn test_not_implemented_message() {
        let err = DatasetError::not_implemented("mnist", "as_dataset");
        assert_eq!(err.to_string(), "Dataset 'mnist' does not implement 'as_dataset'");
    }

    #[test]
    fn test_storage_source_is_exposed() {
        use std::error::Error;

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = DatasetError::storage_with_source("/tmp/x", "failed to open file", io);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("/tmp/x"));
    }
}
