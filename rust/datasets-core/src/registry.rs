// rust/datasets-core/src/registry.rs

//! Name-to-constructor table of available datasets.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::builder::{Builder, DatasetBuilder};
use crate::config::DatasetsConfig;
use crate::error::{DatasetError, Result};
use crate::naming::camel_to_snake;

type Constructor = Box<dyn Fn() -> Box<dyn DatasetBuilder> + Send + Sync>;

/// Datasets known to an application, populated at startup and passed to
/// whatever needs to look one up by name.
#[derive(Default)]
pub struct DatasetRegistry {
    constructors: BTreeMap<String, Constructor>,
}

impl DatasetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `constructor` under `name`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `name` is empty, not snake_case, or already
    /// registered.
    pub fn register<F, D>(&mut self, name: impl Into<String>, constructor: F) -> Result<()>
    where
        F: Fn() -> D + Send + Sync + 'static,
        D: DatasetBuilder + 'static,
    {
        let name = name.into();
        if name.is_empty() {
            return Err(DatasetError::invalid_argument("dataset name must not be empty"));
        }
        let snake = camel_to_snake(&name);
        if snake != name {
            return Err(DatasetError::invalid_argument(format!(
                "dataset name '{name}' must be snake_case (e.g. '{snake}')"
            )));
        }
        if self.constructors.contains_key(&name) {
            return Err(DatasetError::invalid_argument(format!(
                "dataset '{name}' is already registered"
            )));
        }

        tracing::debug!(dataset = %name, "Registered dataset");
        self.constructors
            .insert(name, Box::new(move || Box::new(constructor()) as Box<dyn DatasetBuilder>));
        Ok(())
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Constructs the dataset registered as `name`.
    pub fn dataset(&self, name: &str) -> Result<Box<dyn DatasetBuilder>> {
        let constructor = self.constructors.get(name).ok_or_else(|| DatasetError::UnknownDataset {
            name: name.to_string(),
            registered: self.names().join(", "),
        })?;
        Ok(constructor())
    }

    /// Constructs a [`Builder`] for `name` with default configuration.
    pub fn builder(&self, name: &str, data_dir_root: Option<PathBuf>) -> Result<Builder> {
        Builder::from_boxed(self.dataset(name)?, data_dir_root)
    }

    pub fn builder_with_config(
        &self,
        name: &str,
        data_dir_root: Option<PathBuf>,
        config: DatasetsConfig,
    ) -> Result<Builder> {
        Builder::with_config(self.dataset(name)?, data_dir_root, config)
    }
}

impl fmt::Debug for DatasetRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetRegistry")
            .field("datasets", &self.names())
            .finish()
    }
}
