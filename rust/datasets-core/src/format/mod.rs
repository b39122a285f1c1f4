// rust/datasets-core/src/format/mod.rs

//! On-disk file formats for prepared shards.
//!
//! A [`FileFormatAdapter`] owns both directions: writing a generator's
//! examples across a set of shard paths, and reading one shard back as an
//! example stream. Shards are written to temporary siblings and renamed into
//! place only once every shard has been written, so a reader never sees a
//! partial shard under its final name.

mod framing;
mod json_lines;
mod record_file;

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, Result};
use crate::features::{Example, ExampleStream, FeatureSchema};
use crate::storage::{temp_path, StorageBackend, StorageWriter};

pub use framing::{FramedReader, RecordFraming};
pub use json_lines::JsonLinesAdapter;
pub use record_file::{Compression, RecordFileAdapter};

/// Serializes examples into shard files and reads them back.
pub trait FileFormatAdapter: Send + Sync {
    /// Suffix inserted into shard names, e.g. `jsonl`.
    fn filetype_suffix(&self) -> &str;

    /// Schema examples are validated against on write, if any.
    fn schema(&self) -> Option<&FeatureSchema> {
        None
    }

    /// Consumes `examples`, spreading them round-robin over `paths`.
    ///
    /// # Errors
    ///
    /// Propagates generator, validation, serialization and storage errors.
    /// No file under a final shard name is created on error.
    fn write_from_generator(
        &self,
        storage: &dyn StorageBackend,
        examples: ExampleStream,
        paths: &[PathBuf],
    ) -> Result<WriteSummary>;

    /// Opens one shard as a lazy example stream.
    fn dataset_from_filename(&self, storage: &dyn StorageBackend, path: &Path) -> Result<ExampleStream>;

    /// Whether all of `paths` are present.
    fn do_files_exist(&self, storage: &dyn StorageBackend, paths: &[PathBuf]) -> Result<bool> {
        storage.exists_all(paths)
    }
}

/// Per-shard example counts from one write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub shards: Vec<(PathBuf, u64)>,
}

impl WriteSummary {
    pub fn total(&self) -> u64 {
        self.shards.iter().map(|(_, n)| n).sum()
    }

    pub fn count_for(&self, path: &Path) -> Option<u64> {
        self.shards
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, n)| *n)
    }
}

struct OpenShard {
    path: PathBuf,
    tmp: PathBuf,
    writer: BufWriter<Box<dyn StorageWriter>>,
    count: u64,
}

/// Shared write path: opens every shard under a temporary name, writes
/// `header` to each, distributes examples round-robin through
/// `write_record`, then renames all shards into place.
pub(crate) fn write_sharded<F>(
    storage: &dyn StorageBackend,
    examples: ExampleStream,
    paths: &[PathBuf],
    schema: Option<&FeatureSchema>,
    header: &[u8],
    mut write_record: F,
) -> Result<WriteSummary>
where
    F: FnMut(&mut dyn Write, &Example) -> Result<()>,
{
    if paths.is_empty() {
        return Err(DatasetError::invalid_argument(
            "cannot write examples to an empty set of shard paths",
        ));
    }

    let mut shards = Vec::with_capacity(paths.len());
    for path in paths {
        let tmp = temp_path(path);
        let writer = match storage.open_write(&tmp) {
            Ok(w) => w,
            Err(e) => {
                discard(storage, shards);
                return Err(e);
            }
        };
        shards.push(OpenShard {
            path: path.clone(),
            tmp,
            writer: BufWriter::new(writer),
            count: 0,
        });
    }

    let written = fill_shards(&mut shards, examples, schema, header, &mut write_record);
    if let Err(e) = written {
        discard(storage, shards);
        return Err(e);
    }

    let mut summary = WriteSummary::default();
    let mut finished = Vec::with_capacity(shards.len());
    let mut failure = None;
    for shard in shards {
        if failure.is_some() {
            let _ = storage.delete(&shard.tmp);
            continue;
        }
        let result = shard
            .writer
            .into_inner()
            .map_err(|e| {
                DatasetError::storage_with_source(&shard.tmp, "failed to flush shard", e.into_error())
            })
            .and_then(|w| w.finish());
        match result {
            Ok(()) => finished.push((shard.path, shard.tmp, shard.count)),
            Err(e) => {
                let _ = storage.delete(&shard.tmp);
                failure = Some(e);
            }
        }
    }
    if let Some(e) = failure {
        for (_, tmp, _) in &finished {
            let _ = storage.delete(tmp);
        }
        return Err(e);
    }

    for (path, tmp, count) in finished {
        storage.rename(&tmp, &path)?;
        tracing::debug!(path = %path.display(), examples = count, "Wrote shard");
        summary.shards.push((path, count));
    }
    Ok(summary)
}

fn fill_shards<F>(
    shards: &mut [OpenShard],
    examples: ExampleStream,
    schema: Option<&FeatureSchema>,
    header: &[u8],
    write_record: &mut F,
) -> Result<()>
where
    F: FnMut(&mut dyn Write, &Example) -> Result<()>,
{
    if !header.is_empty() {
        for shard in shards.iter_mut() {
            shard.writer.write_all(header).map_err(|e| {
                DatasetError::storage_with_source(&shard.tmp, "failed to write shard header", e)
            })?;
        }
    }

    for (i, example) in examples.enumerate() {
        let example = example?;
        if let Some(schema) = schema {
            schema.validate(&example)?;
        }
        let shard = &mut shards[i % shards.len()];
        write_record(&mut shard.writer, &example)?;
        shard.count += 1;
    }
    Ok(())
}

fn discard(storage: &dyn StorageBackend, shards: Vec<OpenShard>) {
    for shard in shards {
        let tmp = shard.tmp;
        drop(shard.writer);
        let _ = storage.delete(&tmp);
    }
}
