// rust/datasets-core/src/reader.rs

//! Turns a shard file pattern into one lazy example stream.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{DatasetError, Result};
use crate::features::{Example, ExampleStream};
use crate::naming::wildcard_match;
use crate::storage::StorageBackend;

/// Lists the files matching `pattern`, sorted by name.
///
/// Only the final path component may contain wildcards.
pub fn matching_files(storage: &dyn StorageBackend, pattern: &Path) -> Result<Vec<PathBuf>> {
    let dir = pattern.parent().unwrap_or_else(|| Path::new(""));
    let file_pattern = pattern
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            DatasetError::invalid_argument(format!("invalid file pattern: {}", pattern.display()))
        })?;

    Ok(storage
        .list(dir)?
        .into_iter()
        .filter(|name| wildcard_match(file_pattern, name))
        .map(|name| dir.join(name))
        .collect())
}

/// Builds a stream over every file matching `pattern`.
///
/// Files are visited in name order, or in a random order when
/// `shuffle_files` is set (reproducible if `seed` is given). Each file is
/// opened with `open` only when the previous one is exhausted, and every
/// example passes through `transform`.
///
/// # Errors
///
/// `InvalidState` if nothing matches `pattern`.
pub fn build_stream<O, T>(
    storage: Arc<dyn StorageBackend>,
    pattern: &Path,
    open: O,
    transform: T,
    shuffle_files: bool,
    seed: Option<u64>,
) -> Result<ExampleStream>
where
    O: Fn(&dyn StorageBackend, &Path) -> Result<ExampleStream> + Send + 'static,
    T: Fn(Example) -> Result<Example> + Send + 'static,
{
    let mut files = matching_files(storage.as_ref(), pattern)?;
    if files.is_empty() {
        return Err(DatasetError::invalid_state(format!(
            "no files match {}; was the dataset prepared?",
            pattern.display()
        )));
    }

    if shuffle_files {
        match seed {
            Some(seed) => files.shuffle(&mut StdRng::seed_from_u64(seed)),
            None => files.shuffle(&mut rand::thread_rng()),
        }
    }
    tracing::debug!(
        pattern = %pattern.display(),
        files = files.len(),
        shuffle_files,
        "Building example stream"
    );

    Ok(Box::new(ShardChain {
        storage,
        pending: files.into(),
        current: None,
        open,
        transform,
        failed: false,
    }))
}

/// Opens shards one at a time, in order.
struct ShardChain<O, T> {
    storage: Arc<dyn StorageBackend>,
    pending: VecDeque<PathBuf>,
    current: Option<ExampleStream>,
    open: O,
    transform: T,
    failed: bool,
}

impl<O, T> Iterator for ShardChain<O, T>
where
    O: Fn(&dyn StorageBackend, &Path) -> Result<ExampleStream>,
    T: Fn(Example) -> Result<Example>,
{
    type Item = Result<Example>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(stream) = self.current.as_mut() {
                match stream.next() {
                    Some(Ok(example)) => return Some((self.transform)(example)),
                    Some(Err(e)) => return Some(Err(e)),
                    None => self.current = None,
                }
            }

            let path = self.pending.pop_front()?;
            match (self.open)(self.storage.as_ref(), &path) {
                Ok(stream) => self.current = Some(stream),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{example, FeatureValue};
    use crate::format::{FileFormatAdapter, JsonLinesAdapter};
    use crate::storage::LocalStorage;
    use tempfile::TempDir;

    fn write_shards(dir: &Path, shards: usize, per_shard: i64) -> Arc<dyn StorageBackend> {
        let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::default());
        let adapter = JsonLinesAdapter::new();
        for s in 0..shards {
            let base = s as i64 * per_shard;
            let rows: ExampleStream = Box::new(
                (base..base + per_shard).map(|i| Ok(example([("id", FeatureValue::Int(i))]))),
            );
            let path = dir.join(format!("ds-train.jsonl-{s:05}-of-{shards:05}"));
            adapter
                .write_from_generator(storage.as_ref(), rows, &[path])
                .unwrap();
        }
        storage
    }

    fn open_jsonl(storage: &dyn StorageBackend, path: &Path) -> Result<ExampleStream> {
        JsonLinesAdapter::new().dataset_from_filename(storage, path)
    }

    fn ids(stream: ExampleStream) -> Vec<i64> {
        stream
            .map(|ex| ex.unwrap()["id"].as_int().unwrap())
            .collect()
    }

    #[test]
    fn test_ordered_stream_reads_all_shards() {
        let dir = TempDir::new().unwrap();
        let storage = write_shards(dir.path(), 3, 4);
        std::fs::write(dir.path().join("ds-test.jsonl-00000-of-00001"), "").unwrap();

        let stream = build_stream(
            storage,
            &dir.path().join("ds-train.jsonl-*"),
            open_jsonl,
            Ok,
            false,
            None,
        )
        .unwrap();
        assert_eq!(ids(stream), (0..12).collect::<Vec<_>>());
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let dir = TempDir::new().unwrap();
        let storage = write_shards(dir.path(), 8, 2);
        let pattern = dir.path().join("ds-train.jsonl-*");

        let run = |seed| {
            ids(build_stream(storage.clone(), &pattern, open_jsonl, Ok, true, Some(seed)).unwrap())
        };
        let a = run(7);
        assert_eq!(a, run(7));

        let mut sorted = a.clone();
        sorted.sort();
        assert_eq!(sorted, (0..16).collect::<Vec<_>>());
    }

    #[test]
    fn test_transform_applied() {
        let dir = TempDir::new().unwrap();
        let storage = write_shards(dir.path(), 1, 3);

        let double = |mut ex: Example| -> Result<Example> {
            let id = ex["id"].as_int().unwrap_or(0);
            ex.insert("id".to_string(), FeatureValue::Int(id * 2));
            Ok(ex)
        };
        let stream = build_stream(
            storage,
            &dir.path().join("ds-train.jsonl-*"),
            open_jsonl,
            double,
            false,
            None,
        )
        .unwrap();
        assert_eq!(ids(stream), vec![0, 2, 4]);
    }

    #[test]
    fn test_no_matching_files() {
        let dir = TempDir::new().unwrap();
        let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::default());
        let err = build_stream(storage, &dir.path().join("ds-train-*"), open_jsonl, Ok, false, None)
            .err()
            .unwrap();
        assert!(matches!(err, DatasetError::InvalidState { .. }));
    }
}
