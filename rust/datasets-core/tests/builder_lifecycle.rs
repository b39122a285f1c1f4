// rust/datasets-core/tests/builder_lifecycle.rs

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use datasets_core::builder::{BuildContext, PrepareOptions, PrepareOutcome, Version};
use datasets_core::config::DatasetsConfig;
use datasets_core::download::{DownloadManager, GenerateMode};
use datasets_core::features::{example, Example, ExampleStream, FeatureValue};
use datasets_core::format::{FileFormatAdapter, JsonLinesAdapter, RecordFileAdapter};
use datasets_core::incomplete::incomplete_dir;
use datasets_core::{
    Builder, DatasetBuilder, DatasetError, DatasetRegistry, GeneratorBasedBuilder, Result, Split,
    SplitGenerator,
};
use tempfile::TempDir;

fn numbered(n: i64) -> ExampleStream {
    Box::new((0..n).map(|i| Ok(example([("id", FeatureValue::Int(i))]))))
}

fn version(token: &str) -> PrepareOptions {
    PrepareOptions {
        version: Some(Version::new(token).unwrap()),
        ..Default::default()
    }
}

fn subdirs(path: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(path)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn ids(stream: ExampleStream) -> Vec<i64> {
    stream
        .map(|ex| ex.unwrap()["id"].as_int().unwrap())
        .collect()
}

/// Train split written as 3 shards plus test as 1 shard from one generator.
#[derive(Clone)]
struct Counter {
    generations: Arc<AtomicUsize>,
    examples: i64,
    fail_at: Option<i64>,
}

impl Counter {
    fn new(examples: i64) -> Self {
        Self {
            generations: Arc::new(AtomicUsize::new(0)),
            examples,
            fail_at: None,
        }
    }
}

impl GeneratorBasedBuilder for Counter {
    fn name(&self) -> &str {
        "counter"
    }

    fn split_generators(&self, ctx: &BuildContext, _dl: &DownloadManager) -> Result<Vec<SplitGenerator>> {
        let generations = self.generations.clone();
        let (n, fail_at) = (self.examples, self.fail_at);

        let generate = move || -> Result<ExampleStream> {
            generations.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new((0..n).map(move |i| {
                if Some(i) == fail_at {
                    return Err(DatasetError::invalid_state("source truncated"));
                }
                Ok(example([("id", FeatureValue::Int(i))]))
            })))
        };

        Ok(vec![SplitGenerator::from_fn(
            generate,
            vec![
                ctx.split_files(Split::Train, 3),
                ctx.split_files(Split::Test, 1),
            ],
        )])
    }

    fn file_format_adapter(&self) -> Arc<dyn FileFormatAdapter> {
        Arc::new(JsonLinesAdapter::new())
    }
}

#[test]
fn prepare_twice_reuses_the_existing_version() {
    let dir = TempDir::new().unwrap();
    let dataset = Counter::new(40);
    let generations = dataset.generations.clone();

    let mut builder = Builder::new(dataset.clone(), Some(dir.path().to_path_buf())).unwrap();
    let first = builder.download_and_prepare(PrepareOptions::default()).unwrap();
    assert!(matches!(first, PrepareOutcome::Generated(_)));

    let second = builder.download_and_prepare(PrepareOptions::default()).unwrap();
    assert_eq!(second, PrepareOutcome::Reused(first.data_dir().to_path_buf()));
    assert_eq!(generations.load(Ordering::SeqCst), 1);
    assert_eq!(subdirs(&dir.path().join("counter")).len(), 1);

    // A fresh builder over the same root picks up the version without work.
    let mut again = Builder::new(dataset, Some(dir.path().to_path_buf())).unwrap();
    assert_eq!(again.data_dir(), Some(first.data_dir()));
    again.download_and_prepare(PrepareOptions::default()).unwrap();
    assert_eq!(generations.load(Ordering::SeqCst), 1);
}

#[test]
fn reuse_cache_mode_generates_a_new_version() {
    let dir = TempDir::new().unwrap();
    let dataset = Counter::new(8);
    let mut config = DatasetsConfig::default();
    config.download.mode = GenerateMode::ReuseCacheIfExists;

    let mut builder =
        Builder::with_config(Box::new(dataset.clone()), Some(dir.path().to_path_buf()), config).unwrap();
    builder.download_and_prepare(version("v_20190101_0000")).unwrap();
    let outcome = builder.download_and_prepare(version("v_20190102_0000")).unwrap();

    assert!(matches!(outcome, PrepareOutcome::Generated(_)));
    assert_eq!(dataset.generations.load(Ordering::SeqCst), 2);
    assert_eq!(
        subdirs(&dir.path().join("counter")),
        vec!["v_20190101_0000", "v_20190102_0000"]
    );
    assert!(builder.data_dir().unwrap().ends_with("v_20190102_0000"));
}

#[test]
fn same_version_twice_is_refused() {
    let dir = TempDir::new().unwrap();
    let mut config = DatasetsConfig::default();
    config.download.mode = GenerateMode::ForceRedownload;

    let mut builder =
        Builder::with_config(Box::new(Counter::new(4)), Some(dir.path().to_path_buf()), config).unwrap();
    builder.download_and_prepare(version("v_20190101_0000")).unwrap();
    let err = builder.download_and_prepare(version("v_20190101_0000")).unwrap_err();
    assert!(matches!(err, DatasetError::VersionExists { .. }));
}

#[test]
fn failed_generation_publishes_nothing() {
    let dir = TempDir::new().unwrap();
    let mut dataset = Counter::new(100);
    dataset.fail_at = Some(57);

    let mut builder = Builder::new(dataset, Some(dir.path().to_path_buf())).unwrap();
    let err = builder.download_and_prepare(version("v_20200101_0000")).unwrap_err();
    assert!(matches!(err, DatasetError::InvalidState { .. }));

    let final_dir = dir.path().join("counter").join("v_20200101_0000");
    assert!(!final_dir.exists());
    assert!(incomplete_dir(&final_dir).exists());
    assert!(builder.data_dir().is_none());

    // The leftover staging directory is never mistaken for a version.
    let fresh = Builder::new(Counter::new(1), Some(dir.path().to_path_buf())).unwrap();
    assert!(fresh.data_dir().is_none());
}

#[test]
fn shared_generator_splits_proportionally_to_shard_count() {
    let dir = TempDir::new().unwrap();
    let mut builder = Builder::new(Counter::new(400), Some(dir.path().to_path_buf())).unwrap();
    builder.download_and_prepare(version("v_20200101_0000")).unwrap();

    let train = ids(builder.as_dataset(Split::Train, Some(false)).unwrap());
    let test = ids(builder.as_dataset(Split::Test, None).unwrap());

    // Round-robin over four shards: three of every four examples are train.
    assert_eq!(train.len(), 300);
    assert_eq!(test.len(), 100);

    let mut all: Vec<i64> = train.into_iter().chain(test).collect();
    all.sort();
    assert_eq!(all, (0..400).collect::<Vec<_>>());
}

#[test]
fn shuffled_train_read_covers_every_example() {
    let dir = TempDir::new().unwrap();
    let mut config = DatasetsConfig::default();
    config.reader.shuffle_seed = Some(42);

    let mut builder =
        Builder::with_config(Box::new(Counter::new(60)), Some(dir.path().to_path_buf()), config).unwrap();
    builder.download_and_prepare(version("v_20200101_0000")).unwrap();

    let first = ids(builder.as_dataset(Split::Train, None).unwrap());
    let second = ids(builder.as_dataset(Split::Train, None).unwrap());
    assert_eq!(first, second);

    let mut sorted = first;
    sorted.sort();
    assert_eq!(sorted.len(), 45);
}

#[test]
fn numpy_iterator_yields_plain_arrays() {
    let dir = TempDir::new().unwrap();
    let mut builder = Builder::new(Counter::new(12), Some(dir.path().to_path_buf())).unwrap();
    builder.download_and_prepare(PrepareOptions::default()).unwrap();

    let rows: Vec<_> = builder
        .numpy_iterator(Split::Test, None)
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(rows.len(), 3);
    for row in &rows {
        let id = &row["id"];
        assert_eq!(id.shape().rank(), 0);
        assert_eq!(id.dtype(), datasets_core::DType::I64);
    }
}

/// Implements neither hook.
struct Bare;

impl DatasetBuilder for Bare {
    fn name(&self) -> &str {
        "bare"
    }
}

#[test]
fn missing_hooks_fail_when_called() {
    let dir = TempDir::new().unwrap();

    // Construction succeeds; only use of a hook fails.
    let mut builder = Builder::new(Bare, Some(dir.path().to_path_buf())).unwrap();
    let err = builder.download_and_prepare(version("v_1")).unwrap_err();
    assert!(matches!(
        err,
        DatasetError::NotImplemented {
            hook: "prepare_hook",
            ..
        }
    ));

    fs::create_dir_all(dir.path().join("bare").join("v_2")).unwrap();
    let builder = Builder::new(Bare, Some(dir.path().to_path_buf())).unwrap();
    let err = builder.as_dataset(Split::Test, None).err().unwrap();
    assert!(matches!(
        err,
        DatasetError::NotImplemented {
            hook: "as_dataset_hook",
            ..
        }
    ));
}

#[test]
fn cache_dir_and_download_manager_are_exclusive() {
    let dir = TempDir::new().unwrap();
    let mut builder = Builder::new(Counter::new(1), Some(dir.path().to_path_buf())).unwrap();
    let dl = DownloadManager::new(
        builder.storage().clone(),
        dir.path().join("dl"),
        GenerateMode::default(),
    );

    let err = builder
        .download_and_prepare(PrepareOptions {
            cache_dir: Some(dir.path().join("cache")),
            download_manager: Some(dl),
            version: None,
        })
        .unwrap_err();
    assert!(matches!(err, DatasetError::InvalidArgument { .. }));
}

/// Reads a gzipped word list through the download manager.
#[derive(Clone)]
struct Words {
    source: PathBuf,
}

impl GeneratorBasedBuilder for Words {
    fn name(&self) -> &str {
        "words"
    }

    fn split_generators(&self, ctx: &BuildContext, dl: &DownloadManager) -> Result<Vec<SplitGenerator>> {
        let local = dl.fetch_and_extract(&format!("file://{}", self.source.display()))?;
        let text = fs::read_to_string(&local)
            .map_err(|e| DatasetError::storage_with_source(&local, "failed to read source", e))?;
        let words: Vec<String> = text.lines().map(str::to_string).collect();
        let (train, test): (Vec<_>, Vec<_>) =
            words.into_iter().enumerate().partition(|(i, _)| i % 5 != 0);

        let to_stream = |rows: Vec<(usize, String)>| -> ExampleStream {
            Box::new(rows.into_iter().map(|(i, w)| {
                Ok(example([
                    ("id", FeatureValue::Int(i as i64)),
                    ("word", FeatureValue::Str(w)),
                ]))
            }))
        };

        Ok(vec![
            SplitGenerator::from_fn(move || Ok(to_stream(train)), vec![ctx.split_files(Split::Train, 2)]),
            SplitGenerator::from_fn(move || Ok(to_stream(test)), vec![ctx.split_files(Split::Test, 1)]),
        ])
    }

    fn file_format_adapter(&self) -> Arc<dyn FileFormatAdapter> {
        Arc::new(RecordFileAdapter::new(datasets_core::format::Compression::Zstd { level: 3 }))
    }

    fn preprocess(&self, mut example: Example) -> Result<Example> {
        if let Some(word) = example.get("word").and_then(FeatureValue::as_str) {
            let upper = word.to_uppercase();
            example.insert("word".to_string(), FeatureValue::Str(upper));
        }
        Ok(example)
    }
}

#[test]
fn prepare_through_download_cache_and_record_files() {
    let dir = TempDir::new().unwrap();
    let source = dir.path().join("words.txt.gz");
    write_gz(&source, (0..50).map(|i| format!("word{i}")));

    let root = dir.path().join("data");
    let mut builder = Builder::new(Words { source }, Some(root.clone())).unwrap();
    builder
        .download_and_prepare(PrepareOptions {
            cache_dir: Some(dir.path().join("cache")),
            ..version("v_20210101_0000")
        })
        .unwrap();

    assert_eq!(subdirs(&dir.path().join("cache")), vec!["downloads", "extracted"]);
    let shards = subdirs(builder.data_dir().unwrap());
    assert_eq!(
        shards,
        vec![
            "words-test.records-00000-of-00001",
            "words-train.records-00000-of-00002",
            "words-train.records-00001-of-00002",
        ]
    );

    let test: Vec<Example> = builder
        .as_dataset(Split::Test, None)
        .unwrap()
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(test.len(), 10);
    assert_eq!(test[0]["word"], FeatureValue::Str("WORD0".to_string()));
}

fn write_gz(path: &Path, lines: impl IntoIterator<Item = String>) {
    let file = fs::File::create(path).unwrap();
    let mut encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
    for line in lines {
        writeln!(encoder, "{line}").unwrap();
    }
    encoder.finish().unwrap();
}

#[test]
fn registry_builds_by_name() {
    let dir = TempDir::new().unwrap();
    let mut registry = DatasetRegistry::new();
    registry.register("counter", || Counter::new(8)).unwrap();
    registry.register("bare", || Bare).unwrap();

    assert_eq!(registry.names(), vec!["bare", "counter"]);

    let mut builder = registry
        .builder("counter", Some(dir.path().to_path_buf()))
        .unwrap();
    builder.download_and_prepare(PrepareOptions::default()).unwrap();
    assert_eq!(ids(builder.as_dataset(Split::Test, None).unwrap()).len(), 2);

    let err = registry.builder("imagenet", None).unwrap_err();
    assert!(matches!(err, DatasetError::UnknownDataset { .. }));
}
