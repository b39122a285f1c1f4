// rust/datasets-core/src/format/json_lines.rs

use std::io::BufReader;
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, Result};
use crate::features::{Example, ExampleStream, FeatureSchema};
use crate::storage::StorageBackend;

use super::framing::{FramedReader, RecordFraming};
use super::{write_sharded, FileFormatAdapter, WriteSummary};

/// One JSON object per line. Human-readable, handy for small datasets and
/// debugging generators.
#[derive(Debug, Clone, Default)]
pub struct JsonLinesAdapter {
    schema: Option<FeatureSchema>,
}

impl JsonLinesAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(schema: FeatureSchema) -> Self {
        Self {
            schema: Some(schema),
        }
    }
}

impl FileFormatAdapter for JsonLinesAdapter {
    fn filetype_suffix(&self) -> &str {
        "jsonl"
    }

    fn schema(&self) -> Option<&FeatureSchema> {
        self.schema.as_ref()
    }

    fn write_from_generator(
        &self,
        storage: &dyn StorageBackend,
        examples: ExampleStream,
        paths: &[PathBuf],
    ) -> Result<WriteSummary> {
        write_sharded(storage, examples, paths, self.schema.as_ref(), b"", |w, example| {
            let line = serde_json::to_vec(example)
                .map_err(|e| DatasetError::serialization(format!("failed to encode example: {e}")))?;
            RecordFraming::Newline
                .write_record(w, &line)
                .map_err(|e| DatasetError::serialization(format!("failed to write example: {e}")))
        })
    }

    fn dataset_from_filename(&self, storage: &dyn StorageBackend, path: &Path) -> Result<ExampleStream> {
        let reader = BufReader::new(storage.open_read(path)?);
        let location = path.display().to_string();

        let examples = FramedReader::new(reader, RecordFraming::Newline, path)
            .filter(|line| !matches!(line, Ok(l) if l.is_empty()))
            .map(move |line| {
                let line = line?;
                serde_json::from_slice::<Example>(&line).map_err(|e| {
                    DatasetError::serialization(format!("bad record in {location}: {e}"))
                })
            });
        Ok(Box::new(examples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{example, FeatureSpec, FeatureValue};
    use crate::storage::LocalStorage;
    use crate::tensor::DType;
    use tempfile::TempDir;

    fn rows(n: i64) -> ExampleStream {
        Box::new((0..n).map(|i| {
            Ok(example([
                ("id", FeatureValue::Int(i)),
                ("text", FeatureValue::Str(format!("row {i}"))),
            ]))
        }))
    }

    #[test]
    fn test_write_then_read_shard() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::default();
        let adapter = JsonLinesAdapter::new();
        let paths = vec![dir.path().join("a.jsonl"), dir.path().join("b.jsonl")];

        let summary = adapter.write_from_generator(&storage, rows(5), &paths).unwrap();
        assert_eq!(summary.count_for(&paths[0]), Some(3));
        assert!(adapter.do_files_exist(&storage, &paths).unwrap());

        let ids: Vec<i64> = adapter
            .dataset_from_filename(&storage, &paths[0])
            .unwrap()
            .map(|ex| ex.unwrap()["id"].as_int().unwrap())
            .collect();
        assert_eq!(ids, vec![0, 2, 4]);
    }

    #[test]
    fn test_schema_violation_aborts_write() {
        let dir = TempDir::new().unwrap();
        let storage = LocalStorage::default();
        let schema = FeatureSchema::new().with_feature("id", FeatureSpec::scalar(DType::I64));
        let adapter = JsonLinesAdapter::with_schema(schema);
        let paths = vec![dir.path().join("only.jsonl")];

        let err = adapter.write_from_generator(&storage, rows(2), &paths).unwrap_err();
        assert!(matches!(err, DatasetError::Schema { .. }));
        assert!(!adapter.do_files_exist(&storage, &paths).unwrap());
    }

    #[test]
    fn test_corrupt_line_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.jsonl");
        std::fs::write(&path, "{\"id\":{\"int\":1}}\nnot json\n").unwrap();

        let storage = LocalStorage::default();
        let mut stream = JsonLinesAdapter::new()
            .dataset_from_filename(&storage, &path)
            .unwrap();
        assert!(stream.next().unwrap().is_ok());
        assert!(matches!(
            stream.next().unwrap(),
            Err(DatasetError::Serialization { .. })
        ));
    }

    #[test]
    fn test_tensor_with_wrong_element_count_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tensor.jsonl");
        std::fs::write(
            &path,
            r#"{"pixels":{"tensor":{"shape":[2,2],"data":{"F32":[1.0]}}}}"#,
        )
        .unwrap();

        let storage = LocalStorage::default();
        let mut stream = JsonLinesAdapter::new()
            .dataset_from_filename(&storage, &path)
            .unwrap();
        let err = stream.next().unwrap().unwrap_err();
        assert!(matches!(err, DatasetError::Serialization { .. }));
        assert!(err.to_string().contains("holds 4 elements"));
    }
}
