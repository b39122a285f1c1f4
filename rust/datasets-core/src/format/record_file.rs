// rust/datasets-core/src/format/record_file.rs

//! Binary record shards.
//!
//! Layout of a shard:
//!
//! ```text
//! +-----------+-------------+---------------------------------------------+
//! | magic (6) | codec (1)   | records...                                  |
//! +-----------+-------------+---------------------------------------------+
//! record := len:u32 BE | xxhash64(body):u64 BE | body
//! body   := codec(bincode(example))
//! ```
//!
//! The checksum covers the uncompressed bincode bytes.

use std::hash::Hasher;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use twox_hash::XxHash64;

use crate::config::WriterConfig;
use crate::error::{DatasetError, Result};
use crate::features::{Example, ExampleStream, FeatureSchema};
use crate::storage::StorageBackend;

use super::framing::{FramedReader, RecordFraming};
use super::{write_sharded, FileFormatAdapter, WriteSummary};

const MAGIC: &[u8; 6] = b"DSREC1";

/// Per-record compression codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lz4,
    Zstd { level: i32 },
}

impl Compression {
    /// Resolves the codec named in the writer configuration.
    pub fn from_config(config: &WriterConfig) -> Result<Self> {
        match config.compression.as_str() {
            "none" => Ok(Compression::None),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd {
                level: config.compression_level,
            }),
            other => Err(DatasetError::config(format!(
                "unknown compression algorithm: {other}"
            ))),
        }
    }

    fn code(&self) -> u8 {
        match self {
            Compression::None => 0,
            Compression::Lz4 => 1,
            Compression::Zstd { .. } => 2,
        }
    }

    fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Lz4),
            // Level only matters when compressing.
            2 => Ok(Compression::Zstd { level: 0 }),
            other => Err(DatasetError::serialization(format!(
                "unknown compression code {other} in shard header"
            ))),
        }
    }

    fn compress(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data),
            Compression::Lz4 => Ok(lz4_flex::compress_prepend_size(&data)),
            Compression::Zstd { level } => zstd::encode_all(data.as_slice(), *level)
                .map_err(|e| DatasetError::serialization(format!("zstd compression failed: {e}"))),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Compression::None => Ok(data.to_vec()),
            Compression::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| DatasetError::serialization(format!("lz4 decompression failed: {e}"))),
            Compression::Zstd { .. } => zstd::decode_all(data)
                .map_err(|e| DatasetError::serialization(format!("zstd decompression failed: {e}"))),
        }
    }
}

fn checksum(data: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(0);
    hasher.write(data);
    hasher.finish()
}

/// Compact binary shards with per-record integrity checks.
#[derive(Debug, Clone)]
pub struct RecordFileAdapter {
    compression: Compression,
    schema: Option<FeatureSchema>,
}

impl Default for RecordFileAdapter {
    fn default() -> Self {
        Self::new(Compression::None)
    }
}

impl RecordFileAdapter {
    pub fn new(compression: Compression) -> Self {
        Self {
            compression,
            schema: None,
        }
    }

    pub fn from_config(config: &WriterConfig) -> Result<Self> {
        Ok(Self::new(Compression::from_config(config)?))
    }

    pub fn with_schema(mut self, schema: FeatureSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    fn encode(&self, example: &Example) -> Result<Vec<u8>> {
        let raw = bincode::serialize(example)
            .map_err(|e| DatasetError::serialization(format!("failed to encode example: {e}")))?;
        let sum = checksum(&raw);
        let body = self.compression.compress(raw)?;

        let mut payload = Vec::with_capacity(8 + body.len());
        payload.extend_from_slice(&sum.to_be_bytes());
        payload.extend_from_slice(&body);
        Ok(payload)
    }
}

fn decode(compression: Compression, payload: &[u8]) -> Result<Example> {
    if payload.len() < 8 {
        return Err(DatasetError::serialization("record shorter than its checksum"));
    }
    let (sum_bytes, body) = payload.split_at(8);
    let mut expected = [0u8; 8];
    expected.copy_from_slice(sum_bytes);
    let expected = u64::from_be_bytes(expected);

    let raw = compression.decompress(body)?;
    let actual = checksum(&raw);
    if actual != expected {
        return Err(DatasetError::serialization(format!(
            "checksum mismatch: expected {expected:016x}, got {actual:016x}"
        )));
    }

    bincode::deserialize(&raw)
        .map_err(|e| DatasetError::serialization(format!("failed to decode example: {e}")))
}

fn read_header(reader: &mut dyn BufRead, path: &Path) -> Result<Compression> {
    let mut header = [0u8; 7];
    reader.read_exact(&mut header).map_err(|e| {
        DatasetError::serialization(format!("{}: missing shard header ({e})", path.display()))
    })?;
    if &header[..6] != MAGIC {
        return Err(DatasetError::serialization(format!(
            "{}: not a record shard",
            path.display()
        )));
    }
    Compression::from_code(header[6])
}

impl FileFormatAdapter for RecordFileAdapter {
    fn filetype_suffix(&self) -> &str {
        "records"
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
        let mut header = MAGIC.to_vec();
        header.push(self.compression.code());

        write_sharded(storage, examples, paths, self.schema.as_ref(), &header, |w, example| {
            let payload = self.encode(example)?;
            RecordFraming::LengthPrefixed
                .write_record(w, &payload)
                .map_err(|e| DatasetError::serialization(format!("failed to write record: {e}")))
        })
    }

    fn dataset_from_filename(&self, storage: &dyn StorageBackend, path: &Path) -> Result<ExampleStream> {
        let mut reader = BufReader::new(storage.open_read(path)?);
        let compression = read_header(&mut reader, path)?;

        let examples = FramedReader::new(reader, RecordFraming::LengthPrefixed, path)
            .map(move |payload| decode(compression, &payload?));
        Ok(Box::new(examples))
    }
}
