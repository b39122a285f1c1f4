// rust/datasets-core/src/format/framing.rs

//! Record framing inside a shard file.

use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{DatasetError, Result};

/// How consecutive records are delimited in a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFraming {
    /// One record per line. Payloads must not contain `\n`.
    Newline,
    /// 4-byte big-endian length followed by the payload.
    LengthPrefixed,
}

impl RecordFraming {
    /// Writes one framed record.
    pub fn write_record(&self, writer: &mut dyn Write, payload: &[u8]) -> io::Result<()> {
        match self {
            RecordFraming::Newline => {
                writer.write_all(payload)?;
                writer.write_all(b"\n")
            }
            RecordFraming::LengthPrefixed => {
                let len = u32::try_from(payload.len()).map_err(|_| {
                    io::Error::new(io::ErrorKind::InvalidInput, "record larger than 4 GiB")
                })?;
                writer.write_all(&len.to_be_bytes())?;
                writer.write_all(payload)
            }
        }
    }

    /// Reads the next record payload, or `None` at a clean end of input.
    /// `source` names the shard in errors.
    ///
    /// # Errors
    ///
    /// `Serialization` if the input ends partway through a length-prefixed
    /// record, `Storage` on I/O failure.
    pub fn read_record(&self, reader: &mut dyn BufRead, source: &Path) -> Result<Option<Vec<u8>>> {
        match self {
            RecordFraming::Newline => {
                let mut line = Vec::new();
                let n = reader
                    .read_until(b'\n', &mut line)
                    .map_err(|e| DatasetError::storage_with_source(source, "failed to read record", e))?;
                if n == 0 {
                    return Ok(None);
                }
                if line.last() == Some(&b'\n') {
                    line.pop();
                }
                Ok(Some(line))
            }
            RecordFraming::LengthPrefixed => {
                let mut len_buf = [0u8; 4];
                let got = read_full(reader, &mut len_buf, source)?;
                if got == 0 {
                    return Ok(None);
                }
                if got < len_buf.len() {
                    return Err(DatasetError::serialization(format!(
                        "truncated record length prefix in {}",
                        source.display()
                    )));
                }

                // The prefix is untrusted; grow with the bytes actually present.
                let len = u64::from(u32::from_be_bytes(len_buf));
                let mut payload = Vec::new();
                (&mut *reader)
                    .take(len)
                    .read_to_end(&mut payload)
                    .map_err(|e| DatasetError::storage_with_source(source, "failed to read record", e))?;
                if (payload.len() as u64) < len {
                    return Err(DatasetError::serialization(format!(
                        "truncated record in {}: expected {len} bytes, found {}",
                        source.display(),
                        payload.len()
                    )));
                }
                Ok(Some(payload))
            }
        }
    }
}

/// Reads until `buf` is full or input ends; returns the bytes read.
fn read_full(reader: &mut dyn BufRead, buf: &mut [u8], source: &Path) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(DatasetError::storage_with_source(source, "failed to read record", e)),
        }
    }
    Ok(filled)
}

/// Iterator over the raw record payloads of one shard.
pub struct FramedReader<R> {
    reader: R,
    framing: RecordFraming,
    source: PathBuf,
    done: bool,
}

impl<R: BufRead> FramedReader<R> {
    pub fn new(reader: R, framing: RecordFraming, source: impl Into<PathBuf>) -> Self {
        Self {
            reader,
            framing,
            source: source.into(),
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for FramedReader<R> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.framing.read_record(&mut self.reader, &self.source) {
            Ok(Some(payload)) => Some(Ok(payload)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
