//! Per-chunk conversion: one header-carrying text chunk in, one Snappy Parquet file out,
//! every column text and pinned to the job's canonical schema.

use crate::error::PipelineError;
use crate::lines::{decode_line, for_each_raw_line, is_blank, parse_header, split_fields};
use crate::schema::CanonicalSchema;
use crate::sink::ParquetSink;
use crate::splitter::IntermediateChunk;
use crate::util::remove_if_exists;
use anyhow::{Context, Result};
use arrow::array::{ArrayRef, StringBuilder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// One Parquet file produced from one intermediate chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConvertedChunk {
    /// Index of the source chunk (input order), kept for deterministic packing.
    pub index: usize,
    pub path: PathBuf,
    pub bytes: u64,
    pub rows: u64,
}

#[derive(Clone, Debug)]
pub struct ConvertSettings {
    pub separator: String,
    /// Records held in memory before a batch is handed to the writer.
    pub batch_rows: usize,
    pub read_buf_bytes: usize,
    pub write_buf_bytes: usize,
    /// Remove the text chunk once its Parquet file is durably written.
    pub delete_source: bool,
    /// Once set, conversion stops at the next batch boundary.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl ConvertSettings {
    pub fn new(separator: impl Into<String>, batch_rows: usize) -> Self {
        Self {
            separator: separator.into(),
            batch_rows: batch_rows.max(1),
            read_buf_bytes: 256 * 1024,
            write_buf_bytes: 256 * 1024,
            delete_source: false,
            cancel: None,
        }
    }

    pub fn with_delete_source(mut self, yes: bool) -> Self {
        self.delete_source = yes;
        self
    }

    pub fn with_cancel_flag(mut self, flag: Option<Arc<AtomicBool>>) -> Self {
        self.cancel = flag;
        self
    }

    fn check_cancelled(&self) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => {
                Err(PipelineError::Cancelled { stage: "converting" }.into())
            }
            _ => Ok(()),
        }
    }

    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buf_bytes = read_bytes.max(8 * 1024);
        self.write_buf_bytes = write_bytes.max(8 * 1024);
        self
    }
}

/// `<dir>/<stem>_partNNNN.csv` -> `<dir>/<stem>_partNNNN.parquet`
pub fn converted_path(chunk_path: &Path) -> PathBuf {
    chunk_path.with_extension("parquet")
}

/// Column builders for up to `batch_rows` records of one chunk.
struct TextBatchBuilder {
    schema: SchemaRef,
    builders: Vec<StringBuilder>,
    rows: usize,
}

impl TextBatchBuilder {
    fn new(columns: &[String], capacity: usize) -> Self {
        let fields: Vec<Field> = columns
            .iter()
            .map(|c| Field::new(c.as_str(), DataType::Utf8, true))
            .collect();
        let builders = columns
            .iter()
            .map(|_| StringBuilder::with_capacity(capacity, capacity * 16))
            .collect();
        Self { schema: Arc::new(Schema::new(fields)), builders, rows: 0 }
    }

    /// Append one record. Trailing fields the record does not carry become null; an
    /// empty field stays an empty string.
    fn push(&mut self, line: &str, separator: &str, chunk: usize, line_no: u64) -> Result<()> {
        let expected = self.builders.len();
        let mut found = 0usize;
        for value in split_fields(line, separator) {
            if found >= expected {
                let found = found + 1 + split_fields(line, separator).skip(found + 1).count();
                return Err(PipelineError::MalformedRecord { chunk, line: line_no, expected, found }.into());
            }
            self.builders[found].append_value(value);
            found += 1;
        }
        for b in &mut self.builders[found..] {
            b.append_null();
        }
        self.rows += 1;
        Ok(())
    }

    fn take_batch(&mut self) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = self
            .builders
            .iter_mut()
            .map(|b| Arc::new(b.finish()) as ArrayRef)
            .collect();
        self.rows = 0;
        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }
}

/// Convert a header-carrying text stream (file or in-memory buffer) into `dest`.
/// Returns `(path, bytes, rows)` of the written Parquet file.
pub fn convert_reader<R: BufRead>(
    reader: &mut R,
    chunk: usize,
    schema: &CanonicalSchema,
    settings: &ConvertSettings,
    dest: &Path,
) -> Result<(PathBuf, u64, u64)> {
    let mut header = Vec::new();
    reader
        .read_until(b'\n', &mut header)
        .with_context(|| format!("read header of chunk {chunk}"))?;
    let columns = if is_blank(&header) {
        Vec::new()
    } else {
        parse_header(&header, &settings.separator)
    };
    // reject before anything is written
    schema.check_columns(chunk, &columns)?;
    settings.check_cancelled()?;

    let mut sink = ParquetSink::open(dest, schema, settings.batch_rows, settings.write_buf_bytes)?;
    let mut batch = TextBatchBuilder::new(&columns, settings.batch_rows.min(8 * 1024));
    let mut line_no = 1u64;

    for_each_raw_line(reader, |raw| {
        line_no += 1;
        if is_blank(raw) {
            return Ok(true);
        }
        batch.push(&decode_line(raw), &settings.separator, chunk, line_no)?;
        if batch.rows >= settings.batch_rows {
            settings.check_cancelled()?;
            let cast = schema.cast_batch(chunk, &batch.take_batch()?)?;
            sink.write(&cast)?;
        }
        Ok(true)
    })
    .with_context(|| format!("convert chunk {chunk}"))?;

    settings.check_cancelled()?;
    if batch.rows > 0 {
        let cast = schema.cast_batch(chunk, &batch.take_batch()?)?;
        sink.write(&cast)?;
    }
    sink.finish()
}

/// Convert one intermediate chunk next to itself (`.csv` -> `.parquet`).
pub fn convert_chunk(
    chunk: &IntermediateChunk,
    schema: &CanonicalSchema,
    settings: &ConvertSettings,
) -> Result<ConvertedChunk> {
    let file = File::open(&chunk.path).with_context(|| format!("open {}", chunk.path.display()))?;
    let mut reader = BufReader::with_capacity(settings.read_buf_bytes, file);
    let dest = converted_path(&chunk.path);

    let (path, bytes, rows) = convert_reader(&mut reader, chunk.index, schema, settings, &dest)
        .with_context(|| format!("convert {}", chunk.path.display()))?;
    drop(reader);

    tracing::debug!(index = chunk.index, rows, bytes, path = %path.display(), "converted chunk");
    if settings.delete_source {
        remove_if_exists(&chunk.path)?;
    }
    Ok(ConvertedChunk { index: chunk.index, path, bytes, rows })
}
