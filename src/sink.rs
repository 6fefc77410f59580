use crate::schema::CanonicalSchema;
use crate::util::StagedFile;
use anyhow::{Context, Result};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Snappy: cheap to decompress, written once and scanned many times.
pub fn writer_properties(max_row_group_rows: usize) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .set_max_row_group_size(max_row_group_rows.max(1))
        .set_created_by(format!("pqpack {}", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Phase two of the write protocol: a Parquet file opened for a known schema.
/// Batches go to a staged file; [`ParquetSink::finish`] closes and promotes it.
/// A sink dropped without `finish` leaves nothing behind.
pub struct ParquetSink {
    stage: StagedFile,
    writer: ArrowWriter<BufWriter<File>>,
    rows: u64,
}

impl ParquetSink {
    pub fn open(
        dest: &Path,
        schema: &CanonicalSchema,
        max_row_group_rows: usize,
        write_buf_bytes: usize,
    ) -> Result<Self> {
        let (stage, file) = StagedFile::create(dest)?;
        let buffered = BufWriter::with_capacity(write_buf_bytes, file);
        let writer = ArrowWriter::try_new(
            buffered,
            schema.arrow_schema(),
            Some(writer_properties(max_row_group_rows)),
        )
        .with_context(|| format!("create parquet writer for {}", dest.display()))?;
        Ok(Self { stage, writer, rows: 0 })
    }

    /// Append one batch already cast to the canonical schema.
    pub fn write(&mut self, batch: &RecordBatch) -> Result<()> {
        self.writer
            .write(batch)
            .with_context(|| format!("write batch to {}", self.stage.dest().display()))?;
        self.rows += batch.num_rows() as u64;
        Ok(())
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    /// Write the footer, flush, and promote the file. Returns `(path, bytes, rows)`.
    pub fn finish(self) -> Result<(PathBuf, u64, u64)> {
        let ParquetSink { stage, writer, rows } = self;
        let buffered = writer
            .into_inner()
            .with_context(|| format!("close parquet writer for {}", stage.dest().display()))?;
        let file = buffered
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("flush {}", stage.dest().display()))?;
        file.sync_all()
            .with_context(|| format!("sync {}", stage.dest().display()))?;
        drop(file);
        let (path, bytes) = stage.commit()?;
        Ok((path, bytes, rows))
    }
}
