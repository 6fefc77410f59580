//! Streaming splitter: one pass over the input, cutting it at line boundaries into
//! header-carrying chunk files that each stay under a byte ceiling.

use crate::error::PipelineError;
use crate::lines::{for_each_raw_line, is_blank, parse_header, take_progress, CountingReader};
use crate::util::{remove_if_exists, StagedFile};
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// One text chunk produced by the splitter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntermediateChunk {
    /// 1-based position in input order.
    pub index: usize,
    pub path: PathBuf,
    /// Size on disk, header included.
    pub bytes: u64,
    /// Data records (blank lines excluded).
    pub rows: u64,
}

#[derive(Clone, Debug)]
pub struct SplitOutput {
    /// Column names declared by the input header.
    pub columns: Vec<String>,
    pub chunks: Vec<IntermediateChunk>,
    pub total_rows: u64,
    /// Chunks over the ceiling because a single line was larger than it.
    pub oversized_chunks: usize,
}

pub fn chunk_csv_path(work_dir: &Path, stem: &str, index: usize) -> PathBuf {
    work_dir.join(format!("{stem}_part{index:04}.csv"))
}

/// A chunk being written. The header is emitted on open; `close` flushes and promotes it.
struct OpenChunk {
    index: usize,
    stage: StagedFile,
    writer: BufWriter<File>,
    bytes: u64,
    rows: u64,
    lines: u64,
}

impl OpenChunk {
    fn open(work_dir: &Path, stem: &str, index: usize, header: &[u8], write_buf: usize) -> Result<Self> {
        let dest = chunk_csv_path(work_dir, stem, index);
        let (stage, file) = StagedFile::create(&dest)?;
        let mut writer = BufWriter::with_capacity(write_buf, file);
        writer
            .write_all(header)
            .with_context(|| format!("write header to {}", dest.display()))?;
        Ok(Self { index, stage, writer, bytes: header.len() as u64, rows: 0, lines: 0 })
    }

    fn push(&mut self, line: &[u8]) -> Result<()> {
        self.writer
            .write_all(line)
            .with_context(|| format!("write {}", self.stage.dest().display()))?;
        self.bytes += line.len() as u64;
        self.lines += 1;
        if !is_blank(line) {
            self.rows += 1;
        }
        Ok(())
    }

    fn close(self) -> Result<IntermediateChunk> {
        let OpenChunk { index, stage, writer, rows, .. } = self;
        let file = writer
            .into_inner()
            .map_err(|e| e.into_error())
            .with_context(|| format!("flush {}", stage.dest().display()))?;
        drop(file);
        let (path, bytes) = stage.commit()?;
        Ok(IntermediateChunk { index, path, bytes, rows })
    }
}

/// Chunks committed by a split still in progress. Unless the split completes and
/// calls [`CommittedChunks::keep`], dropping it removes them again.
struct CommittedChunks {
    chunks: Vec<IntermediateChunk>,
    kept: bool,
}

impl CommittedChunks {
    fn keep(mut self) -> Vec<IntermediateChunk> {
        self.kept = true;
        std::mem::take(&mut self.chunks)
    }
}

impl Drop for CommittedChunks {
    fn drop(&mut self) {
        if self.kept {
            return;
        }
        for chunk in &self.chunks {
            if let Err(e) = remove_if_exists(&chunk.path) {
                tracing::warn!(path = %chunk.path.display(), error = %e, "failed to remove chunk of a failed split");
            }
        }
    }
}

/// Splitter settings: the separator (only used to name the columns of the header) and
/// the per-chunk byte ceiling.
#[derive(Clone, Debug)]
pub struct Splitter {
    pub separator: String,
    pub max_chunk_bytes: u64,
    pub read_buf_bytes: usize,
    pub write_buf_bytes: usize,
}

impl Splitter {
    pub fn new(separator: impl Into<String>, max_chunk_bytes: u64) -> Self {
        Self {
            separator: separator.into(),
            max_chunk_bytes: max_chunk_bytes.max(1),
            read_buf_bytes: 256 * 1024,
            write_buf_bytes: 256 * 1024,
        }
    }

    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buf_bytes = read_bytes.max(8 * 1024);
        self.write_buf_bytes = write_bytes.max(8 * 1024);
        self
    }

    /// Split `input` into `<work_dir>/<stem>_partNNNN.csv` files of at most
    /// `max_chunk_bytes` each (header included). A single line larger than the ceiling
    /// still goes whole into a chunk of its own. If the split fails, the chunks it
    /// already committed are removed.
    pub fn split(
        &self,
        input: &Path,
        work_dir: &Path,
        stem: &str,
        pb: Option<ProgressBar>,
    ) -> Result<SplitOutput> {
        let max_chunk_bytes = self.max_chunk_bytes;
        let write_buf_bytes = self.write_buf_bytes;
        fs::create_dir_all(work_dir).with_context(|| format!("create {}", work_dir.display()))?;
        let file = File::open(input).with_context(|| format!("open {}", input.display()))?;
        let (counting, counter) = CountingReader::new(file);
        let mut reader = BufReader::with_capacity(self.read_buf_bytes, counting);

        let mut header = Vec::new();
        reader
            .read_until(b'\n', &mut header)
            .with_context(|| format!("read header of {}", input.display()))?;
        if is_blank(&header) {
            return Err(PipelineError::EmptyInput { path: input.to_path_buf() }.into());
        }
        let columns = parse_header(&header, &self.separator);
        let mut last = 0u64;
        if let Some(pb) = &pb {
            pb.inc(take_progress(&counter, &mut last));
        }

        let header_len = header.len() as u64;
        let mut committed = CommittedChunks { chunks: Vec::new(), kept: false };
        let mut current = OpenChunk::open(work_dir, stem, 1, &header, write_buf_bytes)?;

        for_each_raw_line(&mut reader, |line| {
            let line_len = line.len() as u64;
            if current.bytes + line_len > max_chunk_bytes && current.lines > 0 {
                let next = OpenChunk::open(work_dir, stem, current.index + 1, &header, write_buf_bytes)?;
                let done = std::mem::replace(&mut current, next);
                committed.chunks.push(done.close()?);
            }
            if header_len + line_len > max_chunk_bytes {
                tracing::warn!(
                    chunk = current.index,
                    line_bytes = line_len,
                    ceiling = max_chunk_bytes,
                    "line exceeds the chunk ceiling; it gets a chunk of its own"
                );
            }
            current.push(line)?;
            if let Some(pb) = &pb {
                pb.inc(take_progress(&counter, &mut last));
            }
            Ok(true)
        })
        .with_context(|| format!("split {}", input.display()))?;
        committed.chunks.push(current.close()?);
        let chunks = committed.keep();

        if let Some(pb) = pb {
            pb.finish_with_message("split done");
        }

        let total_rows = chunks.iter().map(|c| c.rows).sum();
        let oversized_chunks = chunks.iter().filter(|c| c.bytes > max_chunk_bytes).count();
        tracing::info!(
            chunks = chunks.len(),
            rows = total_rows,
            oversized = oversized_chunks,
            "split {}",
            input.display()
        );
        for c in &chunks {
            tracing::debug!(index = c.index, bytes = c.bytes, rows = c.rows, path = %c.path.display(), "chunk");
        }

        Ok(SplitOutput { columns, chunks, total_rows, oversized_chunks })
    }
}
