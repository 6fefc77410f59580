//! Memory-footprint sampling: estimate how many bytes one parsed record occupies so a
//! row-count chunk size can be derived from a memory budget.

use crate::error::PipelineError;
use crate::lines::{decode_line, for_each_raw_line, is_blank, split_fields};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::BufReader;
use std::mem::size_of;
use std::path::Path;

/// Bytes-per-record derived once from a prefix of the input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SizeEstimate {
    pub bytes_per_record: f64,
    pub records_sampled: usize,
}

impl SizeEstimate {
    /// Rows per chunk for `target_bytes` of memory, never below `min_chunk_rows`.
    pub fn chunk_rows(&self, target_bytes: u64, min_chunk_rows: usize) -> usize {
        chunk_rows(target_bytes, self.bytes_per_record, min_chunk_rows)
    }

    /// Rows each of `workers` concurrent converters may buffer when they share
    /// `target_bytes` between them.
    pub fn rows_per_worker(&self, target_bytes: u64, workers: usize, min_chunk_rows: usize) -> usize {
        self.chunk_rows(target_bytes / workers.max(1) as u64, min_chunk_rows)
    }
}

/// `max(floor(target_bytes / bytes_per_record), min_chunk_rows)`.
pub fn chunk_rows(target_bytes: u64, bytes_per_record: f64, min_chunk_rows: usize) -> usize {
    if !(bytes_per_record.is_finite() && bytes_per_record > 0.0) {
        return min_chunk_rows;
    }
    let rows = (target_bytes as f64 / bytes_per_record).floor();
    (rows as usize).max(min_chunk_rows)
}

/// In-memory footprint of one record held as owned text cells.
#[inline]
pub fn record_footprint<'a>(fields: impl Iterator<Item = &'a str>) -> usize {
    size_of::<Vec<String>>()
        + fields
            .map(|f| size_of::<String>() + f.len())
            .sum::<usize>()
}

/// Read the header and at most `sample_rows` records of `path` and return the average
/// footprint per record. Blank lines are not records.
pub fn sample_bytes_per_record(
    path: &Path,
    separator: &str,
    sample_rows: usize,
    read_buf_bytes: usize,
) -> Result<SizeEstimate> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::with_capacity(read_buf_bytes.max(8 * 1024), file);

    let mut header_seen = false;
    let mut records = 0usize;
    let mut footprint = 0usize;

    for_each_raw_line(&mut reader, |raw| {
        if !header_seen {
            header_seen = true;
            return Ok(true);
        }
        if is_blank(raw) {
            return Ok(true);
        }
        let line = decode_line(raw);
        footprint += record_footprint(split_fields(&line, separator));
        records += 1;
        Ok(records < sample_rows)
    })
    .with_context(|| format!("sample {}", path.display()))?;

    if records == 0 {
        return Err(PipelineError::EmptyInput { path: path.to_path_buf() }.into());
    }

    let estimate = SizeEstimate {
        bytes_per_record: footprint as f64 / records as f64,
        records_sampled: records,
    };
    tracing::info!(
        records = estimate.records_sampled,
        bytes_per_record = estimate.bytes_per_record,
        "sampled input"
    );
    Ok(estimate)
}
