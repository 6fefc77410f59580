//! Bin packing of converted chunks into as few capped final files as possible.
//!
//! [`pack_first_fit_decreasing`] is a pure function over byte sizes; [`merge_group`] and
//! [`pack_and_merge`] do the file work for the groups it returns.

use crate::converter::ConvertedChunk;
use crate::schema::CanonicalSchema;
use crate::sink::ParquetSink;
use crate::util::remove_if_exists;
use anyhow::{Context, Result};
use indicatif::ProgressBar;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::File;
use std::path::{Path, PathBuf};

/// Positions (into the sizes slice) placed together, in placement order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PackGroup {
    pub members: Vec<usize>,
    pub total_bytes: u64,
}

/// First-fit decreasing.
///
/// Items are visited largest first (stable, so equal sizes keep their input order). Each
/// goes into the first group, in creation order, whose total plus the item stays within
/// `ceiling`; otherwise it opens a new group. A group that already reaches the ceiling is
/// never offered anything else, so an oversized item always ends up alone.
pub fn pack_first_fit_decreasing(sizes: &[u64], ceiling: u64) -> Vec<PackGroup> {
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| sizes[b].cmp(&sizes[a]));

    let mut groups: Vec<PackGroup> = Vec::new();
    for item in order {
        let size = sizes[item];
        let slot = groups
            .iter()
            .position(|g| g.total_bytes < ceiling && g.total_bytes.saturating_add(size) <= ceiling);
        match slot {
            Some(g) => {
                let group = &mut groups[g];
                group.members.push(item);
                group.total_bytes += size;
            }
            None => groups.push(PackGroup { members: vec![item], total_bytes: size }),
        }
    }
    groups
}

/// One merged output file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinalFile {
    pub path: PathBuf,
    /// Size on disk after re-compression.
    pub bytes: u64,
    /// Sum of the member sizes the packing decision was based on.
    pub declared_bytes: u64,
    pub rows: u64,
    /// Chunk indices merged into this file, in merge order.
    pub members: Vec<usize>,
}

/// Merge settings shared by every group of a job.
#[derive(Clone, Debug)]
pub struct PackSettings {
    /// Row-group size of the final files.
    pub batch_rows: usize,
    pub write_buf_bytes: usize,
    /// Remove a group's converted chunks once its final file is written.
    pub delete_members: bool,
}

impl PackSettings {
    pub fn new(batch_rows: usize) -> Self {
        Self { batch_rows: batch_rows.max(1), write_buf_bytes: 256 * 1024, delete_members: false }
    }

    pub fn with_write_buffer(mut self, bytes: usize) -> Self {
        self.write_buf_bytes = bytes.max(8 * 1024);
        self
    }

    pub fn with_delete_members(mut self, yes: bool) -> Self {
        self.delete_members = yes;
        self
    }
}

/// Stream every member's batches through the canonical schema into one Parquet file.
pub fn merge_group(
    members: &[&ConvertedChunk],
    schema: &CanonicalSchema,
    dest: &Path,
    settings: &PackSettings,
) -> Result<FinalFile> {
    let mut sink = ParquetSink::open(dest, schema, settings.batch_rows, settings.write_buf_bytes)?;
    for member in members {
        let file = File::open(&member.path).with_context(|| format!("open {}", member.path.display()))?;
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("read parquet metadata of {}", member.path.display()))?
            .with_batch_size(settings.batch_rows.clamp(1, 64 * 1024))
            .build()
            .with_context(|| format!("build reader for {}", member.path.display()))?;
        for batch in reader {
            let batch = batch.with_context(|| format!("read batch from {}", member.path.display()))?;
            let cast = schema.cast_batch(member.index, &batch)?;
            sink.write(&cast)?;
        }
    }
    let (path, bytes, rows) = sink.finish()?;
    Ok(FinalFile {
        path,
        bytes,
        declared_bytes: members.iter().map(|m| m.bytes).sum(),
        rows,
        members: members.iter().map(|m| m.index).collect(),
    })
}

/// Group `converted` under `ceiling` and merge each group into `final_path(n)` (1-based).
pub fn pack_and_merge(
    converted: &[ConvertedChunk],
    schema: &CanonicalSchema,
    ceiling: u64,
    final_path: impl Fn(usize) -> PathBuf,
    settings: &PackSettings,
    pb: Option<ProgressBar>,
) -> Result<Vec<FinalFile>> {
    let sizes: Vec<u64> = converted.iter().map(|c| c.bytes).collect();
    let groups = pack_first_fit_decreasing(&sizes, ceiling);
    tracing::info!(inputs = converted.len(), groups = groups.len(), ceiling, "packed converted chunks");
    for (n, g) in groups.iter().enumerate() {
        tracing::debug!(group = n + 1, files = g.members.len(), bytes = g.total_bytes, "group");
    }

    let mut finals = Vec::with_capacity(groups.len());
    for (n, group) in groups.iter().enumerate() {
        let members: Vec<&ConvertedChunk> = group.members.iter().map(|&i| &converted[i]).collect();
        let dest = final_path(n + 1);
        let merged = merge_group(&members, schema, &dest, settings)
            .with_context(|| format!("merge group {} into {}", n + 1, dest.display()))?;
        tracing::info!(
            path = %merged.path.display(),
            bytes = merged.bytes,
            rows = merged.rows,
            members = merged.members.len(),
            "wrote final file"
        );
        if settings.delete_members {
            for m in &members {
                remove_if_exists(&m.path)?;
            }
        }
        finals.push(merged);
        if let Some(pb) = &pb {
            pb.inc(1);
        }
    }
    if let Some(pb) = pb {
        pb.finish_with_message("packing done");
    }
    Ok(finals)
}
