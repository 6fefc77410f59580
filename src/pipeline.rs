use crate::concurrency::{map_bounded, pool_size};
use crate::config::{ConversionMode, JobOptions, MismatchPolicy};
use crate::converter::{convert_chunk, convert_reader, converted_path, ConvertSettings, ConvertedChunk};
use crate::error::PipelineError;
use crate::integrity::{count_parquet_rows, verify_outputs};
use crate::mem::{available_memory_bytes, default_memory_budget};
use crate::packer::{pack_and_merge, PackSettings};
use crate::progress::{bytes_bar_if, count_bar_if};
use crate::report::{JobReport, JobStats};
use crate::sampler::{sample_bytes_per_record, SizeEstimate};
use crate::schema::{determine_schema, CanonicalSchema};
use crate::splitter::{IntermediateChunk, Splitter};
use crate::util::{file_len, init_tracing_once, remove_empty_staging, remove_if_exists};
use anyhow::{bail, Context, Result};
use parking_lot::Mutex;
use std::any::Any;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Chunked delimited-text to Parquet job: sample, split, convert, pack.
#[derive(Clone, Default)]
pub struct ChunkedConverter {
    pub(crate) opts: JobOptions,
    cancel: Option<Arc<AtomicBool>>,
}

/// How much a job may hold in memory, derived once from the sample.
#[derive(Clone, Copy, Debug)]
struct Sizing {
    estimate: SizeEstimate,
    budget: u64,
    /// Rows per batch for a stage that runs alone (single-file conversion, packing).
    chunk_rows: usize,
}

/// Successful outcome of [`ChunkedConverter::try_run`].
#[derive(Clone, Debug)]
pub struct JobOutput {
    pub outputs: Vec<PathBuf>,
    pub stats: JobStats,
}

impl ChunkedConverter {
    pub fn new(input: impl AsRef<Path>, output_prefix: impl AsRef<Path>) -> Self {
        Self::from_options(JobOptions::default().with_input(input).with_output_prefix(output_prefix))
    }

    pub fn from_options(opts: JobOptions) -> Self {
        Self { opts, cancel: None }
    }

    pub fn options(&self) -> &JobOptions {
        &self.opts
    }

    // -------- Builder methods --------
    pub fn separator(mut self, sep: impl Into<String>) -> Self { self.opts = self.opts.with_separator(sep); self }
    pub fn target_memory_bytes(mut self, bytes: u64) -> Self { self.opts = self.opts.with_target_memory_bytes(bytes); self }
    pub fn target_memory_gb(mut self, gb: f64) -> Self { self.opts = self.opts.with_target_memory_gb(gb); self }
    pub fn sample_rows(mut self, rows: usize) -> Self { self.opts = self.opts.with_sample_rows(rows); self }
    pub fn max_file_bytes(mut self, bytes: u64) -> Self { self.opts = self.opts.with_max_file_bytes(bytes); self }
    pub fn max_file_mb(mut self, mb: u64) -> Self { self.opts = self.opts.with_max_file_mb(mb); self }
    pub fn min_chunk_rows(mut self, rows: usize) -> Self { self.opts = self.opts.with_min_chunk_rows(rows); self }
    pub fn delete_temp_csv(mut self, yes: bool) -> Self { self.opts = self.opts.with_delete_temp_csv(yes); self }
    pub fn delete_temp_parquet(mut self, yes: bool) -> Self { self.opts = self.opts.with_delete_temp_parquet(yes); self }
    pub fn mode(mut self, mode: ConversionMode) -> Self { self.opts = self.opts.with_mode(mode); self }
    pub fn mismatch_policy(mut self, policy: MismatchPolicy) -> Self { self.opts = self.opts.with_mismatch_policy(policy); self }
    pub fn work_dir(mut self, dir: impl AsRef<Path>) -> Self { self.opts = self.opts.with_work_dir(dir); self }
    pub fn parallelism(mut self, threads: usize) -> Self { self.opts = self.opts.with_parallelism(threads); self }
    pub fn progress(mut self, yes: bool) -> Self { self.opts = self.opts.with_progress(yes); self }
    pub fn progress_label(mut self, label: impl Into<String>) -> Self { self.opts = self.opts.with_progress_label(label); self }
    pub fn io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self { self.opts = self.opts.with_io_buffers(read_bytes, write_bytes); self }

    /// Checked before each chunk, between converted batches and before packing; once set
    /// the job stops with [`PipelineError::Cancelled`]. Single-file jobs check it between
    /// batches.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self { self.cancel = Some(flag); self }

    // -------- Entry points --------

    /// Run the job and describe the outcome. Never returns an error and never lets a
    /// panic escape.
    pub fn run(self) -> JobReport {
        init_tracing_once();
        let mut stats = JobStats::default();
        let outcome = catch_unwind(AssertUnwindSafe(|| self.execute(&mut stats)));
        match outcome {
            Ok(Ok(outputs)) => JobReport::succeeded(outputs, stats),
            Ok(Err(e)) => {
                tracing::error!(error = %format!("{e:#}"), "conversion failed");
                JobReport::failed(&e, stats)
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                tracing::error!(%detail, "conversion panicked");
                JobReport::panicked(detail)
            }
        }
    }

    /// Same job, with failures surfaced as `anyhow::Error`.
    pub fn try_run(self) -> Result<JobOutput> {
        init_tracing_once();
        let mut stats = JobStats::default();
        let outputs = self.execute(&mut stats)?;
        Ok(JobOutput { outputs, stats })
    }

    // -------- Stages --------

    fn execute(&self, stats: &mut JobStats) -> Result<Vec<PathBuf>> {
        self.validate()?;
        let opts = &self.opts;

        let budget = match opts.target_memory_bytes {
            Some(b) => b,
            None => default_memory_budget(),
        };
        let available = available_memory_bytes();
        if available > 0 && budget > available {
            tracing::warn!(budget, available, "memory budget exceeds available memory");
        }

        let estimate = sample_bytes_per_record(&opts.input, &opts.separator, opts.sample_rows, opts.read_buffer_bytes)?;
        let chunk_rows = estimate.chunk_rows(budget, opts.min_chunk_rows);
        stats.bytes_per_record = estimate.bytes_per_record;
        stats.chunk_rows = chunk_rows;
        tracing::info!(budget, chunk_rows, mode = ?opts.mode, "starting conversion of {}", opts.input.display());

        let sizing = Sizing { estimate, budget, chunk_rows };
        match opts.mode {
            ConversionMode::SingleFile => self.run_single_file(sizing, stats),
            ConversionMode::Packed => self.run_packed(sizing, stats),
        }
    }

    fn validate(&self) -> Result<()> {
        let opts = &self.opts;
        if opts.input.as_os_str().is_empty() {
            return Err(PipelineError::Config("input path is required".into()).into());
        }
        if opts.output_prefix.as_os_str().is_empty() {
            return Err(PipelineError::Config("output prefix is required".into()).into());
        }
        if opts.separator.is_empty() {
            return Err(PipelineError::Config("separator must not be empty".into()).into());
        }
        Ok(())
    }

    fn check_cancelled(&self, stage: &'static str) -> Result<()> {
        match &self.cancel {
            Some(flag) if flag.load(Ordering::Relaxed) => Err(PipelineError::Cancelled { stage }.into()),
            _ => Ok(()),
        }
    }

    fn run_packed(&self, sizing: Sizing, stats: &mut JobStats) -> Result<Vec<PathBuf>> {
        let opts = &self.opts;
        let work_dir = opts.resolved_work_dir();
        let stem = opts.output_stem();
        fs::create_dir_all(opts.output_dir())
            .with_context(|| format!("create {}", opts.output_dir().display()))?;

        let input_bytes = file_len(&opts.input)?;
        let pb = bytes_bar_if(opts.progress, input_bytes, opts.progress_label.as_deref());
        let split = Splitter::new(opts.separator.clone(), opts.max_file_bytes)
            .with_io_buffers(opts.read_buffer_bytes, opts.write_buffer_bytes)
            .split(&opts.input, &work_dir, &stem, pb)?;
        stats.input_rows = split.total_rows;
        stats.intermediate_chunks = split.chunks.len();
        stats.oversized_chunks = split.oversized_chunks;

        let result = self.convert_and_pack(&split.chunks, &work_dir, sizing, stats);
        if result.is_err() {
            self.discard_intermediates(&split.chunks);
        }
        remove_empty_staging(&work_dir);
        remove_empty_staging(&opts.output_dir());
        if opts.work_dir.is_none() {
            // only succeeds once every intermediate is gone
            let _ = fs::remove_dir(&work_dir);
        }
        result
    }

    fn convert_and_pack(
        &self,
        chunks: &[IntermediateChunk],
        work_dir: &Path,
        sizing: Sizing,
        stats: &mut JobStats,
    ) -> Result<Vec<PathBuf>> {
        let opts = &self.opts;
        let first = chunks.first().context("splitter produced no chunks")?;
        let schema = determine_schema(&first.path, &opts.separator)?;
        tracing::info!(columns = schema.len(), "canonical schema from {}", first.path.display());

        let converted = self.convert_all(chunks, &schema, work_dir, sizing, stats)?;
        stats.converted_chunks = converted.len();

        self.check_cancelled("packing")?;
        let pb = count_bar_if(opts.progress, converted.len() as u64, "packing");
        let finals = pack_and_merge(
            &converted,
            &schema,
            opts.max_file_bytes,
            |n| opts.final_path(n),
            &PackSettings::new(sizing.chunk_rows)
                .with_write_buffer(opts.write_buffer_bytes)
                .with_delete_members(opts.delete_temp_parquet),
            pb,
        )?;

        let expected: u64 = converted.iter().map(|c| c.rows).sum();
        stats.output_rows = verify_outputs(&finals, expected)?;
        stats.final_files = finals.len();
        stats.output_bytes = finals.iter().map(|f| f.bytes).sum();
        tracing::info!(
            files = stats.final_files,
            rows = stats.output_rows,
            bytes = stats.output_bytes,
            quarantined = stats.quarantined.len(),
            "conversion complete"
        );
        Ok(finals.into_iter().map(|f| f.path).collect())
    }

    /// Convert every chunk on a pool bounded by `parallelism`. Results come back in chunk
    /// order; under [`MismatchPolicy::Quarantine`] chunk-local failures are set aside.
    /// Workers split the memory budget, so each buffers at most its share in rows.
    fn convert_all(
        &self,
        chunks: &[IntermediateChunk],
        schema: &CanonicalSchema,
        work_dir: &Path,
        sizing: Sizing,
        stats: &mut JobStats,
    ) -> Result<Vec<ConvertedChunk>> {
        let opts = &self.opts;
        let workers = pool_size(opts.parallelism, chunks.len());
        let batch_rows = sizing.estimate.rows_per_worker(sizing.budget, workers, opts.min_chunk_rows);
        stats.workers = workers;
        stats.worker_batch_rows = batch_rows;
        tracing::info!(workers, batch_rows, budget = sizing.budget, "converting chunks");

        let settings = ConvertSettings::new(opts.separator.clone(), batch_rows)
            .with_io_buffers(opts.read_buffer_bytes, opts.write_buffer_bytes)
            .with_delete_source(opts.delete_temp_csv)
            .with_cancel_flag(self.cancel.clone());
        let quarantine = opts.mismatch_policy == MismatchPolicy::Quarantine;
        let quarantine_dir = work_dir.join("quarantine");
        let quarantined: Mutex<Vec<PathBuf>> = Mutex::new(Vec::new());
        let pb = count_bar_if(opts.progress, chunks.len() as u64, "converting");

        let results = map_bounded(chunks, Some(workers), |chunk| {
            self.check_cancelled("converting chunks")?;
            let outcome = match convert_chunk(chunk, schema, &settings) {
                Ok(done) => Some(done),
                Err(e) if quarantine && is_chunk_local(&e) => {
                    let moved = quarantine_chunk(&chunk.path, &quarantine_dir)?;
                    tracing::warn!(chunk = chunk.index, path = %moved.display(), error = %e, "quarantined chunk");
                    quarantined.lock().push(moved);
                    None
                }
                Err(e) => return Err(e),
            };
            if let Some(pb) = &pb {
                pb.inc(1);
            }
            Ok(outcome)
        })?;
        if let Some(pb) = pb {
            pb.finish_with_message("conversion done");
        }

        let mut moved = quarantined.into_inner();
        moved.sort();
        stats.quarantined = moved;
        let converted: Vec<ConvertedChunk> = results.into_iter().flatten().collect();
        tracing::info!(converted = converted.len(), quarantined = stats.quarantined.len(), "converted chunks");
        Ok(converted)
    }

    /// Stream the whole input into one Parquet file, `chunk_rows` records per batch.
    fn run_single_file(&self, sizing: Sizing, stats: &mut JobStats) -> Result<Vec<PathBuf>> {
        let opts = &self.opts;
        let dest = opts.single_file_path();
        fs::create_dir_all(opts.output_dir())
            .with_context(|| format!("create {}", opts.output_dir().display()))?;
        let schema = determine_schema(&opts.input, &opts.separator)?;
        let settings = ConvertSettings::new(opts.separator.clone(), sizing.chunk_rows)
            .with_io_buffers(opts.read_buffer_bytes, opts.write_buffer_bytes)
            .with_cancel_flag(self.cancel.clone());
        stats.workers = 1;
        stats.worker_batch_rows = sizing.chunk_rows;

        let file = File::open(&opts.input).with_context(|| format!("open {}", opts.input.display()))?;
        let pb = bytes_bar_if(opts.progress, file_len(&opts.input)?, opts.progress_label.as_deref());
        let source: Box<dyn Read> = match &pb {
            Some(pb) => Box::new(pb.wrap_read(file)),
            None => Box::new(file),
        };
        let mut reader = BufReader::with_capacity(opts.read_buffer_bytes, source);
        let result = convert_reader(&mut reader, 1, &schema, &settings, &dest);
        remove_empty_staging(&opts.output_dir());
        let (path, bytes, rows) = result.with_context(|| format!("convert {}", opts.input.display()))?;
        if let Some(pb) = pb {
            pb.finish_with_message("conversion done");
        }

        let on_disk = count_parquet_rows(&path)?;
        if on_disk != rows {
            bail!("{} holds {} rows but {} were written to it", path.display(), on_disk, rows);
        }
        stats.input_rows = rows;
        stats.converted_chunks = 1;
        stats.final_files = 1;
        stats.output_rows = rows;
        stats.output_bytes = bytes;
        tracing::info!(rows, bytes, path = %path.display(), "conversion complete");
        Ok(vec![path])
    }

    /// Remove the intermediates a failed job leaves behind, honouring the delete flags.
    fn discard_intermediates(&self, chunks: &[IntermediateChunk]) {
        for chunk in chunks {
            if self.opts.delete_temp_csv {
                if let Err(e) = remove_if_exists(&chunk.path) {
                    tracing::warn!(error = %e, "failed to remove intermediate chunk");
                }
            }
            if self.opts.delete_temp_parquet {
                if let Err(e) = remove_if_exists(&converted_path(&chunk.path)) {
                    tracing::warn!(error = %e, "failed to remove converted chunk");
                }
            }
        }
    }
}

fn is_chunk_local(err: &anyhow::Error) -> bool {
    err.chain()
        .find_map(|c| c.downcast_ref::<PipelineError>())
        .is_some_and(PipelineError::is_chunk_local)
}

/// Move a rejected chunk into `dir`, keeping its file name.
fn quarantine_chunk(path: &Path, dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let name = path
        .file_name()
        .with_context(|| format!("chunk path has no file name: {}", path.display()))?;
    let dest = dir.join(name);
    fs::rename(path, &dest).with_context(|| format!("move {} -> {}", path.display(), dest.display()))?;
    Ok(dest)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with a non-string payload".to_string()
    }
}
