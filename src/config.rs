use std::path::{Path, PathBuf};

/// Default field separator of the exports this tool was built for.
pub const DEFAULT_SEPARATOR: &str = "¦";
/// Safety floor for the sampled chunk row count.
pub const MIN_CHUNK_ROWS: usize = 100_000;
pub const DEFAULT_SAMPLE_ROWS: usize = 100_000;
/// Byte ceiling for intermediate chunks and final files (100 MiB).
pub const DEFAULT_MAX_FILE_BYTES: u64 = 100 * 1024 * 1024;

/// What to do with a chunk whose header cannot be reconciled with the canonical schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum MismatchPolicy {
    /// Fail the whole job on the first mismatching chunk.
    #[default]
    Abort,
    /// Move the chunk to `<work_dir>/quarantine/`, report it and keep going.
    Quarantine,
}

/// Shape of the job output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum ConversionMode {
    /// Split, convert per chunk, then bin-pack into as few capped files as possible.
    #[default]
    Packed,
    /// Stream the whole input into one Parquet file, `chunk_rows` rows at a time.
    SingleFile,
}

/// User-facing job options with sensible defaults and builder chaining.
#[derive(Clone, Debug)]
pub struct JobOptions {
    pub input: PathBuf,
    pub output_prefix: PathBuf,        // finals: <prefix>_final_partNNNN.parquet
    pub separator: String,
    pub target_memory_bytes: Option<u64>, // None: half of the available RAM
    pub sample_rows: usize,
    pub max_file_bytes: u64,
    pub min_chunk_rows: usize,
    pub delete_temp_csv: bool,
    pub delete_temp_parquet: bool,
    pub mode: ConversionMode,
    pub mismatch_policy: MismatchPolicy,

    pub work_dir: Option<PathBuf>,     // if None, <prefix dir>/.pqpack_work/
    pub parallelism: Option<usize>,    // converter threads; None uses rayon's default
    pub progress: bool,
    pub progress_label: Option<String>,

    // IO tuning
    pub read_buffer_bytes: usize,
    pub write_buffer_bytes: usize,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            output_prefix: PathBuf::new(),
            separator: DEFAULT_SEPARATOR.to_string(),
            target_memory_bytes: None,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            min_chunk_rows: MIN_CHUNK_ROWS,
            delete_temp_csv: true,
            delete_temp_parquet: true,
            mode: ConversionMode::Packed,
            mismatch_policy: MismatchPolicy::Abort,

            work_dir: None,
            parallelism: None,
            progress: true,
            progress_label: None,

            read_buffer_bytes: 256 * 1024,
            write_buffer_bytes: 256 * 1024,
        }
    }
}

impl JobOptions {
    pub fn with_input(mut self, path: impl AsRef<Path>) -> Self {
        self.input = path.as_ref().to_path_buf();
        self
    }
    pub fn with_output_prefix(mut self, prefix: impl AsRef<Path>) -> Self {
        self.output_prefix = prefix.as_ref().to_path_buf();
        self
    }
    pub fn with_separator(mut self, sep: impl Into<String>) -> Self {
        self.separator = sep.into();
        self
    }
    pub fn with_target_memory_bytes(mut self, bytes: u64) -> Self {
        self.target_memory_bytes = Some(bytes.max(1));
        self
    }
    pub fn with_target_memory_gb(self, gb: f64) -> Self {
        let bytes = (gb.max(0.0) * (1u64 << 30) as f64) as u64;
        self.with_target_memory_bytes(bytes)
    }
    pub fn with_sample_rows(mut self, rows: usize) -> Self {
        self.sample_rows = rows.max(1);
        self
    }
    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes.max(1);
        self
    }
    pub fn with_max_file_mb(self, mb: u64) -> Self {
        self.with_max_file_bytes(mb.saturating_mul(1024 * 1024))
    }
    pub fn with_min_chunk_rows(mut self, rows: usize) -> Self {
        self.min_chunk_rows = rows.max(1);
        self
    }
    pub fn with_delete_temp_csv(mut self, yes: bool) -> Self {
        self.delete_temp_csv = yes;
        self
    }
    pub fn with_delete_temp_parquet(mut self, yes: bool) -> Self {
        self.delete_temp_parquet = yes;
        self
    }
    pub fn with_mode(mut self, mode: ConversionMode) -> Self {
        self.mode = mode;
        self
    }
    pub fn with_mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.mismatch_policy = policy;
        self
    }
    pub fn with_work_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.work_dir = Some(dir.as_ref().to_path_buf());
        self
    }
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads.max(1));
        self
    }
    pub fn with_progress(mut self, yes: bool) -> Self {
        self.progress = yes;
        self
    }
    pub fn with_progress_label(mut self, label: impl Into<String>) -> Self {
        self.progress_label = Some(label.into());
        self
    }

    // IO buffers tuning
    pub fn with_io_buffers(mut self, read_bytes: usize, write_bytes: usize) -> Self {
        self.read_buffer_bytes = read_bytes.max(8 * 1024);
        self.write_buffer_bytes = write_bytes.max(8 * 1024);
        self
    }

    /// File stem used for intermediate and final names (`bigfile` for `out/bigfile`).
    pub fn output_stem(&self) -> String {
        self.output_prefix
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "output".to_string())
    }

    /// Directory the final files land in.
    pub fn output_dir(&self) -> PathBuf {
        match self.output_prefix.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn resolved_work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .unwrap_or_else(|| self.output_dir().join(".pqpack_work"))
    }

    /// Final file path for 1-based group `n`.
    pub fn final_path(&self, n: usize) -> PathBuf {
        self.output_dir()
            .join(format!("{}_final_part{:04}.parquet", self.output_stem(), n))
    }

    /// Output path used by [`ConversionMode::SingleFile`].
    pub fn single_file_path(&self) -> PathBuf {
        self.output_dir().join(format!("{}.parquet", self.output_stem()))
    }
}
