mod config;
mod error;
mod util;
mod mem;
mod progress;
mod concurrency;

mod lines;
mod sampler;
mod splitter;
mod schema;
mod sink;
mod converter;
mod packer;
mod integrity;
mod report;
mod pipeline;
mod cli;

mod classify;
mod idle;
mod object_store;

pub use crate::config::{
    ConversionMode, JobOptions, MismatchPolicy, DEFAULT_MAX_FILE_BYTES, DEFAULT_SAMPLE_ROWS, DEFAULT_SEPARATOR,
    MIN_CHUNK_ROWS,
};
pub use crate::error::{ErrorKind, PipelineError};
pub use crate::pipeline::{ChunkedConverter, JobOutput};
pub use crate::report::{JobError, JobReport, JobStats};
pub use crate::cli::{parse_args, USAGE};

// Stage building blocks, usable on their own.
pub use crate::sampler::{chunk_rows, record_footprint, sample_bytes_per_record, SizeEstimate};
pub use crate::splitter::{chunk_csv_path, IntermediateChunk, SplitOutput, Splitter};
pub use crate::schema::{determine_schema, CanonicalSchema};
pub use crate::sink::{writer_properties, ParquetSink};
pub use crate::converter::{convert_chunk, convert_reader, converted_path, ConvertSettings, ConvertedChunk};
pub use crate::packer::{merge_group, pack_and_merge, pack_first_fit_decreasing, FinalFile, PackGroup, PackSettings};
pub use crate::integrity::{count_parquet_rows, verify_outputs};

// Expose multiprogress and progress helpers.
pub use crate::progress::{set_global_multiprogress, make_count_progress, make_progress_bar_labeled};

// Expose memory helpers so callers can size budgets themselves.
pub use crate::mem::{available_memory_bytes, available_memory_fraction, default_memory_budget};

pub use crate::util::{init_tracing_once, parse_byte_size, StagedFile};
pub use crate::concurrency::{map_bounded, pool_size};

// Collaborators around a job: classification, upload, idle detection.
pub use crate::classify::{
    build_request, parse_classification, ChatBackend, ChatClassifier, ChatMessage, ChatRequest, Classification,
    Classifier,
};
pub use crate::object_store::{upload_file, upload_outputs, LocalDirStore, ObjectStore};
pub use crate::idle::{IdlePolicy, StaticSamples, UtilizationSource};
