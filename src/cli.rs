//! Command-line parsing for the `pqpack` binary.

use crate::config::{ConversionMode, JobOptions, MismatchPolicy};
use crate::error::PipelineError;
use crate::util::parse_byte_size;
use anyhow::Result;

pub const USAGE: &str = "\
Usage: pqpack <input> <output_prefix> [options]

Options:
  --sep <S>              Field separator (default: ¦)
  --memory <SIZE>        Memory budget per chunk, e.g. 18GB (default: half of free RAM)
  --sample-rows <N>      Records sampled to size chunks (default: 100000)
  --max-size <SIZE>      Ceiling for chunks and final files (default: 100MB)
  --min-chunk-rows <N>   Lower bound on rows per chunk (default: 100000)
  --keep-csv             Keep intermediate text chunks
  --keep-parquet         Keep per-chunk Parquet files
  --threads <N>          Conversion threads (default: all cores)
  --single-file          Write one Parquet file instead of packed parts
  --quarantine           Set aside chunks with a mismatching header instead of failing
  --work-dir <DIR>       Directory for intermediates (default: <output dir>/.pqpack_work)
  --no-progress          Disable progress bars

Examples:
  pqpack export.txt out/export --memory 18GB
  pqpack data.csv out/data --sep , --max-size 80MB --threads 4";

fn config_err(msg: impl Into<String>) -> anyhow::Error {
    PipelineError::Config(msg.into()).into()
}

fn value_of<'a>(flag: &str, it: &mut impl Iterator<Item = &'a String>) -> Result<&'a String> {
    it.next().ok_or_else(|| config_err(format!("{flag} needs a value")))
}

fn parse_count(flag: &str, raw: &str) -> Result<usize> {
    raw.parse::<usize>()
        .map_err(|_| config_err(format!("{flag} expects a whole number, got {raw:?}")))
}

/// Parse everything after the program name into job options.
pub fn parse_args(args: &[String]) -> Result<JobOptions> {
    let mut positional = Vec::new();
    let mut opts = JobOptions::default();
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--sep" => opts = opts.with_separator(value_of(arg, &mut it)?.clone()),
            "--memory" => opts = opts.with_target_memory_bytes(parse_byte_size(value_of(arg, &mut it)?)?),
            "--sample-rows" => opts = opts.with_sample_rows(parse_count(arg, value_of(arg, &mut it)?)?),
            "--max-size" => opts = opts.with_max_file_bytes(parse_byte_size(value_of(arg, &mut it)?)?),
            "--min-chunk-rows" => opts = opts.with_min_chunk_rows(parse_count(arg, value_of(arg, &mut it)?)?),
            "--keep-csv" => opts = opts.with_delete_temp_csv(false),
            "--keep-parquet" => opts = opts.with_delete_temp_parquet(false),
            "--threads" => opts = opts.with_parallelism(parse_count(arg, value_of(arg, &mut it)?)?),
            "--single-file" => opts = opts.with_mode(ConversionMode::SingleFile),
            "--quarantine" => opts = opts.with_mismatch_policy(MismatchPolicy::Quarantine),
            "--work-dir" => opts = opts.with_work_dir(value_of(arg, &mut it)?),
            "--no-progress" => opts = opts.with_progress(false),
            flag if flag.starts_with("--") => return Err(config_err(format!("unknown option {flag}"))),
            _ => positional.push(arg.clone()),
        }
    }
    match positional.as_slice() {
        [input, prefix] => Ok(opts.with_input(input).with_output_prefix(prefix)),
        _ => Err(config_err(format!(
            "expected <input> <output_prefix>, got {} positional argument(s)",
            positional.len()
        ))),
    }
}
