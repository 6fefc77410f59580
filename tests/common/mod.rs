#![allow(dead_code)]

use arrow::array::{Array, StringArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub type Row = Vec<Option<String>>;

/// Write `content` verbatim, creating parent directories.
pub fn write_text(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Write a header plus rows joined by `sep`, one record per line.
pub fn write_delimited(path: &Path, sep: &str, header: &[&str], rows: &[Vec<String>]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut w = BufWriter::new(File::create(path).unwrap());
    writeln!(w, "{}", header.join(sep)).unwrap();
    for r in rows {
        writeln!(w, "{}", r.join(sep)).unwrap();
    }
    w.flush().unwrap();
}

/// Three fixed-width columns so every line has a known size:
/// header `a|b|c\n` is 6 bytes, each record `0000001|0000002|0000003\n` is 24 bytes.
pub const FIXED_HEADER_BYTES: u64 = 6;
pub const FIXED_ROW_BYTES: u64 = 24;

pub fn fixed_row(i: u64) -> String {
    format!("{:07}|{:07}|{:07}", i * 3, i * 3 + 1, i * 3 + 2)
}

pub fn write_fixed_width(path: &Path, rows: u64) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut w = BufWriter::new(File::create(path).unwrap());
    writeln!(w, "a|b|c").unwrap();
    for i in 0..rows {
        writeln!(w, "{}", fixed_row(i)).unwrap();
    }
    w.flush().unwrap();
}

/// Every record of a Parquet file with every column read back as text.
pub fn read_parquet_rows(path: &Path) -> Vec<Row> {
    let file = File::open(path).unwrap();
    let reader = ParquetRecordBatchReaderBuilder::try_new(file).unwrap().build().unwrap();
    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.unwrap();
        let cols: Vec<StringArray> = batch
            .columns()
            .iter()
            .map(|c| {
                let utf8 = cast(c, &DataType::Utf8).unwrap();
                utf8.as_any().downcast_ref::<StringArray>().unwrap().clone()
            })
            .collect();
        for r in 0..batch.num_rows() {
            rows.push(
                cols.iter()
                    .map(|c| if c.is_null(r) { None } else { Some(c.value(r).to_string()) })
                    .collect(),
            );
        }
    }
    rows
}

/// Column names and types declared by a Parquet file.
pub fn parquet_fields(path: &Path) -> Vec<(String, DataType)> {
    let file = File::open(path).unwrap();
    let builder = ParquetRecordBatchReaderBuilder::try_new(file).unwrap();
    builder
        .schema()
        .fields()
        .iter()
        .map(|f| (f.name().clone(), f.data_type().clone()))
        .collect()
}

/// Files in `dir` whose name ends with `suffix`, sorted.
pub fn files_with_suffix(dir: &Path, suffix: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else { return Vec::new() };
    let mut out: Vec<PathBuf> = entries
        .map(|e| e.unwrap().path())
        .filter(|p| p.is_file() && p.to_string_lossy().ends_with(suffix))
        .collect();
    out.sort();
    out
}

/// Rows of a text file after the header, blank lines dropped.
pub fn data_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .skip(1)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn some_row(fields: &[&str]) -> Row {
    fields.iter().map(|f| Some(f.to_string())).collect()
}
