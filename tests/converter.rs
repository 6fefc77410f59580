#[path = "common/mod.rs"]
mod common;

use arrow::datatypes::DataType;
use common::*;
use pqpack::{
    convert_chunk, convert_reader, converted_path, count_parquet_rows, CanonicalSchema, ConvertSettings, ErrorKind,
    IntermediateChunk, PipelineError,
};
use std::io::Cursor;
use std::path::Path;

fn chunk_at(path: &Path, index: usize) -> IntermediateChunk {
    IntermediateChunk { index, path: path.to_path_buf(), bytes: std::fs::metadata(path).unwrap().len(), rows: 0 }
}

/// Every column comes out as nullable text under the canonical names, values untouched
/// (leading zeros and numeric-looking strings stay strings).
#[test]
fn converted_chunk_is_all_text_under_canonical_schema() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("t_part0001.csv");
    write_text(&csv, "id¦amount¦note\n007¦12.50¦ok\n008¦-3¦fine\n");
    let schema = CanonicalSchema::from_columns(["id", "amount", "note"]);

    let done = convert_chunk(&chunk_at(&csv, 1), &schema, &ConvertSettings::new("¦", 1_000)).unwrap();

    assert_eq!(done.path, converted_path(&csv));
    assert!(done.path.ends_with("t_part0001.parquet"));
    assert_eq!(done.rows, 2);
    assert_eq!(
        parquet_fields(&done.path),
        vec![
            ("id".to_string(), DataType::Utf8),
            ("amount".to_string(), DataType::Utf8),
            ("note".to_string(), DataType::Utf8),
        ]
    );
    assert_eq!(
        read_parquet_rows(&done.path),
        vec![some_row(&["007", "12.50", "ok"]), some_row(&["008", "-3", "fine"])]
    );
    // kept unless asked otherwise
    assert!(csv.exists());
}

/// An empty field is an empty string; a field the record does not carry at all is null.
/// Blank lines are skipped.
#[test]
fn empty_fields_stay_text_and_missing_fields_are_null() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("t_part0001.csv");
    write_text(&csv, "a|b|c\n1||\n\n2\r\n");
    let schema = CanonicalSchema::from_columns(["a", "b", "c"]);

    let done = convert_chunk(&chunk_at(&csv, 1), &schema, &ConvertSettings::new("|", 10)).unwrap();

    assert_eq!(
        read_parquet_rows(&done.path),
        vec![
            vec![Some("1".to_string()), Some(String::new()), Some(String::new())],
            vec![Some("2".to_string()), None, None],
        ]
    );
}

/// A chunk whose header differs from the canonical schema is rejected before anything
/// is written.
#[test]
fn header_mismatch_is_rejected_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("t_part0002.csv");
    write_text(&csv, "a|x|c\n1|2|3\n");
    let schema = CanonicalSchema::from_columns(["a", "b", "c"]);

    let err = convert_chunk(&chunk_at(&csv, 2), &schema, &ConvertSettings::new("|", 10)).unwrap_err();

    match err.downcast_ref::<PipelineError>() {
        Some(PipelineError::SchemaMismatch { chunk, expected, found }) => {
            assert_eq!(*chunk, 2);
            assert_eq!(expected, &vec!["a", "b", "c"]);
            assert_eq!(found, &vec!["a", "x", "c"]);
        }
        other => panic!("expected a schema mismatch, got {other:?}"),
    }
    assert!(!converted_path(&csv).exists());

    // reordered columns are a mismatch too
    write_text(&csv, "c|b|a\n1|2|3\n");
    let err = convert_chunk(&chunk_at(&csv, 2), &schema, &ConvertSettings::new("|", 10)).unwrap_err();
    assert_eq!(ErrorKind::classify(&err), ErrorKind::SchemaMismatch);
}

/// A record with more fields than the header fails the chunk and leaves no partial file.
#[test]
fn extra_fields_fail_the_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("t_part0003.csv");
    write_text(&csv, "a|b\n1|2\n3|4|5|6\n");
    let schema = CanonicalSchema::from_columns(["a", "b"]);

    let err = convert_chunk(&chunk_at(&csv, 3), &schema, &ConvertSettings::new("|", 1)).unwrap_err();

    match err.chain().find_map(|c| c.downcast_ref::<PipelineError>()) {
        Some(PipelineError::MalformedRecord { chunk, line, expected, found }) => {
            assert_eq!((*chunk, *line, *expected, *found), (3, 3, 2, 4));
        }
        other => panic!("expected a malformed record, got {other:?}"),
    }
    assert!(!converted_path(&csv).exists());
    assert!(files_with_suffix(&dir.path().join("_staging"), ".inprogress").is_empty());
}

/// In-memory buffers convert the same way; small batches still add up to every row.
#[test]
fn convert_reader_accepts_in_memory_buffers() {
    let dir = tempfile::tempdir().unwrap();
    let dest = dir.path().join("mem.parquet");
    let mut text = String::from("k|v\n");
    for i in 0..25 {
        text.push_str(&format!("{i}|v{i}\n"));
    }
    let schema = CanonicalSchema::from_columns(["k", "v"]);

    let (path, bytes, rows) =
        convert_reader(&mut Cursor::new(text.into_bytes()), 1, &schema, &ConvertSettings::new("|", 4), &dest).unwrap();

    assert_eq!(path, dest);
    assert_eq!(rows, 25);
    assert!(bytes > 0);
    assert_eq!(count_parquet_rows(&dest).unwrap(), 25);
    let back = read_parquet_rows(&dest);
    assert_eq!(back[24], some_row(&["24", "v24"]));
}

/// With `delete_source` the text chunk is removed once its Parquet file exists.
#[test]
fn delete_source_removes_text_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("t_part0001.csv");
    write_text(&csv, "a\n1\n2\n");
    let schema = CanonicalSchema::from_columns(["a"]);

    let done = convert_chunk(
        &chunk_at(&csv, 1),
        &schema,
        &ConvertSettings::new("|", 10).with_delete_source(true),
    )
    .unwrap();

    assert!(!csv.exists());
    assert!(done.path.exists());
    assert_eq!(done.rows, 2);
}
