#[path = "common/mod.rs"]
mod common;

use common::*;
use pqpack::{chunk_csv_path, PipelineError, Splitter};
use std::fs;

/// 1,000 fixed-width rows with room for 300 per chunk:
/// - four chunks of 300/300/300/100 rows, named `{stem}_partNNNN.csv`
/// - every chunk starts with the header and stays within the ceiling
/// - concatenating the chunk bodies gives back the input rows in order
#[test]
fn split_conserves_rows_in_order_under_ceiling() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    write_fixed_width(&input, 1_000);
    let ceiling = FIXED_HEADER_BYTES + FIXED_ROW_BYTES * 300;

    let out = Splitter::new("|", ceiling)
        .split(&input, &dir.path().join("work"), "big", None)
        .unwrap();

    assert_eq!(out.columns, vec!["a", "b", "c"]);
    assert_eq!(out.total_rows, 1_000);
    assert_eq!(out.oversized_chunks, 0);
    let rows: Vec<u64> = out.chunks.iter().map(|c| c.rows).collect();
    assert_eq!(rows, vec![300, 300, 300, 100]);

    let mut seen = Vec::new();
    for (n, c) in out.chunks.iter().enumerate() {
        assert_eq!(c.index, n + 1);
        assert_eq!(c.path, chunk_csv_path(&dir.path().join("work"), "big", n + 1));
        assert!(c.path.ends_with(format!("big_part{:04}.csv", n + 1)));
        assert!(c.bytes <= ceiling, "chunk {} is {} bytes", c.index, c.bytes);
        assert_eq!(c.bytes, fs::metadata(&c.path).unwrap().len());
        let text = fs::read_to_string(&c.path).unwrap();
        assert!(text.starts_with("a|b|c\n"));
        seen.extend(data_lines(&c.path));
    }
    let expected: Vec<String> = (0..1_000).map(fixed_row).collect();
    assert_eq!(seen, expected);
}

/// A line larger than the ceiling is never split: it gets a chunk of its own and the
/// neighbouring rows go to the chunks before and after it.
#[test]
fn oversized_line_gets_its_own_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let big = "x".repeat(500);
    write_text(&input, &format!("a|b|c\n1|2|3\n4|5|6\n{big}|y|z\n7|8|9\n"));

    let out = Splitter::new("|", 30)
        .split(&input, &dir.path().join("work"), "in", None)
        .unwrap();

    let rows: Vec<u64> = out.chunks.iter().map(|c| c.rows).collect();
    assert_eq!(rows, vec![2, 1, 1]);
    assert_eq!(out.oversized_chunks, 1);
    assert_eq!(data_lines(&out.chunks[1].path), vec![format!("{big}|y|z")]);
    assert!(out.chunks[1].bytes > 30);
    assert!(out.chunks[0].bytes <= 30 && out.chunks[2].bytes <= 30);
}

/// The splitter copies bytes: blank lines, CRLF endings and invalid UTF-8 come out
/// exactly as they went in.
#[test]
fn split_is_byte_exact() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    let mut body: Vec<u8> = Vec::new();
    body.extend_from_slice(b"1|2\r\n\n");
    body.extend_from_slice(b"\xff\xfe|bad\n");
    body.extend_from_slice(b"3|4");
    let mut content = b"a|b\n".to_vec();
    content.extend_from_slice(&body);
    fs::write(&input, &content).unwrap();

    let out = Splitter::new("|", 10).split(&input, &dir.path().join("work"), "in", None).unwrap();

    let mut joined = Vec::new();
    for c in &out.chunks {
        let bytes = fs::read(&c.path).unwrap();
        assert!(bytes.starts_with(b"a|b\n"));
        joined.extend_from_slice(&bytes[4..]);
    }
    assert_eq!(joined, body);
    assert_eq!(out.total_rows, 3);
}

/// A header with no rows still produces one chunk carrying only the header.
#[test]
fn header_only_input_yields_one_empty_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    write_text(&input, "a|b|c\n");

    let out = Splitter::new("|", 1024).split(&input, &dir.path().join("work"), "in", None).unwrap();

    assert_eq!(out.chunks.len(), 1);
    assert_eq!(out.chunks[0].rows, 0);
    assert_eq!(fs::read_to_string(&out.chunks[0].path).unwrap(), "a|b|c\n");
}

/// An empty file has no header to copy.
#[test]
fn empty_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    write_text(&input, "");

    let err = Splitter::new("|", 1024)
        .split(&input, &dir.path().join("work"), "in", None)
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<PipelineError>(), Some(PipelineError::EmptyInput { .. })));
    assert!(files_with_suffix(&dir.path().join("work"), ".csv").is_empty());
}

/// When a later chunk cannot be committed the split fails and the chunks it already
/// committed are gone again; nothing that looks complete stays in the work dir.
#[test]
fn failed_split_removes_committed_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in.txt");
    write_fixed_width(&input, 100);
    let work = dir.path().join("work");
    // a directory where chunk 2 wants to land makes its commit fail
    fs::create_dir_all(chunk_csv_path(&work, "in", 2)).unwrap();

    let err = Splitter::new("|", FIXED_HEADER_BYTES + FIXED_ROW_BYTES * 30)
        .split(&input, &work, "in", None)
        .unwrap_err();

    assert!(format!("{err:#}").contains("in_part0002.csv"), "{err:#}");
    assert!(!chunk_csv_path(&work, "in", 1).exists());
    assert!(!chunk_csv_path(&work, "in", 3).exists());
    assert!(files_with_suffix(&work, ".csv").is_empty());
}
