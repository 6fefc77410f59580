//! The canonical all-text schema of a conversion job.
//!
//! A job determines its schema once from the first chunk's header and passes it by
//! reference to every conversion and merge; every batch written anywhere goes through
//! [`CanonicalSchema::cast_batch`].

use crate::error::PipelineError;
use crate::lines::{for_each_raw_line, parse_header};
use anyhow::{Context, Result};
use arrow::array::ArrayRef;
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct CanonicalSchema {
    schema: SchemaRef,
}

impl CanonicalSchema {
    /// Every column is nullable `Utf8`: empty fields stay `""`, missing fields are null.
    pub fn from_columns<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<Field> = columns
            .into_iter()
            .map(|name| Field::new(name.into(), DataType::Utf8, true))
            .collect();
        Self { schema: Arc::new(Schema::new(fields)) }
    }

    pub fn from_header(line: &[u8], separator: &str) -> Self {
        Self::from_columns(parse_header(line, separator))
    }

    pub fn arrow_schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn columns(&self) -> Vec<String> {
        self.schema.fields().iter().map(|f| f.name().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schema.fields().is_empty()
    }

    /// Strict reconciliation: same column count, same names, same order.
    pub fn check_columns<S: AsRef<str>>(&self, chunk: usize, found: &[S]) -> Result<()> {
        let matches = found.len() == self.len()
            && self
                .schema
                .fields()
                .iter()
                .zip(found)
                .all(|(f, name)| f.name() == name.as_ref());
        if matches {
            return Ok(());
        }
        Err(PipelineError::SchemaMismatch {
            chunk,
            expected: self.columns(),
            found: found.iter().map(|s| s.as_ref().to_string()).collect(),
        }
        .into())
    }

    /// Validate `batch` against the canonical columns, then cast every column to `Utf8`
    /// (large/view/dictionary strings and promoted types written by other tools).
    pub fn cast_batch(&self, chunk: usize, batch: &RecordBatch) -> Result<RecordBatch> {
        let incoming = batch.schema();
        let names: Vec<&str> = incoming.fields().iter().map(|f| f.name().as_str()).collect();
        self.check_columns(chunk, &names)?;

        let columns = batch
            .columns()
            .iter()
            .map(|col| cast(col, &DataType::Utf8))
            .collect::<std::result::Result<Vec<ArrayRef>, _>>()
            .with_context(|| format!("cast chunk {chunk} to the canonical schema"))?;
        Ok(RecordBatch::try_new(self.schema.clone(), columns)
            .with_context(|| format!("rebuild chunk {chunk} batch"))?)
    }
}

/// Phase one of the write protocol: read the header of the designated first chunk.
pub fn determine_schema(first_chunk: &Path, separator: &str) -> Result<CanonicalSchema> {
    let file = File::open(first_chunk).with_context(|| format!("open {}", first_chunk.display()))?;
    let mut reader = BufReader::new(file);
    let mut header: Option<Vec<u8>> = None;
    for_each_raw_line(&mut reader, |line| {
        header = Some(line.to_vec());
        Ok(false)
    })?;
    match header {
        Some(h) if !crate::lines::is_blank(&h) => Ok(CanonicalSchema::from_header(&h, separator)),
        _ => Err(PipelineError::EmptyInput { path: first_chunk.to_path_buf() }.into()),
    }
}
