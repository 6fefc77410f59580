use crate::packer::FinalFile;
use anyhow::{bail, Context, Result};
use parquet::file::reader::{FileReader, SerializedFileReader};
use std::fs::File;
use std::path::Path;

/// Row count recorded in a Parquet footer.
pub fn count_parquet_rows(path: &Path) -> Result<u64> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let reader = SerializedFileReader::new(file)
        .with_context(|| format!("read parquet footer of {}", path.display()))?;
    footer_rows(path, reader.metadata().file_metadata().num_rows())
}

fn footer_rows(path: &Path, raw: i64) -> Result<u64> {
    match u64::try_from(raw) {
        Ok(rows) => Ok(rows),
        Err(_) => bail!("{} declares a negative row count ({raw}) in its footer", path.display()),
    }
}

/// Re-read every final footer and check the packed total against the rows that went in.
/// Returns the verified total.
pub fn verify_outputs(finals: &[FinalFile], expected_rows: u64) -> Result<u64> {
    let mut total = 0u64;
    for f in finals {
        let rows = count_parquet_rows(&f.path)?;
        if rows != f.rows {
            bail!(
                "{} holds {} rows but {} were written to it",
                f.path.display(),
                rows,
                f.rows
            );
        }
        total += rows;
    }
    if total != expected_rows {
        bail!("final files hold {total} rows, expected {expected_rows}");
    }
    tracing::debug!(files = finals.len(), rows = total, "verified final files");
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_footer_count_is_an_error() {
        let path = Path::new("broken.parquet");
        assert_eq!(footer_rows(path, 42).unwrap(), 42);
        let err = footer_rows(path, -3).unwrap_err();
        assert!(err.to_string().contains("broken.parquet"));
        assert!(err.to_string().contains("-3"));
    }
}
