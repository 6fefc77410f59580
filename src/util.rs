use crate::error::PipelineError;
use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

static INIT_ONCE: std::sync::Once = std::sync::Once::new();
pub fn init_tracing_once() {
    INIT_ONCE.call_once(|| {
        let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
        let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
    });
}

/// Parse a human byte size: `1048576`, `80MB`, `1.5 GB`, `512k`.
/// Units are binary multiples (KB = 1024 bytes) and case-insensitive.
pub fn parse_byte_size(raw: &str) -> Result<u64> {
    let s = raw.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: f64 = num
        .parse()
        .map_err(|_| PipelineError::Config(format!("not a byte size: {raw:?}")))?;
    let mult: u64 = match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        other => return Err(PipelineError::Config(format!("unknown size unit {other:?} in {raw:?}")).into()),
    };
    Ok((value * mult as f64) as u64)
}

pub fn file_len(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path)
        .with_context(|| format!("stat {}", path.display()))?
        .len())
}

/// Remove a file; succeeds if it is already gone.
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
    }
}

/// Remove `<dir>/_staging` if nothing is left in it. Call once no writer is active.
pub fn remove_empty_staging(dir: &Path) {
    let _ = fs::remove_dir(dir.join("_staging"));
}

/// A file written under `<dir>/_staging/<name>.inprogress` and promoted to its final
/// name by [`StagedFile::commit`]. Dropping an uncommitted stage deletes it, so a failed
/// write never leaves a file that looks complete.
///
/// File layout:
///   <dir>/_staging/<name>.inprogress  (while writing)
///   <dir>/<name>                      (after commit)
pub struct StagedFile {
    tmp: PathBuf,
    dest: PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Create the staging file and return it with a writable handle.
    pub fn create(dest: &Path) -> Result<(Self, File)> {
        let dir = match dest.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let staging = dir.join("_staging");
        fs::create_dir_all(&staging).with_context(|| format!("create {}", staging.display()))?;
        let name = dest
            .file_name()
            .with_context(|| format!("output path has no file name: {}", dest.display()))?;
        let tmp = staging.join(format!("{}.inprogress", name.to_string_lossy()));
        let file = File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
        let stage = Self { tmp, dest: dest.to_path_buf(), committed: false };
        Ok((stage, file))
    }

    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Promote the staged file. The caller must have flushed and closed its handle.
    /// Returns the final path and its size on disk.
    pub fn commit(mut self) -> Result<(PathBuf, u64)> {
        if self.dest.exists() {
            remove_if_exists(&self.dest)?;
        }
        fs::rename(&self.tmp, &self.dest)
            .with_context(|| format!("rename {} -> {}", self.tmp.display(), self.dest.display()))?;
        self.committed = true;
        let bytes = file_len(&self.dest)?;
        Ok((self.dest.clone(), bytes))
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = fs::remove_file(&self.tmp) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!(path = %self.tmp.display(), error = %e, "failed to discard staged file");
                }
            }
        }
    }
}
