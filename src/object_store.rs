//! Where finished outputs go after a job: a put-only object store behind a trait.

use crate::error::PipelineError;
use crate::util::StagedFile;
use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Component, Path, PathBuf};

pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous object.
    fn put_object(&self, bytes: &[u8], key: &str) -> Result<()>;
}

/// Objects as files under a root directory; `a/b.parquet` lands at `<root>/a/b.parquet`.
#[derive(Clone, Debug)]
pub struct LocalDirStore {
    root: PathBuf,
}

impl LocalDirStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an object key maps to. Keys must stay relative and inside the root.
    pub fn object_path(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        let escapes = key.is_empty()
            || rel
                .components()
                .any(|c| !matches!(c, Component::Normal(_)));
        if escapes {
            return Err(PipelineError::Config(format!("invalid object key {key:?}")).into());
        }
        Ok(self.root.join(rel))
    }
}

impl ObjectStore for LocalDirStore {
    fn put_object(&self, bytes: &[u8], key: &str) -> Result<()> {
        let dest = self.object_path(key)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        let (stage, mut file) = StagedFile::create(&dest)?;
        file.write_all(bytes)
            .with_context(|| format!("write {}", dest.display()))?;
        file.sync_all().with_context(|| format!("sync {}", dest.display()))?;
        drop(file);
        stage.commit()?;
        if let Some(parent) = dest.parent() {
            crate::util::remove_empty_staging(parent);
        }
        Ok(())
    }
}

pub fn upload_file(store: &dyn ObjectStore, path: &Path, key: &str) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    store
        .put_object(&bytes, key)
        .with_context(|| format!("upload {} as {key}", path.display()))?;
    tracing::info!(path = %path.display(), key, bytes = bytes.len(), "uploaded");
    Ok(())
}

/// Upload each output as `<prefix>/<file name>` and return the keys in order.
pub fn upload_outputs(store: &dyn ObjectStore, outputs: &[PathBuf], prefix: &str) -> Result<Vec<String>> {
    let prefix = prefix.trim_matches('/');
    let mut keys = Vec::with_capacity(outputs.len());
    for path in outputs {
        let name = path
            .file_name()
            .with_context(|| format!("output has no file name: {}", path.display()))?
            .to_string_lossy();
        let key = if prefix.is_empty() { name.into_owned() } else { format!("{prefix}/{name}") };
        upload_file(store, path, &key)?;
        keys.push(key);
    }
    Ok(keys)
}
