//! Content-addressed store: one file per (backend, id) identity.
//!
//! The path of a stored file is a pure function of the identity, so the
//! filesystem itself is the index. Files are written to a temporary name in
//! the target directory and renamed into place, which means a reader either
//! sees a complete file at the final path or nothing.

use std::path::{Path, PathBuf};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use super::errors::StoreError;
use super::models::ByteStream;

#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<backend>/<id>.<ext>`, with both names escaped into a single
    /// path component
    pub fn path_for(&self, backend: &str, id: &str, ext: &str) -> PathBuf {
        self.root
            .join(escape_component(backend))
            .join(format!("{}.{}", escape_component(id), ext))
    }

    pub fn exists(&self, backend: &str, id: &str, ext: &str) -> bool {
        self.path_for(backend, id, ext).is_file()
    }

    /// Write `stream` to the identity's path. On any error the partial data
    /// is discarded and the final path is left untouched.
    pub async fn commit(
        &self,
        backend: &str,
        id: &str,
        ext: &str,
        mut stream: ByteStream,
    ) -> Result<PathBuf, StoreError> {
        let target = self.path_for(backend, id, ext);
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        // Removed on drop unless persisted
        let tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".part")
            .tempfile_in(&dir)
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;
        let tmp_path = tmp.path().to_path_buf();
        let io_err = |source: std::io::Error| StoreError::Io {
            path: tmp_path.clone(),
            source,
        };

        let mut file = tokio::fs::File::from_std(tmp.reopen().map_err(io_err)?);
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| StoreError::Transfer {
                path: target.clone(),
                source,
            })?;
            file.write_all(&chunk).await.map_err(io_err)?;
            written += chunk.len() as u64;
        }
        file.flush().await.map_err(io_err)?;
        file.sync_all().await.map_err(io_err)?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))
                .map_err(io_err)?;
        }

        tmp.persist(&target).map_err(|e| StoreError::Io {
            path: target.clone(),
            source: e.error,
        })?;

        tracing::debug!("[store] committed {} ({} bytes)", target.display(), written);
        Ok(target)
    }
}

/// Escape a name into one path component. `%` itself is escaped, so two
/// different names never produce the same component.
fn escape_component(name: &str) -> String {
    if name.is_empty() {
        return "%".to_string();
    }

    let mut out = String::with_capacity(name.len());
    for (i, c) in name.chars().enumerate() {
        match c {
            '%' | '/' | '\\' | '\0' => out.push_str(&format!("%{:02X}", c as u32)),
            '.' if i == 0 => out.push_str("%2E"),
            _ => out.push(c),
        }
    }
    out
}
