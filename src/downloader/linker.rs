//! User-facing links into the content store.
//!
//! A link is `<directory>/<title>.<ext>`, a symbolic link to the stored
//! file. Links are recomputed on every run: an existing link to the same
//! target is left alone, a link to a different target is replaced (last
//! writer wins). Regular files in the link directory are never touched.

use std::io;
use std::path::{Path, PathBuf};

use super::errors::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Created,
    Unchanged,
    Replaced,
}

/// Longest link stem in bytes. Leaves room under the usual 255-byte
/// NAME_MAX for the extension and the `.{name}.{pid}.link` staging name.
pub const MAX_STEM_BYTES: usize = 200;

/// File name for a video's link. Path separators are replaced; titles that
/// would give an empty or dot-only name fall back to the id. Long titles are
/// cut to [`MAX_STEM_BYTES`] on a char boundary.
pub fn link_name(title: &str, id: &str, ext: &str) -> String {
    let clean = |s: &str| -> String {
        s.trim()
            .chars()
            .map(|c| match c {
                '/' | '\\' | '\0' => '_',
                c if c.is_control() => ' ',
                c => c,
            })
            .collect()
    };

    let mut stem = clean(title);
    if stem.chars().all(|c| c == '.') {
        stem = clean(id);
    }
    if stem.chars().all(|c| c == '.') {
        stem = "_".to_string();
    }
    truncate_on_char_boundary(&mut stem, MAX_STEM_BYTES);
    format!("{}.{}", stem.trim_end(), ext)
}

fn truncate_on_char_boundary(s: &mut String, max_bytes: usize) {
    if s.len() <= max_bytes {
        return;
    }
    let mut end = max_bytes;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s.truncate(end);
}

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> LinkError + '_ {
    move |source| LinkError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(unix)]
async fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(windows)]
async fn make_symlink(target: &Path, link: &Path) -> io::Result<()> {
    tokio::fs::symlink_file(target, link).await
}

/// Make `<directory>/<display_name>` point at `target`
pub async fn ensure_link(
    directory: &Path,
    display_name: &str,
    target: &Path,
) -> Result<LinkStatus, LinkError> {
    tokio::fs::create_dir_all(directory)
        .await
        .map_err(io_err(directory))?;

    let dest = directory.join(display_name);

    match tokio::fs::symlink_metadata(&dest).await {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            make_symlink(target, &dest).await.map_err(io_err(&dest))?;
            tracing::debug!("[link] {} -> {}", dest.display(), target.display());
            Ok(LinkStatus::Created)
        }
        Err(e) => Err(LinkError::Io {
            path: dest,
            source: e,
        }),
        Ok(meta) if !meta.file_type().is_symlink() => Err(LinkError::Occupied { path: dest }),
        Ok(_) => {
            let current = tokio::fs::read_link(&dest).await.map_err(io_err(&dest))?;
            if current == target {
                return Ok(LinkStatus::Unchanged);
            }

            // Build the new link beside the old one, then rename over it
            let staging = directory.join(format!(".{}.{}.link", display_name, std::process::id()));
            let _ = tokio::fs::remove_file(&staging).await;
            make_symlink(target, &staging)
                .await
                .map_err(io_err(&staging))?;
            if let Err(source) = tokio::fs::rename(&staging, &dest).await {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(LinkError::Io { path: dest, source });
            }

            tracing::info!(
                "[link] {} now points at {} (was {})",
                dest.display(),
                target.display(),
                current.display()
            );
            Ok(LinkStatus::Replaced)
        }
    }
}

/// Remove symbolic links in `directory` whose target is gone. A missing
/// directory has nothing to purge.
pub async fn purge_dead_links(directory: &Path) -> Result<Vec<PathBuf>, LinkError> {
    let mut entries = match tokio::fs::read_dir(directory).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(LinkError::Io {
                path: directory.to_path_buf(),
                source,
            })
        }
    };

    let mut removed = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err(directory))? {
        let path = entry.path();
        let is_link = entry
            .file_type()
            .await
            .map(|t| t.is_symlink())
            .unwrap_or(false);
        if !is_link {
            continue;
        }

        // metadata() follows the link
        if let Err(e) = tokio::fs::metadata(&path).await {
            if e.kind() == io::ErrorKind::NotFound {
                tokio::fs::remove_file(&path).await.map_err(io_err(&path))?;
                tracing::info!("[link] removed dead link {}", path.display());
                removed.push(path);
            }
        }
    }
    Ok(removed)
}
