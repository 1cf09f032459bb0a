// Download-if-absent: the only place a backend download is triggered

use std::path::PathBuf;

use super::errors::FetchError;
use super::models::VideoRecord;
use super::store::ContentStore;
use super::traits::Backend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched {
    Downloaded(PathBuf),
    AlreadyPresent(PathBuf),
}

impl Fetched {
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Downloaded(p) | Self::AlreadyPresent(p) => p,
        }
    }
}

/// Ensure the record's identity is in the store, downloading it only when
/// the store does not have it yet.
pub async fn fetch_if_absent(
    backend: &dyn Backend,
    store: &ContentStore,
    record: &VideoRecord,
) -> Result<Fetched, FetchError> {
    let (name, ext) = (backend.name(), backend.extension());

    if store.exists(name, &record.id, ext) {
        tracing::debug!("[fetch] {}/{} already stored", name, record.id);
        return Ok(Fetched::AlreadyPresent(store.path_for(name, &record.id, ext)));
    }

    tracing::info!("[fetch] downloading {}/{}: {}", name, record.id, record.title);
    let bytes = backend.download(record).await?;
    let path = store.commit(name, &record.id, ext, bytes).await?;
    Ok(Fetched::Downloaded(path))
}
