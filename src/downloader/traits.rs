// Backend capability trait

use async_trait::async_trait;

use super::errors::DownloadError;
use super::models::{ByteStream, RecordStream, VideoRecord};

/// A video source that can be searched and downloaded from
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name of the backend, also the first level of the store layout
    fn name(&self) -> &str;

    /// Container extension of every file this backend produces
    fn extension(&self) -> &str;

    /// Query the backend, asking for at most `max_results` records
    async fn search(&self, pattern: &str, max_results: usize)
        -> Result<RecordStream, DownloadError>;

    /// Open the media payload for a record
    async fn download(&self, record: &VideoRecord) -> Result<ByteStream, DownloadError>;
}
