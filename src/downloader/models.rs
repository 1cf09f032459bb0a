// Common data models for the download pipeline

use std::fmt;
use std::path::PathBuf;
use std::pin::Pin;

use bytes::Bytes;
use futures::Stream;

use super::errors::DownloadError;

/// A video as returned by a backend search
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRecord {
    pub id: String,
    pub title: String,
    /// Backend-local handle (page URL for yt-dlp, key for the memory backend)
    pub backend_ref: String,
}

impl VideoRecord {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        backend_ref: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            backend_ref: backend_ref.into(),
        }
    }
}

/// Lazy, finite search results
pub type RecordStream = Pin<Box<dyn Stream<Item = Result<VideoRecord, DownloadError>> + Send>>;

/// Media payload as it arrives from a backend
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, DownloadError>> + Send>>;

/// Pipeline stage a per-video failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Download,
    Store,
    Link,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => write!(f, "download"),
            Self::Store => write!(f, "store"),
            Self::Link => write!(f, "link"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoOutcome {
    /// Fetched during this run and linked
    Downloaded { path: PathBuf },
    /// Found in the store, only the link was checked
    AlreadyPresent { path: PathBuf },
    Failed { stage: Stage, message: String },
}

impl VideoOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Per-section summary
#[derive(Debug, Clone, Default)]
pub struct SectionReport {
    pub section: String,
    pub videos: Vec<(VideoRecord, VideoOutcome)>,
}

impl SectionReport {
    pub fn new(section: impl Into<String>) -> Self {
        Self {
            section: section.into(),
            videos: Vec::new(),
        }
    }

    pub fn push(&mut self, record: VideoRecord, outcome: VideoOutcome) {
        self.videos.push((record, outcome));
    }

    pub fn downloaded(&self) -> usize {
        self.count(|o| matches!(o, VideoOutcome::Downloaded { .. }))
    }

    pub fn already_present(&self) -> usize {
        self.count(|o| matches!(o, VideoOutcome::AlreadyPresent { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(VideoOutcome::is_failure)
    }

    fn count(&self, pred: impl Fn(&VideoOutcome) -> bool) -> usize {
        self.videos.iter().filter(|(_, o)| pred(o)).count()
    }
}
