use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::{ByteStream, RecordStream, VideoRecord};
use crate::downloader::traits::Backend;

/// In-memory backend. Search matches every word of the pattern against the
/// title; `*` matches everything. Keeps per-id download counters.
pub struct MemoryBackend {
    name: String,
    ext: String,
    videos: Vec<(VideoRecord, Bytes)>,
    failing: HashSet<String>,
    search_fails: AtomicBool,
    calls: Mutex<HashMap<String, usize>>,
}

impl MemoryBackend {
    pub fn new(name: impl Into<String>, ext: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ext: ext.into(),
            videos: Vec::new(),
            failing: HashSet::new(),
            search_fails: AtomicBool::new(false),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_video(mut self, record: VideoRecord, payload: Vec<u8>) -> Self {
        self.videos.push((record, Bytes::from(payload)));
        self
    }

    /// Downloads of `id` deliver half the payload, then fail
    pub fn failing_midway(mut self, id: impl Into<String>) -> Self {
        self.failing.insert(id.into());
        self
    }

    pub fn fail_searches(&self, fail: bool) {
        self.search_fails.store(fail, Ordering::SeqCst);
    }

    pub fn download_calls(&self, id: &str) -> usize {
        let calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.get(id).copied().unwrap_or(0)
    }

    pub fn total_download_calls(&self) -> usize {
        let calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.values().sum()
    }

    fn matches(pattern: &str, title: &str) -> bool {
        let pattern = pattern.trim();
        if pattern == "*" {
            return true;
        }
        let title = title.to_lowercase();
        pattern
            .split_whitespace()
            .all(|word| title.contains(&word.to_lowercase()))
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn extension(&self) -> &str {
        &self.ext
    }

    async fn search(
        &self,
        pattern: &str,
        max_results: usize,
    ) -> Result<RecordStream, DownloadError> {
        if self.search_fails.load(Ordering::SeqCst) {
            return Err(DownloadError::NetworkTimeout);
        }

        let hits: Vec<Result<VideoRecord, DownloadError>> = self
            .videos
            .iter()
            .filter(|(record, _)| Self::matches(pattern, &record.title))
            .take(max_results)
            .map(|(record, _)| Ok(record.clone()))
            .collect();
        Ok(Box::pin(stream::iter(hits)))
    }

    async fn download(&self, record: &VideoRecord) -> Result<ByteStream, DownloadError> {
        {
            let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
            *calls.entry(record.id.clone()).or_insert(0) += 1;
        }

        let payload = self
            .videos
            .iter()
            .find(|(r, _)| r.id == record.id)
            .map(|(_, p)| p.clone())
            .ok_or_else(|| DownloadError::Unknown(format!("no such video: {}", record.id)))?;

        let chunks: Vec<Result<Bytes, DownloadError>> = if self.failing.contains(&record.id) {
            vec![
                Ok(payload.slice(..payload.len() / 2)),
                Err(DownloadError::Interrupted("connection reset by peer".to_string())),
            ]
        } else {
            payload
                .chunks(4096)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect()
        };
        Ok(Box::pin(stream::iter(chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_search_matches_all_words() {
        let backend = MemoryBackend::new("mem", "mp4")
            .with_video(VideoRecord::new("1", "Rust Conf Keynote", "mem://1"), vec![])
            .with_video(VideoRecord::new("2", "Go Conf Keynote", "mem://2"), vec![]);

        let hits: Vec<_> = backend.search("rust keynote", 10).await.unwrap().collect().await;
        assert_eq!(hits.len(), 1);

        let hits: Vec<_> = backend.search("*", 1).await.unwrap().collect().await;
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_search() {
        let backend = MemoryBackend::new("mem", "mp4");
        backend.fail_searches(true);
        assert!(backend.search("*", 10).await.is_err());
    }
}
