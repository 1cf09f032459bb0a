// Orchestrator: search -> filter -> download-if-absent -> link, per section

use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;

use super::backends::BackendRegistry;
use super::errors::{DownloadError, FetchError, SectionError, StoreError};
use super::fetch::{fetch_if_absent, Fetched};
use super::filter::Filter;
use super::linker::{ensure_link, link_name, purge_dead_links};
use super::models::{SectionReport, Stage, VideoOutcome, VideoRecord};
use super::store::ContentStore;
use super::traits::Backend;
use crate::config::Section;

/// Store directory used inside a section's link directory
pub const DEFAULT_STORE_DIR: &str = ".files";

/// Outcome of a whole run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<SectionReport>,
    pub failures: Vec<SectionError>,
}

impl RunSummary {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

pub struct Orchestrator {
    registry: BackendRegistry,
    store_root: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(registry: BackendRegistry) -> Self {
        Self {
            registry,
            store_root: None,
        }
    }

    /// Use one store for every section instead of `<directory>/.files`
    pub fn with_store_root(mut self, root: Option<PathBuf>) -> Self {
        self.store_root = root;
        self
    }

    pub fn store_for(&self, section: &Section) -> ContentStore {
        let root = match &self.store_root {
            Some(root) => root.clone(),
            None => section.directory.join(DEFAULT_STORE_DIR),
        };
        ContentStore::new(absolute(&root))
    }

    /// Run sections one after another. A failed section is recorded and the
    /// next one still runs.
    pub async fn run(&self, sections: &[&Section]) -> RunSummary {
        let mut summary = RunSummary::default();

        for section in sections {
            match self.run_section(section).await {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    tracing::error!("{}", e);
                    summary.failures.push(e);
                }
            }
        }

        summary
    }

    pub async fn run_section(&self, section: &Section) -> Result<SectionReport, SectionError> {
        let backend: Arc<dyn Backend> =
            self.registry
                .get(&section.backend)
                .ok_or_else(|| SectionError::UnknownBackend {
                    section: section.name.clone(),
                    backend: section.backend.clone(),
                })?;
        let store = self.store_for(section);

        tracing::info!(
            "[{}] searching {} for {:?} (max {})",
            section.name,
            backend.name(),
            section.pattern,
            section.max_results
        );

        purge_dead_links(&section.directory)
            .await
            .map_err(|source| SectionError::Directory {
                section: section.name.clone(),
                directory: section.directory.clone(),
                source,
            })?;

        let search_err = |source: DownloadError| SectionError::Search {
            section: section.name.clone(),
            source,
        };
        let results = backend
            .search(&section.pattern, section.max_results)
            .await
            .map_err(search_err)?;
        let mut records = Filter::from_section(section).apply(results);

        let mut report = SectionReport::new(&section.name);
        while let Some(item) = records.next().await {
            let record = item.map_err(search_err)?;
            let outcome = self
                .process_video(backend.as_ref(), &store, section, &record)
                .await;
            log_outcome(&section.name, &record, &outcome);
            report.push(record, outcome);
        }

        tracing::info!(
            "[{}] done: {} downloaded, {} already present, {} failed",
            section.name,
            report.downloaded(),
            report.already_present(),
            report.failed()
        );
        Ok(report)
    }

    async fn process_video(
        &self,
        backend: &dyn Backend,
        store: &ContentStore,
        section: &Section,
        record: &VideoRecord,
    ) -> VideoOutcome {
        let fetched = match fetch_if_absent(backend, store, record).await {
            Ok(fetched) => fetched,
            Err(FetchError::Download(e)) => return failed(Stage::Download, e),
            // the byte stream broke, not the store
            Err(FetchError::Store(e @ StoreError::Transfer { .. })) => {
                return failed(Stage::Download, e)
            }
            Err(FetchError::Store(e)) => return failed(Stage::Store, e),
        };

        let name = link_name(&record.title, &record.id, backend.extension());
        if let Err(e) = ensure_link(&section.directory, &name, fetched.path()).await {
            return failed(Stage::Link, e);
        }

        match fetched {
            Fetched::Downloaded(path) => VideoOutcome::Downloaded { path },
            Fetched::AlreadyPresent(path) => VideoOutcome::AlreadyPresent { path },
        }
    }
}

fn failed(stage: Stage, e: impl std::fmt::Display) -> VideoOutcome {
    VideoOutcome::Failed {
        stage,
        message: e.to_string(),
    }
}

fn log_outcome(section: &str, record: &VideoRecord, outcome: &VideoOutcome) {
    match outcome {
        VideoOutcome::Downloaded { path } => {
            tracing::info!("[{}] ✓ {} -> {}", section, record.title, path.display())
        }
        VideoOutcome::AlreadyPresent { .. } => {
            tracing::debug!("[{}] = {} already present", section, record.title)
        }
        VideoOutcome::Failed { stage, message } => tracing::warn!(
            "[{}] ✗ {} ({}) {} failed: {}",
            section,
            record.title,
            record.id,
            stage,
            message
        ),
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::downloader::backends::MemoryBackend;

    fn section(dir: &Path, extra: &str) -> Section {
        let text = format!(
            "[talks]\nbackend = mem\npattern = *\ndirectory = {}\n{}",
            dir.display(),
            extra
        );
        Config::parse(&text, Path::new("test.conf"))
            .unwrap()
            .sections
            .remove(0)
    }

    fn backend() -> Arc<MemoryBackend> {
        Arc::new(
            MemoryBackend::new("mem", "mp4")
                .with_video(VideoRecord::new("abc1", "Keynote", "mem://abc1"), b"one".to_vec())
                .with_video(
                    VideoRecord::new("abc2", "Keynote Trailer", "mem://abc2"),
                    b"two".to_vec(),
                )
                .with_video(VideoRecord::new("xyz3", "Workshop", "mem://xyz3"), b"three".to_vec()),
        )
    }

    fn orchestrator(backend: Arc<MemoryBackend>) -> Orchestrator {
        let mut registry = BackendRegistry::new();
        registry.register(backend);
        Orchestrator::new(registry)
    }

    #[tokio::test]
    async fn test_section_downloads_and_links() {
        let dir = tempfile::tempdir().unwrap();
        let links = dir.path().join("talks");
        let backend = backend();
        let section = section(&links, "title_exclude = trailer\n");

        let report = orchestrator(backend.clone())
            .run_section(&section)
            .await
            .unwrap();

        assert_eq!(report.downloaded(), 2);
        assert_eq!(report.failed(), 0);
        assert_eq!(std::fs::read(links.join("Keynote.mp4")).unwrap(), b"one");
        assert_eq!(std::fs::read(links.join("Workshop.mp4")).unwrap(), b"three");
        assert!(!links.join("Keynote Trailer.mp4").exists());
        assert!(links.join(".files/mem/abc1.mp4").is_file());
        assert_eq!(backend.download_calls("abc2"), 0);
    }

    #[tokio::test]
    async fn test_rerun_never_downloads_again() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend();
        let section = section(dir.path(), "");
        let orch = orchestrator(backend.clone());

        orch.run_section(&section).await.unwrap();
        let second = orch.run_section(&section).await.unwrap();

        assert_eq!(second.already_present(), 3);
        assert_eq!(second.downloaded(), 0);
        assert_eq!(backend.total_download_calls(), 3);
    }

    #[tokio::test]
    async fn test_id_regexp_restricts() {
        let dir = tempfile::tempdir().unwrap();
        let backend = backend();
        let section = section(dir.path(), "id_regexp = abc.*\n");

        let report = orchestrator(backend.clone())
            .run_section(&section)
            .await
            .unwrap();

        let ids: Vec<_> = report.videos.iter().map(|(r, _)| r.id.as_str()).collect();
        assert_eq!(ids, ["abc1", "abc2"]);
    }

    #[tokio::test]
    async fn test_failed_video_does_not_stop_section() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(
            MemoryBackend::new("mem", "mp4")
                .with_video(VideoRecord::new("bad", "Broken", "mem://bad"), b"xxxx".to_vec())
                .with_video(VideoRecord::new("good", "Fine", "mem://good"), b"ok".to_vec())
                .failing_midway("bad"),
        );
        let section = section(dir.path(), "");

        let report = orchestrator(backend).run_section(&section).await.unwrap();

        assert_eq!(report.failed(), 1);
        assert_eq!(report.downloaded(), 1);
        assert!(matches!(
            report.videos[0].1,
            VideoOutcome::Failed {
                stage: Stage::Download,
                ..
            }
        ));
        assert!(!dir.path().join("Broken.mp4").exists());
        assert!(!dir.path().join(".files/mem/bad.mp4").exists());
        assert!(dir.path().join("Fine.mp4").exists());
    }

    #[tokio::test]
    async fn test_link_failure_keeps_download() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Keynote.mp4"), b"user file").unwrap();
        let backend = backend();
        let section = section(dir.path(), "max_results = 1\n");

        let report = orchestrator(backend).run_section(&section).await.unwrap();

        assert!(matches!(
            report.videos[0].1,
            VideoOutcome::Failed {
                stage: Stage::Link,
                ..
            }
        ));
        assert!(dir.path().join(".files/mem/abc1.mp4").is_file());
        assert_eq!(std::fs::read(dir.path().join("Keynote.mp4")).unwrap(), b"user file");
    }

    #[tokio::test]
    async fn test_shared_store_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store");
        let section = section(&dir.path().join("links"), "max_results = 1\n");

        orchestrator(backend())
            .with_store_root(Some(store.clone()))
            .run_section(&section)
            .await
            .unwrap();

        assert!(store.join("mem/abc1.mp4").is_file());
        assert_eq!(
            std::fs::read_link(dir.path().join("links/Keynote.mp4")).unwrap(),
            store.join("mem/abc1.mp4")
        );
    }

    #[tokio::test]
    async fn test_section_failures_do_not_stop_run() {
        let dir = tempfile::tempdir().unwrap();
        let failing = section(&dir.path().join("a"), "");
        let mut unknown = section(&dir.path().join("b"), "");
        unknown.name = "other".to_string();
        unknown.backend = "vimeo".to_string();

        let backend = backend();
        backend.fail_searches(true);
        let summary = orchestrator(backend).run(&[&failing, &unknown]).await;

        assert!(!summary.is_success());
        assert!(matches!(summary.failures[0], SectionError::Search { .. }));
        assert!(matches!(summary.failures[1], SectionError::UnknownBackend { .. }));
    }

    #[tokio::test]
    async fn test_dead_links_purged_before_section() {
        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.mp4"), dir.path().join("Old.mp4"))
            .unwrap();
        let section = section(dir.path(), "max_results = 1\n");

        orchestrator(backend()).run_section(&section).await.unwrap();

        assert!(std::fs::symlink_metadata(dir.path().join("Old.mp4")).is_err());
        assert!(dir.path().join("Keynote.mp4").exists());
    }
}
