use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, TryStreamExt};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;

use crate::downloader::errors::DownloadError;
use crate::downloader::models::{ByteStream, RecordStream, VideoRecord};
use crate::downloader::traits::Backend;
use crate::downloader::utils::{find_binary, run_output_with_timeout};

/// Backend names served through yt-dlp and their search prefixes
pub const SEARCH_PREFIXES: &[(&str, &str)] = &[
    ("youtube", "ytsearch"),
    ("soundcloud", "scsearch"),
    ("bilibili", "bilisearch"),
    ("niconico", "nicosearch"),
];

const DEFAULT_FORMAT: &str = "best[ext=mp4]";
const DEFAULT_EXT: &str = "mp4";
const METADATA_TIMEOUT_SECS: u64 = 120;
const PIPE_CHUNK: usize = 64 * 1024;

pub struct YtDlpBackend {
    name: String,
    search_prefix: String,
    ytdlp_bin: String,
    format: String,
    ext: String,
    timeout_secs: u64,
    client: reqwest::Client,
}

/// One line of `--flat-playlist --dump-json`
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: String,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
}

/// The parts of a resolved single-format `--dump-json` we use
#[derive(Debug, Deserialize)]
struct ResolvedMedia {
    url: Option<String>,
    protocol: Option<String>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

impl YtDlpBackend {
    pub fn new(name: impl Into<String>, search_prefix: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            name: name.into(),
            search_prefix: search_prefix.into(),
            ytdlp_bin: find_binary("yt-dlp"),
            format: DEFAULT_FORMAT.to_string(),
            ext: DEFAULT_EXT.to_string(),
            timeout_secs: METADATA_TIMEOUT_SECS,
            client,
        }
    }

    /// Backend for a known name, `None` when yt-dlp has no search for it
    pub fn for_name(name: &str) -> Option<Self> {
        SEARCH_PREFIXES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(n, prefix)| Self::new(*n, *prefix))
    }

    /// Format selector and the extension it is guaranteed to produce
    pub fn with_format(mut self, format: impl Into<String>, ext: impl Into<String>) -> Self {
        self.format = format.into();
        self.ext = ext.into();
        self
    }

    pub fn with_binary(mut self, path: impl Into<String>) -> Self {
        self.ytdlp_bin = path.into();
        self
    }

    /// Deadline for metadata calls (search, format resolution)
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn search_query(&self, pattern: &str, max_results: usize) -> String {
        format!("{}{}:{}", self.search_prefix, max_results, pattern)
    }

    async fn resolve(&self, record: &VideoRecord) -> Result<ResolvedMedia, DownloadError> {
        let args = vec![
            "--dump-json".to_string(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "-f".to_string(),
            self.format.clone(),
            record.backend_ref.clone(),
        ];
        let output = run_output_with_timeout(&self.ytdlp_bin, args, self.timeout_secs).await?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(error.trim().to_string().into());
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| DownloadError::ParseError(format!("JSON parse error: {}", e)))
    }

    async fn stream_http(
        &self,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<ByteStream, DownloadError> {
        let mut request = self.client.get(url);
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.send().await?.error_for_status()?;
        tracing::debug!(
            "[{}] HTTP transfer started ({:?} bytes)",
            self.name,
            response.content_length()
        );

        Ok(Box::pin(
            response
                .bytes_stream()
                .map_err(|e| DownloadError::Interrupted(e.to_string())),
        ))
    }

    /// Let yt-dlp do the transfer itself (HLS, DASH) and read its stdout
    fn stream_pipe(&self, record: &VideoRecord) -> Result<ByteStream, DownloadError> {
        let (running, stdout) = Running::spawn(
            &self.ytdlp_bin,
            &[
                "-f",
                self.format.as_str(),
                "--no-playlist",
                "--no-warnings",
                "--quiet",
                "-o",
                "-",
                record.backend_ref.as_str(),
            ],
        )?;

        let state = (stdout, Some(running));
        Ok(Box::pin(stream::unfold(state, |(mut stdout, running)| async move {
            let Some(running) = running else {
                return None;
            };
            let mut buf = vec![0u8; PIPE_CHUNK];
            match stdout.read(&mut buf).await {
                Ok(0) => running.finish().await.map(|e| (Err(e), (stdout, None))),
                Ok(n) => {
                    buf.truncate(n);
                    Some((Ok(Bytes::from(buf)), (stdout, Some(running))))
                }
                Err(e) => {
                    running.abort().await;
                    Some((
                        Err(DownloadError::Interrupted(e.to_string())),
                        (stdout, None),
                    ))
                }
            }
        })))
    }
}

/// A yt-dlp child whose stderr is read in the background, so a chatty
/// child never blocks on a full pipe while we wait on stdout
struct Running {
    child: Child,
    stderr: JoinHandle<Vec<u8>>,
}

impl Running {
    fn spawn(program: &str, args: &[&str]) -> Result<(Self, ChildStdout), DownloadError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| DownloadError::ToolNotFound(format!("yt-dlp: {}", e)))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            DownloadError::ExecutionError("Failed to capture yt-dlp stdout".to_string())
        })?;
        let mut stderr_pipe = child.stderr.take().ok_or_else(|| {
            DownloadError::ExecutionError("Failed to capture yt-dlp stderr".to_string())
        })?;

        let stderr = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        Ok((Self { child, stderr }, stdout))
    }

    /// Reap a finished child, turning a failed exit into an error item
    async fn finish(mut self) -> Option<DownloadError> {
        let status = match self.child.wait().await {
            Ok(status) => status,
            Err(e) => {
                self.stderr.abort();
                return Some(DownloadError::ExecutionError(format!(
                    "Failed to wait for yt-dlp: {}",
                    e
                )));
            }
        };
        let stderr = self.stderr.await.unwrap_or_default();

        if status.success() {
            return None;
        }
        let stderr = String::from_utf8_lossy(&stderr).trim().to_string();
        if stderr.is_empty() {
            Some(DownloadError::ExecutionError(format!(
                "yt-dlp exited with {:?}",
                status.code()
            )))
        } else {
            Some(stderr.into())
        }
    }

    /// Kill and reap
    async fn abort(mut self) {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
        self.stderr.abort();
    }
}

fn parse_flat_entry(line: &str) -> Result<VideoRecord, DownloadError> {
    let entry: FlatEntry = serde_json::from_str(line)
        .map_err(|e| DownloadError::ParseError(format!("JSON parse error: {}", e)))?;

    let backend_ref = entry
        .webpage_url
        .or(entry.url)
        .unwrap_or_else(|| entry.id.clone());
    let title = entry.title.unwrap_or_else(|| entry.id.clone());

    Ok(VideoRecord {
        id: entry.id,
        title,
        backend_ref,
    })
}

fn search_stream(
    lines: Lines<BufReader<ChildStdout>>,
    running: Running,
    deadline: Duration,
) -> RecordStream {
    Box::pin(stream::unfold(
        (lines, Some(running)),
        move |(mut lines, running)| async move {
            let Some(running) = running else {
                return None;
            };
            loop {
                let next = match tokio::time::timeout(deadline, lines.next_line()).await {
                    Ok(next) => next,
                    Err(_) => {
                        tracing::warn!("[yt-dlp] search timed out after {:?}", deadline);
                        running.abort().await;
                        return Some((Err(DownloadError::NetworkTimeout), (lines, None)));
                    }
                };
                match next {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        return Some((parse_flat_entry(line), (lines, Some(running))));
                    }
                    Ok(None) => {
                        // dropping `finish` on expiry kills the child
                        let error = match tokio::time::timeout(deadline, running.finish()).await {
                            Ok(error) => error,
                            Err(_) => Some(DownloadError::NetworkTimeout),
                        };
                        return error.map(|e| (Err(e), (lines, None)));
                    }
                    Err(e) => {
                        running.abort().await;
                        return Some((
                            Err(DownloadError::ExecutionError(format!(
                                "Failed to read yt-dlp output: {}",
                                e
                            ))),
                            (lines, None),
                        ));
                    }
                }
            }
        },
    ))
}

#[async_trait]
impl Backend for YtDlpBackend {
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
        let query = self.search_query(pattern, max_results);
        tracing::debug!("[{}] searching {:?}", self.name, query);

        let (running, stdout) = Running::spawn(
            &self.ytdlp_bin,
            &["--flat-playlist", "--dump-json", "--no-warnings", query.as_str()],
        )?;

        Ok(search_stream(
            BufReader::new(stdout).lines(),
            running,
            Duration::from_secs(self.timeout_secs),
        ))
    }

    async fn download(&self, record: &VideoRecord) -> Result<ByteStream, DownloadError> {
        let media = self.resolve(record).await?;

        match (media.url.as_deref(), media.protocol.as_deref()) {
            (Some(url), Some("http") | Some("https")) => {
                self.stream_http(url, &media.http_headers).await
            }
            (_, protocol) => {
                tracing::debug!(
                    "[{}] protocol {:?} for {}, piping through yt-dlp",
                    self.name,
                    protocol,
                    record.id
                );
                self.stream_pipe(record)
            }
        }
    }
}
