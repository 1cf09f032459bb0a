// Error types for backends, the content store and the linker

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum DownloadError {
    /// Backend did not answer in time
    #[error("Network timeout: backend is not responding")]
    NetworkTimeout,

    /// Backend refused the request (429, bot detection, geo block, ...)
    #[error("Request blocked by backend: {0}")]
    Blocked(String),

    /// yt-dlp (or another helper) is not installed
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Failed to parse tool output
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Command execution failed
    #[error("Execution error: {0}")]
    ExecutionError(String),

    /// HTTP transfer failed
    #[error("Network error: {0}")]
    Network(String),

    /// Byte stream ended with an error after transfer started
    #[error("Transfer interrupted: {0}")]
    Interrupted(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

// Classifies raw stderr output of external tools
impl From<String> for DownloadError {
    fn from(s: String) -> Self {
        let lower = s.to_lowercase();

        if lower.contains("timeout") || lower.contains("timed out") {
            return Self::NetworkTimeout;
        }

        if lower.contains("http error 429")
            || lower.contains("http error 403")
            || lower.contains("too many requests")
            || lower.contains("sign in to confirm")
            || lower.contains("blocked")
        {
            return Self::Blocked(s);
        }

        // any other HTTP status yt-dlp reports, 404 included
        if lower.contains("http error") {
            return Self::Network(s);
        }

        if lower.contains("command not found") || lower.contains("no such file or directory") {
            return Self::ToolNotFound(s);
        }

        if lower.contains("parse") || lower.contains("json") {
            return Self::ParseError(s);
        }

        if lower.starts_with("error:") {
            return Self::ExecutionError(s);
        }

        Self::Unknown(s)
    }
}

impl From<reqwest::Error> for DownloadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::NetworkTimeout
        } else {
            Self::Network(e.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The byte stream failed mid-write; nothing was published
    #[error("transfer into {path} failed: {source}")]
    Transfer {
        path: PathBuf,
        #[source]
        source: DownloadError,
    },
}

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("link I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Destination exists and is not a symbolic link
    #[error("{path} exists and is not a link, refusing to replace it")]
    Occupied { path: PathBuf },
}

/// Per-video failure of the fetch step
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure that aborts one section but not the run
#[derive(Debug, Error)]
pub enum SectionError {
    #[error("section [{section}]: unknown backend '{backend}'")]
    UnknownBackend { section: String, backend: String },

    #[error("section [{section}]: search failed: {source}")]
    Search {
        section: String,
        #[source]
        source: DownloadError,
    },

    #[error("section [{section}]: cannot prepare {directory}: {source}")]
    Directory {
        section: String,
        directory: PathBuf,
        #[source]
        source: LinkError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_classification() {
        let err: DownloadError = "ERROR: Read timed out".to_string().into();
        assert!(matches!(err, DownloadError::NetworkTimeout));
    }

    #[test]
    fn test_rate_limit_classification() {
        let err: DownloadError = "ERROR: HTTP Error 429: Too Many Requests".to_string().into();
        assert!(matches!(err, DownloadError::Blocked(_)));
    }

    #[test]
    fn test_bot_check_classification() {
        let err: DownloadError = "Sign in to confirm you're not a bot".to_string().into();
        assert!(matches!(err, DownloadError::Blocked(_)));
    }

    #[test]
    fn test_forbidden_classification() {
        let err: DownloadError = "ERROR: unable to download video data: HTTP Error 403: Forbidden"
            .to_string()
            .into();
        assert!(matches!(err, DownloadError::Blocked(_)));
    }

    #[test]
    fn test_http_not_found_is_not_a_missing_tool() {
        let err: DownloadError = "ERROR: HTTP Error 404: Not Found".to_string().into();
        assert!(matches!(err, DownloadError::Network(_)));
    }

    #[test]
    fn test_bare_status_digits_do_not_classify() {
        let err: DownloadError = "ERROR: [youtube] x4030yz: Video unavailable".to_string().into();
        assert!(matches!(err, DownloadError::ExecutionError(_)));

        let err: DownloadError = "ERROR: wrote 1403 bytes, Requested format not found"
            .to_string()
            .into();
        assert!(matches!(err, DownloadError::ExecutionError(_)));
    }

    #[test]
    fn test_missing_tool_classification() {
        let err: DownloadError = "yt-dlp: No such file or directory".to_string().into();
        assert!(matches!(err, DownloadError::ToolNotFound(_)));
    }

    #[test]
    fn test_json_classification() {
        let err: DownloadError = "Invalid JSON on line 3".to_string().into();
        assert!(matches!(err, DownloadError::ParseError(_)));
    }

    #[test]
    fn test_generic_error_classification() {
        let err: DownloadError = "ERROR: Unsupported URL: https://example.org".to_string().into();
        assert!(matches!(err, DownloadError::ExecutionError(_)));

        let err: DownloadError = "something odd".to_string().into();
        assert!(matches!(err, DownloadError::Unknown(_)));
    }
}
