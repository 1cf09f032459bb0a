// Command line front end: argument handling, logging, exit status

use std::path::{Path, PathBuf};

use clap::{ArgAction, Parser};

use crate::config::{self, Config, ConfigError};
use crate::downloader::{BackendRegistry, Orchestrator, RunSummary};

pub const EXIT_OK: u8 = 0;
pub const EXIT_SECTION_FAILED: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;

#[derive(Parser, Debug, Default)]
#[command(
    name = "vidlink",
    version,
    about = "Search video backends, store each video once and link it by title"
)]
pub struct Cli {
    /// [CONFIG] [SECTION...]. The first value is the config file when it
    /// names an existing file; everything else is a section name.
    #[arg(value_name = "CONFIG_OR_SECTION")]
    pub args: Vec<String>,

    /// Config file (instead of the first positional argument)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Shared store directory (default: `.files` inside each section's directory)
    #[arg(long, value_name = "DIR")]
    pub store_root: Option<PathBuf>,

    /// More output (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only warnings and errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    /// Split positionals into (config path, section names)
    pub fn split_positionals(&self) -> (Option<PathBuf>, Vec<String>) {
        if let Some(path) = &self.config {
            return (Some(path.clone()), self.args.clone());
        }

        match self.args.split_first() {
            Some((first, rest)) if Path::new(first).is_file() => {
                (Some(PathBuf::from(first)), rest.to_vec())
            }
            _ => (None, self.args.clone()),
        }
    }

    pub fn log_level(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (true, _) => "warn",
            (false, 0) => "info",
            (false, 1) => "debug",
            _ => "trace",
        }
    }
}

/// Log to stderr; `RUST_LOG` wins over the command line level
pub fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("vidlink={}", level).into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .ok();
}

/// Load the config, select sections and run them. Config problems are
/// returned before anything on disk is touched.
pub async fn run(
    cli: &Cli,
    registry: BackendRegistry,
    default_locations: &[PathBuf],
) -> Result<RunSummary, ConfigError> {
    let (explicit, names) = cli.split_positionals();
    let path = config::locate(explicit.as_deref(), default_locations)?;
    let config = Config::load(&path)?;
    let sections = config.select(&names)?;

    tracing::info!(
        "[vidlink] {}: {} section(s) selected",
        path.display(),
        sections.len()
    );

    let summary = Orchestrator::new(registry)
        .with_store_root(cli.store_root.clone())
        .run(&sections)
        .await;
    Ok(summary)
}

pub fn exit_code(result: &Result<RunSummary, ConfigError>) -> u8 {
    match result {
        Ok(summary) if summary.is_success() => EXIT_OK,
        Ok(_) => EXIT_SECTION_FAILED,
        Err(_) => EXIT_CONFIG_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::{MemoryBackend, VideoRecord};
    use std::sync::Arc;

    fn registry(backend: Arc<MemoryBackend>) -> BackendRegistry {
        let mut registry = BackendRegistry::new();
        registry.register(backend);
        registry
    }

    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("vidlink.conf");
        let text = format!(
            "[clips]\nbackend = mem\npattern = *\ndirectory = {}\n",
            dir.join("links").display()
        );
        std::fs::write(&path, text).unwrap();
        path
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("vidlink").chain(args.iter().copied()))
    }

    #[test]
    fn test_first_positional_is_config_when_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let conf = write_config(dir.path());
        let conf_str = conf.to_str().unwrap();

        let (path, sections) = cli(&[conf_str, "clips"]).split_positionals();
        assert_eq!(path, Some(conf.clone()));
        assert_eq!(sections, ["clips"]);

        let (path, sections) = cli(&["clips", "more"]).split_positionals();
        assert_eq!(path, None);
        assert_eq!(sections, ["clips", "more"]);
    }

    #[test]
    fn test_explicit_config_flag() {
        let (path, sections) = cli(&["-c", "/etc/other.conf", "clips"]).split_positionals();
        assert_eq!(path, Some(PathBuf::from("/etc/other.conf")));
        assert_eq!(sections, ["clips"]);
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(cli(&[]).log_level(), "info");
        assert_eq!(cli(&["-v"]).log_level(), "debug");
        assert_eq!(cli(&["-vv"]).log_level(), "trace");
        assert_eq!(cli(&["-q"]).log_level(), "warn");
    }

    #[tokio::test]
    async fn test_unknown_section_aborts_without_touching_disk() {
        let dir = tempfile::tempdir().unwrap();
        let conf = write_config(dir.path());
        let backend = Arc::new(
            MemoryBackend::new("mem", "mp4")
                .with_video(VideoRecord::new("a", "A", "mem://a"), b"a".to_vec()),
        );

        let args = cli(&[conf.to_str().unwrap(), "clips", "missing"]);
        let result = run(&args, registry(backend.clone()), &[]).await;

        assert!(matches!(
            result,
            Err(ConfigError::UnknownSections { ref names }) if names == &["missing"]
        ));
        assert_ne!(exit_code(&result), EXIT_OK);
        assert!(!dir.path().join("links").exists());
        assert_eq!(backend.total_download_calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_config_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = run(&cli(&[]), BackendRegistry::new(), &[dir.path().join("none.conf")]).await;
        assert!(matches!(result, Err(ConfigError::NotFound { .. })));
        assert_eq!(exit_code(&result), EXIT_CONFIG_ERROR);
    }

    #[tokio::test]
    async fn test_full_run_from_default_location() {
        let dir = tempfile::tempdir().unwrap();
        let conf = write_config(dir.path());
        let backend = Arc::new(
            MemoryBackend::new("mem", "mp4")
                .with_video(VideoRecord::new("a", "A", "mem://a"), b"a".to_vec()),
        );

        let result = run(&cli(&[]), registry(backend), &[conf]).await;

        assert_eq!(exit_code(&result), EXIT_OK);
        assert!(dir.path().join("links/A.mp4").exists());
    }

    #[tokio::test]
    async fn test_section_failure_sets_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let conf = write_config(dir.path());
        let result = run(&cli(&[]), BackendRegistry::new(), &[conf]).await;

        assert_eq!(exit_code(&result), EXIT_SECTION_FAILED);
    }
}
