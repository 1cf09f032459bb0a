//! Search video backends, store every video once under its
//! (backend, id) identity and expose it through title-named links.

pub mod app;
pub mod config;
pub mod downloader;

pub use config::{Config, ConfigError, Section};
pub use downloader::{Backend, BackendRegistry, ContentStore, Orchestrator, RunSummary};
