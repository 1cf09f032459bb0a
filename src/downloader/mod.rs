// Download pipeline: backends, filtering, content store, links

pub mod backends;
pub mod errors;
pub mod fetch;
pub mod filter;
pub mod linker;
pub mod models;
pub mod orchestrator;
pub mod store;
pub mod traits;
pub mod utils;

pub use backends::{BackendRegistry, MemoryBackend, YtDlpBackend};
pub use errors::{DownloadError, FetchError, LinkError, SectionError, StoreError};
pub use models::{SectionReport, VideoOutcome, VideoRecord};
pub use orchestrator::{Orchestrator, RunSummary};
pub use store::ContentStore;
pub use traits::Backend;
