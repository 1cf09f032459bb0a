// Backends and the name -> backend registry

pub mod memory;
pub mod ytdlp;

use std::collections::BTreeMap;
use std::sync::Arc;

pub use memory::MemoryBackend;
pub use ytdlp::YtDlpBackend;

use super::traits::Backend;

/// Resolves the `backend` key of a section
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every backend yt-dlp can search
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for (name, _) in ytdlp::SEARCH_PREFIXES {
            if let Some(backend) = YtDlpBackend::for_name(name) {
                registry.register(Arc::new(backend));
            }
        }
        registry
    }

    /// Register under the backend's own name, replacing any previous entry
    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.backends.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_search_prefixes() {
        let registry = BackendRegistry::with_defaults();
        assert_eq!(
            registry.names(),
            ["bilibili", "niconico", "soundcloud", "youtube"]
        );
        assert_eq!(registry.get("youtube").unwrap().extension(), "mp4");
        assert!(registry.get("vimeo").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = BackendRegistry::with_defaults();
        registry.register(Arc::new(MemoryBackend::new("youtube", "webm")));
        assert_eq!(registry.get("youtube").unwrap().extension(), "webm");
    }
}
