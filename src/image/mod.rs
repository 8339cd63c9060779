//! Cloud image acquisition.
//!
//! Each supported distribution has one [`ImageProvider`]; the
//! [`ProviderRegistry`] maps distribution tags to providers so callers never
//! branch on distribution names themselves.

pub mod convert;
pub mod debian;
pub mod download;
pub mod lock;
pub mod ubuntu;

pub use debian::DebianImageProvider;
pub use lock::CacheLocks;
pub use ubuntu::UbuntuImageProvider;

use crate::error::Result;
use crate::models::SourceSpec;
use crate::progress::ProgressSink;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Share of the progress range given to the download when a provider also
/// converts the image.
pub const DOWNLOAD_SHARE: f64 = 0.7;

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Deterministic location of the final artifact for `source`.
    fn cache_path(&self, source: &SourceSpec) -> Result<PathBuf>;

    /// Produces a local disk image for `source`.
    ///
    /// With `use_cache` set and the artifact already present at
    /// [`ImageProvider::cache_path`], this returns immediately after
    /// reporting completion. Concurrent fetches of one artifact are
    /// serialised; a caller that waited sees the finished file as cached.
    async fn fetch(&self, source: &SourceSpec, use_cache: bool, progress: &ProgressSink) -> Result<PathBuf>;
}

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ImageProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `debian` and `ubuntu` providers.
    pub fn with_defaults(http: HttpClient, cache_dir: impl AsRef<Path>) -> Self {
        let cache_dir = cache_dir.as_ref();
        Self::new()
            .register("debian", DebianImageProvider::new(http.clone(), cache_dir))
            .register("ubuntu", UbuntuImageProvider::new(http, cache_dir))
    }

    pub fn register(mut self, distribution: &str, provider: impl ImageProvider + 'static) -> Self {
        self.providers
            .insert(distribution.to_lowercase(), Arc::new(provider));
        self
    }

    pub fn get(&self, distribution: &str) -> Option<Arc<dyn ImageProvider>> {
        self.providers.get(&distribution.to_lowercase()).cloned()
    }

    pub fn contains(&self, distribution: &str) -> bool {
        self.providers.contains_key(&distribution.to_lowercase())
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
