use super::{download, CacheLocks, ImageProvider};
use crate::error::Result;
use crate::models::SourceSpec;
use crate::progress::ProgressSink;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::path::{Path, PathBuf};
use tracing::info;

pub const UBUNTU_IMAGE_URL: &str = "https://releases.ubuntu.com";

/// Ubuntu release ISOs. No conversion step.
#[derive(Debug, Clone)]
pub struct UbuntuImageProvider {
    http: HttpClient,
    base_url: String,
    cache_dir: PathBuf,
    locks: CacheLocks,
}

impl UbuntuImageProvider {
    pub fn new(http: HttpClient, cache_dir: impl AsRef<Path>) -> Self {
        Self {
            http,
            base_url: UBUNTU_IMAGE_URL.to_string(),
            cache_dir: cache_dir.as_ref().to_path_buf(),
            locks: CacheLocks::new(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn image_name(source: &SourceSpec) -> String {
        format!(
            "ubuntu-{}-{}-{}.iso",
            source.version, source.variant, source.architecture
        )
    }

    pub fn image_url(&self, source: &SourceSpec) -> String {
        format!("{}/{}/{}", self.base_url, source.version, Self::image_name(source))
    }
}

#[async_trait]
impl ImageProvider for UbuntuImageProvider {
    fn cache_path(&self, source: &SourceSpec) -> Result<PathBuf> {
        Ok(self.cache_dir.join(Self::image_name(source)))
    }

    async fn fetch(&self, source: &SourceSpec, use_cache: bool, progress: &ProgressSink) -> Result<PathBuf> {
        let iso = self.cache_path(source)?;
        progress.report(0.0);
        let _guard = self.locks.acquire(&iso).await;

        if use_cache && iso.exists() {
            info!("Image already exists: {}", iso.display());
            progress.report(1.0);
            return Ok(iso);
        }

        download::download(&self.http, &self.image_url(source), &iso, progress).await?;
        Ok(iso)
    }
}
