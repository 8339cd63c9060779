use super::{convert, download, CacheLocks, ImageProvider, DOWNLOAD_SHARE};
use crate::error::{Error, Result};
use crate::models::SourceSpec;
use crate::progress::ProgressSink;
use async_trait::async_trait;
use reqwest::Client as HttpClient;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEBIAN_CLOUD_IMAGE_URL: &str = "https://cdimage.debian.org/images/cloud";

const CODENAMES: &[(&str, &str)] = &[
    ("7", "wheezy"),
    ("8", "jessie"),
    ("9", "stretch"),
    ("10", "buster"),
    ("11", "bullseye"),
    ("12", "bookworm"),
    ("13", "trixie"),
];

pub fn codename(version: &str) -> Option<&'static str> {
    CODENAMES
        .iter()
        .find(|(v, _)| *v == version)
        .map(|(_, name)| *name)
}

/// Debian cloud images, downloaded as qcow2 and converted to VMDK.
#[derive(Debug, Clone)]
pub struct DebianImageProvider {
    http: HttpClient,
    base_url: String,
    cache_dir: PathBuf,
    converter: String,
    locks: CacheLocks,
}

impl DebianImageProvider {
    pub fn new(http: HttpClient, cache_dir: impl AsRef<Path>) -> Self {
        Self {
            http,
            base_url: DEBIAN_CLOUD_IMAGE_URL.to_string(),
            cache_dir: cache_dir.as_ref().to_path_buf(),
            converter: convert::DEFAULT_CONVERTER.to_string(),
            locks: CacheLocks::new(),
        }
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Program invoked as `<converter> convert -O vmdk <in> <out>`.
    pub fn converter(mut self, program: impl Into<String>) -> Self {
        self.converter = program.into();
        self
    }

    fn image_stem(source: &SourceSpec) -> String {
        format!(
            "debian-{}-{}-{}",
            source.version, source.variant, source.architecture
        )
    }

    pub fn image_url(&self, source: &SourceSpec) -> Result<String> {
        let codename = codename(&source.version).ok_or_else(|| Error::ImageUnavailable {
            url: self.base_url.clone(),
            reason: format!("unsupported Debian version {}", source.version),
        })?;
        Ok(format!(
            "{}/{}/latest/{}.qcow2",
            self.base_url,
            codename,
            Self::image_stem(source)
        ))
    }
}

#[async_trait]
impl ImageProvider for DebianImageProvider {
    fn cache_path(&self, source: &SourceSpec) -> Result<PathBuf> {
        Ok(self.cache_dir.join(format!("{}.vmdk", Self::image_stem(source))))
    }

    async fn fetch(&self, source: &SourceSpec, use_cache: bool, progress: &ProgressSink) -> Result<PathBuf> {
        let vmdk = self.cache_path(source)?;
        progress.report(0.0);
        let _guard = self.locks.acquire(&vmdk).await;

        if use_cache && vmdk.exists() {
            info!("Image already exists: {}", vmdk.display());
            progress.report(1.0);
            return Ok(vmdk);
        }

        let qcow2 = vmdk.with_extension("qcow2");
        if use_cache && qcow2.exists() {
            info!("Reusing downloaded image: {}", qcow2.display());
        } else {
            let url = self.image_url(source)?;
            download::download(&self.http, &url, &qcow2, &progress.scaled(0.0, DOWNLOAD_SHARE)).await?;
        }
        progress.report(DOWNLOAD_SHARE);

        convert::convert(&self.converter, &qcow2, &vmdk, "vmdk").await?;
        progress.report(1.0);

        Ok(vmdk)
    }
}
