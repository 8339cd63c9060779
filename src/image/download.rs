use crate::error::{Error, Result};
use crate::progress::ProgressSink;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Streams `url` into `dest`.
///
/// Data goes to a `.part` sibling first and is renamed once complete, so a
/// half-written file never shows up at `dest`.
pub async fn download(http: &HttpClient, url: &str, dest: &Path, progress: &ProgressSink) -> Result<()> {
    progress.report(0.0);
    info!("Downloading image from {} to {}", url, dest.display());

    let response = http.get(url).send().await.map_err(|e| Error::ImageUnavailable {
        url: url.to_string(),
        reason: e.to_string(),
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::ImageUnavailable {
            url: url.to_string(),
            reason: format!("HTTP {}", status.as_u16()),
        });
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).await?;
    }

    let total = response.content_length().unwrap_or(0);
    let partial = partial_path(dest);
    let mut file = fs::File::create(&partial).await?;
    let mut received: u64 = 0;
    let mut body = response.bytes_stream();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = fs::remove_file(&partial).await;
                return Err(Error::ImageUnavailable {
                    url: url.to_string(),
                    reason: format!("download interrupted: {}", e),
                });
            }
        };
        file.write_all(&chunk).await?;
        received += chunk.len() as u64;
        if total > 0 {
            progress.report(received as f64 / total as f64);
        }
    }

    file.flush().await?;
    drop(file);
    fs::rename(&partial, dest).await?;
    debug!("Downloaded {} bytes to {}", received, dest.display());

    progress.report(1.0);
    Ok(())
}

pub(crate) fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}
