use crate::{
    client::Client,
    error::{Error, Result},
    progress::ProgressSink,
};
use futures::StreamExt;
use reqwest::{header, Body, StatusCode};
use std::path::Path;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::form_urlencoded;

/// Raw VDI import through the REST endpoint.
#[derive(Clone)]
pub struct DiskApi {
    client: Client,
}

impl DiskApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn upload_url(&self, sr_id: &str, upload_name: &str) -> String {
        let name: String = form_urlencoded::byte_serialize(upload_name.as_bytes()).collect();
        self.client
            .build_url(&format!("/rest/v0/srs/{}/vdis?raw&name_label={}", sr_id, name))
    }

    /// Streams `path` into storage repository `sr_id` and returns the new VDI
    /// id. Progress is bytes sent over file size. Anything but `200 OK` is an
    /// [`Error::UploadFailed`]. Only connecting is bounded by the configured
    /// timeout, so a stalled transfer holds its build slot until cancelled.
    pub async fn import(&self, sr_id: &str, path: &Path, upload_name: &str, progress: &ProgressSink) -> Result<String> {
        let file = File::open(path).await?;
        let total = file.metadata().await?.len();
        let url = self.upload_url(sr_id, upload_name);
        info!("Uploading {} ({} bytes) as {}", path.display(), total, upload_name);

        progress.report(0.0);
        let sink = progress.clone();
        let mut sent: u64 = 0;
        let stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                sent += bytes.len() as u64;
                if total > 0 {
                    sink.report(sent as f64 / total as f64);
                }
            }
            chunk
        });

        let response = self
            .client
            .http()
            .post(&url)
            .header(header::COOKIE, format!("authenticationToken={}", self.client.config().token))
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .header(header::CONTENT_LENGTH, total)
            .body(Body::wrap_stream(stream))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let vdi_id = response.text().await?.trim().to_string();
                debug!("Upload of {} produced VDI {}", upload_name, vdi_id);
                progress.report(1.0);
                Ok(vdi_id)
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(Error::UploadFailed {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
