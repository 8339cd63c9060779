use crate::{
    api::{DiskApi, ObjectsApi, VmApi},
    config::Config,
    error::{Error, Result},
    rpc::RpcClient,
};
use reqwest::{header, Client as HttpClient};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("xo-templates/", env!("CARGO_PKG_VERSION"));

/// Handle to an authenticated Xen Orchestra connection.
///
/// Cloning is cheap; all clones share the same WebSocket, which multiplexes
/// concurrent calls.
#[derive(Clone)]
pub struct Client {
    http: HttpClient,
    rpc: Arc<RpcClient>,
    config: Config,
}

impl Client {
    /// Opens the transport. Does not sign in; see [`crate::Session`].
    pub async fn connect(config: Config) -> Result<Self> {
        let http = http_client(&config)?;
        let rpc = RpcClient::connect(config.rpc_url(), Duration::from_secs(config.timeout_seconds)).await?;

        debug!("Xen Orchestra client connected to {}", config.url);

        Ok(Self {
            http,
            rpc: Arc::new(rpc),
            config,
        })
    }

    pub async fn sign_in(&self) -> Result<Value> {
        self.rpc
            .call("session.signIn", json!({ "token": self.config.token }))
            .await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.rpc.close().await
    }

    pub fn objects(&self) -> ObjectsApi {
        ObjectsApi::new(self.clone())
    }

    pub fn vms(&self) -> VmApi {
        VmApi::new(self.clone())
    }

    pub fn disks(&self) -> DiskApi {
        DiskApi::new(self.clone())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn http(&self) -> &HttpClient {
        &self.http
    }

    pub(crate) async fn call(&self, method: &str, params: Value) -> Result<Value> {
        self.rpc.call(method, params).await
    }

    pub(crate) async fn call_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| Error::UnexpectedResponse {
            method: method.to_string(),
            detail: e.to_string(),
        })
    }

    pub(crate) fn build_url(&self, path: &str) -> String {
        format!("{}{}", self.config.http_base_url(), path)
    }
}

/// HTTP client shared by image downloads and disk uploads.
///
/// Only the connect phase is bounded; transfers run until done.
pub fn http_client(config: &Config) -> Result<HttpClient> {
    let mut headers = header::HeaderMap::new();
    headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

    let http = HttpClient::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(config.timeout_seconds))
        .build()?;
    Ok(http)
}
