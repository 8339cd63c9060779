use crate::error::{Error, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_CONCURRENCY: usize = 2;

#[derive(Debug, Clone)]
pub struct Config {
    pub url: String,
    pub token: String,
    pub timeout_seconds: u64,
    pub concurrency: usize,
    pub cache_dir: PathBuf,
    pub use_cache: bool,
}

impl Config {
    /// Reads `XOA_URL` and `XOA_TOKEN`, plus the optional `XOA_TIMEOUT` and
    /// `XOA_CACHE_DIR` overrides.
    pub fn new() -> Result<Self> {
        let url = non_empty_var("XOA_URL").ok_or(Error::MissingCredentials)?;
        let token = non_empty_var("XOA_TOKEN").ok_or(Error::MissingCredentials)?;
        let mut config = Self::with_credentials(url, token);

        if let Some(timeout) = non_empty_var("XOA_TIMEOUT") {
            config.timeout_seconds = timeout.parse().map_err(|_| {
                Error::Configuration(format!("XOA_TIMEOUT must be a number of seconds, got '{}'", timeout))
            })?;
        }

        Ok(config)
    }

    pub fn with_credentials(url: impl Into<String>, token: impl Into<String>) -> Self {
        let cache_dir = non_empty_var("XOA_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(default_cache_dir);

        Self {
            url: url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            concurrency: DEFAULT_CONCURRENCY,
            cache_dir,
            use_cache: true,
        }
    }

    pub fn timeout_seconds(mut self, timeout: u64) -> Self {
        self.timeout_seconds = timeout;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    /// JSON-RPC endpoint, e.g. `wss://xoa.example/api/`. An HTTP scheme is
    /// swapped for its WebSocket counterpart.
    pub fn rpc_url(&self) -> String {
        let base = if let Some(rest) = self.url.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = self.url.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            self.url.clone()
        };
        format!("{}/api/", base)
    }

    /// Base for the REST upload endpoint. The WebSocket scheme is swapped for
    /// its HTTP counterpart.
    pub fn http_base_url(&self) -> String {
        if let Some(rest) = self.url.strip_prefix("wss://") {
            format!("https://{}", rest)
        } else if let Some(rest) = self.url.strip_prefix("ws://") {
            format!("http://{}", rest)
        } else {
            self.url.clone()
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().and_then(|v| {
        let trimmed = v.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

fn default_cache_dir() -> PathBuf {
    env::temp_dir().join("xo-templates").join("images")
}
