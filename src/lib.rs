//! # xo-templates
//!
//! Builds XCP-ng VM templates from distribution cloud images through the
//! Xen Orchestra API.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use xo_templates::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = Config::new()?;
//!     let registry = ProviderRegistry::with_defaults(http_client(&config)?, &config.cache_dir);
//!     let specs = TemplateList::load("config.yml")?.into_validated(&registry)?;
//!
//!     let report = Session::scope(config, |client| async move {
//!         BuildCoordinator::new(Arc::new(client), registry)
//!             .concurrency(2)
//!             .run(specs)
//!             .await
//!     })
//!     .await?;
//!
//!     println!("{} succeeded, {} failed", report.succeeded(), report.failed());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod build;
pub mod client;
pub mod config;
pub mod error;
pub mod hypervisor;
pub mod image;
pub mod models;
pub mod progress;
pub mod rpc;
pub mod session;

pub use client::{http_client, Client};
pub use config::Config;
pub use error::{Error, Result};
pub use hypervisor::Hypervisor;
pub use session::Session;

pub mod prelude {
    pub use crate::build::{BuildCoordinator, BuildPipeline, BuildReport, PipelineOptions, Stage};
    pub use crate::image::{ImageProvider, ProviderRegistry};
    pub use crate::models::*;
    pub use crate::progress::{BuildEvent, ProgressSink};
    pub use crate::{http_client, Client, Config, Error, Hypervisor, Result, Session};
}
