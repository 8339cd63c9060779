//! Template builds.
//!
//! A [`BuildPipeline`] turns one [`crate::models::TemplateSpec`] into a
//! template on the pool by walking the seven [`Stage`]s in order. The
//! [`BuildCoordinator`] runs many pipelines against one shared client with a
//! bound on how many are in flight.

pub mod cleanup;
pub mod coordinator;
pub mod pipeline;

pub use cleanup::{remove_stale, stale_templates, CleanupOutcome, CleanupPolicy, StaleTemplate};
pub use coordinator::{BuildCoordinator, BuildOutcome, BuildReport};
pub use pipeline::{BuildContext, BuildPipeline, BuildSummary, PipelineOptions};

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    PrepareImage,
    ResolveResources,
    ImportDisk,
    CreateVm,
    ConfigureVm,
    ConvertToTemplate,
    Cleanup,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::PrepareImage,
        Stage::ResolveResources,
        Stage::ImportDisk,
        Stage::CreateVm,
        Stage::ConfigureVm,
        Stage::ConvertToTemplate,
        Stage::Cleanup,
    ];

    /// Share of the overall progress, in percent. The weights sum to 100.
    pub fn weight(&self) -> u32 {
        match self {
            Stage::PrepareImage => 25,
            Stage::ResolveResources => 5,
            Stage::ImportDisk => 40,
            Stage::CreateVm => 10,
            Stage::ConfigureVm => 10,
            Stage::ConvertToTemplate => 5,
            Stage::Cleanup => 5,
        }
    }

    /// 1-based position in the pipeline.
    pub fn number(&self) -> usize {
        Stage::ALL.iter().position(|s| s == self).unwrap_or(0) + 1
    }

    pub fn label(&self) -> &'static str {
        match self {
            Stage::PrepareImage => "Downloading and preparing image",
            Stage::ResolveResources => "Gathering resources",
            Stage::ImportDisk => "Importing disk",
            Stage::CreateVm => "Creating VM",
            Stage::ConfigureVm => "Configuring VM",
            Stage::ConvertToTemplate => "Converting to template",
            Stage::Cleanup => "Cleaning up old templates",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {}/{} ({})", self.number(), Stage::ALL.len(), self.label())
    }
}
