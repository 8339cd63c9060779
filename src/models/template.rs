use serde::{Deserialize, Serialize};

const BYTES_PER_GB: f64 = (1u64 << 30) as f64;

/// A `VM-template` object as returned by `xo.getAllObjects`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default)]
    pub name_label: String,
    #[serde(default)]
    pub name_description: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "CPUs", default)]
    pub cpus: Option<CpuInfo>,
    #[serde(default)]
    pub memory: Option<MemoryInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CpuInfo {
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub max: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryInfo {
    #[serde(default)]
    pub size: Option<u64>,
}

impl TemplateRecord {
    pub fn cpu_count(&self) -> Option<u32> {
        self.cpus.as_ref().and_then(|c| c.number)
    }

    /// Memory in GB rounded to one decimal.
    pub fn memory_gb(&self) -> f64 {
        let bytes = self.memory.as_ref().and_then(|m| m.size).unwrap_or(0);
        (bytes as f64 / BYTES_PER_GB * 10.0).round() / 10.0
    }

    /// Trailing dot-separated segment of the label parsed as a build id.
    pub fn build_id(&self) -> Option<u64> {
        self.name_label.rsplit('.').next()?.parse().ok()
    }
}

/// Name of the template produced by a build.
pub fn template_name(target: &str, build_id: u64) -> String {
    format!("{}.{}", template_family(target), build_id)
}

/// Common prefix shared by every generation of a target.
pub fn template_family(target: &str) -> String {
    format!("template.{}", target)
}
