use crate::error::{Error, Result};
use crate::image::ProviderRegistry;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
}

impl Architecture {
    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::Amd64 => "amd64",
            Architecture::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the disk image comes from and which template it is cloned from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceSpec {
    pub distribution: String,
    pub architecture: Architecture,
    #[serde(deserialize_with = "string_or_number")]
    pub version: String,
    pub variant: String,
    pub base_template: String,
}

/// Shape of the resulting template on the pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetSpec {
    pub name: String,
    pub cpu: u32,
    /// Memory in GB.
    pub memory: u32,
    pub network: String,
    pub sr: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateSpec {
    pub source: SourceSpec,
    pub target: TargetSpec,
}

impl TemplateSpec {
    /// Normalises the distribution tag and checks it against the registry.
    pub fn validate(&mut self, registry: &ProviderRegistry) -> Result<()> {
        self.source.distribution = self.source.distribution.trim().to_lowercase();
        if !registry.contains(&self.source.distribution) {
            return Err(Error::Configuration(format!(
                "Unsupported distribution: {}. Supported distributions are: {}",
                self.source.distribution,
                registry.names().join(", ")
            )));
        }
        if self.target.name.trim().is_empty() {
            return Err(Error::Configuration("target name must not be empty".to_string()));
        }
        if self.target.cpu < 1 {
            return Err(Error::Configuration(format!(
                "[{}] cpu must be at least 1",
                self.target.name
            )));
        }
        if self.target.memory < 1 {
            return Err(Error::Configuration(format!(
                "[{}] memory must be at least 1 GB",
                self.target.name
            )));
        }
        Ok(())
    }

    /// Human readable description stored on the created VM.
    pub fn description(&self, build_id: u64) -> String {
        format!(
            "{} {} {} {} {} template",
            capitalize(&self.source.distribution),
            self.source.version,
            self.source.variant,
            self.source.architecture,
            build_id
        )
    }

    pub fn tags(&self, build_id: u64) -> Vec<String> {
        vec![
            format!("template.{}", self.target.name),
            format!("build.{}", build_id),
            format!("arch.{}", self.source.architecture),
            format!("version.{}", self.source.version),
        ]
    }
}

/// The `templates:` document, keyed by an arbitrary entry name.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TemplateList {
    pub templates: IndexMap<String, TemplateSpec>,
}

impl TemplateList {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| Error::Configuration(format!("invalid template file: {}", e)))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    /// Validates every entry and returns the specs in file order.
    pub fn into_validated(self, registry: &ProviderRegistry) -> Result<Vec<TemplateSpec>> {
        let mut specs = Vec::with_capacity(self.templates.len());
        for (key, mut spec) in self.templates {
            spec.validate(registry).map_err(|e| match e {
                Error::Configuration(message) => {
                    Error::Configuration(format!("template '{}': {}", key, message))
                }
                other => other,
            })?;
            specs.push(spec);
        }
        Ok(specs)
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Int(n) => n.to_string(),
        Raw::Float(n) => n.to_string(),
    })
}
