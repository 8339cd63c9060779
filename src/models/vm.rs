use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parameters for `vm.create`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VmCreateParams {
    pub name_label: String,
    pub name_description: String,
    pub template_id: String,
    pub network_id: String,
    pub cpus: u32,
    pub memory_gb: u32,
    #[serde(default)]
    pub boot_after_create: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl VmCreateParams {
    pub fn memory_bytes(&self) -> u64 {
        u64::from(self.memory_gb) << 30
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DiskMode {
    #[serde(rename = "RO")]
    ReadOnly,
    #[serde(rename = "RW")]
    ReadWrite,
}

impl DiskMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiskMode::ReadOnly => "RO",
            DiskMode::ReadWrite => "RW",
        }
    }
}

/// Parameters for `vm.attachDisk`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiskAttachParams {
    pub vm_id: String,
    pub vdi_id: String,
    pub mode: DiskMode,
    pub bootable: bool,
}

impl DiskAttachParams {
    /// Read-write, bootable attachment.
    pub fn boot_disk(vm_id: impl Into<String>, vdi_id: impl Into<String>) -> Self {
        Self {
            vm_id: vm_id.into(),
            vdi_id: vdi_id.into(),
            mode: DiskMode::ReadWrite,
            bootable: true,
        }
    }
}

/// Device boot priority: `c` disk, `d` optical, `n` network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootOrder(String);

impl BootOrder {
    pub fn parse(order: &str) -> Result<Self> {
        if order.is_empty() || !order.chars().all(|c| matches!(c, 'c' | 'd' | 'n')) {
            return Err(Error::InvalidBootOrder(order.to_string()));
        }
        Ok(Self(order.to_string()))
    }

    /// Disk first, then optical drive.
    pub fn disk_then_optical() -> Self {
        Self("cd".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BootOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for BootOrder {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
