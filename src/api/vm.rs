use crate::{
    client::Client,
    error::{Error, Result},
    models::{BootOrder, DiskAttachParams, VmCreateParams},
};
use serde_json::{json, Value};

/// VM and template lifecycle calls.
#[derive(Clone)]
pub struct VmApi {
    client: Client,
}

impl VmApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Creates a halted VM and returns its id.
    pub async fn create(&self, params: &VmCreateParams) -> Result<String> {
        let result = self
            .client
            .call(
                "vm.create",
                json!({
                    "name_label": params.name_label,
                    "name_description": params.name_description,
                    "template": params.template_id,
                    "VIFs": [{ "network": params.network_id }],
                    "CPUs": params.cpus,
                    "memory": params.memory_bytes(),
                    "bootAfterCreate": params.boot_after_create,
                    "tags": params.tags,
                }),
            )
            .await?;

        match result {
            Value::String(id) if !id.is_empty() => Ok(id),
            other => Err(Error::UnexpectedResponse {
                method: "vm.create".to_string(),
                detail: format!("expected a VM id, got {}", other),
            }),
        }
    }

    pub async fn attach_disk(&self, params: &DiskAttachParams) -> Result<bool> {
        let result = self
            .client
            .call(
                "vm.attachDisk",
                json!({
                    "vm": params.vm_id,
                    "vdi": params.vdi_id,
                    "mode": params.mode.as_str(),
                    "bootable": params.bootable,
                }),
            )
            .await?;
        Ok(acknowledged(&result))
    }

    pub async fn set_boot_order(&self, vm_id: &str, order: &BootOrder) -> Result<bool> {
        let result = self
            .client
            .call("vm.setBootOrder", json!({ "vm": vm_id, "order": order.as_str() }))
            .await?;
        Ok(acknowledged(&result))
    }

    pub async fn convert_to_template(&self, vm_id: &str) -> Result<bool> {
        let result = self
            .client
            .call("vm.convertToTemplate", json!({ "id": vm_id }))
            .await?;
        Ok(acknowledged(&result))
    }

    /// Deletes a VM or template.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let result = self.client.call("vm.delete", json!({ "id": id })).await?;
        Ok(acknowledged(&result))
    }
}

/// XO answers `true` or `null` on success.
fn acknowledged(result: &Value) -> bool {
    !matches!(result, Value::Bool(false))
}
