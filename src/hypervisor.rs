use crate::{
    client::Client,
    error::Result,
    models::{BootOrder, DiskAttachParams, TemplateRecord, VmCreateParams},
    progress::ProgressSink,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;

/// Remote operations a build needs from the pool.
///
/// Every method is an independent remote call; implementations must accept
/// concurrent calls from several pipelines at once.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    async fn find_storage_repository_id(&self, name: &str) -> Result<String>;

    async fn find_template_id(&self, name: &str) -> Result<String>;

    async fn find_network_id(&self, name: &str) -> Result<String>;

    async fn import_disk(
        &self,
        sr_id: &str,
        path: &Path,
        upload_name: &str,
        progress: &ProgressSink,
    ) -> Result<String>;

    async fn create_vm(&self, params: &VmCreateParams) -> Result<String>;

    async fn attach_disk(&self, params: &DiskAttachParams) -> Result<bool>;

    async fn set_boot_order(&self, vm_id: &str, order: &BootOrder) -> Result<bool>;

    async fn convert_vm_to_template(&self, vm_id: &str) -> Result<bool>;

    async fn list_templates(&self) -> Result<BTreeMap<String, TemplateRecord>>;

    async fn delete_template(&self, id: &str) -> Result<bool>;
}

#[async_trait]
impl Hypervisor for Client {
    async fn find_storage_repository_id(&self, name: &str) -> Result<String> {
        self.objects().storage_repository_id(name).await
    }

    async fn find_template_id(&self, name: &str) -> Result<String> {
        self.objects().template_id(name).await
    }

    async fn find_network_id(&self, name: &str) -> Result<String> {
        self.objects().network_id(name).await
    }

    async fn import_disk(
        &self,
        sr_id: &str,
        path: &Path,
        upload_name: &str,
        progress: &ProgressSink,
    ) -> Result<String> {
        self.disks().import(sr_id, path, upload_name, progress).await
    }

    async fn create_vm(&self, params: &VmCreateParams) -> Result<String> {
        self.vms().create(params).await
    }

    async fn attach_disk(&self, params: &DiskAttachParams) -> Result<bool> {
        self.vms().attach_disk(params).await
    }

    async fn set_boot_order(&self, vm_id: &str, order: &BootOrder) -> Result<bool> {
        self.vms().set_boot_order(vm_id, order).await
    }

    async fn convert_vm_to_template(&self, vm_id: &str) -> Result<bool> {
        self.vms().convert_to_template(vm_id).await
    }

    async fn list_templates(&self) -> Result<BTreeMap<String, TemplateRecord>> {
        self.objects().templates().await
    }

    async fn delete_template(&self, id: &str) -> Result<bool> {
        self.vms().delete(id).await
    }
}
