use super::cleanup::{remove_stale, stale_templates, CleanupOutcome, CleanupPolicy, StaleTemplate};
use super::Stage;
use crate::error::{Error, Result};
use crate::hypervisor::Hypervisor;
use crate::image::ImageProvider;
use crate::models::{template_name, BootOrder, DiskAttachParams, TemplateSpec, VmCreateParams};
use crate::progress::{Reporter, StageTracker};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    pub use_cache: bool,
    pub cleanup: CleanupPolicy,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            cleanup: CleanupPolicy::default(),
        }
    }
}

/// State accumulated by one run. Never shared between runs.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    pub build_id: u64,
    pub template_name: String,
    pub image_path: Option<PathBuf>,
    pub sr_id: Option<String>,
    pub base_template_id: Option<String>,
    pub network_id: Option<String>,
    pub vdi_id: Option<String>,
    pub vm_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BuildSummary {
    pub target: String,
    pub template_name: String,
    pub template_id: String,
    pub build_id: u64,
    pub cleanup: Vec<(StaleTemplate, CleanupOutcome)>,
}

impl BuildSummary {
    pub fn deleted(&self) -> usize {
        self.cleanup
            .iter()
            .filter(|(_, outcome)| *outcome == CleanupOutcome::Deleted)
            .count()
    }
}

/// Current Unix time in seconds.
pub fn new_build_id() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

pub struct BuildPipeline {
    spec: TemplateSpec,
    hypervisor: Arc<dyn Hypervisor>,
    provider: Arc<dyn ImageProvider>,
    options: PipelineOptions,
    tracker: StageTracker,
    cancel: CancellationToken,
    build_id: u64,
}

impl BuildPipeline {
    pub fn new(spec: TemplateSpec, hypervisor: Arc<dyn Hypervisor>, provider: Arc<dyn ImageProvider>) -> Self {
        Self {
            spec,
            hypervisor,
            provider,
            options: PipelineOptions::default(),
            tracker: StageTracker::new(Reporter::detached()),
            cancel: CancellationToken::new(),
            build_id: new_build_id(),
        }
    }

    pub fn build_id(mut self, build_id: u64) -> Self {
        self.build_id = build_id;
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn reporter(mut self, reporter: Reporter) -> Self {
        self.tracker = StageTracker::new(reporter);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn template_name(&self) -> String {
        template_name(&self.spec.target.name, self.build_id)
    }

    pub async fn run(self) -> Result<BuildSummary> {
        let span = info_span!("pipeline", template = %self.template_name());
        self.execute().instrument(span).await
    }

    async fn execute(self) -> Result<BuildSummary> {
        let mut ctx = BuildContext {
            build_id: self.build_id,
            template_name: self.template_name(),
            ..Default::default()
        };

        info!("Step 1/7: Downloading and preparing image...");
        let image_path = self.stage(Stage::PrepareImage, self.prepare_image()).await?;
        ctx.image_path = Some(image_path.clone());

        info!("Step 2/7: Getting XCP-ng resources...");
        let (sr_id, base_template_id, network_id) =
            self.stage(Stage::ResolveResources, self.resolve_resources()).await?;
        ctx.sr_id = Some(sr_id.clone());
        ctx.base_template_id = Some(base_template_id.clone());
        ctx.network_id = Some(network_id.clone());

        info!("Step 3/7: Importing disk...");
        let vdi_id = self
            .stage(Stage::ImportDisk, self.import_disk(&image_path, &sr_id))
            .await?;
        ctx.vdi_id = Some(vdi_id.clone());

        info!("Step 4/7: Creating VM...");
        let vm_id = self
            .stage(Stage::CreateVm, self.create_vm(&ctx.template_name, &base_template_id, &network_id))
            .await?;
        ctx.vm_id = Some(vm_id.clone());

        info!("Step 5/7: Configuring VM...");
        self.stage(Stage::ConfigureVm, self.configure_vm(&vm_id, &vdi_id))
            .await?;

        info!("Step 6/7: Converting to template...");
        self.stage(Stage::ConvertToTemplate, self.convert_to_template(&vm_id))
            .await?;

        info!("Step 7/7: Cleaning up old templates...");
        let cleanup = self.stage(Stage::Cleanup, self.cleanup(&vm_id)).await?;

        info!("Template '{}' created successfully with ID: {}", ctx.template_name, vm_id);
        debug!("Build context: {:?}", ctx);

        Ok(BuildSummary {
            target: self.spec.target.name.clone(),
            template_name: ctx.template_name,
            template_id: vm_id,
            build_id: ctx.build_id,
            cleanup,
        })
    }

    /// Runs one stage under the cancellation token and tags its failure
    /// with the target and stage.
    async fn stage<T>(&self, stage: Stage, work: impl Future<Output = Result<T>>) -> Result<T> {
        if self.cancel.is_cancelled() {
            return Err(self.failure(stage, Error::Cancelled));
        }

        self.tracker.begin(stage);
        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            outcome = work => outcome,
        };

        match outcome {
            Ok(value) => {
                self.tracker.complete(stage);
                Ok(value)
            }
            Err(e) => {
                error!("{} failed: {}", stage, e);
                Err(self.failure(stage, e))
            }
        }
    }

    fn failure(&self, stage: Stage, source: Error) -> Error {
        Error::Pipeline {
            target: self.spec.target.name.clone(),
            stage,
            source: Box::new(source),
        }
    }

    async fn prepare_image(&self) -> Result<PathBuf> {
        let sink = self.tracker.sink(Stage::PrepareImage);
        let path = self
            .provider
            .fetch(&self.spec.source, self.options.use_cache, &sink)
            .await?;
        debug!("Image ready at {}", path.display());
        Ok(path)
    }

    async fn resolve_resources(&self) -> Result<(String, String, String)> {
        let target = &self.spec.target;
        let source = &self.spec.source;
        debug!(
            "Looking for storage repository '{}', base template '{}', network '{}'",
            target.sr, source.base_template, target.network
        );

        let (sr_id, template_id, network_id) = tokio::try_join!(
            self.hypervisor.find_storage_repository_id(&target.sr),
            self.hypervisor.find_template_id(&source.base_template),
            self.hypervisor.find_network_id(&target.network),
        )?;

        info!("Storage repository {} found with ID: {}", target.sr, sr_id);
        info!("Base Template {} found with ID: {}", source.base_template, template_id);
        info!("Network {} found with ID: {}", target.network, network_id);
        Ok((sr_id, template_id, network_id))
    }

    async fn import_disk(&self, image_path: &Path, sr_id: &str) -> Result<String> {
        let upload_name = upload_name(image_path, self.build_id);
        let sink = self.tracker.sink(Stage::ImportDisk);

        let vdi_id = self
            .hypervisor
            .import_disk(sr_id, image_path, &upload_name, &sink)
            .await?;
        if vdi_id.is_empty() {
            return Err(Error::UnexpectedResponse {
                method: "disk import".to_string(),
                detail: format!("no VDI id returned for '{}'", upload_name),
            });
        }

        info!("Disk imported with ID: {}", vdi_id);
        Ok(vdi_id)
    }

    async fn create_vm(&self, name: &str, base_template_id: &str, network_id: &str) -> Result<String> {
        let params = VmCreateParams {
            name_label: name.to_string(),
            name_description: self.spec.description(self.build_id),
            template_id: base_template_id.to_string(),
            network_id: network_id.to_string(),
            cpus: self.spec.target.cpu,
            memory_gb: self.spec.target.memory,
            boot_after_create: false,
            tags: self.spec.tags(self.build_id),
        };

        let vm_id = self.hypervisor.create_vm(&params).await?;
        info!("VM {} created with ID: {}", name, vm_id);
        Ok(vm_id)
    }

    async fn configure_vm(&self, vm_id: &str, vdi_id: &str) -> Result<()> {
        let attached = self
            .hypervisor
            .attach_disk(&DiskAttachParams::boot_disk(vm_id, vdi_id))
            .await?;
        if !attached {
            return Err(refused("vm.attachDisk", vm_id));
        }
        info!("VDI {} attached to VM {}", vdi_id, vm_id);

        let order = BootOrder::disk_then_optical();
        if !self.hypervisor.set_boot_order(vm_id, &order).await? {
            return Err(refused("vm.setBootOrder", vm_id));
        }
        info!("Boot order set to '{}' for VM {}", order, vm_id);
        Ok(())
    }

    async fn convert_to_template(&self, vm_id: &str) -> Result<()> {
        if !self.hypervisor.convert_vm_to_template(vm_id).await? {
            return Err(refused("vm.convertToTemplate", vm_id));
        }
        info!("VM {} converted to template", vm_id);
        Ok(())
    }

    /// Best effort: never fails the run.
    async fn cleanup(&self, current_id: &str) -> Result<Vec<(StaleTemplate, CleanupOutcome)>> {
        let templates = match self.hypervisor.list_templates().await {
            Ok(templates) => templates,
            Err(e) => {
                warn!("Could not list templates, skipping cleanup: {}", e);
                return Ok(Vec::new());
            }
        };

        let stale = stale_templates(
            &templates,
            &self.spec.target.name,
            current_id,
            self.build_id,
            self.options.cleanup,
        );
        if stale.is_empty() {
            debug!("No old templates to delete for '{}'", self.spec.target.name);
            return Ok(Vec::new());
        }

        Ok(remove_stale(self.hypervisor.as_ref(), stale).await)
    }
}

/// `<stem>.<build_id>.<ext>` for the uploaded disk.
pub fn upload_name(image_path: &Path, build_id: u64) -> String {
    let stem = image_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    match image_path.extension() {
        Some(ext) => format!("{}.{}.{}", stem, build_id, ext.to_string_lossy()),
        None => format!("{}.{}", stem, build_id),
    }
}

fn refused(method: &str, vm_id: &str) -> Error {
    Error::UnexpectedResponse {
        method: method.to_string(),
        detail: format!("call returned false for VM {}", vm_id),
    }
}
