use super::pipeline::{new_build_id, BuildPipeline, BuildSummary, PipelineOptions};
use super::Stage;
use crate::config::DEFAULT_CONCURRENCY;
use crate::error::{Error, Result};
use crate::hypervisor::Hypervisor;
use crate::image::ProviderRegistry;
use crate::models::TemplateSpec;
use crate::progress::{BuildEvent, ProgressBoard, Reporter};
use futures::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Debug)]
pub struct BuildOutcome {
    pub target: String,
    pub result: Result<BuildSummary>,
}

/// One outcome per spec, in input order.
#[derive(Debug, Default)]
pub struct BuildReport {
    pub outcomes: Vec<BuildOutcome>,
}

impl BuildReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    /// Every pipeline failed. Reported to the user, not raised.
    pub fn all_failed(&self) -> bool {
        !self.outcomes.is_empty() && self.succeeded() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.target.as_str(), e)))
    }
}

/// Runs pipelines concurrently against one shared client.
///
/// At most `concurrency` pipelines hold an admission permit at any time; a
/// permit is taken before the first stage and released after the last, so
/// a waiting pipeline starts only when a running one finishes. A failing
/// pipeline never affects its siblings.
pub struct BuildCoordinator {
    hypervisor: Arc<dyn Hypervisor>,
    registry: ProviderRegistry,
    concurrency: usize,
    options: PipelineOptions,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<BuildEvent>>,
}

impl BuildCoordinator {
    pub fn new(hypervisor: Arc<dyn Hypervisor>, registry: ProviderRegistry) -> Self {
        Self {
            hypervisor,
            registry,
            concurrency: DEFAULT_CONCURRENCY,
            options: PipelineOptions::default(),
            cancel: CancellationToken::new(),
            events: None,
        }
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Cancelling `token` aborts every running pipeline at its current stage.
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn events(mut self, events: mpsc::UnboundedSender<BuildEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn run(&self, specs: Vec<TemplateSpec>) -> BuildReport {
        let board = Arc::new(ProgressBoard::new(specs.len()));
        self.run_with_board(specs, board).await
    }

    pub async fn run_with_board(&self, specs: Vec<TemplateSpec>, board: Arc<ProgressBoard>) -> BuildReport {
        let gate = Arc::new(Semaphore::new(self.concurrency));
        let build_id = new_build_id();
        info!("Building {} templates, {} at a time", specs.len(), self.concurrency);

        let targets: Vec<String> = specs.iter().map(|s| s.target.name.clone()).collect();
        let handles: Vec<_> = specs
            .into_iter()
            .enumerate()
            .map(|(index, spec)| {
                let reporter = Reporter::new(index, self.events.clone(), Some(board.clone()));
                let provider = self.registry.get(&spec.source.distribution);
                let hypervisor = self.hypervisor.clone();
                let options = self.options;
                let cancel = self.cancel.child_token();
                let gate = gate.clone();

                tokio::spawn(async move {
                    let target = spec.target.name.clone();
                    let outcome: Result<BuildSummary> = async {
                        let _permit = gate
                            .acquire_owned()
                            .await
                            .map_err(|_| Error::Cancelled)?;
                        let provider = provider.ok_or_else(|| Error::Pipeline {
                            target: target.clone(),
                            stage: Stage::PrepareImage,
                            source: Box::new(Error::Configuration(format!(
                                "no image provider for distribution '{}'",
                                spec.source.distribution
                            ))),
                        })?;

                        BuildPipeline::new(spec, hypervisor, provider)
                            .build_id(build_id)
                            .options(options)
                            .reporter(reporter.clone())
                            .cancellation(cancel)
                            .run()
                            .await
                    }
                    .await;

                    reporter.finished(outcome.is_ok());
                    outcome
                })
            })
            .collect();

        let results = join_all(handles).await;

        let outcomes: Vec<BuildOutcome> = targets
            .into_iter()
            .zip(results)
            .map(|(target, joined)| {
                let result = joined.unwrap_or_else(|e| {
                    error!("[{}] build task aborted: {}", target, e);
                    Err(Error::TaskFailed(e.to_string()))
                });
                BuildOutcome { target, result }
            })
            .collect();

        let report = BuildReport { outcomes };
        info!("{} templates succeeded, {} failed", report.succeeded(), report.failed());
        report
    }
}
