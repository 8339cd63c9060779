use crate::cli::display::BuildDisplay;
use crate::cli::Credentials;
use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use indicatif::MultiProgress;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use xo_templates::{
    build::{BuildCoordinator, BuildReport, CleanupPolicy, PipelineOptions},
    config::DEFAULT_CONCURRENCY,
    http_client,
    image::ProviderRegistry,
    models::{TemplateList, TemplateSpec},
    Session,
};

#[derive(Parser)]
#[command(about = "Generate VM templates from a YAML configuration file")]
pub struct GenerateCommand {
    #[arg(short, long, default_value = "config.yml", help = "Template configuration file")]
    config: PathBuf,

    #[command(flatten)]
    credentials: Credentials,

    #[arg(
        short = 'j',
        long,
        default_value_t = DEFAULT_CONCURRENCY,
        help = "Number of templates built at the same time"
    )]
    concurrency: usize,

    #[arg(short, long, help = "Do not ask for confirmation")]
    yes: bool,

    #[arg(long, help = "Always download images, ignoring the local cache")]
    no_cache: bool,

    #[arg(long, env = "XOA_CACHE_DIR", help = "Directory for downloaded and converted images")]
    cache_dir: Option<PathBuf>,

    #[arg(long, help = "Warn about old templates whose build id cannot be parsed")]
    warn_unparsable: bool,
}

impl GenerateCommand {
    pub async fn run(self, multi: MultiProgress) -> Result<ExitCode> {
        let mut config = self
            .credentials
            .config()?
            .concurrency(self.concurrency)
            .use_cache(!self.no_cache);
        if let Some(dir) = &self.cache_dir {
            config = config.cache_dir(dir);
        }

        let registry = ProviderRegistry::with_defaults(http_client(&config)?, &config.cache_dir);
        let specs = TemplateList::load(&self.config)
            .and_then(|list| list.into_validated(&registry))
            .with_context(|| format!("failed to load {}", self.config.display()))?;

        if specs.is_empty() {
            println!("No templates defined in {}.", self.config.display());
            return Ok(ExitCode::SUCCESS);
        }

        println!("{}", plan_table(&specs));
        if !self.yes && !confirm("Do you want to continue with template generation?").await? {
            println!("Template generation cancelled.");
            return Ok(ExitCode::SUCCESS);
        }

        let cancel = CancellationToken::new();
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling running builds");
                interrupt.cancel();
            }
        });

        let (events, receiver) = mpsc::unbounded_channel();
        let display = tokio::spawn(BuildDisplay::new(&multi, &specs).drive(receiver));

        let options = PipelineOptions {
            use_cache: config.use_cache,
            cleanup: CleanupPolicy {
                warn_on_unparsable: self.warn_unparsable,
            },
        };
        let concurrency = config.concurrency;
        let outcome = Session::scope(config, |client| async move {
            BuildCoordinator::new(Arc::new(client), registry)
                .concurrency(concurrency)
                .options(options)
                .cancellation(cancel)
                .events(events)
                .run(specs)
                .await
        })
        .await;

        // every sender is dropped by now, so the display winds down
        let _ = display.await;
        let report = outcome?;

        print_report(&report);
        Ok(if report.all_succeeded() {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        })
    }
}

fn plan_table(specs: &[TemplateSpec]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "Name",
        "Distribution",
        "Base Template",
        "Version",
        "CPUs",
        "Memory (GB)",
        "Network",
        "SR",
    ]);
    for spec in specs {
        table.add_row(vec![
            Cell::new(&spec.target.name),
            Cell::new(&spec.source.distribution),
            Cell::new(&spec.source.base_template),
            Cell::new(&spec.source.version),
            Cell::new(spec.target.cpu),
            Cell::new(spec.target.memory),
            Cell::new(&spec.target.network),
            Cell::new(&spec.target.sr),
        ]);
    }
    table
}

/// Prompts on stdout; an empty answer counts as yes.
async fn confirm(question: &str) -> Result<bool> {
    let question = question.to_string();
    let answer = tokio::task::spawn_blocking(move || -> io::Result<String> {
        print!("{} [Y/n] ", question);
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().lock().read_line(&mut line)?;
        Ok(line)
    })
    .await??;

    let answer = answer.trim().to_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}

fn print_report(report: &BuildReport) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Target", "Result", "Template", "Details"]);
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(summary) => table.add_row(vec![
                Cell::new(&outcome.target),
                Cell::new("created"),
                Cell::new(&summary.template_name),
                Cell::new(format!(
                    "ID {}, {} old template(s) removed",
                    summary.template_id,
                    summary.deleted()
                )),
            ]),
            Err(error) => table.add_row(vec![
                Cell::new(&outcome.target),
                Cell::new("failed"),
                Cell::new(
                    error
                        .stage()
                        .map(|stage| stage.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::new(error.root()),
            ]),
        };
    }
    println!("{}", table);

    if report.all_failed() {
        println!("All {} template builds failed.", report.failed());
    } else {
        println!(
            "{} template(s) created, {} failed.",
            report.succeeded(),
            report.failed()
        );
    }
}
