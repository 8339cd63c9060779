pub mod display;
pub mod generate;
pub mod list;
pub mod logging;

use crate::cli::generate::GenerateCommand;
use crate::cli::list::ListTemplatesCommand;
use anyhow::Result;
use clap::{ArgAction, Args, Parser, Subcommand};
use indicatif::MultiProgress;
use std::process::ExitCode;
use xo_templates::{config::DEFAULT_TIMEOUT_SECONDS, Config, Error};

#[derive(Parser)]
#[command(
    name = "xo-templates",
    version,
    about = "Generate VM templates for XCP-ng using the Xen Orchestra API"
)]
pub struct XoTemplatesCli {
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase verbosity (-v for info, -vv for debug)"
    )]
    pub verbose: u8,

    #[command(subcommand)]
    command: XoTemplatesCommands,
}

#[derive(Subcommand)]
pub enum XoTemplatesCommands {
    Generate(GenerateCommand),
    ListTemplates(ListTemplatesCommand),
}

impl XoTemplatesCli {
    pub async fn run(self, multi: MultiProgress) -> Result<ExitCode> {
        match self.command {
            XoTemplatesCommands::Generate(generate) => generate.run(multi).await,
            XoTemplatesCommands::ListTemplates(list) => list.run().await,
        }
    }
}

/// Connection settings shared by every command that talks to Xen Orchestra.
#[derive(Args, Clone, Debug)]
pub struct Credentials {
    #[arg(short = 'u', long, env = "XOA_URL", help = "Xen Orchestra URL, e.g. wss://xoa.example.com")]
    xoa_url: Option<String>,

    #[arg(
        short = 't',
        long,
        env = "XOA_TOKEN",
        hide_env_values = true,
        help = "Xen Orchestra authentication token"
    )]
    xoa_token: Option<String>,

    #[arg(
        long,
        env = "XOA_TIMEOUT",
        default_value_t = DEFAULT_TIMEOUT_SECONDS,
        help = "Seconds to wait for a single API call"
    )]
    timeout: u64,
}

impl Credentials {
    pub fn config(&self) -> xo_templates::Result<Config> {
        let url = non_empty(self.xoa_url.as_deref()).ok_or(Error::MissingCredentials)?;
        let token = non_empty(self.xoa_token.as_deref()).ok_or(Error::MissingCredentials)?;
        Ok(Config::with_credentials(url, token).timeout_seconds(self.timeout))
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
