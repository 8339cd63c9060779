//! XCP-ng template generator.
//!
//! Generates VM templates for XCP-ng using the Xen Orchestra API from the
//! specifications in a YAML file.

mod cli;

use clap::Parser;
use cli::XoTemplatesCli;
use indicatif::MultiProgress;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = XoTemplatesCli::parse();
    let multi = MultiProgress::new();
    cli::logging::init(cli.verbose, multi.clone());

    match cli.run(multi).await {
        Ok(code) => code,
        Err(error) => {
            eprintln!("Error: {:#}", error);
            ExitCode::FAILURE
        }
    }
}
