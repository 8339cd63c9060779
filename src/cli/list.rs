use crate::cli::Credentials;
use anyhow::Result;
use clap::Parser;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use std::process::ExitCode;
use xo_templates::Session;

#[derive(Parser)]
#[command(about = "List the VM templates available on the pool")]
pub struct ListTemplatesCommand {
    #[command(flatten)]
    credentials: Credentials,
}

impl ListTemplatesCommand {
    pub async fn run(self) -> Result<ExitCode> {
        let config = self.credentials.config()?;
        let templates = Session::scope(config, |client| async move { client.objects().templates().await })
            .await??;

        if templates.is_empty() {
            println!("No templates found.");
            return Ok(ExitCode::SUCCESS);
        }

        let mut records: Vec<_> = templates.into_iter().collect();
        records.sort_by(|(_, a), (_, b)| a.name_label.cmp(&b.name_label));

        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Name", "ID", "CPUs", "Memory (GB)"]);
        for (id, record) in records {
            table.add_row(vec![
                Cell::new(&record.name_label),
                Cell::new(record.uuid.as_deref().unwrap_or(&id)),
                Cell::new(
                    record
                        .cpu_count()
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::new(format!("{:.1}", record.memory_gb())),
            ]);
        }
        println!("{}", table);
        Ok(ExitCode::SUCCESS)
    }
}
