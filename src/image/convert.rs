use crate::error::{Error, Result};
use std::path::Path;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

use super::download::partial_path;

pub const DEFAULT_CONVERTER: &str = "qemu-img";

/// Converts `input` to `format` at `output` with `qemu-img convert`.
pub async fn convert(program: &str, input: &Path, output: &Path, format: &str) -> Result<()> {
    info!("Converting {} to {} format", input.display(), format);
    let partial = partial_path(output);

    let result = Command::new(program)
        .arg("convert")
        .arg("-O")
        .arg(format)
        .arg(input)
        .arg(&partial)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| Error::ConversionFailed {
            status: "not started".to_string(),
            stderr: format!("{}: {}", program, e),
        })?;

    if !result.status.success() {
        let _ = fs::remove_file(&partial).await;
        return Err(Error::ConversionFailed {
            status: result.status.to_string(),
            stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
        });
    }

    fs::rename(&partial, output).await?;
    debug!("Converted image written to {}", output.display());
    Ok(())
}
