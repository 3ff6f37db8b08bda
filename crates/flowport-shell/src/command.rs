use std::path::Path;
use std::process::Command;

use anyhow::{anyhow, Context, Result};

pub fn run_command(command: &mut Command, context_message: &str) -> Result<()> {
    let output = command
        .output()
        .with_context(|| format!("{context_message}: command failed to start"))?;
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    Err(anyhow!(
        "{context_message}: status={} stdout='{}' stderr='{}'",
        output.status,
        stdout.trim(),
        stderr.trim()
    ))
}

pub(crate) fn escape_ps_single_quote(path: &Path) -> String {
    escape_ps_single_quote_str(&path.display().to_string())
}

pub(crate) fn escape_ps_single_quote_str(value: &str) -> String {
    value.replace('\'', "''")
}
