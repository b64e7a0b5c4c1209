use serde_json::Value;

use crate::cli::OutputFormat;
use crate::commands::CommandOutput;
use crate::error::CliError;

pub fn render(output: &CommandOutput, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(output)?
            } else {
                serde_json::to_string(output)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => print!("{}", render_table(output)?),
    }

    Ok(())
}

fn render_table(output: &CommandOutput) -> Result<String, CliError> {
    let meta = &output.meta;
    let mut text = String::new();

    text.push_str(&format!("request_id: {}\n", meta.request_id));
    if let (Some(tier), Some(source)) = (meta.tier, &meta.source) {
        text.push_str(&format!("tier      : {tier} ({source})\n"));
        text.push_str(&format!("degraded  : {}\n", meta.degraded));
        text.push_str(&format!("latency_ms: {}\n", meta.latency_ms));
    }

    if !meta.warnings.is_empty() {
        text.push_str("warnings:\n");
        for warning in &meta.warnings {
            text.push_str(&format!("  - {warning}\n"));
        }
    }
    if !meta.failures.is_empty() {
        text.push_str("failed tiers:\n");
        for failure in &meta.failures {
            text.push_str(&format!("  - {}: {}\n", failure.tier, failure.error));
        }
    }

    text.push_str("data:\n");
    match &output.data {
        Value::Array(rows) if rows.is_empty() => text.push_str("  (none)\n"),
        data => {
            for line in serde_json::to_string_pretty(data)?.lines() {
                text.push_str(&format!("  {line}\n"));
            }
        }
    }

    Ok(text)
}
