use kisan_core::MarketService;

use crate::cli::{QueueArgs, QueueCommand};
use crate::error::CliError;

use super::CommandOutput;

pub async fn run(args: &QueueArgs, service: &MarketService) -> Result<CommandOutput, CliError> {
    let queue = service.queue();

    match &args.command {
        QueueCommand::List => Ok(CommandOutput::local(serde_json::to_value(queue.list().await)?)),
        QueueCommand::Sync => {
            let report = service.sync_pending().await?;
            let mut warnings = Vec::new();
            if let Some(task) = &report.requeued {
                warnings.push(format!(
                    "task {} still cannot be delivered; it stays queued",
                    task.id
                ));
            }
            if let Some(task) = &report.halted_on {
                warnings.push(format!(
                    "task {} was rejected; use 'kisan queue ack {}' or 'kisan queue retry {}'",
                    task.id, task.id, task.id
                ));
            }

            let mut output = CommandOutput::local(serde_json::to_value(&report)?);
            output.meta.warnings = warnings;
            Ok(output)
        }
        QueueCommand::Ack { id } => Ok(CommandOutput::local(serde_json::to_value(
            queue.acknowledge(*id).await?,
        )?)),
        QueueCommand::Retry { id } => Ok(CommandOutput::local(serde_json::to_value(
            queue.retry_failed(*id).await?,
        )?)),
    }
}
