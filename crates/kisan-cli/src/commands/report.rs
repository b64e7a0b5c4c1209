use kisan_core::{MarketId, MarketService, PriceReport, SubmitOutcome};
use serde::Serialize;
use uuid::Uuid;

use crate::cli::ReportArgs;
use crate::error::CliError;

use super::CommandOutput;

#[derive(Debug, Serialize)]
struct ReportResponseData {
    idempotency_key: String,
    report: PriceReport,
    #[serde(flatten)]
    outcome: SubmitOutcome,
}

pub async fn run(args: &ReportArgs, service: &MarketService) -> Result<CommandOutput, CliError> {
    let market = MarketId::parse(&args.market)?;
    let report = PriceReport::new(market, args.crop.as_str(), args.price, args.unit.as_str())?;
    let idempotency_key = args
        .key
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let outcome = service
        .submit_price_report(&report, &idempotency_key)
        .await?;

    let queued = matches!(outcome, SubmitOutcome::Queued { .. });
    let output = CommandOutput::local(serde_json::to_value(ReportResponseData {
        idempotency_key,
        report,
        outcome,
    })?);

    if queued {
        return Ok(output.with_warning(
            "offline: report queued, run 'kisan queue sync' once connected",
        ));
    }
    Ok(output)
}
