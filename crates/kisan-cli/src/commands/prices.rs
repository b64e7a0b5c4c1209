use kisan_core::{MarketId, MarketService};

use crate::cli::PricesArgs;
use crate::error::CliError;

use super::CommandOutput;

pub async fn run(args: &PricesArgs, service: &MarketService) -> Result<CommandOutput, CliError> {
    let market = MarketId::parse(&args.market)?;
    let result = service
        .market_prices(&market, args.crop.as_deref())
        .await?;
    CommandOutput::from_fetch(result)
}
