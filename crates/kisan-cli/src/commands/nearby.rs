use kisan_core::{GeoPoint, MarketService};

use crate::cli::NearbyArgs;
use crate::error::CliError;

use super::CommandOutput;

pub async fn run(args: &NearbyArgs, service: &MarketService) -> Result<CommandOutput, CliError> {
    if args.limit == 0 {
        return Err(CliError::Command(String::from(
            "--limit must be greater than zero",
        )));
    }

    let origin = GeoPoint::new(args.lat, args.lon)?;
    let result = service
        .nearby_markets(origin, args.radius_km, args.limit)
        .await?;

    let empty = result.data().is_empty();
    let output = CommandOutput::from_fetch(result)?;
    if empty {
        return Ok(output.with_warning(format!(
            "no mandis within {} km; try a larger --radius-km",
            args.radius_km
        )));
    }
    Ok(output)
}
