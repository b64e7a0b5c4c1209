use kisan_core::distance_between;
use serde::Serialize;

use crate::cli::DistanceArgs;
use crate::error::CliError;

use super::CommandOutput;

#[derive(Debug, Serialize)]
struct DistanceResponseData {
    distance_km: f64,
}

pub fn run(args: &DistanceArgs) -> Result<CommandOutput, CliError> {
    let distance_km = distance_between(args.from_lat, args.from_lon, args.to_lat, args.to_lon)?;
    Ok(CommandOutput::local(serde_json::to_value(
        DistanceResponseData { distance_km },
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_haversine_distance() {
        let args = DistanceArgs {
            from_lat: 28.6139,
            from_lon: 77.2090,
            to_lat: 28.7041,
            to_lon: 77.1025,
        };

        let output = run(&args).expect("valid coordinates");
        let distance = output.data["distance_km"].as_f64().expect("number");
        assert!((distance - 14.44).abs() < 0.1);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let args = DistanceArgs {
            from_lat: 100.0,
            from_lon: 0.0,
            to_lat: 0.0,
            to_lon: 0.0,
        };

        let error = run(&args).expect_err("latitude out of range");
        assert_eq!(error.exit_code(), 2);
    }
}
