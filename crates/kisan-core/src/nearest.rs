use std::cmp::Ordering;

use serde::Serialize;

use crate::{distance_km, GeoPoint, MarketEntity, ValidationError};

/// A market paired with its distance from the search origin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearbyMarket {
    pub market: MarketEntity,
    pub distance_km: f64,
}

/// Markets within `radius_km` of `origin`, nearest first, at most `limit`.
///
/// Equal distances are ordered by name. An empty result is a valid answer.
pub fn find_nearest(
    origin: GeoPoint,
    markets: &[MarketEntity],
    radius_km: f64,
    limit: usize,
) -> Result<Vec<NearbyMarket>, ValidationError> {
    validate_radius(radius_km)?;

    let mut nearby = markets
        .iter()
        .filter_map(|market| {
            let distance_km = distance_km(origin, market.location);
            (distance_km <= radius_km).then(|| NearbyMarket {
                market: market.clone(),
                distance_km,
            })
        })
        .collect::<Vec<_>>();

    nearby.sort_by(compare);
    nearby.truncate(limit);
    Ok(nearby)
}

pub(crate) fn validate_radius(radius_km: f64) -> Result<(), ValidationError> {
    if radius_km.is_finite() && radius_km >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidRadius { value: radius_km })
    }
}

fn compare(left: &NearbyMarket, right: &NearbyMarket) -> Ordering {
    left.distance_km
        .total_cmp(&right.distance_km)
        .then_with(|| left.market.name.cmp(&right.market.name))
}
