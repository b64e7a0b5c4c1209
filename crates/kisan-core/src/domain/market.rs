use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{GeoPoint, UtcDateTime, ValidationError};

/// Stable market identifier: `state/district/name` slugs, e.g.
/// `delhi/north-west-delhi/azadpur`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(String);

impl MarketId {
    /// Derive the identifier from a listing's location fields.
    pub fn derive(state: &str, district: &str, name: &str) -> Self {
        Self(format!("{}/{}/{}", slug(state), slug(district), slug(name)))
    }

    /// Parse a user-supplied identifier.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyField { field: "market_id" });
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MarketId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn slug(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut pending_dash = false;

    for ch in input.trim().chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !output.is_empty() {
                output.push('-');
            }
            pending_dash = false;
            output.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    output
}

/// A mandi: regional wholesale agricultural market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketEntity {
    pub id: MarketId,
    pub name: String,
    pub state: String,
    pub district: String,
    pub location: GeoPoint,
    pub crops_available: BTreeSet<String>,
}

impl MarketEntity {
    pub fn new(
        name: impl Into<String>,
        state: impl Into<String>,
        district: impl Into<String>,
        location: GeoPoint,
        crops_available: impl IntoIterator<Item = String>,
    ) -> Result<Self, ValidationError> {
        let name = non_empty("name", name.into())?;
        let state = non_empty("state", state.into())?;
        let district = non_empty("district", district.into())?;

        let crops_available = crops_available
            .into_iter()
            .map(|crop| crop.trim().to_owned())
            .filter(|crop| !crop.is_empty())
            .collect();

        Ok(Self {
            id: MarketId::derive(&state, &district, &name),
            name,
            state,
            district,
            location,
            crops_available,
        })
    }

    /// Case-insensitive crop availability check.
    pub fn offers_crop(&self, crop: &str) -> bool {
        let crop = crop.trim();
        self.crops_available
            .iter()
            .any(|available| available.eq_ignore_ascii_case(crop))
    }
}

/// Demand for a crop at a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DemandLevel {
    Low,
    Medium,
    High,
}

impl DemandLevel {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        match input.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(ValidationError::InvalidDemandLevel {
                value: input.to_owned(),
            }),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl Display for DemandLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price of one crop at one market at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub entity_id: MarketId,
    pub crop_name: String,
    pub price: f64,
    pub unit: String,
    pub as_of: UtcDateTime,
    pub demand_level: DemandLevel,
}

impl PriceQuote {
    pub fn new(
        entity_id: MarketId,
        crop_name: impl Into<String>,
        price: f64,
        unit: impl Into<String>,
        as_of: UtcDateTime,
        demand_level: DemandLevel,
    ) -> Result<Self, ValidationError> {
        validate_price(price)?;
        Ok(Self {
            entity_id,
            crop_name: non_empty("crop_name", crop_name.into())?,
            price,
            unit: non_empty("unit", unit.into())?,
            as_of,
            demand_level,
        })
    }
}

/// Farmer-submitted price observation, replayed through the offline queue
/// when it cannot be delivered immediately.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceReport {
    pub market_id: MarketId,
    pub crop_name: String,
    pub price: f64,
    pub unit: String,
    pub reported_at: UtcDateTime,
}

impl PriceReport {
    pub fn new(
        market_id: MarketId,
        crop_name: impl Into<String>,
        price: f64,
        unit: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        validate_price(price)?;
        Ok(Self {
            market_id,
            crop_name: non_empty("crop_name", crop_name.into())?,
            price,
            unit: non_empty("unit", unit.into())?,
            reported_at: UtcDateTime::now(),
        })
    }
}

fn validate_price(price: f64) -> Result<(), ValidationError> {
    if !price.is_finite() {
        return Err(ValidationError::NonFiniteValue { field: "price" });
    }
    if price < 0.0 {
        return Err(ValidationError::NegativeValue { field: "price" });
    }
    Ok(())
}

fn non_empty(field: &'static str, value: String) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn azadpur() -> MarketEntity {
        MarketEntity::new(
            "Azadpur",
            "Delhi",
            "North West Delhi",
            GeoPoint::new(28.7041, 77.1025).expect("valid"),
            vec![String::from("Onion"), String::from(" Potato "), String::new()],
        )
        .expect("valid market")
    }

    #[test]
    fn market_id_is_a_stable_slug() {
        assert_eq!(azadpur().id.as_str(), "delhi/north-west-delhi/azadpur");
        assert_eq!(
            MarketId::derive("  Tamil Nadu ", "Chennai", "Koyambedu (Wholesale)").as_str(),
            "tamil-nadu/chennai/koyambedu-wholesale"
        );
    }

    #[test]
    fn crops_are_trimmed_and_blank_entries_dropped() {
        let market = azadpur();
        assert_eq!(market.crops_available.len(), 2);
        assert!(market.offers_crop("potato"));
        assert!(market.offers_crop("ONION"));
        assert!(!market.offers_crop("wheat"));
    }

    #[test]
    fn market_requires_a_name() {
        let result = MarketEntity::new(
            "  ",
            "Delhi",
            "North West Delhi",
            GeoPoint::new(28.7, 77.1).expect("valid"),
            Vec::new(),
        );
        assert_eq!(result, Err(ValidationError::EmptyField { field: "name" }));
    }

    #[test]
    fn demand_level_parses_case_insensitively() {
        assert_eq!(DemandLevel::parse("High"), Ok(DemandLevel::High));
        assert_eq!(DemandLevel::parse(" medium "), Ok(DemandLevel::Medium));
        assert!(DemandLevel::parse("extreme").is_err());
    }

    #[test]
    fn price_quote_rejects_negative_and_non_finite_prices() {
        let id = azadpur().id;
        let as_of = UtcDateTime::parse("2024-01-15T00:00:00Z").expect("valid");

        assert_eq!(
            PriceQuote::new(id.clone(), "Onion", -1.0, "quintal", as_of, DemandLevel::Low),
            Err(ValidationError::NegativeValue { field: "price" })
        );
        assert_eq!(
            PriceQuote::new(id.clone(), "Onion", f64::NAN, "quintal", as_of, DemandLevel::Low),
            Err(ValidationError::NonFiniteValue { field: "price" })
        );
        assert!(PriceQuote::new(id, "Onion", 2150.0, "quintal", as_of, DemandLevel::High).is_ok());
    }
}
