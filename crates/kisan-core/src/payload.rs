//! Boundary validation for remote JSON payloads.
//!
//! A payload whose shape does not match is classified `Api`; a payload with
//! the right shape but an invalid value (latitude 95, negative price, unknown
//! demand level) is classified `Validation`. Either rejects the whole payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::classify::{ClassifiedError, RawFailure};
use crate::{DemandLevel, GeoPoint, MarketEntity, MarketId, PriceQuote, UtcDateTime};

/// One entry of the market listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketListingRow {
    pub name: String,
    pub state: String,
    pub district: String,
    pub latitude: f64,
    pub longitude: f64,
    pub crops_available: Vec<String>,
}

impl MarketListingRow {
    pub fn into_entity(self) -> Result<MarketEntity, ClassifiedError> {
        let location = GeoPoint::new(self.latitude, self.longitude)
            .map_err(|error| invalid_field(&self.name, error))?;
        MarketEntity::new(
            self.name.clone(),
            self.state,
            self.district,
            location,
            self.crops_available,
        )
        .map_err(|error| invalid_field(&self.name, error))
    }
}

/// One entry of the price endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    pub crop_name: String,
    pub current_price: f64,
    pub unit: String,
    pub date: String,
    pub market_demand: String,
}

impl PriceRow {
    pub fn into_quote(self, market: &MarketId) -> Result<PriceQuote, ClassifiedError> {
        let context = format!("{market}/{}", self.crop_name);
        let as_of =
            UtcDateTime::parse_lenient(&self.date).map_err(|error| invalid_field(&context, error))?;
        let demand_level = DemandLevel::parse(&self.market_demand)
            .map_err(|error| invalid_field(&context, error))?;

        PriceQuote::new(
            market.clone(),
            self.crop_name,
            self.current_price,
            self.unit,
            as_of,
            demand_level,
        )
        .map_err(|error| invalid_field(&context, error))
    }
}

/// Decode and validate a market listing payload.
pub fn parse_market_listing(payload: Value) -> Result<Vec<MarketEntity>, ClassifiedError> {
    decode_rows::<MarketListingRow>("market listing", payload)?
        .into_iter()
        .map(MarketListingRow::into_entity)
        .collect()
}

/// Decode and validate a price payload for `market`.
pub fn parse_price_rows(market: &MarketId, payload: Value) -> Result<Vec<PriceQuote>, ClassifiedError> {
    decode_rows::<PriceRow>("price list", payload)?
        .into_iter()
        .map(|row| row.into_quote(market))
        .collect()
}

fn decode_rows<T: DeserializeOwned>(what: &str, payload: Value) -> Result<Vec<T>, ClassifiedError> {
    if !payload.is_array() {
        return Err(RawFailure::MalformedPayload(format!(
            "{what} payload must be a JSON array, got {}",
            json_type(&payload)
        ))
        .classify());
    }
    serde_json::from_value(payload).map_err(|error| {
        RawFailure::MalformedPayload(format!("{what} payload has an unexpected shape: {error}"))
            .classify()
    })
}

fn invalid_field(context: &str, error: crate::ValidationError) -> ClassifiedError {
    RawFailure::InvalidField(format!("{context}: {error}")).classify()
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
