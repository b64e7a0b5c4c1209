//! # Domain Models
//!
//! Canonical, validated types for the market data layer.
//!
//! ## Models
//!
//! | Type | Description |
//! |------|-------------|
//! | [`GeoPoint`] | Validated latitude/longitude pair |
//! | [`MarketEntity`] | A mandi (regional wholesale market) |
//! | [`MarketId`] | Stable identifier derived from state, district and name |
//! | [`PriceQuote`] | Price of one crop at one market |
//! | [`DemandLevel`] | Low / medium / high market demand |
//! | [`PriceReport`] | A farmer-submitted price observation (mutation payload) |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! ## Validation
//!
//! Every constructor enforces its invariants, so a value that exists is valid:
//!
//! ```rust
//! use kisan_core::{GeoPoint, ValidationError};
//!
//! assert!(GeoPoint::new(28.6139, 77.2090).is_ok());
//! assert!(matches!(
//!     GeoPoint::new(91.0, 0.0),
//!     Err(ValidationError::InvalidCoordinate { field: "latitude", .. })
//! ));
//! ```

mod geo;
mod market;
mod timestamp;

pub use geo::{distance_between, distance_km, GeoPoint, EARTH_RADIUS_KM};
pub use market::{DemandLevel, MarketEntity, MarketId, PriceQuote, PriceReport};
pub use timestamp::UtcDateTime;
