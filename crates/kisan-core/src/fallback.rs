//! Bundled market snapshot served when no live or cached data is available.
//!
//! The snapshot is compiled into the binary and copied into the local store on
//! first use, so the fallback tier reads it through the same `LocalStore` as
//! the offline queue.

use std::collections::BTreeMap;

use kisan_store::{LocalStore, LocalStoreExt};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classify::{ClassifiedError, RawFailure};
use crate::payload::{MarketListingRow, PriceRow};
use crate::{CoreError, MarketEntity, MarketId, PriceQuote};

/// Store key holding the snapshot document.
pub const FALLBACK_DATASET_KEY: &str = "fallback/dataset";

const BUNDLED_DATASET: &str = include_str!("../data/fallback_dataset.json");

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DatasetDocument {
    version: String,
    markets: Vec<MarketListingRow>,
    #[serde(default)]
    prices: BTreeMap<String, Vec<PriceRow>>,
}

#[derive(Deserialize)]
struct DatasetVersion {
    version: String,
}

/// Validated snapshot of markets and their last known prices.
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackDataset {
    version: String,
    markets: Vec<MarketEntity>,
    prices: BTreeMap<MarketId, Vec<PriceQuote>>,
}

impl FallbackDataset {
    /// The snapshot compiled into this build.
    pub fn bundled() -> Result<Self, ClassifiedError> {
        Self::from_json(BUNDLED_DATASET)
    }

    /// The snapshot seeded into `store`, if any.
    pub fn load(store: &dyn LocalStore) -> Result<Option<Self>, ClassifiedError> {
        match store.get(FALLBACK_DATASET_KEY)? {
            Some(raw) => Self::from_json(&raw).map(Some),
            None => Ok(None),
        }
    }

    fn from_json(raw: &str) -> Result<Self, ClassifiedError> {
        let document: DatasetDocument = serde_json::from_str(raw).map_err(|error| {
            RawFailure::MalformedPayload(format!("fallback dataset is malformed: {error}")).classify()
        })?;

        let markets = document
            .markets
            .into_iter()
            .map(MarketListingRow::into_entity)
            .collect::<Result<Vec<_>, _>>()?;

        let mut prices = BTreeMap::new();
        for (market, rows) in document.prices {
            let market = MarketId::parse(&market)?;
            let quotes = rows
                .into_iter()
                .map(|row| row.into_quote(&market))
                .collect::<Result<Vec<_>, _>>()?;
            prices.insert(market, quotes);
        }

        Ok(Self {
            version: document.version,
            markets,
            prices,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn markets(&self) -> &[MarketEntity] {
        &self.markets
    }

    /// Snapshot prices for `market`, optionally narrowed to one crop
    /// (case-insensitive).
    pub fn prices_for(&self, market: &MarketId, crop: Option<&str>) -> Vec<PriceQuote> {
        let Some(quotes) = self.prices.get(market) else {
            return Vec::new();
        };
        quotes
            .iter()
            .filter(|quote| crop.is_none_or(|crop| quote.crop_name.eq_ignore_ascii_case(crop.trim())))
            .cloned()
            .collect()
    }
}

/// Copy the bundled snapshot into `store` unless the same version is already
/// there. Returns whether anything was written.
pub fn seed_fallback(store: &dyn LocalStore) -> Result<bool, CoreError> {
    let bundled: DatasetVersion = serde_json::from_str(BUNDLED_DATASET)?;

    if let Some(raw) = store.get(FALLBACK_DATASET_KEY)? {
        let seeded = serde_json::from_str::<DatasetVersion>(&raw).ok();
        if seeded.is_some_and(|seeded| seeded.version == bundled.version) {
            return Ok(false);
        }
    }

    let document: DatasetDocument = serde_json::from_str(BUNDLED_DATASET)?;
    store.put_json(FALLBACK_DATASET_KEY, &document)?;
    info!(version = %bundled.version, "seeded fallback dataset");
    Ok(true)
}
