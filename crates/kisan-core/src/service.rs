//! Composition of the data layer into the queries the app makes.

use std::sync::Arc;
use std::time::Duration;

use kisan_store::LocalStore;
use serde::Serialize;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::classify::ClassifiedError;
use crate::config::KisanConfig;
use crate::fallback::{seed_fallback, FallbackDataset};
use crate::nearest::{find_nearest, validate_radius, NearbyMarket};
use crate::payload::{parse_market_listing, parse_price_rows};
use crate::queue::{OfflineSyncQueue, RemoteReplay, SyncPayload, SyncReport, SyncTask};
use crate::remote::{fetch_bounded, RemoteFetch, RemoteRequest};
use crate::retry::RetryPolicy;
use crate::tiered::{FetchResult, Tier, TieredDataFetcher};
use crate::{CoreError, GeoPoint, MarketEntity, MarketId, PriceQuote, PriceReport, ValidationError};

const MARKETS_ENDPOINT: &str = "markets";
const PRICES_ENDPOINT: &str = "prices";
const REPORTS_ENDPOINT: &str = "reports";
const MARKETS_CACHE_KEY: &str = "markets/all";

/// Time budgets for the tiers of one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTimeouts {
    /// Whole remote tier, retries included.
    pub remote: Duration,
    /// One HTTP call.
    pub request: Duration,
    /// Cached and fallback tiers.
    pub local: Duration,
}

impl TierTimeouts {
    pub fn from_config(config: &KisanConfig) -> Self {
        Self {
            remote: config.remote_budget(),
            request: config.request_timeout,
            local: Duration::from_secs(2),
        }
    }
}

/// What happened to a submitted mutation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Delivered,
    /// The device is offline; the report will be replayed by the queue.
    Queued { task: SyncTask },
}

/// Market queries over remote, cached and bundled data, plus offline-safe
/// price reporting.
pub struct MarketService {
    remote: Arc<dyn RemoteFetch>,
    store: Arc<dyn LocalStore>,
    cache: CacheStore,
    fetcher: TieredDataFetcher,
    retry: RetryPolicy,
    queue: Arc<OfflineSyncQueue>,
    timeouts: TierTimeouts,
}

impl MarketService {
    /// Wire the service from configuration, seeding the fallback snapshot
    /// and loading the offline queue from `store`.
    pub fn open(
        remote: Arc<dyn RemoteFetch>,
        store: Arc<dyn LocalStore>,
        config: &KisanConfig,
    ) -> Result<Self, CoreError> {
        let retry = config.retry_policy();
        let timeouts = TierTimeouts::from_config(config);
        let replay = Arc::new(RemoteReplay::new(Arc::clone(&remote), timeouts.request));
        let queue = Arc::new(OfflineSyncQueue::open(Arc::clone(&store), replay, retry)?);

        Self::new(remote, store, CacheStore::new(config.cache_ttl), queue, retry, timeouts)
    }

    pub fn new(
        remote: Arc<dyn RemoteFetch>,
        store: Arc<dyn LocalStore>,
        cache: CacheStore,
        queue: Arc<OfflineSyncQueue>,
        retry: RetryPolicy,
        timeouts: TierTimeouts,
    ) -> Result<Self, CoreError> {
        seed_fallback(store.as_ref())?;
        Ok(Self {
            remote,
            store,
            cache,
            fetcher: TieredDataFetcher::new(),
            retry,
            queue,
            timeouts,
        })
    }

    pub fn queue(&self) -> &Arc<OfflineSyncQueue> {
        &self.queue
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Markets within `radius_km` of `origin`, nearest first.
    ///
    /// Only invalid input is an error; unavailable data yields a degraded or
    /// empty result.
    pub async fn nearby_markets(
        &self,
        origin: GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<FetchResult<Vec<NearbyMarket>>, ClassifiedError> {
        validate_radius(radius_km)?;
        let nearest = move |markets: &[MarketEntity]| {
            find_nearest(origin, markets, radius_km, limit).map_err(ClassifiedError::from)
        };

        let tiers = vec![
            Tier::remote("market-api", self.timeouts.remote, move || async move {
                let markets = self.fetch_markets().await?;
                nearest(markets.as_slice())
            }),
            Tier::cached("memory-cache", self.timeouts.local, move || async move {
                let markets = self
                    .cache
                    .get_json::<Vec<MarketEntity>>(MARKETS_CACHE_KEY)
                    .await
                    .ok_or_else(|| ClassifiedError::not_found("no cached market listing"))?;
                nearest(markets.as_slice())
            }),
            Tier::fallback("bundled-snapshot", self.timeouts.local, move || async move {
                let dataset = self.fallback_dataset()?;
                nearest(dataset.markets())
            }),
        ];

        Ok(self.fetcher.fetch(tiers).await)
    }

    /// Current prices at `market`, optionally for a single crop.
    pub async fn market_prices(
        &self,
        market: &MarketId,
        crop: Option<&str>,
    ) -> Result<FetchResult<Vec<PriceQuote>>, ClassifiedError> {
        let crop = match crop.map(str::trim) {
            Some("") => return Err(ValidationError::EmptyField { field: "crop" }.into()),
            other => other,
        };
        let cache_key = format!(
            "prices/{market}/{}",
            crop.map_or_else(|| String::from("*"), str::to_ascii_lowercase)
        );
        let cache_key = cache_key.as_str();

        let tiers = vec![
            Tier::remote("price-api", self.timeouts.remote, move || async move {
                let quotes = self.fetch_prices(market, crop).await?;
                if let Err(error) = self.cache.put_json(cache_key, &quotes).await {
                    debug!(%error, "price list not cached");
                }
                Ok(quotes)
            }),
            Tier::cached("memory-cache", self.timeouts.local, move || async move {
                self.cache
                    .get_json::<Vec<PriceQuote>>(cache_key)
                    .await
                    .ok_or_else(|| ClassifiedError::not_found("no cached prices"))
            }),
            Tier::fallback("bundled-snapshot", self.timeouts.local, move || async move {
                Ok(self.fallback_dataset()?.prices_for(market, crop))
            }),
        ];

        Ok(self.fetcher.fetch(tiers).await)
    }

    /// Post a farmer's price observation. Connectivity failures queue the
    /// report for replay instead of failing; other failures are returned.
    pub async fn submit_price_report(
        &self,
        report: &PriceReport,
        idempotency_key: &str,
    ) -> Result<SubmitOutcome, ClassifiedError> {
        let idempotency_key = idempotency_key.trim();
        if idempotency_key.is_empty() {
            return Err(ValidationError::EmptyIdempotencyKey.into());
        }

        let body = serde_json::to_value(report).map_err(CoreError::from)?;
        let request = RemoteRequest::post(REPORTS_ENDPOINT, body.clone())
            .with_idempotency_key(idempotency_key)
            .with_timeout(self.timeouts.request);

        match self
            .retry
            .retry(|| fetch_bounded(self.remote.as_ref(), request.clone()))
            .await
        {
            Ok(_) => {
                info!(key = idempotency_key, "price report delivered");
                Ok(SubmitOutcome::Delivered)
            }
            Err(error) if error.kind().is_connectivity() => {
                info!(key = idempotency_key, kind = %error.kind(), "offline, queueing price report");
                let task = self
                    .queue
                    .enqueue(idempotency_key, SyncPayload::new(REPORTS_ENDPOINT, body))
                    .await?;
                Ok(SubmitOutcome::Queued { task })
            }
            Err(error) => Err(error),
        }
    }

    /// Replay queued mutations now.
    pub async fn sync_pending(&self) -> Result<SyncReport, ClassifiedError> {
        self.queue.sync().await
    }

    async fn fetch_markets(&self) -> Result<Vec<MarketEntity>, ClassifiedError> {
        let payload = self
            .retry
            .retry(|| {
                let request =
                    RemoteRequest::get(MARKETS_ENDPOINT).with_timeout(self.timeouts.request);
                fetch_bounded(self.remote.as_ref(), request)
            })
            .await?;
        let markets = parse_market_listing(payload)?;

        if let Err(error) = self.cache.put_json(MARKETS_CACHE_KEY, &markets).await {
            debug!(%error, "market listing not cached");
        }
        Ok(markets)
    }

    async fn fetch_prices(
        &self,
        market: &MarketId,
        crop: Option<&str>,
    ) -> Result<Vec<PriceQuote>, ClassifiedError> {
        let mut request = RemoteRequest::get(PRICES_ENDPOINT)
            .with_param("market", market.as_str())
            .with_timeout(self.timeouts.request);
        if let Some(crop) = crop {
            request = request.with_param("crop", crop);
        }

        let payload = self
            .retry
            .retry(|| fetch_bounded(self.remote.as_ref(), request.clone()))
            .await?;
        let mut quotes = parse_price_rows(market, payload)?;
        if let Some(crop) = crop {
            quotes.retain(|quote| quote.crop_name.eq_ignore_ascii_case(crop));
        }
        Ok(quotes)
    }

    fn fallback_dataset(&self) -> Result<FallbackDataset, ClassifiedError> {
        match FallbackDataset::load(self.store.as_ref())? {
            Some(dataset) => Ok(dataset),
            None => FallbackDataset::bundled(),
        }
    }
}

impl std::fmt::Debug for MarketService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketService")
            .field("retry", &self.retry)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}
