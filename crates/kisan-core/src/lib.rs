//! # Kisan Core
//!
//! Resilient, location-aware market data access for the kisan farming
//! assistant.
//!
//! ## Overview
//!
//! | Component | Module | Role |
//! |-----------|--------|------|
//! | Geo distance | [`domain`] | Haversine distance over validated [`GeoPoint`]s |
//! | Nearest finder | [`nearest`] | Radius filter, distance ranking, limit |
//! | Error classifier | [`classify`] | Raw failures to [`ClassifiedError`] |
//! | Retry policy | [`retry`] | Linear backoff over classified failures |
//! | Tiered fetcher | [`tiered`] | Remote, cached, fallback, empty |
//! | Offline queue | [`queue`] | Durable FIFO replay of deferred mutations |
//! | Market service | [`service`] | The queries above wired together |
//!
//! Supporting pieces: [`remote`] (HTTP transport behind the [`RemoteFetch`]
//! trait, with a [`circuit_breaker`] and client-side [`throttling`]),
//! [`cache`], [`payload`] validation, the bundled [`fallback`] snapshot,
//! [`connectivity`] tracking and [`config`].
//!
//! ## Failure model
//!
//! Reads never fail because data is unavailable: they return a
//! [`FetchResult`] whose tier says where the data came from and whether it is
//! degraded. Only invalid input is an error. Mutations that fail because the
//! device is offline are queued and replayed later; every other failure
//! reaches the caller as a [`ClassifiedError`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use kisan_core::{GeoPoint, HttpRemoteFetch, KisanConfig, MarketService};
//! use kisan_store::MemoryStore;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = KisanConfig::from_env()?;
//! let service = MarketService::open(
//!     Arc::new(HttpRemoteFetch::from_config(&config)),
//!     Arc::new(MemoryStore::new()),
//!     &config,
//! )?;
//!
//! let delhi = GeoPoint::new(28.6139, 77.2090)?;
//! let result = service.nearby_markets(delhi, 50.0, 5).await?;
//! for nearby in result.data() {
//!     println!("{} {:.1} km", nearby.market.name, nearby.distance_km);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod circuit_breaker;
pub mod classify;
pub mod config;
pub mod connectivity;
pub mod domain;
pub mod error;
pub mod fallback;
pub mod nearest;
pub mod payload;
pub mod queue;
pub mod remote;
pub mod retry;
pub mod service;
pub mod throttling;
pub mod tiered;

pub use cache::{CacheStore, CachedBody};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use classify::{classify, Classify, ClassifiedError, ErrorKind, RawFailure, Severity};
pub use config::KisanConfig;
pub use connectivity::{spawn_sync_on_reconnect, ConnectivityMonitor};
pub use domain::{
    distance_between, distance_km, DemandLevel, GeoPoint, MarketEntity, MarketId, PriceQuote,
    PriceReport, UtcDateTime, EARTH_RADIUS_KM,
};
pub use error::{CoreError, ValidationError};
pub use fallback::{seed_fallback, FallbackDataset, FALLBACK_DATASET_KEY};
pub use nearest::{find_nearest, NearbyMarket};
pub use payload::{parse_market_listing, parse_price_rows, MarketListingRow, PriceRow};
pub use queue::{
    OfflineSyncQueue, RemoteReplay, ReplayFuture, SyncHandler, SyncPayload, SyncReport,
    SyncStatus, SyncTask, QUEUE_STATE_KEY,
};
pub use remote::{
    fetch_bounded, DisconnectedRemote, HttpRemoteFetch, RemoteFetch, RemoteFuture, RemoteMethod,
    RemoteRequest, IDEMPOTENCY_HEADER,
};
pub use retry::{retry, Backoff, RetryPolicy};
pub use service::{MarketService, SubmitOutcome, TierTimeouts};
pub use throttling::RequestThrottle;
pub use tiered::{FetchResult, Tier, TierFailure, TierFuture, TierKind, TieredDataFetcher};
