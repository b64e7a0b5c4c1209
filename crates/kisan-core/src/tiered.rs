//! Ordered fallback pipeline for a single query.
//!
//! Tiers run one after another on the caller's task. Each attempt is bounded
//! by its own budget; a timeout or any error marks the tier failed and the next
//! one runs. The first tier to produce a value wins, even if that value is an
//! empty collection. When nothing produces a value the result is the `Empty`
//! tier with `T::default()`, never an error.

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::classify::ClassifiedError;

/// Where the data in a [`FetchResult`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TierKind {
    Remote,
    Cached,
    Fallback,
    Empty,
}

impl TierKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Cached => "cached",
            Self::Fallback => "fallback",
            Self::Empty => "empty",
        }
    }

    pub const fn is_degraded(self) -> bool {
        matches!(self, Self::Fallback | Self::Empty)
    }
}

impl Display for TierKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type TierFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ClassifiedError>> + Send + 'a>>;

type TierAttempt<'a, T> = Box<dyn FnOnce() -> TierFuture<'a, T> + Send + 'a>;

/// One step of the pipeline: a named attempt with a time budget.
pub struct Tier<'a, T> {
    name: String,
    kind: TierKind,
    timeout: Duration,
    attempt: TierAttempt<'a, T>,
}

impl<'a, T> Tier<'a, T> {
    fn new<F, Fut>(name: impl Into<String>, kind: TierKind, timeout: Duration, attempt: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, ClassifiedError>> + Send + 'a,
    {
        Self {
            name: name.into(),
            kind,
            timeout,
            attempt: Box::new(move || -> TierFuture<'a, T> { Box::pin(attempt()) }),
        }
    }

    /// Live data from the remote service.
    pub fn remote<F, Fut>(name: impl Into<String>, timeout: Duration, attempt: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, ClassifiedError>> + Send + 'a,
    {
        Self::new(name, TierKind::Remote, timeout, attempt)
    }

    /// Recently fetched remote data.
    pub fn cached<F, Fut>(name: impl Into<String>, timeout: Duration, attempt: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, ClassifiedError>> + Send + 'a,
    {
        Self::new(name, TierKind::Cached, timeout, attempt)
    }

    /// Degraded data, e.g. a bundled snapshot.
    pub fn fallback<F, Fut>(name: impl Into<String>, timeout: Duration, attempt: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = Result<T, ClassifiedError>> + Send + 'a,
    {
        Self::new(name, TierKind::Fallback, timeout, attempt)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn kind(&self) -> TierKind {
        self.kind
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// A tier that was tried and did not produce data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TierFailure {
    pub tier: String,
    pub kind: TierKind,
    pub error: ClassifiedError,
}

/// The only value a tiered query returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult<T> {
    tier: TierKind,
    data: T,
    is_degraded: bool,
    source_tier_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    failures: Vec<TierFailure>,
    latency_ms: u64,
}

impl<T> FetchResult<T> {
    pub const fn tier(&self) -> TierKind {
        self.tier
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    pub fn into_data(self) -> T {
        self.data
    }

    pub const fn is_degraded(&self) -> bool {
        self.is_degraded
    }

    pub fn source_tier_name(&self) -> &str {
        &self.source_tier_name
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Tiers that failed before the result was produced, in order.
    pub fn failures(&self) -> &[TierFailure] {
        &self.failures
    }

    pub const fn latency_ms(&self) -> u64 {
        self.latency_ms
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FetchResult<U> {
        FetchResult {
            tier: self.tier,
            data: f(self.data),
            is_degraded: self.is_degraded,
            source_tier_name: self.source_tier_name,
            message: self.message,
            failures: self.failures,
            latency_ms: self.latency_ms,
        }
    }
}

/// Runs tiers in order and reports which one answered.
#[derive(Debug, Clone, Copy, Default)]
pub struct TieredDataFetcher;

impl TieredDataFetcher {
    pub fn new() -> Self {
        Self
    }

    pub async fn fetch<T: Default>(&self, tiers: Vec<Tier<'_, T>>) -> FetchResult<T> {
        let started = Instant::now();
        let mut failures = Vec::new();

        for tier in tiers {
            let Tier {
                name,
                kind,
                timeout,
                attempt,
            } = tier;
            debug!(tier = %name, kind = %kind, budget_ms = millis(timeout), "attempting tier");

            let error = match tokio::time::timeout(timeout, attempt()).await {
                Ok(Ok(data)) => {
                    let message = (!failures.is_empty()).then(|| {
                        format!(
                            "served by {kind} tier '{name}' after {} failed tier(s)",
                            failures.len()
                        )
                    });
                    if kind.is_degraded() {
                        info!(tier = %name, failed = failures.len(), "serving degraded data");
                    }
                    return FetchResult {
                        tier: kind,
                        data,
                        is_degraded: kind.is_degraded(),
                        source_tier_name: name,
                        message,
                        failures,
                        latency_ms: elapsed_ms(started),
                    };
                }
                Ok(Err(error)) => error,
                Err(_) => ClassifiedError::timeout(format!(
                    "tier '{name}' exceeded its {} ms budget",
                    millis(timeout)
                )),
            };

            warn!(tier = %name, kind = %error.kind(), error = %error, "tier failed, moving on");
            failures.push(TierFailure {
                tier: name,
                kind,
                error,
            });
        }

        warn!(failed = failures.len(), "every tier failed, returning empty result");
        FetchResult {
            tier: TierKind::Empty,
            data: T::default(),
            is_degraded: true,
            source_tier_name: TierKind::Empty.as_str().to_owned(),
            message: Some(String::from("no data available from any tier")),
            failures,
            latency_ms: elapsed_ms(started),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn elapsed_ms(started: Instant) -> u64 {
    millis(started.elapsed())
}
