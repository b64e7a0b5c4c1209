use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use kisan_store::StoreConfig;

use crate::retry::RetryPolicy;
use crate::ValidationError;

pub const ENV_API_BASE_URL: &str = "KISAN_API_BASE_URL";
pub const ENV_API_KEY: &str = "KISAN_API_KEY";
pub const ENV_HOME: &str = "KISAN_HOME";
pub const ENV_TIMEOUT_MS: &str = "KISAN_TIMEOUT_MS";
pub const ENV_REQUEST_TIMEOUT_MS: &str = "KISAN_REQUEST_TIMEOUT_MS";
pub const ENV_RETRY_MAX_ATTEMPTS: &str = "KISAN_RETRY_MAX_ATTEMPTS";
pub const ENV_RETRY_BASE_DELAY_MS: &str = "KISAN_RETRY_BASE_DELAY_MS";
pub const ENV_CACHE_TTL_SECS: &str = "KISAN_CACHE_TTL_SECS";
pub const ENV_RATE_LIMIT_PER_MIN: &str = "KISAN_RATE_LIMIT_PER_MIN";

/// Slack added to a derived remote budget so the last attempt's own timeout
/// fires before the tier's.
const REMOTE_BUDGET_GRACE: Duration = Duration::from_secs(1);

/// Runtime settings for the data layer.
#[derive(Debug, Clone, PartialEq)]
pub struct KisanConfig {
    /// Remote service base URL. Without it the remote tier fails with a
    /// `Configuration` error and reads degrade.
    pub api_base_url: Option<String>,
    pub api_key: Option<String>,
    /// Data directory holding the store.
    pub home: PathBuf,
    /// Budget for a whole remote tier, retries included. When unset it is
    /// derived from the retry schedule, see [`KisanConfig::remote_budget`].
    pub tier_timeout: Option<Duration>,
    /// Timeout for a single HTTP call.
    pub request_timeout: Duration,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    /// Zero disables the cached tier.
    pub cache_ttl: Duration,
    pub rate_limit_per_min: u32,
}

impl Default for KisanConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            api_key: None,
            home: kisan_store::default_home(),
            tier_timeout: None,
            request_timeout: Duration::from_secs(8),
            retry_max_attempts: 3,
            retry_base_delay: Duration::from_secs(2),
            cache_ttl: Duration::from_secs(300),
            rate_limit_per_min: 60,
        }
    }
}

impl KisanConfig {
    pub fn from_env() -> Result<Self, ValidationError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; unset and blank variables
    /// keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ValidationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        config.api_base_url = get(ENV_API_BASE_URL);
        config.api_key = get(ENV_API_KEY);
        if let Some(home) = get(ENV_HOME) {
            config.home = PathBuf::from(home);
        } else if let Some(home) = get("HOME") {
            config.home = PathBuf::from(home).join(".kisan");
        }

        if let Some(value) = get(ENV_TIMEOUT_MS) {
            let millis = parse_positive(ENV_TIMEOUT_MS, &value)?;
            config.tier_timeout = Some(Duration::from_millis(millis));
        }
        if let Some(value) = get(ENV_REQUEST_TIMEOUT_MS) {
            config.request_timeout =
                Duration::from_millis(parse_positive(ENV_REQUEST_TIMEOUT_MS, &value)?);
        }
        if let Some(value) = get(ENV_RETRY_MAX_ATTEMPTS) {
            config.retry_max_attempts = parse_positive(ENV_RETRY_MAX_ATTEMPTS, &value)?;
        }
        if let Some(value) = get(ENV_RETRY_BASE_DELAY_MS) {
            config.retry_base_delay = Duration::from_millis(parse(ENV_RETRY_BASE_DELAY_MS, &value)?);
        }
        if let Some(value) = get(ENV_CACHE_TTL_SECS) {
            config.cache_ttl = Duration::from_secs(parse(ENV_CACHE_TTL_SECS, &value)?);
        }
        if let Some(value) = get(ENV_RATE_LIMIT_PER_MIN) {
            config.rate_limit_per_min = parse_positive(ENV_RATE_LIMIT_PER_MIN, &value)?;
        }

        Ok(config)
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    pub fn with_tier_timeout(mut self, timeout: Duration) -> Self {
        self.tier_timeout = Some(timeout);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.retry_max_attempts = max_attempts;
        self.retry_base_delay = base_delay;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_max_attempts, self.retry_base_delay)
    }

    /// Budget for the remote tier: the configured one, or long enough for
    /// every retry attempt to time out on its own.
    pub fn remote_budget(&self) -> Duration {
        self.tier_timeout.unwrap_or_else(|| {
            self.retry_policy()
                .worst_case(self.request_timeout)
                .saturating_add(REMOTE_BUDGET_GRACE)
        })
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::in_home(&self.home)
    }
}

fn parse<T: FromStr>(key: &'static str, value: &str) -> Result<T, ValidationError> {
    value.parse().map_err(|_| ValidationError::InvalidConfig {
        key,
        value: value.to_owned(),
    })
}

fn parse_positive<T: FromStr + Default + PartialEq>(
    key: &'static str,
    value: &str,
) -> Result<T, ValidationError> {
    let parsed = parse(key, value)?;
    if parsed == T::default() {
        return Err(ValidationError::InvalidConfig {
            key,
            value: value.to_owned(),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect::<HashMap<_, _>>();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = KisanConfig::from_lookup(lookup(&[("HOME", "/home/farmer")])).expect("valid");
        assert_eq!(config.api_base_url, None);
        assert_eq!(config.home, PathBuf::from("/home/farmer/.kisan"));
        assert_eq!(config.retry_policy(), RetryPolicy::new(3, Duration::from_secs(2)));
        assert_eq!(config.cache_ttl, Duration::from_secs(300));
        assert_eq!(config.request_timeout, Duration::from_secs(8));
        assert_eq!(config.tier_timeout, None);
    }

    #[test]
    fn derived_remote_budget_outlasts_every_retry() {
        let config = KisanConfig::default();
        let schedule = config.retry_policy().worst_case(config.request_timeout);
        assert_eq!(schedule, Duration::from_secs(30));
        assert!(config.remote_budget() > schedule);

        let slower = KisanConfig::default().with_request_timeout(Duration::from_secs(20));
        assert!(slower.remote_budget() > Duration::from_secs(66));

        let pinned = KisanConfig::default().with_tier_timeout(Duration::from_secs(5));
        assert_eq!(pinned.remote_budget(), Duration::from_secs(5));
    }

    #[test]
    fn reads_every_variable() {
        let config = KisanConfig::from_lookup(lookup(&[
            (ENV_API_BASE_URL, "https://mandi.example.test/v1"),
            (ENV_API_KEY, "secret"),
            (ENV_HOME, "/data/kisan"),
            (ENV_TIMEOUT_MS, "15000"),
            (ENV_REQUEST_TIMEOUT_MS, "4000"),
            (ENV_RETRY_MAX_ATTEMPTS, "5"),
            (ENV_RETRY_BASE_DELAY_MS, "250"),
            (ENV_CACHE_TTL_SECS, "0"),
            (ENV_RATE_LIMIT_PER_MIN, "10"),
        ]))
        .expect("valid");

        assert_eq!(config.api_base_url.as_deref(), Some("https://mandi.example.test/v1"));
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.store_config().db_path, PathBuf::from("/data/kisan/store/kisan.duckdb"));
        assert_eq!(config.tier_timeout, Some(Duration::from_millis(15_000)));
        assert_eq!(config.request_timeout, Duration::from_millis(4_000));
        assert_eq!(config.retry_max_attempts, 5);
        assert_eq!(config.retry_base_delay, Duration::from_millis(250));
        assert_eq!(config.cache_ttl, Duration::ZERO);
        assert_eq!(config.rate_limit_per_min, 10);
    }

    #[test]
    fn blank_values_are_treated_as_unset() {
        let config = KisanConfig::from_lookup(lookup(&[(ENV_API_BASE_URL, "   ")])).expect("valid");
        assert_eq!(config.api_base_url, None);
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let error = KisanConfig::from_lookup(lookup(&[(ENV_RETRY_MAX_ATTEMPTS, "three")]))
            .expect_err("not a number");
        assert_eq!(
            error,
            ValidationError::InvalidConfig {
                key: ENV_RETRY_MAX_ATTEMPTS,
                value: String::from("three"),
            }
        );

        let error = KisanConfig::from_lookup(lookup(&[(ENV_TIMEOUT_MS, "0")])).expect_err("zero budget");
        assert!(matches!(error, ValidationError::InvalidConfig { key: ENV_TIMEOUT_MS, .. }));
    }
}
