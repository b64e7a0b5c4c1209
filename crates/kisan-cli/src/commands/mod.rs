mod distance;
mod nearby;
mod prices;
mod queue;
mod report;

use std::sync::Arc;
use std::time::Duration;

use kisan_core::{
    DisconnectedRemote, FetchResult, HttpRemoteFetch, KisanConfig, MarketService, RemoteFetch,
    TierFailure, TierKind,
};
use kisan_store::{DuckDbStore, LocalStore, MemoryStore};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::cli::{Cli, Command};
use crate::error::CliError;

/// Everything a command prints.
#[derive(Debug, Serialize)]
pub struct CommandOutput {
    pub data: Value,
    pub meta: OutputMeta,
}

#[derive(Debug, Serialize)]
pub struct OutputMeta {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<TierKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub degraded: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<TierFailure>,
}

impl CommandOutput {
    /// Output for a command that does not go through the tiered fetcher.
    pub fn local(data: Value) -> Self {
        Self {
            data,
            meta: OutputMeta {
                request_id: Uuid::new_v4().to_string(),
                tier: None,
                source: None,
                degraded: false,
                latency_ms: 0,
                warnings: Vec::new(),
                failures: Vec::new(),
            },
        }
    }

    pub fn from_fetch<T: Serialize>(result: FetchResult<T>) -> Result<Self, CliError> {
        let mut output = Self::local(serde_json::to_value(result.data())?);
        output.meta.tier = Some(result.tier());
        output.meta.source = Some(result.source_tier_name().to_owned());
        output.meta.degraded = result.is_degraded();
        output.meta.latency_ms = result.latency_ms();
        output.meta.failures = result.failures().to_vec();
        if let Some(message) = result.message() {
            output.meta.warnings.push(message.to_owned());
        }
        Ok(output)
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.meta.warnings.push(warning.into());
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandOutput, CliError> {
    if let Command::Distance(args) = &cli.command {
        return distance::run(args);
    }

    let config = load_config(cli)?;
    let service = open_service(cli, &config)?;

    match &cli.command {
        Command::Nearby(args) => nearby::run(args, &service).await,
        Command::Prices(args) => prices::run(args, &service).await,
        Command::Report(args) => report::run(args, &service).await,
        Command::Queue(args) => queue::run(args, &service).await,
        Command::Distance(args) => distance::run(args),
    }
}

/// Environment configuration with command-line overrides applied.
fn load_config(cli: &Cli) -> Result<KisanConfig, CliError> {
    let mut config = KisanConfig::from_env()?;
    if let Some(url) = &cli.api_url {
        config = config.with_api_base_url(url.clone());
    }
    if let Some(home) = &cli.home {
        config = config.with_home(home.clone());
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        if timeout_ms == 0 {
            return Err(CliError::Command(String::from(
                "--timeout-ms must be greater than zero",
            )));
        }
        config = config.with_tier_timeout(Duration::from_millis(timeout_ms));
    }
    Ok(config)
}

fn open_service(cli: &Cli, config: &KisanConfig) -> Result<MarketService, CliError> {
    let store: Arc<dyn LocalStore> = if cli.ephemeral {
        Arc::new(MemoryStore::new())
    } else {
        let store = DuckDbStore::open(config.store_config())?;
        debug!(path = %store.db_path().display(), "using on-disk store");
        Arc::new(store)
    };

    let remote: Arc<dyn RemoteFetch> = if cli.offline {
        Arc::new(DisconnectedRemote)
    } else {
        Arc::new(HttpRemoteFetch::from_config(config))
    };

    Ok(MarketService::open(remote, store, config)?)
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use kisan_core::{ClassifiedError, Tier, TieredDataFetcher};
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn fetch_metadata_is_carried_into_the_output() {
        let result = TieredDataFetcher::new()
            .fetch(vec![
                Tier::remote("market-api", Duration::from_secs(1), || async {
                    Err(ClassifiedError::no_connectivity("offline"))
                }),
                Tier::fallback("bundled-snapshot", Duration::from_secs(1), || async {
                    Ok(vec![1, 2])
                }),
            ])
            .await;

        let output = CommandOutput::from_fetch(result).expect("serializable");

        assert_eq!(output.data, serde_json::json!([1, 2]));
        assert_eq!(output.meta.tier, Some(TierKind::Fallback));
        assert_eq!(output.meta.source.as_deref(), Some("bundled-snapshot"));
        assert!(output.meta.degraded);
        assert_eq!(output.meta.failures.len(), 1);
        assert_eq!(output.meta.warnings.len(), 1);
    }

    #[test]
    fn command_line_overrides_environment() {
        let dir = tempdir().expect("tempdir");
        let home = dir.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from([
            "kisan",
            "queue",
            "list",
            "--home",
            home.as_str(),
            "--api-url",
            "https://mandi.example.test/v1",
            "--timeout-ms",
            "1500",
        ])
        .expect("valid arguments");

        let config = load_config(&cli).expect("valid config");

        assert_eq!(config.home, dir.path());
        assert_eq!(config.api_base_url.as_deref(), Some("https://mandi.example.test/v1"));
        assert_eq!(config.tier_timeout, Some(Duration::from_millis(1500)));
    }

    #[tokio::test]
    async fn offline_queue_listing_opens_a_store_under_home() {
        let dir = tempdir().expect("tempdir");
        let home = dir.path().to_string_lossy().into_owned();
        let cli = Cli::try_parse_from(["kisan", "queue", "list", "--offline", "--home", home.as_str()])
            .expect("valid arguments");

        let output = run(&cli).await.expect("queue list");

        assert_eq!(output.data, serde_json::json!([]));
        assert!(dir.path().join("store").join("kisan.duckdb").exists());
    }
}
