use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use crate::classify::{ClassifiedError, RawFailure};
use crate::config::KisanConfig;
use crate::throttling::RequestThrottle;

/// Header carrying a mutation's idempotency key on replay.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteMethod {
    Get,
    Post,
}

impl Display for RemoteMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
        })
    }
}

/// One call to the remote service: an endpoint relative to the base URL,
/// query parameters, optional JSON body and a per-call timeout.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteRequest {
    pub method: RemoteMethod,
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl RemoteRequest {
    pub fn new(method: RemoteMethod, endpoint: impl Into<String>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            params: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
            timeout: Duration::from_secs(8),
        }
    }

    pub fn get(endpoint: impl Into<String>) -> Self {
        Self::new(RemoteMethod::Get, endpoint)
    }

    pub fn post(endpoint: impl Into<String>, body: Value) -> Self {
        let mut request = Self::new(RemoteMethod::Post, endpoint);
        request.body = Some(body);
        request
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_idempotency_key(self, key: impl Into<String>) -> Self {
        self.with_header(IDEMPOTENCY_HEADER, key)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn idempotency_key(&self) -> Option<&str> {
        self.headers.get(IDEMPOTENCY_HEADER).map(String::as_str)
    }
}

pub type RemoteFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ClassifiedError>> + Send + 'a>>;

/// Transport to the remote market service. Errors are already classified.
pub trait RemoteFetch: Send + Sync {
    fn fetch<'a>(&'a self, request: RemoteRequest) -> RemoteFuture<'a>;
}

impl<R: RemoteFetch + ?Sized> RemoteFetch for Arc<R> {
    fn fetch<'a>(&'a self, request: RemoteRequest) -> RemoteFuture<'a> {
        (**self).fetch(request)
    }
}

/// Runs one call, failing it as a timeout if the transport does not answer
/// within `request.timeout`.
pub async fn fetch_bounded<R>(remote: &R, request: RemoteRequest) -> Result<Value, ClassifiedError>
where
    R: RemoteFetch + ?Sized,
{
    let timeout = request.timeout;
    let target = format!("{} {}", request.method, request.endpoint);
    match tokio::time::timeout(timeout, remote.fetch(request)).await {
        Ok(result) => result,
        Err(_) => Err(RawFailure::DeadlineExceeded(format!(
            "{target} did not answer within {} ms",
            timeout.as_millis()
        ))
        .classify()),
    }
}

/// Remote that is never reachable; every call fails as `NoConnectivity`.
#[derive(Debug, Default)]
pub struct DisconnectedRemote;

impl RemoteFetch for DisconnectedRemote {
    fn fetch<'a>(&'a self, request: RemoteRequest) -> RemoteFuture<'a> {
        Box::pin(async move {
            Err(RawFailure::Transport(format!(
                "offline: {} {} not sent",
                request.method, request.endpoint
            ))
            .classify())
        })
    }
}

/// Production transport over reqwest, guarded by a client-side throttle and a
/// circuit breaker.
#[derive(Debug)]
pub struct HttpRemoteFetch {
    client: reqwest::Client,
    base_url: Option<String>,
    api_key: Option<String>,
    breaker: CircuitBreaker,
    throttle: RequestThrottle,
}

impl HttpRemoteFetch {
    pub fn new(base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(concat!("kisan/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            base_url: base_url
                .map(|url| url.trim().trim_end_matches('/').to_owned())
                .filter(|url| !url.is_empty()),
            api_key: None,
            breaker: CircuitBreaker::default(),
            throttle: RequestThrottle::per_minute(60),
        }
    }

    pub fn from_config(config: &KisanConfig) -> Self {
        let mut remote = Self::new(config.api_base_url.clone())
            .with_throttle(RequestThrottle::per_minute(config.rate_limit_per_min));
        remote.api_key = config.api_key.clone();
        remote
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.breaker = CircuitBreaker::new(config);
        self
    }

    pub fn with_throttle(mut self, throttle: RequestThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn url_for(&self, request: &RemoteRequest) -> Result<String, RawFailure> {
        let Some(base_url) = &self.base_url else {
            return Err(RawFailure::MissingConfiguration {
                key: "KISAN_API_BASE_URL",
            });
        };
        Ok(build_url(base_url, &request.endpoint, &request.params))
    }

    async fn send(&self, request: RemoteRequest) -> Result<Value, RawFailure> {
        let url = self.url_for(&request)?;
        self.throttle.check()?;
        if !self.breaker.allow_request() {
            return Err(RawFailure::CircuitOpen);
        }

        debug!(method = %request.method, url = %url, "remote request");
        let mut builder = match request.method {
            RemoteMethod::Get => self.client.get(&url),
            RemoteMethod::Post => self.client.post(&url),
        }
        .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;

        if !status.is_success() {
            return Err(RawFailure::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).chars().take(512).collect(),
            });
        }
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes)
            .map_err(|error| RawFailure::MalformedPayload(format!("response is not JSON: {error}")))
    }
}

impl RemoteFetch for HttpRemoteFetch {
    fn fetch<'a>(&'a self, request: RemoteRequest) -> RemoteFuture<'a> {
        Box::pin(async move {
            match self.send(request).await {
                Ok(value) => {
                    self.breaker.record_success();
                    Ok(value)
                }
                Err(raw) => {
                    let error = RawFailure::classify(&raw);
                    match raw {
                        RawFailure::CircuitOpen
                        | RawFailure::RateLimited
                        | RawFailure::MissingConfiguration { .. } => {}
                        _ if error.retryable() => self.breaker.record_failure(),
                        // The server answered, so it is reachable.
                        _ => self.breaker.record_success(),
                    }
                    Err(error)
                }
            }
        })
    }
}

fn build_url(base_url: &str, endpoint: &str, params: &BTreeMap<String, String>) -> String {
    let mut url = format!("{base_url}/{}", endpoint.trim_start_matches('/'));
    for (index, (name, value)) in params.iter().enumerate() {
        url.push(if index == 0 { '?' } else { '&' });
        url.push_str(&urlencoding::encode(name));
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::ErrorKind;

    #[test]
    fn url_encodes_query_parameters_in_stable_order() {
        let request = RemoteRequest::get("/prices")
            .with_param("market", "delhi/north-west-delhi/azadpur")
            .with_param("crop", "Green Chilli");

        let url = build_url("https://api.example.test/v1", &request.endpoint, &request.params);
        assert_eq!(
            url,
            "https://api.example.test/v1/prices?crop=Green%20Chilli&market=delhi%2Fnorth-west-delhi%2Fazadpur"
        );
    }

    #[test]
    fn idempotency_key_is_sent_as_lowercase_header() {
        let request = RemoteRequest::post("reports", Value::Null).with_idempotency_key("abc-123");
        assert_eq!(request.idempotency_key(), Some("abc-123"));
        assert!(request.headers.contains_key("idempotency-key"));
    }

    #[tokio::test]
    async fn missing_base_url_is_a_configuration_error() {
        let remote = HttpRemoteFetch::new(Some(String::from("  ")));
        let error = remote
            .fetch(RemoteRequest::get("markets"))
            .await
            .expect_err("no base url");

        assert_eq!(error.kind(), ErrorKind::Configuration);
        assert!(!error.retryable());
    }

    #[tokio::test]
    async fn disconnected_remote_reports_no_connectivity() {
        let error = DisconnectedRemote
            .fetch(RemoteRequest::get("markets"))
            .await
            .expect_err("offline");
        assert_eq!(error.kind(), ErrorKind::NoConnectivity);
        assert!(error.retryable());
    }

    #[tokio::test]
    async fn open_circuit_fails_fast_without_a_request() {
        let remote = HttpRemoteFetch::new(Some(String::from("http://127.0.0.1:9"))).with_breaker(
            CircuitBreakerConfig {
                failure_threshold: 1,
                open_timeout: Duration::from_secs(60),
            },
        );
        remote.breaker().record_failure();

        let error = remote
            .fetch(RemoteRequest::get("markets"))
            .await
            .expect_err("circuit open");
        assert_eq!(error.kind(), ErrorKind::NoConnectivity);
        assert!(error.message().contains("circuit"));
    }
}
