//! Behaviour tests for the remote, cached, fallback, empty pipeline.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use kisan_core::{ClassifiedError, ErrorKind, Tier, TierKind, TieredDataFetcher};

const BUDGET: Duration = Duration::from_secs(2);

// ============================================================================
// Tier precedence
// ============================================================================

#[tokio::test]
async fn when_remote_answers_later_tiers_are_never_invoked() {
    // Given: three tiers that count their invocations
    let remote_calls = AtomicUsize::new(0);
    let cached_calls = AtomicUsize::new(0);
    let fallback_calls = AtomicUsize::new(0);

    // When: the remote tier succeeds
    let result = TieredDataFetcher::new()
        .fetch(vec![
            Tier::remote("api", BUDGET, || async {
                remote_calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["live"])
            }),
            Tier::cached("memory", BUDGET, || async {
                cached_calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["cached"])
            }),
            Tier::fallback("snapshot", BUDGET, || async {
                fallback_calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec!["bundled"])
            }),
        ])
        .await;

    // Then: the live answer is returned and nothing else ran
    assert_eq!(result.tier(), TierKind::Remote);
    assert!(!result.is_degraded());
    assert_eq!(result.source_tier_name(), "api");
    assert!(result.failures().is_empty());
    assert_eq!(result.data(), &vec!["live"]);
    assert_eq!(remote_calls.load(Ordering::SeqCst), 1);
    assert_eq!(cached_calls.load(Ordering::SeqCst), 0);
    assert_eq!(fallback_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn when_remote_and_cache_fail_the_bundled_snapshot_is_served_degraded() {
    let result = TieredDataFetcher::new()
        .fetch(vec![
            Tier::remote("api", BUDGET, || async {
                Err(ClassifiedError::no_connectivity("airplane mode"))
            }),
            Tier::cached("memory", BUDGET, || async {
                Err(ClassifiedError::not_found("nothing cached"))
            }),
            Tier::fallback("snapshot", BUDGET, || async { Ok(vec![1, 2, 3]) }),
        ])
        .await;

    assert_eq!(result.tier(), TierKind::Fallback);
    assert!(result.is_degraded());
    assert_eq!(result.source_tier_name(), "snapshot");

    // And: each failed tier is recorded in order with its classification
    let failures = result.failures();
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].tier, "api");
    assert_eq!(failures[0].kind, TierKind::Remote);
    assert_eq!(failures[0].error.kind(), ErrorKind::NoConnectivity);
    assert_eq!(failures[1].tier, "memory");
    assert_eq!(failures[1].kind, TierKind::Cached);
}

// ============================================================================
// Exhaustion and timeouts
// ============================================================================

#[tokio::test(start_paused = true)]
async fn when_every_tier_fails_or_hangs_the_user_gets_an_empty_degraded_result() {
    // Given: a remote that never answers and local tiers that fail
    let result = TieredDataFetcher::new()
        .fetch(vec![
            Tier::remote("api", BUDGET, || async {
                std::future::pending::<Result<Vec<String>, ClassifiedError>>().await
            }),
            Tier::cached("memory", BUDGET, || async {
                Err(ClassifiedError::not_found("nothing cached"))
            }),
            Tier::fallback("snapshot", BUDGET, || async {
                Err(ClassifiedError::unknown("snapshot unreadable"))
            }),
        ])
        .await;

    // Then: no error escapes, the data is empty and flagged
    assert_eq!(result.tier(), TierKind::Empty);
    assert!(result.is_degraded());
    assert_eq!(result.source_tier_name(), "empty");
    assert_eq!(result.message(), Some("no data available from any tier"));
    assert!(result.data().is_empty());
    assert_eq!(result.failures().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn a_tier_that_exceeds_its_budget_counts_as_a_timeout_failure() {
    let result = TieredDataFetcher::new()
        .fetch(vec![
            Tier::remote("api", Duration::from_millis(500), || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(String::from("too late"))
            }),
            Tier::cached("memory", BUDGET, || async { Ok(String::from("cached")) }),
        ])
        .await;

    assert_eq!(result.tier(), TierKind::Cached);
    assert_eq!(result.data(), "cached");
    assert_eq!(result.failures()[0].error.kind(), ErrorKind::Timeout);
    assert!(result.failures()[0].error.retryable());

    // And: the slow tier was cut off at its budget
    assert!(result.latency_ms() < 1_000, "latency {}", result.latency_ms());
}

#[tokio::test]
async fn tiers_run_one_after_another_in_declared_order() {
    let order = Mutex::new(Vec::new());
    let record = |name: &'static str| order.lock().expect("order lock").push(name);

    let result = TieredDataFetcher::new()
        .fetch(vec![
            Tier::remote("api", BUDGET, || async {
                record("api:start");
                tokio::task::yield_now().await;
                record("api:end");
                Err::<u8, _>(ClassifiedError::no_connectivity("offline"))
            }),
            Tier::cached("memory", BUDGET, || async {
                record("memory:start");
                tokio::task::yield_now().await;
                record("memory:end");
                Err(ClassifiedError::not_found("empty"))
            }),
            Tier::fallback("snapshot", BUDGET, || async {
                record("snapshot");
                Ok(9)
            }),
        ])
        .await;

    assert_eq!(*result.data(), 9);
    assert_eq!(
        *order.lock().expect("order lock"),
        vec!["api:start", "api:end", "memory:start", "memory:end", "snapshot"]
    );
}
