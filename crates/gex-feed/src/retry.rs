//! Per-topic subscription retry.

use crate::client::QuoteFeedClient;
use crate::error::FeedError;
use gex_core::Topic;
use gex_telemetry::Metrics;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fixed-backoff retry policy for `subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per topic, including the first.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        }
    }
}

/// Result of subscribing one topic.
#[derive(Debug)]
pub enum SubscribeOutcome {
    Subscribed,
    /// Every attempt failed; carries the last failure.
    Failed(FeedError),
    /// The stop signal fired during backoff.
    Cancelled,
}

/// Subscribe `topic`, retrying on `Err` and on `Ok(false)`.
///
/// The failure is only reported once all attempts are spent. Backoff sleeps
/// are cut short by `token`.
pub async fn subscribe_with_retry<C>(
    client: &mut C,
    topic: &Topic,
    policy: &RetryPolicy,
    token: &CancellationToken,
) -> SubscribeOutcome
where
    C: QuoteFeedClient + ?Sized,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_reason = String::new();

    for attempt in 1..=max_attempts {
        match client.subscribe(topic) {
            Ok(true) => {
                Metrics::subscribe_attempt("ok");
                return SubscribeOutcome::Subscribed;
            }
            Ok(false) => {
                Metrics::subscribe_attempt("rejected");
                last_reason = FeedError::SubscriptionRejected(topic.to_string()).to_string();
            }
            Err(e) => {
                Metrics::subscribe_attempt("error");
                last_reason = e.to_string();
            }
        }
        debug!(%topic, attempt, reason = %last_reason, "Subscribe attempt failed");

        if attempt < max_attempts {
            tokio::select! {
                () = tokio::time::sleep(policy.backoff) => {}
                () = token.cancelled() => return SubscribeOutcome::Cancelled,
            }
        }
    }

    Metrics::subscribe_failed();
    warn!(%topic, attempts = max_attempts, reason = %last_reason, "Subscription failed");
    SubscribeOutcome::Failed(FeedError::SubscriptionFailed {
        topic: topic.to_string(),
        attempts: max_attempts,
        reason: last_reason,
    })
}
