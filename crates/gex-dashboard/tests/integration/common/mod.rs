//! Shared helpers for session integration tests.

use chrono::NaiveDate;
use gex_core::{StrikeSelection, StrikeSpacing};
use gex_dashboard::{PollOutcome, SessionConfig, SessionRequest, StreamingSession};
use gex_feed::{FeedFactory, ProducerConfig, RetryPolicy};
use rust_decimal::Decimal;
use std::time::Duration;
use tokio::time::{timeout, Instant};

/// Session timing fast enough for tests.
pub fn fast_config() -> SessionConfig {
    SessionConfig {
        producer: ProducerConfig {
            poll_interval: Duration::from_millis(10),
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            },
            settle_delay: Duration::ZERO,
        },
        restart_grace: Duration::from_millis(500),
        expand_grace: Duration::from_millis(500),
    }
}

/// SPY centered request with no redraw throttling.
pub fn centered_request(range: Decimal) -> SessionRequest {
    SessionRequest {
        symbol: "SPY".to_string(),
        expiry: NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
        strikes: StrikeSelection::Centered { range },
        spacing: StrikeSpacing::Five,
        refresh_interval: Duration::ZERO,
    }
}

/// Poll until `accept` returns true for an outcome, or panic after 3s.
pub async fn poll_until<F, P>(session: &mut StreamingSession<F>, mut accept: P) -> PollOutcome
where
    F: FeedFactory,
    P: FnMut(&PollOutcome) -> bool,
{
    let started = Instant::now();
    let result = timeout(Duration::from_secs(3), async {
        loop {
            let outcome = session.poll().await;
            if accept(&outcome) {
                return outcome;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    match result {
        Ok(outcome) => outcome,
        Err(_) => panic!(
            "no matching poll outcome after {:?}, state {:?}",
            started.elapsed(),
            session.state()
        ),
    }
}

pub fn is_update(outcome: &PollOutcome) -> bool {
    matches!(outcome, PollOutcome::Update(_))
}

pub fn is_failure(outcome: &PollOutcome) -> bool {
    matches!(outcome, PollOutcome::Failed(_))
}
