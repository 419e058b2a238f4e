//! Prometheus metrics for gex-stream.
//!
//! Covers:
//! - Producer lifecycle (starts, exits, abandoned tasks)
//! - Subscription attempts and failures
//! - Snapshot publication and mailbox evictions
//! - Session state
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration failure
//! means duplicate metric names, a programming error that should crash at
//! first use rather than silently drop metrics.

use crate::error::TelemetryResult;
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_int_counter, register_int_gauge_vec, CounterVec, Encoder,
    IntCounter, IntGaugeVec, TextEncoder,
};

/// Session states exported by [`SESSION_STATE`].
const SESSION_STATES: [&str; 5] = [
    "idle",
    "bootstrapping_price",
    "expanding_universe",
    "streaming",
    "stopping",
];

/// Producer tasks started.
/// Labels: phase (bootstrap/expanded)
pub static PRODUCER_STARTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "gex_producer_starts_total",
        "Total streaming producer starts",
        &["phase"]
    )
    .unwrap()
});

/// Producer exits.
/// Labels: reason (stopped/subscription_failed/init_failed)
pub static PRODUCER_EXITS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "gex_producer_exits_total",
        "Total streaming producer exits",
        &["reason"]
    )
    .unwrap()
});

/// Producers that did not exit within their grace period.
pub static PRODUCER_ABANDONED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gex_producer_abandoned_total",
        "Producers detached after missing their stop grace period"
    )
    .unwrap()
});

/// Subscribe calls.
/// Labels: outcome (ok/rejected/error)
pub static SUBSCRIBE_ATTEMPTS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "gex_subscribe_attempts_total",
        "Total feed subscribe calls",
        &["outcome"]
    )
    .unwrap()
});

/// Topics that exhausted their retry budget.
pub static SUBSCRIBE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gex_subscribe_failures_total",
        "Topics whose subscription failed after all retries"
    )
    .unwrap()
});

/// Snapshots published to the mailbox.
pub static SNAPSHOTS_PUBLISHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gex_snapshots_published_total",
        "Snapshots published to the consumer mailbox"
    )
    .unwrap()
});

/// Unread mailbox items replaced by a newer one.
pub static MAILBOX_EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gex_mailbox_evictions_total",
        "Unread mailbox items superseded before the consumer read them"
    )
    .unwrap()
});

/// Per-iteration data processing errors (non-fatal).
pub static DATA_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gex_data_errors_total",
        "Non-fatal errors while reading the feed value table"
    )
    .unwrap()
});

/// Session state machine current state.
/// Labels: state
pub static SESSION_STATE: Lazy<IntGaugeVec> = Lazy::new(|| {
    register_int_gauge_vec!(
        "gex_session_state",
        "Streaming session current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

/// Session-fatal errors surfaced to the consumer.
pub static SESSION_FATAL_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gex_session_fatal_total",
        "Session-fatal errors surfaced to the consumer"
    )
    .unwrap()
});

/// Session starts that replaced a previous producer.
pub static SESSION_RESTARTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "gex_session_restarts_total",
        "Session starts that replaced a running producer"
    )
    .unwrap()
});

/// Metrics facade.
pub struct Metrics;

impl Metrics {
    /// Record a producer start.
    pub fn producer_started(phase: &str) {
        PRODUCER_STARTS_TOTAL.with_label_values(&[phase]).inc();
    }

    /// Record a producer exit.
    pub fn producer_exited(reason: &str) {
        PRODUCER_EXITS_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Record a producer detached after its grace period.
    pub fn producer_abandoned() {
        PRODUCER_ABANDONED_TOTAL.inc();
    }

    /// Record one subscribe call.
    pub fn subscribe_attempt(outcome: &str) {
        SUBSCRIBE_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a topic whose retries were exhausted.
    pub fn subscribe_failed() {
        SUBSCRIBE_FAILURES_TOTAL.inc();
    }

    /// Record a snapshot publication; `evicted` when an unread item was replaced.
    pub fn snapshot_published(evicted: bool) {
        SNAPSHOTS_PUBLISHED_TOTAL.inc();
        if evicted {
            MAILBOX_EVICTIONS_TOTAL.inc();
        }
    }

    /// Record a non-fatal data processing error.
    pub fn data_error() {
        DATA_ERRORS_TOTAL.inc();
    }

    /// Set the session state gauge. Only the active state is 1.
    pub fn session_state_set(state: &str) {
        for s in SESSION_STATES {
            SESSION_STATE.with_label_values(&[s]).set(0);
        }
        SESSION_STATE.with_label_values(&[state]).set(1);
    }

    /// Record a session-fatal error.
    pub fn session_fatal() {
        SESSION_FATAL_TOTAL.inc();
    }

    /// Record a start that replaced a running producer.
    pub fn session_restarted() {
        SESSION_RESTARTS_TOTAL.inc();
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render() -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&prometheus::gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_gauge_single_active() {
        Metrics::session_state_set("streaming");
        assert_eq!(SESSION_STATE.with_label_values(&["streaming"]).get(), 1);
        assert_eq!(SESSION_STATE.with_label_values(&["idle"]).get(), 0);

        Metrics::session_state_set("idle");
        assert_eq!(SESSION_STATE.with_label_values(&["streaming"]).get(), 0);
        assert_eq!(SESSION_STATE.with_label_values(&["idle"]).get(), 1);
    }

    #[test]
    fn test_snapshot_published_counts_evictions() {
        let published = SNAPSHOTS_PUBLISHED_TOTAL.get();
        let evicted = MAILBOX_EVICTIONS_TOTAL.get();

        Metrics::snapshot_published(false);
        Metrics::snapshot_published(true);

        assert!(SNAPSHOTS_PUBLISHED_TOTAL.get() >= published + 2);
        assert!(MAILBOX_EVICTIONS_TOTAL.get() > evicted);
    }

    #[test]
    fn test_render_contains_registered_metrics() {
        Metrics::producer_started("bootstrap");
        let text = Metrics::render().unwrap();
        assert!(text.contains("gex_producer_starts_total"));
    }
}
