//! Streaming producer thread.
//!
//! One producer owns one feed client for its whole life: it initializes the
//! client, subscribes the requested topics, then polls the client's value
//! table and publishes changed snapshots to the mailbox until it is
//! cancelled. The client is torn down on every exit path.
//!
//! Feed calls are synchronous and `advance` may block for as long as the
//! platform pumps messages, so each producer runs on its own OS thread with
//! a current-thread runtime for its timers. The consumer's runtime never
//! executes a feed call.

use crate::client::QuoteFeedClient;
use crate::error::{FeedError, FeedResult};
use crate::mailbox::LatestValueQueue;
use crate::retry::{subscribe_with_retry, RetryPolicy, SubscribeOutcome};
use gex_core::{QuoteValue, Snapshot, StreamMessage, Topic};
use gex_telemetry::Metrics;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Mailbox shared by a producer and the session.
pub type Mailbox = Arc<LatestValueQueue<StreamMessage>>;

/// Producer timing and retry settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerConfig {
    /// Sleep between value table reads.
    pub poll_interval: Duration,
    pub retry: RetryPolicy,
    /// Pause after subscribing, before the first read.
    pub settle_delay: Duration,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            retry: RetryPolicy::default(),
            settle_delay: Duration::from_millis(300),
        }
    }
}

/// Which topic set a producer streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerPhase {
    /// Underlying topics only, to discover the price.
    Bootstrap,
    /// Underlying plus every option topic of the universe.
    Expanded,
}

impl ProducerPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::Expanded => "expanded",
        }
    }
}

/// Why a producer task returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// Stop signal observed.
    Stopped,
    /// `initialize` failed; an error message was published.
    InitFailed,
    /// At least one topic exhausted its retries; an error message was
    /// published.
    SubscriptionFailed,
}

impl ProducerExit {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::InitFailed => "init_failed",
            Self::SubscriptionFailed => "subscription_failed",
        }
    }
}

/// Result of [`ProducerHandle::stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Joined(ProducerExit),
    /// Grace period elapsed; the thread was detached and may still be running.
    Abandoned,
    /// The thread panicked. Teardown still ran during unwinding.
    Panicked,
}

/// Disconnects and cleans up the client exactly once, on release or drop.
struct Teardown<C: QuoteFeedClient> {
    client: C,
    released: bool,
}

impl<C: QuoteFeedClient> Teardown<C> {
    fn new(client: C) -> Self {
        Self {
            client,
            released: false,
        }
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if let Err(e) = self.client.disconnect() {
            warn!(error = %e, "Feed disconnect failed");
        }
        if let Err(e) = self.client.cleanup() {
            warn!(error = %e, "Feed cleanup failed");
        }
        debug!("Feed client torn down");
    }
}

impl<C: QuoteFeedClient> Drop for Teardown<C> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Feed producer for one topic set.
pub struct StreamingProducer<C> {
    client: C,
    topics: Vec<Topic>,
    mailbox: Mailbox,
    config: ProducerConfig,
}

impl<C> StreamingProducer<C>
where
    C: QuoteFeedClient + 'static,
{
    pub fn new(client: C, topics: Vec<Topic>, mailbox: Mailbox, config: ProducerConfig) -> Self {
        Self {
            client,
            topics,
            mailbox,
            config,
        }
    }

    /// Start the producer on a dedicated thread.
    pub fn spawn(self, phase: ProducerPhase) -> FeedResult<ProducerHandle> {
        let token = CancellationToken::new();
        let (exit_tx, exit_rx) = oneshot::channel();
        let topics = self.topics.len();

        let run_token = token.clone();
        thread::Builder::new()
            .name(format!("gex-producer-{}", phase.as_str()))
            .spawn(move || {
                let exit = self.run_blocking(run_token);
                // The handle may already be gone after an abandon.
                let _ = exit_tx.send(exit);
            })
            .map_err(|e| FeedError::Spawn(e.to_string()))?;

        Metrics::producer_started(phase.as_str());
        info!(phase = phase.as_str(), topics, "Started streaming producer");
        Ok(ProducerHandle {
            token,
            exit: exit_rx,
            phase,
        })
    }

    /// Drive [`run`](Self::run) to completion on a runtime owned by the
    /// calling thread.
    fn run_blocking(self, token: CancellationToken) -> ProducerExit {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build();
        match runtime {
            Ok(rt) => rt.block_on(self.run(token)),
            Err(e) => {
                let mut feed = Teardown::new(self.client);
                let e = FeedError::InitFailed(format!("producer runtime: {e}"));
                error!(error = %e, "Producer runtime failed to start");
                self.mailbox.put(StreamMessage::Error(e.to_string()));
                feed.release();
                Metrics::producer_exited(ProducerExit::InitFailed.as_str());
                ProducerExit::InitFailed
            }
        }
    }

    /// Run until cancelled or a fatal error. Teardown runs before returning.
    pub async fn run(self, token: CancellationToken) -> ProducerExit {
        let StreamingProducer {
            client,
            topics,
            mailbox,
            config,
        } = self;
        let mut feed = Teardown::new(client);

        let exit = Self::stream(&mut feed, &topics, &mailbox, &config, &token).await;
        feed.release();

        Metrics::producer_exited(exit.as_str());
        info!(reason = exit.as_str(), "Streaming producer exited");
        exit
    }

    async fn stream(
        feed: &mut Teardown<C>,
        topics: &[Topic],
        mailbox: &Mailbox,
        config: &ProducerConfig,
        token: &CancellationToken,
    ) -> ProducerExit {
        if let Err(e) = feed.client.initialize() {
            let e = match e {
                FeedError::InitFailed(_) => e,
                other => FeedError::InitFailed(other.to_string()),
            };
            error!(error = %e, "Feed client failed to initialize");
            mailbox.put(StreamMessage::Error(e.to_string()));
            return ProducerExit::InitFailed;
        }

        let mut failures = Vec::new();
        for topic in topics {
            match subscribe_with_retry(&mut feed.client, topic, &config.retry, token).await {
                SubscribeOutcome::Subscribed => {}
                SubscribeOutcome::Failed(e) => failures.push(e.to_string()),
                SubscribeOutcome::Cancelled => return ProducerExit::Stopped,
            }
        }

        if !failures.is_empty() {
            error!(
                failed = failures.len(),
                total = topics.len(),
                "Subscription failed, not streaming"
            );
            mailbox.put(StreamMessage::Error(failures.join("\n")));
            return ProducerExit::SubscriptionFailed;
        }
        debug!(topics = topics.len(), "All topics subscribed");

        tokio::select! {
            () = tokio::time::sleep(config.settle_delay) => {}
            () = token.cancelled() => return ProducerExit::Stopped,
        }

        let mut last_published: Option<BTreeMap<Topic, QuoteValue>> = None;
        while !token.is_cancelled() {
            feed.client.advance();

            match feed.client.snapshot() {
                Ok(values) => {
                    if !values.is_empty() && last_published.as_ref() != Some(&values) {
                        let evicted =
                            mailbox.put(StreamMessage::Data(Snapshot::new(values.clone())));
                        Metrics::snapshot_published(evicted.is_some());
                        debug!(
                            values = values.len(),
                            evicted = evicted.is_some(),
                            "Published snapshot"
                        );
                        last_published = Some(values);
                    }
                }
                Err(e) => {
                    Metrics::data_error();
                    warn!(error = %e, "Failed to read feed values");
                }
            }

            tokio::select! {
                () = tokio::time::sleep(config.poll_interval) => {}
                () = token.cancelled() => break,
            }
        }

        ProducerExit::Stopped
    }
}

/// Handle to a spawned producer.
pub struct ProducerHandle {
    token: CancellationToken,
    exit: oneshot::Receiver<ProducerExit>,
    phase: ProducerPhase,
}

impl ProducerHandle {
    pub fn phase(&self) -> ProducerPhase {
        self.phase
    }

    /// Signal the producer to stop without waiting for it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Signal the producer to stop and wait up to `grace` for it to return.
    ///
    /// On timeout the thread is detached. It exits on its own once it next
    /// observes the stop signal.
    pub async fn stop(self, grace: Duration) -> StopOutcome {
        self.token.cancel();

        match tokio::time::timeout(grace, self.exit).await {
            Ok(Ok(exit)) => StopOutcome::Joined(exit),
            Ok(Err(_)) => {
                error!(phase = self.phase.as_str(), "Producer thread panicked");
                StopOutcome::Panicked
            }
            Err(_) => {
                Metrics::producer_abandoned();
                warn!(
                    phase = self.phase.as_str(),
                    grace_ms = grace.as_millis() as u64,
                    "Producer did not stop within grace period, abandoning"
                );
                StopOutcome::Abandoned
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockQuoteFeedClient;
    use gex_core::QuoteKind;

    fn fast_config() -> ProducerConfig {
        ProducerConfig {
            poll_interval: Duration::from_millis(10),
            retry: RetryPolicy {
                max_attempts: 3,
                backoff: Duration::from_millis(1),
            },
            settle_delay: Duration::ZERO,
        }
    }

    fn price_table(price: f64) -> BTreeMap<Topic, QuoteValue> {
        let mut values = BTreeMap::new();
        values.insert(Topic::new("SPY", QuoteKind::Last), QuoteValue::Number(price));
        values
    }

    /// Mock whose disconnect and cleanup must each run exactly once.
    fn mock_with_teardown() -> MockQuoteFeedClient {
        let mut client = MockQuoteFeedClient::new();
        client.expect_disconnect().times(1).returning(|| Ok(()));
        client.expect_cleanup().times(1).returning(|| Ok(()));
        client
    }

    #[tokio::test]
    async fn test_init_failure_publishes_error() {
        let mut client = mock_with_teardown();
        client
            .expect_initialize()
            .times(1)
            .returning(|| Err(FeedError::InitFailed("no platform".to_string())));
        client.expect_subscribe().never();

        let mailbox: Mailbox = Arc::new(LatestValueQueue::new());
        let producer = StreamingProducer::new(
            client,
            Topic::underlying("SPY"),
            Arc::clone(&mailbox),
            fast_config(),
        );

        let exit = producer.run(CancellationToken::new()).await;
        assert_eq!(exit, ProducerExit::InitFailed);

        match mailbox.try_get() {
            Some(StreamMessage::Error(text)) => {
                assert_eq!(text, "Feed initialization failed: no platform");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscription_failures_are_aggregated() {
        let mut client = mock_with_teardown();
        client.expect_initialize().returning(|| Ok(()));
        client
            .expect_subscribe()
            .withf(|topic| topic.kind == QuoteKind::Last)
            .times(1)
            .returning(|_| Ok(true));
        client
            .expect_subscribe()
            .withf(|topic| topic.kind != QuoteKind::Last)
            .times(9)
            .returning(|_| Ok(false));
        client.expect_advance().never();

        let mailbox: Mailbox = Arc::new(LatestValueQueue::new());
        let producer = StreamingProducer::new(
            client,
            Topic::underlying("SPY"),
            Arc::clone(&mailbox),
            fast_config(),
        );

        let exit = producer.run(CancellationToken::new()).await;
        assert_eq!(exit, ProducerExit::SubscriptionFailed);

        match mailbox.try_get() {
            Some(StreamMessage::Error(text)) => {
                let lines: Vec<&str> = text.split('\n').collect();
                assert_eq!(lines.len(), 3);
                assert!(lines[0].starts_with("Failed to subscribe to SPY:MRKT_MKR_MOVE"));
                assert!(lines.iter().all(|l| l.contains("after 3 attempts")));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publishes_only_on_change() {
        let mut client = mock_with_teardown();
        client.expect_initialize().returning(|| Ok(()));
        client.expect_subscribe().returning(|_| Ok(true));
        client.expect_advance().returning(|| ());
        client
            .expect_snapshot()
            .returning(|| Ok(price_table(601.5)));

        let mailbox: Mailbox = Arc::new(LatestValueQueue::new());
        let handle = StreamingProducer::new(
            client,
            Topic::underlying("SPY"),
            Arc::clone(&mailbox),
            fast_config(),
        )
        .spawn(ProducerPhase::Bootstrap)
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        match mailbox.try_get() {
            Some(StreamMessage::Data(snapshot)) => {
                assert_eq!(snapshot.underlying_price("SPY"), 601.5);
            }
            other => panic!("unexpected message: {other:?}"),
        }

        // Unchanged table across many polls: nothing new.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(mailbox.try_get().is_none());

        let outcome = handle.stop(Duration::from_secs(1)).await;
        assert_eq!(outcome, StopOutcome::Joined(ProducerExit::Stopped));
    }

    #[tokio::test]
    async fn test_changed_table_replaces_unread_snapshot() {
        let mut client = mock_with_teardown();
        client.expect_initialize().returning(|| Ok(()));
        client.expect_subscribe().returning(|_| Ok(true));
        client.expect_advance().returning(|| ());
        let mut reads = 0;
        client.expect_snapshot().returning(move || {
            reads += 1;
            Ok(price_table(if reads < 3 { 600.0 } else { 605.0 }))
        });

        let mailbox: Mailbox = Arc::new(LatestValueQueue::new());
        let handle = StreamingProducer::new(
            client,
            Topic::underlying("SPY"),
            Arc::clone(&mailbox),
            fast_config(),
        )
        .spawn(ProducerPhase::Bootstrap)
        .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        let outcome = handle.stop(Duration::from_secs(1)).await;
        assert_eq!(outcome, StopOutcome::Joined(ProducerExit::Stopped));

        match mailbox.try_get() {
            Some(StreamMessage::Data(snapshot)) => {
                assert_eq!(snapshot.underlying_price("SPY"), 605.0);
            }
            other => panic!("unexpected message: {other:?}"),
        }
        assert!(mailbox.is_empty());
    }

    #[tokio::test]
    async fn test_empty_table_is_not_published() {
        let mut client = mock_with_teardown();
        client.expect_initialize().returning(|| Ok(()));
        client.expect_subscribe().returning(|_| Ok(true));
        client.expect_advance().returning(|| ());
        client.expect_snapshot().returning(|| Ok(BTreeMap::new()));

        let mailbox: Mailbox = Arc::new(LatestValueQueue::new());
        let handle = StreamingProducer::new(
            client,
            Topic::underlying("SPY"),
            Arc::clone(&mailbox),
            fast_config(),
        )
        .spawn(ProducerPhase::Bootstrap)
        .unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(mailbox.is_empty());
        handle.stop(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_read_errors_do_not_stop_streaming() {
        let mut client = mock_with_teardown();
        client.expect_initialize().returning(|| Ok(()));
        client.expect_subscribe().returning(|_| Ok(true));
        client.expect_advance().returning(|| ());
        let mut reads = 0;
        client.expect_snapshot().returning(move || {
            reads += 1;
            if reads <= 2 {
                Err(FeedError::DataProcessing("bad frame".to_string()))
            } else {
                Ok(price_table(599.0))
            }
        });

        let mailbox: Mailbox = Arc::new(LatestValueQueue::new());
        let handle = StreamingProducer::new(
            client,
            Topic::underlying("SPY"),
            Arc::clone(&mailbox),
            fast_config(),
        )
        .spawn(ProducerPhase::Bootstrap)
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(mailbox.try_get(), Some(StreamMessage::Data(_))));
        assert_eq!(
            handle.stop(Duration::from_secs(1)).await,
            StopOutcome::Joined(ProducerExit::Stopped)
        );
    }

    #[tokio::test]
    async fn test_teardown_errors_are_absorbed() {
        let mut client = MockQuoteFeedClient::new();
        client.expect_initialize().returning(|| Ok(()));
        client.expect_subscribe().returning(|_| Ok(true));
        client.expect_advance().returning(|| ());
        client.expect_snapshot().returning(|| Ok(price_table(1.0)));
        client
            .expect_disconnect()
            .times(1)
            .returning(|| Err(FeedError::Cleanup("already closed".to_string())));
        client
            .expect_cleanup()
            .times(1)
            .returning(|| Err(FeedError::Cleanup("platform gone".to_string())));

        let token = CancellationToken::new();
        token.cancel();
        let producer = StreamingProducer::new(
            client,
            Topic::underlying("SPY"),
            Arc::new(LatestValueQueue::new()),
            fast_config(),
        );

        assert_eq!(producer.run(token).await, ProducerExit::Stopped);
    }

    #[tokio::test]
    async fn test_stop_abandons_unresponsive_producer() {
        let mut client = MockQuoteFeedClient::new();
        client.expect_initialize().returning(|| Ok(()));
        client.expect_subscribe().returning(|_| Ok(true));
        // Blocks the producer thread so it cannot observe the stop signal in time.
        client
            .expect_advance()
            .returning(|| std::thread::sleep(Duration::from_millis(300)));
        client.expect_snapshot().returning(|| Ok(BTreeMap::new()));
        client.expect_disconnect().returning(|| Ok(()));
        client.expect_cleanup().returning(|| Ok(()));

        let handle = StreamingProducer::new(
            client,
            Topic::underlying("SPY"),
            Arc::new(LatestValueQueue::new()),
            fast_config(),
        )
        .spawn(ProducerPhase::Expanded)
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.phase(), ProducerPhase::Expanded);
        assert_eq!(
            handle.stop(Duration::from_millis(20)).await,
            StopOutcome::Abandoned
        );
    }

    #[tokio::test]
    async fn test_blocking_pump_does_not_stall_consumer_runtime() {
        let mut client = MockQuoteFeedClient::new();
        client.expect_initialize().returning(|| Ok(()));
        client.expect_subscribe().returning(|_| Ok(true));
        client
            .expect_advance()
            .returning(|| std::thread::sleep(Duration::from_millis(1500)));
        client.expect_snapshot().returning(|| Ok(price_table(600.0)));
        client.expect_disconnect().returning(|| Ok(()));
        client.expect_cleanup().returning(|| Ok(()));

        let handle = StreamingProducer::new(
            client,
            Topic::underlying("SPY"),
            Arc::new(LatestValueQueue::new()),
            fast_config(),
        )
        .spawn(ProducerPhase::Bootstrap)
        .unwrap();

        // Give the producer time to enter the blocking pump.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let started = std::time::Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(500));

        let started = std::time::Instant::now();
        assert_eq!(
            handle.stop(Duration::from_millis(50)).await,
            StopOutcome::Abandoned
        );
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_panicking_pump_still_tears_down_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let disconnects = Arc::new(AtomicUsize::new(0));
        let cleanups = Arc::new(AtomicUsize::new(0));

        let mut client = MockQuoteFeedClient::new();
        client.expect_initialize().returning(|| Ok(()));
        client.expect_subscribe().returning(|_| Ok(true));
        client
            .expect_advance()
            .times(1)
            .returning(|| panic!("message pump crashed"));
        client.expect_snapshot().never();
        // Mock expectations are not verified while unwinding, so count calls too.
        let seen = Arc::clone(&disconnects);
        client.expect_disconnect().times(1).returning(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let seen = Arc::clone(&cleanups);
        client.expect_cleanup().times(1).returning(move || {
            seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        let handle = StreamingProducer::new(
            client,
            Topic::underlying("SPY"),
            Arc::new(LatestValueQueue::new()),
            fast_config(),
        )
        .spawn(ProducerPhase::Bootstrap)
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            handle.stop(Duration::from_secs(2)).await,
            StopOutcome::Panicked
        );
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exit_labels() {
        assert_eq!(ProducerExit::Stopped.as_str(), "stopped");
        assert_eq!(ProducerExit::SubscriptionFailed.as_str(), "subscription_failed");
        assert_eq!(ProducerPhase::Bootstrap.as_str(), "bootstrap");
    }
}
