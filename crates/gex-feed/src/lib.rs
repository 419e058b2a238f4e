//! Quote feed streaming for gex-stream.
//!
//! - `QuoteFeedClient` / `FeedFactory`: the external feed contract
//! - `StreamingProducer`: subscribes with retry, polls and publishes changes
//! - `LatestValueQueue`: single-slot mailbox between producer and consumer
//! - `SimulatedFeed`: deterministic in-process feed

pub mod client;
pub mod error;
pub mod mailbox;
pub mod producer;
pub mod retry;
pub mod simulated;

pub use client::{FeedFactory, QuoteFeedClient};
pub use error::{FeedError, FeedResult};
pub use mailbox::LatestValueQueue;
pub use producer::{
    Mailbox, ProducerConfig, ProducerExit, ProducerHandle, ProducerPhase, StopOutcome,
    StreamingProducer,
};
pub use retry::{subscribe_with_retry, RetryPolicy, SubscribeOutcome};
pub use simulated::{MarketStats, SimulatedFeed, SimulatedMarket};
