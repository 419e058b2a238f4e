//! Quote feed client contract.
//!
//! The real-time feed is an external binding. The producer only talks to it
//! through [`QuoteFeedClient`], and the session obtains a fresh client per
//! producer start through [`FeedFactory`].

use crate::error::FeedResult;
use gex_core::{QuoteValue, Topic};
use std::collections::BTreeMap;

/// Contract for one live feed subscription lifecycle.
///
/// The client owns its cumulative value table and guards it with its own
/// lock; [`QuoteFeedClient::snapshot`] is the only way the producer reads it.
#[cfg_attr(test, mockall::automock)]
pub trait QuoteFeedClient: Send {
    /// Prepare the client for use. Called once per producer start.
    fn initialize(&mut self) -> FeedResult<()>;

    /// Register interest in one topic.
    ///
    /// `Ok(false)` means the feed refused the registration; `Err` is a
    /// transport failure. Both are retried by the producer.
    fn subscribe(&mut self, topic: &Topic) -> FeedResult<bool>;

    /// Deliver pending updates into the client's value table.
    ///
    /// Must be called once per poll iteration or delivery can stall.
    fn advance(&mut self);

    /// Current full value table.
    fn snapshot(&self) -> FeedResult<BTreeMap<Topic, QuoteValue>>;

    /// Release the feed connection. Safe to call repeatedly.
    fn disconnect(&mut self) -> FeedResult<()>;

    /// Release platform-level resources acquired by `initialize`.
    /// Safe to call repeatedly and after a partial `initialize`.
    fn cleanup(&mut self) -> FeedResult<()>;
}

/// Creates feed clients, one per producer start.
pub trait FeedFactory: Send + Sync + 'static {
    type Client: QuoteFeedClient + 'static;

    fn create(&self) -> Self::Client;
}

impl<F, C> FeedFactory for F
where
    F: Fn() -> C + Send + Sync + 'static,
    C: QuoteFeedClient + 'static,
{
    type Client = C;

    fn create(&self) -> C {
        self()
    }
}
