//! In-process simulated quote feed.
//!
//! [`SimulatedMarket`] is shared state standing in for the quote platform.
//! Each [`SimulatedFeed`] is one client connection to it. Values are
//! deterministic functions of the market tick and each contract's moneyness,
//! so tests can assert on exact behavior.

use crate::client::QuoteFeedClient;
use crate::error::{FeedError, FeedResult};
use gex_core::{OptionIdentifier, OptionRight, QuoteKind, QuoteValue, Topic};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Counters recorded by a [`SimulatedMarket`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MarketStats {
    pub tick: u64,
    /// `subscribe` calls across every client, including failed ones.
    pub subscribe_calls: u64,
    /// Clients initialized and not yet disconnected.
    pub live_clients: usize,
    /// Highest `live_clients` ever observed.
    pub peak_live_clients: usize,
    /// Clients that have been torn down with `cleanup`.
    pub cleaned_up: u64,
}

#[derive(Debug)]
struct MarketState {
    underlying: String,
    base_price: f64,
    drift: f64,
    stats: MarketStats,
    fail_initialize: bool,
    remaining_subscribe_failures: u32,
    refused_symbols: BTreeSet<String>,
}

impl MarketState {
    fn price_at(&self, tick: u64) -> f64 {
        self.base_price + self.drift * tick as f64
    }
}

/// Shared simulated market; cheap to clone.
#[derive(Debug, Clone)]
pub struct SimulatedMarket {
    state: Arc<Mutex<MarketState>>,
}

impl SimulatedMarket {
    pub fn new(underlying: &str, base_price: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(MarketState {
                underlying: underlying.to_string(),
                base_price,
                drift: 0.0,
                stats: MarketStats::default(),
                fail_initialize: false,
                remaining_subscribe_failures: 0,
                refused_symbols: BTreeSet::new(),
            })),
        }
    }

    /// Price change per tick.
    pub fn with_drift(self, drift: f64) -> Self {
        self.state.lock().drift = drift;
        self
    }

    /// Make every subsequent `initialize` fail.
    pub fn fail_initialize(&self) {
        self.state.lock().fail_initialize = true;
    }

    /// Make the next `count` subscribe calls fail with a transport error.
    pub fn fail_next_subscribes(&self, count: u32) {
        self.state.lock().remaining_subscribe_failures = count;
    }

    /// Refuse every subscription for topics of `symbol`.
    pub fn refuse_symbol(&self, symbol: &str) {
        self.state.lock().refused_symbols.insert(symbol.to_string());
    }

    /// Refuse every option subscription (symbols starting with `.`).
    pub fn refuse_options(&self) {
        self.refuse_symbol(".");
    }

    /// Current underlying price.
    pub fn price(&self) -> f64 {
        let state = self.state.lock();
        state.price_at(state.stats.tick)
    }

    pub fn stats(&self) -> MarketStats {
        self.state.lock().stats
    }

    /// New client connected to this market.
    pub fn client(&self) -> SimulatedFeed {
        SimulatedFeed {
            market: self.clone(),
            subscriptions: BTreeSet::new(),
            values: Arc::new(Mutex::new(BTreeMap::new())),
            connected: false,
        }
    }

    fn advance_tick(&self) -> u64 {
        let mut state = self.state.lock();
        state.stats.tick += 1;
        state.stats.tick
    }
}

/// One simulated client connection.
#[derive(Debug)]
pub struct SimulatedFeed {
    market: SimulatedMarket,
    subscriptions: BTreeSet<Topic>,
    values: Arc<Mutex<BTreeMap<Topic, QuoteValue>>>,
    connected: bool,
}

impl SimulatedFeed {
    pub fn subscriptions(&self) -> &BTreeSet<Topic> {
        &self.subscriptions
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }
}

impl QuoteFeedClient for SimulatedFeed {
    fn initialize(&mut self) -> FeedResult<()> {
        let mut state = self.market.state.lock();
        if state.fail_initialize {
            return Err(FeedError::InitFailed(
                "simulated platform unavailable".to_string(),
            ));
        }
        if !self.connected {
            self.connected = true;
            state.stats.live_clients += 1;
            state.stats.peak_live_clients =
                state.stats.peak_live_clients.max(state.stats.live_clients);
        }
        Ok(())
    }

    fn subscribe(&mut self, topic: &Topic) -> FeedResult<bool> {
        let mut state = self.market.state.lock();
        state.stats.subscribe_calls += 1;

        if !self.connected {
            return Err(FeedError::SubscriptionRejected(format!(
                "{topic}: client not initialized"
            )));
        }
        if state.remaining_subscribe_failures > 0 {
            state.remaining_subscribe_failures -= 1;
            return Err(FeedError::SubscriptionRejected(format!(
                "{topic}: simulated transport error"
            )));
        }
        if state
            .refused_symbols
            .iter()
            .any(|refused| topic.symbol.starts_with(refused.as_str()))
        {
            return Ok(false);
        }

        self.subscriptions.insert(topic.clone());
        Ok(true)
    }

    fn advance(&mut self) {
        if !self.connected {
            return;
        }
        let tick = self.market.advance_tick();
        let (underlying, price) = {
            let state = self.market.state.lock();
            (state.underlying.clone(), state.price_at(tick))
        };

        let mut values = self.values.lock();
        for topic in &self.subscriptions {
            if let Some(value) = quote_for(topic, &underlying, price, tick) {
                values.insert(topic.clone(), value);
            }
        }
    }

    fn snapshot(&self) -> FeedResult<BTreeMap<Topic, QuoteValue>> {
        Ok(self.values.lock().clone())
    }

    fn disconnect(&mut self) -> FeedResult<()> {
        if self.connected {
            self.connected = false;
            self.market.state.lock().stats.live_clients -= 1;
            debug!(
                subscriptions = self.subscriptions.len(),
                "Simulated client disconnected"
            );
        }
        self.subscriptions.clear();
        Ok(())
    }

    fn cleanup(&mut self) -> FeedResult<()> {
        self.values.lock().clear();
        self.market.state.lock().stats.cleaned_up += 1;
        Ok(())
    }
}

/// Deterministic value for `topic`, or `None` when the symbol is unknown.
fn quote_for(topic: &Topic, underlying: &str, price: f64, tick: u64) -> Option<QuoteValue> {
    if topic.symbol == underlying {
        let value = match topic.kind {
            QuoteKind::Last => price,
            QuoteKind::MrktMkrMove => price * 0.012,
            QuoteKind::FrontExMove => price * 0.015,
            QuoteKind::BackExMove => price * 0.021,
            _ => return None,
        };
        return Some(QuoteValue::Number(round4(value)));
    }

    let contract: OptionIdentifier = topic.symbol.parse().ok()?;
    let strike = contract.strike.to_f64();
    let moneyness = (strike - price) / price;
    let bell = (-(moneyness / 0.02).powi(2) / 2.0).exp();
    let is_call = contract.right == OptionRight::Call;
    let call_delta = (0.5 - moneyness * 12.0).clamp(0.01, 0.99);
    let delta = if is_call { call_delta } else { call_delta - 1.0 };
    let itm_probability = delta.abs();

    let value = match topic.kind {
        QuoteKind::Gamma => 0.08 * bell,
        QuoteKind::OpenInt => (500.0 + 9500.0 * bell + (tick % 7) as f64).round(),
        QuoteKind::ImplVol => 0.16 + 4.0 * moneyness * moneyness + if is_call { 0.0 } else { 0.02 },
        QuoteKind::Delta => delta,
        QuoteKind::Theta => -0.05 - 0.4 * bell,
        QuoteKind::Vega => 0.02 + 0.3 * bell,
        QuoteKind::Rho => delta * 0.05,
        QuoteKind::Volume => (200.0 * bell + tick as f64).round(),
        QuoteKind::ProbOfExpiring => itm_probability,
        QuoteKind::ProbOtm => 1.0 - itm_probability,
        QuoteKind::ProbOfTouching => (2.0 * itm_probability).min(1.0),
        _ => return None,
    };
    Some(QuoteValue::Number(round4(value)))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use gex_core::{Strike, StrikeSpacing};
    use rust_decimal_macros::dec;
    use tokio_test::{assert_err, assert_ok};

    fn contract(right: OptionRight, strike: rust_decimal::Decimal) -> OptionIdentifier {
        OptionIdentifier::new(
            "SPY",
            NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
            right,
            Strike::new(strike),
            StrikeSpacing::Five,
        )
    }

    #[test]
    fn test_values_only_for_subscribed_topics() {
        let market = SimulatedMarket::new("SPY", 600.0);
        let mut feed = market.client();
        feed.initialize().unwrap();
        assert!(feed.subscribe(&Topic::new("SPY", QuoteKind::Last)).unwrap());

        assert!(feed.snapshot().unwrap().is_empty());
        feed.advance();

        let values = feed.snapshot().unwrap();
        assert_eq!(values.len(), 1);
        assert_eq!(
            values.get(&Topic::new("SPY", QuoteKind::Last)),
            Some(&QuoteValue::Number(600.0))
        );
    }

    #[test]
    fn test_drift_moves_price() {
        let market = SimulatedMarket::new("SPY", 600.0).with_drift(0.5);
        let mut feed = market.client();
        feed.initialize().unwrap();
        feed.subscribe(&Topic::new("SPY", QuoteKind::Last)).unwrap();
        feed.advance();
        feed.advance();
        assert_eq!(market.price(), 601.0);
        assert_eq!(market.stats().tick, 2);
    }

    #[test]
    fn test_gamma_peaks_at_the_money() {
        let market = SimulatedMarket::new("SPY", 600.0);
        let mut feed = market.client();
        feed.initialize().unwrap();

        let atm = Topic::new(contract(OptionRight::Call, dec!(600)).as_str(), QuoteKind::Gamma);
        let otm = Topic::new(contract(OptionRight::Call, dec!(620)).as_str(), QuoteKind::Gamma);
        feed.subscribe(&atm).unwrap();
        feed.subscribe(&otm).unwrap();
        feed.advance();

        let values = feed.snapshot().unwrap();
        let atm_gamma = values[&atm].as_f64().unwrap();
        let otm_gamma = values[&otm].as_f64().unwrap();
        assert!(atm_gamma > otm_gamma);
        assert!(otm_gamma >= 0.0);
    }

    #[test]
    fn test_put_delta_is_negative() {
        let market = SimulatedMarket::new("SPY", 600.0);
        let mut feed = market.client();
        feed.initialize().unwrap();
        let put = Topic::new(contract(OptionRight::Put, dec!(600)).as_str(), QuoteKind::Delta);
        feed.subscribe(&put).unwrap();
        feed.advance();
        assert!(feed.snapshot().unwrap()[&put].as_f64().unwrap() < 0.0);
    }

    #[test]
    fn test_live_client_accounting() {
        let market = SimulatedMarket::new("SPY", 600.0);
        let mut a = market.client();
        let mut b = market.client();

        a.initialize().unwrap();
        b.initialize().unwrap();
        assert_eq!(market.stats().live_clients, 2);

        a.disconnect().unwrap();
        a.disconnect().unwrap();
        a.cleanup().unwrap();
        assert_eq!(market.stats().live_clients, 1);
        assert_eq!(market.stats().peak_live_clients, 2);
        assert_eq!(market.stats().cleaned_up, 1);
        assert!(!a.is_connected());
    }

    #[test]
    fn test_failure_plan() {
        let market = SimulatedMarket::new("SPY", 600.0);
        market.fail_next_subscribes(2);
        market.refuse_symbol("QQQ");

        let mut feed = market.client();
        feed.initialize().unwrap();
        let spy = Topic::new("SPY", QuoteKind::Last);
        assert_err!(feed.subscribe(&spy));
        assert_err!(feed.subscribe(&spy));
        assert!(assert_ok!(feed.subscribe(&spy)));
        assert!(!feed.subscribe(&Topic::new("QQQ", QuoteKind::Last)).unwrap());
        assert_eq!(market.stats().subscribe_calls, 4);
        assert_eq!(feed.subscriptions().len(), 1);
    }

    #[test]
    fn test_initialize_failure() {
        let market = SimulatedMarket::new("SPY", 600.0);
        market.fail_initialize();
        let mut feed = market.client();
        assert!(matches!(feed.initialize(), Err(FeedError::InitFailed(_))));
        assert_eq!(market.stats().live_clients, 0);
    }

    #[test]
    fn test_subscribe_before_initialize_is_error() {
        let market = SimulatedMarket::new("SPY", 600.0);
        let mut feed = market.client();
        assert_err!(feed.subscribe(&Topic::new("SPY", QuoteKind::Last)));
    }
}
