//! Snapshot of every value currently known to the feed.
//!
//! A snapshot always supersedes its predecessor wholesale; values are never
//! merged across snapshots here. The feed client owns cumulative state.

use crate::quote::{QuoteKind, QuoteValue, Topic};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Reserved flattened key carrying a session-fatal error.
pub const ERROR_KEY: &str = "error";
/// Reserved flattened key carrying a non-data control message.
pub const STATUS_KEY: &str = "status";

/// Immutable view of the feed's value table at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    values: BTreeMap<Topic, QuoteValue>,
    /// When the producer captured this snapshot.
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(values: BTreeMap<Topic, QuoteValue>) -> Self {
        Self {
            values,
            captured_at: Utc::now(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value for a topic, if delivered.
    pub fn get(&self, topic: &Topic) -> Option<&QuoteValue> {
        self.values.get(topic)
    }

    /// Numeric value for `symbol`/`kind`, falling back to the kind's default
    /// when the value is missing or not numeric.
    pub fn number(&self, symbol: &str, kind: QuoteKind) -> f64 {
        let topic = Topic::new(symbol, kind);
        self.values
            .get(&topic)
            .and_then(QuoteValue::as_f64)
            .or_else(|| kind.default_value().as_f64())
            .unwrap_or(0.0)
    }

    /// Last price of the underlying (zero when not yet delivered).
    pub fn underlying_price(&self, symbol: &str) -> f64 {
        self.number(symbol, QuoteKind::Last)
    }

    /// Consumer-facing shape keyed by `"{symbol}:{KIND}"`.
    pub fn flatten(&self) -> BTreeMap<String, QuoteValue> {
        self.values
            .iter()
            .map(|(topic, value)| (topic.to_string(), value.clone()))
            .collect()
    }
}

/// Message carried through the mailbox from producer to consumer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// A full value table.
    Data(Snapshot),
    /// Control message; carries no data.
    Status(String),
    /// Session-fatal failure (aggregated subscription or init errors).
    Error(String),
}

impl StreamMessage {
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Flattened JSON object using the reserved `error` / `status` keys for
    /// control messages.
    pub fn to_flat_json(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            Self::Data(snapshot) => {
                for (key, value) in snapshot.flatten() {
                    map.insert(key, serde_json::to_value(value).unwrap_or(Value::Null));
                }
            }
            Self::Status(text) => {
                map.insert(STATUS_KEY.to_string(), Value::String(text.clone()));
            }
            Self::Error(text) => {
                map.insert(ERROR_KEY.to_string(), Value::String(text.clone()));
            }
        }
        map
    }
}
