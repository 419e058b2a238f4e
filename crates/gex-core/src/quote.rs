//! Quote addressing types.
//!
//! A feed value is addressed by a [`Topic`]: the pair of a symbol (an
//! underlying ticker or an option identifier) and a [`QuoteKind`].

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Field type retrievable from the quote feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuoteKind {
    /// Last traded price.
    Last,
    Gamma,
    /// Open interest.
    OpenInt,
    /// Implied volatility.
    ImplVol,
    Delta,
    Theta,
    Vega,
    Rho,
    Volume,
    ProbOfExpiring,
    /// Probability of expiring out of the money.
    ProbOtm,
    ProbOfTouching,
    /// Market maker implied move for the front expiration.
    MrktMkrMove,
    FrontExMove,
    BackExMove,
}

impl QuoteKind {
    /// Kinds subscribed for the underlying instrument.
    pub const UNDERLYING: [QuoteKind; 4] = [
        Self::Last,
        Self::MrktMkrMove,
        Self::FrontExMove,
        Self::BackExMove,
    ];

    /// Kinds subscribed for every option contract.
    pub const OPTION: [QuoteKind; 11] = [
        Self::Gamma,
        Self::OpenInt,
        Self::ImplVol,
        Self::Delta,
        Self::Theta,
        Self::Vega,
        Self::Rho,
        Self::Volume,
        Self::ProbOfExpiring,
        Self::ProbOtm,
        Self::ProbOfTouching,
    ];

    /// Name used by the feed and in flattened snapshot keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Last => "LAST",
            Self::Gamma => "GAMMA",
            Self::OpenInt => "OPEN_INT",
            Self::ImplVol => "IMPL_VOL",
            Self::Delta => "DELTA",
            Self::Theta => "THETA",
            Self::Vega => "VEGA",
            Self::Rho => "RHO",
            Self::Volume => "VOLUME",
            Self::ProbOfExpiring => "PROB_OF_EXPIRING",
            Self::ProbOtm => "PROB_OTM",
            Self::ProbOfTouching => "PROB_OF_TOUCHING",
            Self::MrktMkrMove => "MRKT_MKR_MOVE",
            Self::FrontExMove => "FRONT_EX_MOVE",
            Self::BackExMove => "BACK_EX_MOVE",
        }
    }

    /// Value assumed when the feed has not delivered this kind.
    ///
    /// Every kind the feed exposes is numeric, so the default is zero.
    pub fn default_value(&self) -> QuoteValue {
        QuoteValue::Number(0.0)
    }
}

impl fmt::Display for QuoteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuoteKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "LAST" => Self::Last,
            "GAMMA" => Self::Gamma,
            "OPEN_INT" => Self::OpenInt,
            "IMPL_VOL" => Self::ImplVol,
            "DELTA" => Self::Delta,
            "THETA" => Self::Theta,
            "VEGA" => Self::Vega,
            "RHO" => Self::Rho,
            "VOLUME" => Self::Volume,
            "PROB_OF_EXPIRING" => Self::ProbOfExpiring,
            "PROB_OTM" => Self::ProbOtm,
            "PROB_OF_TOUCHING" => Self::ProbOfTouching,
            "MRKT_MKR_MOVE" => Self::MrktMkrMove,
            "FRONT_EX_MOVE" => Self::FrontExMove,
            "BACK_EX_MOVE" => Self::BackExMove,
            other => return Err(CoreError::InvalidTopic(format!("unknown quote kind {other}"))),
        };
        Ok(kind)
    }
}

/// Unique address of one feed value.
///
/// Format: `{symbol}:{KIND}` (e.g. "SPY:LAST", ".SPY250117C600:GAMMA").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Topic {
    pub symbol: String,
    pub kind: QuoteKind,
}

impl Topic {
    pub fn new(symbol: impl Into<String>, kind: QuoteKind) -> Self {
        Self {
            symbol: symbol.into(),
            kind,
        }
    }

    /// Topics for an underlying: price plus the three move metrics.
    pub fn underlying(symbol: &str) -> Vec<Topic> {
        QuoteKind::UNDERLYING
            .iter()
            .map(|kind| Topic::new(symbol, *kind))
            .collect()
    }

    /// The eleven option topics for one contract identifier.
    pub fn option(identifier: &str) -> Vec<Topic> {
        QuoteKind::OPTION
            .iter()
            .map(|kind| Topic::new(identifier, *kind))
            .collect()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.symbol, self.kind)
    }
}

impl FromStr for Topic {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (symbol, kind) = s
            .rsplit_once(':')
            .ok_or_else(|| CoreError::InvalidTopic(format!("missing ':' in {s}")))?;
        if symbol.is_empty() {
            return Err(CoreError::InvalidTopic(format!("empty symbol in {s}")));
        }
        Ok(Self::new(symbol, kind.parse()?))
    }
}

/// Value delivered by the feed: numeric, or raw text when the feed could not
/// produce a number (e.g. "N/A").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuoteValue {
    Number(f64),
    Text(String),
}

impl QuoteValue {
    /// Numeric reading, parsing text values when possible.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Number(_) => None,
            Self::Text(s) => s.trim().replace(',', "").parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

impl From<f64> for QuoteValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for QuoteValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl fmt::Display for QuoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}
