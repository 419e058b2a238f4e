//! Option contract universe construction.
//!
//! Derives the ordered list of option identifiers for an underlying, an
//! expiry and a strike grid. Identifiers use the `.{root}{YYMMDD}{C|P}{strike}`
//! format (e.g. ".SPY250129C601").
//!
//! Two strike selection modes are supported:
//! - Centered: ± range around the observed underlying price
//! - Bounded: explicit low/high strikes supplied by the caller

use crate::error::{CoreError, Result};
use crate::expiry::option_root;
use crate::quote::Topic;
use crate::strike::{Strike, StrikeGrid, StrikeSpacing};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Date layout used inside identifiers.
const EXPIRY_FORMAT: &str = "%y%m%d";

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionRight {
    Call,
    Put,
}

impl OptionRight {
    pub fn code(&self) -> char {
        match self {
            Self::Call => 'C',
            Self::Put => 'P',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'C' => Some(Self::Call),
            'P' => Some(Self::Put),
            _ => None,
        }
    }
}

impl fmt::Display for OptionRight {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "CALL"),
            Self::Put => write!(f, "PUT"),
        }
    }
}

/// One option contract identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OptionIdentifier {
    pub root: String,
    pub expiry: NaiveDate,
    pub right: OptionRight,
    pub strike: Strike,
    text: String,
}

impl OptionIdentifier {
    /// Build an identifier, rendering the strike for `spacing`.
    pub fn new(
        root: &str,
        expiry: NaiveDate,
        right: OptionRight,
        strike: Strike,
        spacing: StrikeSpacing,
    ) -> Self {
        let text = format!(
            ".{root}{}{}{}",
            expiry.format(EXPIRY_FORMAT),
            right.code(),
            strike.format_for(spacing)
        );
        Self {
            root: root.to_string(),
            expiry,
            right,
            strike,
            text,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The eleven option topics for this contract.
    pub fn topics(&self) -> Vec<Topic> {
        Topic::option(&self.text)
    }
}

impl fmt::Display for OptionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for OptionIdentifier {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidIdentifier(s.to_string());

        let body = s.strip_prefix('.').ok_or_else(invalid)?;
        let date_start = body.find(|c: char| c.is_ascii_digit()).ok_or_else(invalid)?;
        let root = &body[..date_start];
        if root.is_empty() || !root.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid());
        }

        let rest = &body[date_start..];
        let date_text = rest.get(..6).ok_or_else(invalid)?;
        let expiry = NaiveDate::parse_from_str(date_text, EXPIRY_FORMAT).map_err(|_| invalid())?;

        let mut tail = rest[6..].chars();
        let right = tail.next().and_then(OptionRight::from_code).ok_or_else(invalid)?;
        let strike: Decimal = tail.as_str().parse().map_err(|_| invalid())?;

        Ok(Self {
            root: root.to_string(),
            expiry,
            right,
            strike: Strike::new(strike),
            text: s.to_string(),
        })
    }
}

/// How the strike grid is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum StrikeSelection {
    /// ± `range` around the underlying price.
    Centered { range: Decimal },
    /// Absolute strike bounds.
    Bounded { low: Decimal, high: Decimal },
}

impl Default for StrikeSelection {
    fn default() -> Self {
        Self::Centered {
            range: Decimal::from(30),
        }
    }
}

/// Strike grid plus the call/put identifiers derived from it.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolUniverse {
    underlying: String,
    root: String,
    expiry: NaiveDate,
    grid: StrikeGrid,
    identifiers: Vec<OptionIdentifier>,
}

impl SymbolUniverse {
    /// Build the universe for `selection`; `price` is only read in centered
    /// mode.
    pub fn build(
        underlying: &str,
        expiry: NaiveDate,
        selection: &StrikeSelection,
        spacing: StrikeSpacing,
        price: f64,
    ) -> Result<Self> {
        match selection {
            StrikeSelection::Centered { range } => {
                Self::centered(underlying, expiry, price, *range, spacing)
            }
            StrikeSelection::Bounded { low, high } => {
                Self::bounded(underlying, expiry, *low, *high, spacing)
            }
        }
    }

    pub fn centered(
        underlying: &str,
        expiry: NaiveDate,
        price: f64,
        range: Decimal,
        spacing: StrikeSpacing,
    ) -> Result<Self> {
        let grid = StrikeGrid::centered(price, range, spacing)?;
        Ok(Self::from_grid(underlying, expiry, grid))
    }

    pub fn bounded(
        underlying: &str,
        expiry: NaiveDate,
        low: Decimal,
        high: Decimal,
        spacing: StrikeSpacing,
    ) -> Result<Self> {
        let grid = StrikeGrid::bounded(low, high, spacing)?;
        Ok(Self::from_grid(underlying, expiry, grid))
    }

    /// Emit a call then a put for every strike, ascending.
    pub fn from_grid(underlying: &str, expiry: NaiveDate, grid: StrikeGrid) -> Self {
        let root = option_root(underlying, expiry);
        let spacing = grid.spacing();
        let identifiers = grid
            .strikes()
            .iter()
            .flat_map(|strike| {
                [OptionRight::Call, OptionRight::Put]
                    .map(|right| OptionIdentifier::new(&root, expiry, right, *strike, spacing))
            })
            .collect();

        Self {
            underlying: underlying.to_string(),
            root,
            expiry,
            grid,
            identifiers,
        }
    }

    pub fn underlying(&self) -> &str {
        &self.underlying
    }

    /// Root used in identifiers (after weekly remapping).
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn expiry(&self) -> NaiveDate {
        self.expiry
    }

    pub fn grid(&self) -> &StrikeGrid {
        &self.grid
    }

    pub fn identifiers(&self) -> &[OptionIdentifier] {
        &self.identifiers
    }

    pub fn symbols(&self) -> Vec<String> {
        self.identifiers.iter().map(|id| id.to_string()).collect()
    }

    /// `(strike, call, put)` per grid strike, ascending.
    pub fn pairs(&self) -> impl Iterator<Item = (Strike, &OptionIdentifier, &OptionIdentifier)> {
        self.identifiers
            .chunks_exact(2)
            .map(|pair| (pair[0].strike, &pair[0], &pair[1]))
    }

    /// Underlying topics followed by every option topic.
    pub fn all_topics(&self) -> Vec<Topic> {
        let mut topics = Topic::underlying(&self.underlying);
        topics.extend(self.identifiers.iter().flat_map(OptionIdentifier::topics));
        topics
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}
