//! Strike prices and strike grids.
//!
//! Strikes use `rust_decimal` so that grid endpoints, spacing multiples and
//! half strikes (e.g. 102.5) stay exact.

use crate::error::{CoreError, Result};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on the number of strikes a single grid may contain.
pub const MAX_GRID_STRIKES: usize = 5_000;

/// Tolerance used when deciding whether a strike sits on a half.
const HALF_STRIKE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 3);

/// Option exercise price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Strike(pub Decimal);

impl Strike {
    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    /// Lossy conversion for consumers that work in `f64`.
    pub fn to_f64(&self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    /// Round to the nearest multiple of `spacing` (ties to even).
    ///
    /// Fails instead of overflowing for values near the decimal limit.
    pub fn round_to_spacing(value: Decimal, spacing: StrikeSpacing) -> Result<Self> {
        let step = spacing.as_decimal();
        value
            .checked_div(step)
            .map(|u| u.round_dp_with_strategy(0, RoundingStrategy::MidpointNearestEven))
            .and_then(|units| units.checked_mul(step))
            .map(Self)
            .ok_or_else(|| CoreError::InvalidStrikeRange(format!("{value} out of range")))
    }

    /// Render the strike as it appears inside an option identifier.
    ///
    /// One decimal place only for half strikes on half-strike capable
    /// spacings; otherwise the integer part.
    pub fn format_for(&self, spacing: StrikeSpacing) -> String {
        let frac = self.0.fract().abs();
        if spacing.supports_half_strikes() && (frac - Decimal::new(5, 1)).abs() < HALF_STRIKE_TOLERANCE {
            format!("{:.1}", self.0)
        } else {
            self.0.trunc().normalize().to_string()
        }
    }
}

impl fmt::Display for Strike {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl From<Decimal> for Strike {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

/// Listed strike increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum StrikeSpacing {
    Half,
    One,
    TwoAndHalf,
    Five,
    Ten,
    TwentyFive,
}

impl StrikeSpacing {
    pub const ALL: [StrikeSpacing; 6] = [
        Self::Half,
        Self::One,
        Self::TwoAndHalf,
        Self::Five,
        Self::Ten,
        Self::TwentyFive,
    ];

    pub fn as_decimal(&self) -> Decimal {
        match self {
            Self::Half => Decimal::new(5, 1),
            Self::One => Decimal::ONE,
            Self::TwoAndHalf => Decimal::new(25, 1),
            Self::Five => Decimal::from(5),
            Self::Ten => Decimal::TEN,
            Self::TwentyFive => Decimal::from(25),
        }
    }

    pub fn as_f64(&self) -> f64 {
        self.as_decimal().to_f64().unwrap_or(0.0)
    }

    /// Spacings whose grids can land on .5 strikes.
    pub fn supports_half_strikes(&self) -> bool {
        matches!(self, Self::Half | Self::TwoAndHalf)
    }
}

impl Default for StrikeSpacing {
    fn default() -> Self {
        Self::Five
    }
}

impl fmt::Display for StrikeSpacing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_decimal())
    }
}

impl TryFrom<f64> for StrikeSpacing {
    type Error = CoreError;

    fn try_from(value: f64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| (s.as_f64() - value).abs() < 1e-9)
            .ok_or_else(|| {
                CoreError::InvalidSpacing(format!(
                    "{value} (expected one of 0.5, 1, 2.5, 5, 10, 25)"
                ))
            })
    }
}

impl From<StrikeSpacing> for f64 {
    fn from(spacing: StrikeSpacing) -> Self {
        spacing.as_f64()
    }
}

/// Ordered, evenly spaced strikes, inclusive of both endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrikeGrid {
    strikes: Vec<Strike>,
    spacing: StrikeSpacing,
}

impl StrikeGrid {
    /// Grid of `floor(2*range/spacing)+1` strikes centered on `price`
    /// rounded to the nearest spacing multiple.
    pub fn centered(price: f64, range: Decimal, spacing: StrikeSpacing) -> Result<Self> {
        if !price.is_finite() || price <= 0.0 {
            return Err(CoreError::InvalidPrice(format!("{price}")));
        }
        if range.is_sign_negative() {
            return Err(CoreError::InvalidStrikeRange(format!("negative range {range}")));
        }
        let price = Decimal::from_f64(price)
            .ok_or_else(|| CoreError::InvalidPrice(format!("{price}")))?;
        let center = Strike::round_to_spacing(price, spacing)?.inner();
        let width = range
            .checked_mul(Decimal::TWO)
            .ok_or_else(|| CoreError::InvalidStrikeRange(format!("range {range}")))?;
        let count = strike_count(width, spacing)?;
        let (Some(start), Some(end)) = (center.checked_sub(range), center.checked_add(range)) else {
            return Err(CoreError::InvalidStrikeRange(format!("range {range}")));
        };
        Self::linspace(start, end, count, spacing)
    }

    /// Grid of `floor((high-low)/spacing)+1` strikes between `low` and `high`
    /// after both are rounded to the nearest spacing multiple.
    pub fn bounded(low: Decimal, high: Decimal, spacing: StrikeSpacing) -> Result<Self> {
        let low = Strike::round_to_spacing(low, spacing)?.inner();
        let high = Strike::round_to_spacing(high, spacing)?.inner();
        if low > high {
            return Err(CoreError::InvalidStrikeRange(format!(
                "low {low} above high {high}"
            )));
        }
        let width = high
            .checked_sub(low)
            .ok_or_else(|| CoreError::InvalidStrikeRange(format!("low {low} high {high}")))?;
        let count = strike_count(width, spacing)?;
        Self::linspace(low, high, count, spacing)
    }

    fn linspace(start: Decimal, end: Decimal, count: usize, spacing: StrikeSpacing) -> Result<Self> {
        if start.is_sign_negative() && !start.is_zero() {
            return Err(CoreError::InvalidStrikeRange(format!(
                "grid starts below zero at {start}"
            )));
        }

        let strikes = if count <= 1 {
            vec![Strike(start)]
        } else {
            let step = (end - start) / Decimal::from(count - 1);
            (0..count)
                .map(|i| {
                    if i == count - 1 {
                        Strike(end)
                    } else {
                        Strike(start + step * Decimal::from(i))
                    }
                })
                .collect()
        };

        Ok(Self { strikes, spacing })
    }

    pub fn strikes(&self) -> &[Strike] {
        &self.strikes
    }

    pub fn spacing(&self) -> StrikeSpacing {
        self.spacing
    }

    pub fn len(&self) -> usize {
        self.strikes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty()
    }

    pub fn first(&self) -> Option<Strike> {
        self.strikes.first().copied()
    }

    pub fn last(&self) -> Option<Strike> {
        self.strikes.last().copied()
    }
}

fn strike_count(width: Decimal, spacing: StrikeSpacing) -> Result<usize> {
    let count = width
        .checked_div(spacing.as_decimal())
        .and_then(|steps| steps.floor().to_usize())
        .and_then(|n| n.checked_add(1))
        .ok_or_else(|| CoreError::InvalidStrikeRange(format!("width {width}")))?;
    if count > MAX_GRID_STRIKES {
        return Err(CoreError::InvalidStrikeRange(format!(
            "{count} strikes exceeds limit of {MAX_GRID_STRIKES}"
        )));
    }
    Ok(count)
}
