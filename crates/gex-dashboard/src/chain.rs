//! Option chain view derived from a session frame.
//!
//! Missing or non-numeric values read as zero, so a partially delivered
//! snapshot still yields a complete table.

use crate::session::SessionFrame;
use chrono::{DateTime, NaiveDate, Utc};
use gex_core::{QuoteKind, Snapshot, Strike, StrikeSpacing};
use std::fmt::Write as _;

/// Contract multiplier.
const CONTRACT_SIZE: f64 = 100.0;
/// Gamma exposure is quoted per 1% move of the underlying.
const ONE_PERCENT: f64 = 0.01;

/// Absolute gamma exposure of one side of one strike.
pub fn gamma_exposure(open_interest: f64, gamma: f64, price: f64) -> f64 {
    (open_interest * gamma * CONTRACT_SIZE * price * price * ONE_PERCENT).abs()
}

/// Sensitivities of one contract, or their sum over several.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

impl Greeks {
    fn read(snapshot: &Snapshot, symbol: &str) -> Self {
        Self {
            delta: snapshot.number(symbol, QuoteKind::Delta),
            gamma: snapshot.number(symbol, QuoteKind::Gamma),
            theta: snapshot.number(symbol, QuoteKind::Theta),
            vega: snapshot.number(symbol, QuoteKind::Vega),
            rho: snapshot.number(symbol, QuoteKind::Rho),
        }
    }
}

impl std::ops::Add for Greeks {
    type Output = Greeks;

    fn add(self, rhs: Greeks) -> Greeks {
        Greeks {
            delta: self.delta + rhs.delta,
            gamma: self.gamma + rhs.gamma,
            theta: self.theta + rhs.theta,
            vega: self.vega + rhs.vega,
            rho: self.rho + rhs.rho,
        }
    }
}

/// Platform-computed probabilities for one contract.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Probabilities {
    pub expiring: f64,
    pub otm: f64,
    pub touching: f64,
}

impl Probabilities {
    fn read(snapshot: &Snapshot, symbol: &str) -> Self {
        Self {
            expiring: snapshot.number(symbol, QuoteKind::ProbOfExpiring),
            otm: snapshot.number(symbol, QuoteKind::ProbOtm),
            touching: snapshot.number(symbol, QuoteKind::ProbOfTouching),
        }
    }
}

/// Per-strike call/put figures.
#[derive(Debug, Clone, PartialEq)]
pub struct StrikeRow {
    pub strike: Strike,
    pub call_open_interest: f64,
    pub put_open_interest: f64,
    pub call_volume: f64,
    pub put_volume: f64,
    pub call_iv: f64,
    pub put_iv: f64,
    pub call_greeks: Greeks,
    pub put_greeks: Greeks,
    pub call_probabilities: Probabilities,
    pub put_probabilities: Probabilities,
    pub call_gex: f64,
    pub put_gex: f64,
}

impl StrikeRow {
    pub fn total_gex(&self) -> f64 {
        self.call_gex + self.put_gex
    }

    /// Call plus put sensitivities at this strike.
    pub fn net_greeks(&self) -> Greeks {
        self.call_greeks + self.put_greeks
    }

    /// Probabilities shown for the strike. These are quoted against the call.
    pub fn probabilities(&self) -> Probabilities {
        self.call_probabilities
    }
}

/// Underlying price and implied move metrics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExpectedMove {
    pub price: f64,
    pub market_maker_move: f64,
    pub front_expiry_move: f64,
    pub back_expiry_move: f64,
}

impl ExpectedMove {
    pub fn from_snapshot(snapshot: &Snapshot, symbol: &str) -> Self {
        Self {
            price: snapshot.underlying_price(symbol),
            market_maker_move: snapshot.number(symbol, QuoteKind::MrktMkrMove),
            front_expiry_move: snapshot.number(symbol, QuoteKind::FrontExMove),
            back_expiry_move: snapshot.number(symbol, QuoteKind::BackExMove),
        }
    }

    /// `(lower, upper)` band from the market maker move, when positive.
    pub fn bands(&self) -> Option<(f64, f64)> {
        (self.market_maker_move > 0.0).then(|| {
            (
                self.price - self.market_maker_move,
                self.price + self.market_maker_move,
            )
        })
    }

    /// Human-readable summary lines.
    pub fn display_lines(&self) -> Vec<String> {
        if self.price == 0.0 {
            return vec!["No data available".to_string()];
        }

        let mut lines = vec![format!("Current Price: ${:.2}", self.price)];
        if let Some((lower, upper)) = self.bands() {
            lines.push(format!("Market Maker Move: ${:.2}", self.market_maker_move));
            lines.push(format!("Expected Range: ${lower:.2} - ${upper:.2}"));
        }
        if self.front_expiry_move > 0.0 {
            lines.push(format!("Front Expiration Move: ${:.2}", self.front_expiry_move));
        }
        if self.back_expiry_move > 0.0 {
            lines.push(format!("Back Expiration Move: ${:.2}", self.back_expiry_move));
        }
        lines
    }
}

/// Table of the whole universe at one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainView {
    pub symbol: String,
    pub root: String,
    pub expiry: NaiveDate,
    pub spacing: StrikeSpacing,
    pub expected_move: ExpectedMove,
    pub rows: Vec<StrikeRow>,
    pub captured_at: DateTime<Utc>,
}

impl ChainView {
    pub fn from_frame(frame: &SessionFrame) -> Self {
        let universe = &frame.universe;
        let snapshot = &frame.snapshot;
        let symbol = universe.underlying();
        let expected_move = ExpectedMove::from_snapshot(snapshot, symbol);
        let price = expected_move.price;

        let rows = universe
            .pairs()
            .map(|(strike, call, put)| {
                let call = call.as_str();
                let put = put.as_str();
                let call_greeks = Greeks::read(snapshot, call);
                let put_greeks = Greeks::read(snapshot, put);
                let call_open_interest = snapshot.number(call, QuoteKind::OpenInt);
                let put_open_interest = snapshot.number(put, QuoteKind::OpenInt);

                StrikeRow {
                    strike,
                    call_open_interest,
                    put_open_interest,
                    call_volume: snapshot.number(call, QuoteKind::Volume),
                    put_volume: snapshot.number(put, QuoteKind::Volume),
                    call_iv: snapshot.number(call, QuoteKind::ImplVol),
                    put_iv: snapshot.number(put, QuoteKind::ImplVol),
                    call_probabilities: Probabilities::read(snapshot, call),
                    put_probabilities: Probabilities::read(snapshot, put),
                    call_gex: gamma_exposure(call_open_interest, call_greeks.gamma, price),
                    put_gex: gamma_exposure(put_open_interest, put_greeks.gamma, price),
                    call_greeks,
                    put_greeks,
                }
            })
            .collect();

        Self {
            symbol: symbol.to_string(),
            root: universe.root().to_string(),
            expiry: universe.expiry(),
            spacing: universe.grid().spacing(),
            expected_move,
            rows,
            captured_at: snapshot.captured_at,
        }
    }

    pub fn total_call_gex(&self) -> f64 {
        self.rows.iter().map(|r| r.call_gex).sum()
    }

    pub fn total_put_gex(&self) -> f64 {
        self.rows.iter().map(|r| r.put_gex).sum()
    }

    pub fn total_call_volume(&self) -> f64 {
        self.rows.iter().map(|r| r.call_volume).sum()
    }

    pub fn total_put_volume(&self) -> f64 {
        self.rows.iter().map(|r| r.put_volume).sum()
    }

    /// Net sensitivities summed over every strike.
    pub fn total_greeks(&self) -> Greeks {
        self.rows
            .iter()
            .fold(Greeks::default(), |acc, row| acc + row.net_greeks())
    }

    /// Row with the largest combined exposure; the lowest strike wins ties.
    pub fn max_gex_row(&self) -> Option<&StrikeRow> {
        self.rows.iter().fold(None, |best, row| match best {
            Some(b) if b.total_gex() >= row.total_gex() => Some(b),
            _ => Some(row),
        })
    }

    /// Plain-text table for the console.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} {} ({}) @ {}",
            self.symbol,
            self.expiry,
            self.root,
            self.captured_at.format("%H:%M:%S")
        );
        for line in self.expected_move.display_lines() {
            let _ = writeln!(out, "  {line}");
        }
        let _ = writeln!(
            out,
            "{:>10} {:>9} {:>10} {:>14} {:>14} {:>10} {:>9} {:>8} {:>7} {:>7}",
            "strike",
            "call vol",
            "call OI",
            "call GEX",
            "put GEX",
            "put OI",
            "put vol",
            "delta",
            "P(OTM)",
            "P(tch)"
        );

        let max_strike = self.max_gex_row().map(|r| r.strike);
        for row in &self.rows {
            let marker = if Some(row.strike) == max_strike { "*" } else { " " };
            let probabilities = row.probabilities();
            let _ = writeln!(
                out,
                "{:>10} {:>9.0} {:>10.0} {:>14.0} {:>14.0} {:>10.0} {:>9.0} {:>8.3} {:>7.3} {:>7.3}{marker}",
                row.strike.format_for(self.spacing),
                row.call_volume,
                row.call_open_interest,
                row.call_gex,
                row.put_gex,
                row.put_open_interest,
                row.put_volume,
                row.net_greeks().delta,
                probabilities.otm,
                probabilities.touching,
            );
        }
        let _ = writeln!(
            out,
            "total call GEX {:.0}  total put GEX {:.0}",
            self.total_call_gex(),
            self.total_put_gex()
        );
        let _ = writeln!(
            out,
            "total call vol {:.0}  total put vol {:.0}",
            self.total_call_volume(),
            self.total_put_volume()
        );
        let greeks = self.total_greeks();
        let _ = writeln!(
            out,
            "net delta {:.2}  gamma {:.4}  theta {:.2}  vega {:.2}  rho {:.2}",
            greeks.delta, greeks.gamma, greeks.theta, greeks.vega, greeks.rho
        );
        out
    }
}
