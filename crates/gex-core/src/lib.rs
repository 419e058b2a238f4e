//! Core domain types for gex-stream.
//!
//! This crate provides the fundamental types used throughout the streamer:
//! - `Topic`, `QuoteKind`, `QuoteValue`: addressing of feed values
//! - `Snapshot`, `StreamMessage`: what the producer hands to the consumer
//! - `Strike`, `StrikeSpacing`, `StrikeGrid`: exact-decimal strike grids
//! - `SymbolUniverse`, `OptionIdentifier`: option contract derivation

pub mod error;
pub mod expiry;
pub mod quote;
pub mod snapshot;
pub mod strike;
pub mod universe;

pub use error::{CoreError, Result};
pub use expiry::{is_third_friday, nearest_friday, option_root, third_friday};
pub use quote::{QuoteKind, QuoteValue, Topic};
pub use snapshot::{Snapshot, StreamMessage, ERROR_KEY, STATUS_KEY};
pub use strike::{Strike, StrikeGrid, StrikeSpacing, MAX_GRID_STRIKES};
pub use universe::{OptionIdentifier, OptionRight, StrikeSelection, SymbolUniverse};
