//! gex-stream dashboard.
//!
//! Orchestrates one streaming session:
//! - Bootstrap on the underlying price, then expand to the option universe
//! - Redraw cadence and frame delivery
//! - Gamma exposure and expected move derivation
//! - Console rendering

pub mod app;
pub mod cadence;
pub mod chain;
pub mod config;
pub mod error;
pub mod session;

pub use app::Application;
pub use chain::{ChainView, ExpectedMove, Greeks, Probabilities, StrikeRow};
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use session::{
    PollOutcome, SessionConfig, SessionFrame, SessionRequest, SessionState, StreamingSession,
};
