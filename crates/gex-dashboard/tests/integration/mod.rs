//! Integration tests for gex-dashboard.
//!
//! These tests drive a real session against the simulated feed:
//! - Bootstrap and universe expansion
//! - Restart and stop lifecycle
//! - Session-fatal failures

pub mod common;
