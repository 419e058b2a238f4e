//! Console consumer loop.
//!
//! Polls the session on a fixed tick, renders every delivered frame as a
//! chain table, and stops the session on Ctrl-C, on the optional run
//! deadline, or on a session-fatal error.

use crate::chain::ChainView;
use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::session::{PollOutcome, StreamingSession};
use chrono::Utc;
use gex_feed::FeedFactory;
use gex_telemetry::Metrics;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Main application.
pub struct Application<F: FeedFactory> {
    config: AppConfig,
    session: StreamingSession<F>,
    shutdown: CancellationToken,
    frames_rendered: u64,
}

impl<F: FeedFactory> Application<F> {
    pub fn new(config: AppConfig, factory: F) -> Self {
        let session = StreamingSession::new(factory, config.session_config());
        Self {
            config,
            session,
            shutdown: CancellationToken::new(),
            frames_rendered: 0,
        }
    }

    /// Token that ends [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stream until Ctrl-C, `run_for` elapses, or the session fails.
    ///
    /// Returns the last rendered chain view, if any.
    pub async fn run(mut self, run_for: Option<Duration>) -> AppResult<Option<ChainView>> {
        let request = self.config.session_request(Utc::now().date_naive());
        info!(
            symbol = %request.symbol,
            expiry = %request.expiry,
            refresh_secs = request.refresh_interval.as_secs(),
            "Starting application"
        );
        self.session.start(request).await?;

        if let Some(limit) = run_for {
            let token = self.shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(limit).await;
                info!(seconds = limit.as_secs(), "Run duration elapsed");
                token.cancel();
            });
        }

        let mut tick = tokio::time::interval(self.config.consumer_tick());
        let mut failure = None;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match self.session.poll().await {
                        PollOutcome::Update(frame) => {
                            let view = ChainView::from_frame(&frame);
                            self.frames_rendered += 1;
                            info!(
                                price = view.expected_move.price,
                                strikes = view.rows.len(),
                                values = frame.snapshot.len(),
                                "Redraw"
                            );
                            println!("{}", view.render());
                        }
                        PollOutcome::Failed(message) => {
                            failure = Some(message);
                            break;
                        }
                        PollOutcome::Status(status) => info!(%status, "Session status"),
                        PollOutcome::Idle => break,
                        PollOutcome::Empty | PollOutcome::NotDue(_) | PollOutcome::Waiting => {}
                    }
                }

                () = self.shutdown.cancelled() => {
                    info!("Shutdown requested");
                    break;
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        self.session.stop().await;
        info!(frames = self.frames_rendered, "Shutting down");
        match Metrics::render() {
            Ok(text) => debug!(metrics = %text, "Final metrics"),
            Err(e) => error!(error = %e, "Failed to render metrics"),
        }

        if let Some(message) = failure {
            return Err(AppError::Session(message));
        }
        Ok(self.session.last_frame().map(ChainView::from_frame))
    }
}
