//! Streaming session state machine.
//!
//! A session first streams only the underlying topics to learn the price,
//! then builds the strike universe around it and replaces the bootstrap
//! producer with one streaming every option topic. At most one producer is
//! live at any time; every producer gets its own client and its own mailbox,
//! so a producer that outlives its grace period can never feed a later one's
//! consumer.
//!
//! ```text
//! Idle --start--> BootstrappingPrice --price>0--> ExpandingUniverse --> Streaming
//!   ^                     |                                                |
//!   +------- Stopping <---+---------------- stop / error ------------------+
//! ```

use crate::cadence::RedrawCadence;
use crate::error::{AppError, AppResult};
use chrono::NaiveDate;
use gex_core::{Snapshot, StreamMessage, StrikeSelection, StrikeSpacing, SymbolUniverse, Topic};
use gex_feed::{
    FeedFactory, LatestValueQueue, Mailbox, ProducerConfig, ProducerHandle, ProducerPhase,
    StopOutcome, StreamingProducer,
};
use gex_telemetry::Metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Lifecycle state of a [`StreamingSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Streaming underlying topics until a positive price arrives.
    BootstrappingPrice,
    ExpandingUniverse,
    Streaming,
    Stopping,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::BootstrappingPrice => "bootstrapping_price",
            Self::ExpandingUniverse => "expanding_universe",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
        }
    }
}

/// What to stream.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRequest {
    pub symbol: String,
    pub expiry: NaiveDate,
    pub strikes: StrikeSelection,
    pub spacing: StrikeSpacing,
    /// Minimum time between two delivered frames.
    pub refresh_interval: Duration,
}

/// Session timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub producer: ProducerConfig,
    /// Wait for the previous producer when restarting or stopping.
    pub restart_grace: Duration,
    /// Wait for the bootstrap producer when expanding.
    pub expand_grace: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            producer: ProducerConfig::default(),
            restart_grace: Duration::from_secs(2),
            expand_grace: Duration::from_secs(1),
        }
    }
}

/// One delivered update: a full snapshot and the universe it covers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionFrame {
    pub snapshot: Snapshot,
    pub universe: Arc<SymbolUniverse>,
}

/// Result of [`StreamingSession::poll`].
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// No session running.
    Idle,
    /// Nothing new in the mailbox.
    Empty,
    /// The previous frame is too recent; carries the time left.
    NotDue(Duration),
    Status(String),
    /// Data arrived but the universe is not built yet.
    Waiting,
    Update(SessionFrame),
    /// Session-fatal error. The session is back to `Idle`.
    Failed(String),
}

/// Explicit session value owning the producer, mailbox and universe.
pub struct StreamingSession<F: FeedFactory> {
    factory: F,
    config: SessionConfig,
    state: SessionState,
    request: Option<SessionRequest>,
    mailbox: Mailbox,
    producer: Option<ProducerHandle>,
    universe: Option<Arc<SymbolUniverse>>,
    cadence: RedrawCadence,
    last_frame: Option<SessionFrame>,
    last_error: Option<String>,
}

impl<F: FeedFactory> StreamingSession<F> {
    pub fn new(factory: F, config: SessionConfig) -> Self {
        Metrics::session_state_set(SessionState::Idle.as_str());
        Self {
            factory,
            config,
            state: SessionState::Idle,
            request: None,
            mailbox: Arc::new(LatestValueQueue::new()),
            producer: None,
            universe: None,
            cadence: RedrawCadence::new(Duration::ZERO),
            last_frame: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn request(&self) -> Option<&SessionRequest> {
        self.request.as_ref()
    }

    /// Universe of the running session, once built.
    pub fn universe(&self) -> Option<&SymbolUniverse> {
        self.universe.as_deref()
    }

    /// Most recent frame. Survives `stop`; cleared by `start`.
    pub fn last_frame(&self) -> Option<&SessionFrame> {
        self.last_frame.as_ref()
    }

    /// Error that ended the last run, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Start (or restart) streaming `request`.
    pub async fn start(&mut self, request: SessionRequest) -> AppResult<()> {
        if request.symbol.trim().is_empty() {
            return Err(AppError::Session("symbol must not be empty".to_string()));
        }

        if let Some(producer) = self.producer.take() {
            info!("Restarting session, stopping previous producer");
            Metrics::session_restarted();
            self.set_state(SessionState::Stopping);
            log_stop(producer.stop(self.config.restart_grace).await);
        }

        self.universe = None;
        self.last_frame = None;
        self.last_error = None;
        self.cadence = RedrawCadence::new(request.refresh_interval);

        info!(
            symbol = %request.symbol,
            expiry = %request.expiry,
            spacing = %request.spacing,
            "Starting streaming session"
        );
        let topics = Topic::underlying(&request.symbol);
        match self.spawn_producer(topics, ProducerPhase::Bootstrap) {
            Ok(producer) => self.producer = Some(producer),
            Err(e) => {
                self.set_state(SessionState::Idle);
                return Err(e);
            }
        }
        self.request = Some(request);
        self.set_state(SessionState::BootstrappingPrice);
        Ok(())
    }

    /// Stop streaming. The last frame is kept.
    pub async fn stop(&mut self) {
        if self.state == SessionState::Idle && self.producer.is_none() {
            return;
        }
        info!("Stopping streaming session");
        self.shutdown(self.config.restart_grace).await;
    }

    /// Drain the mailbox and advance the state machine.
    pub async fn poll(&mut self) -> PollOutcome {
        self.poll_at(Instant::now()).await
    }

    /// [`poll`](Self::poll) with an explicit clock reading.
    pub async fn poll_at(&mut self, now: Instant) -> PollOutcome {
        if self.state == SessionState::Idle {
            return PollOutcome::Idle;
        }
        if let Some(remaining) = self.cadence.remaining(now) {
            // Errors are never throttled; anything else stays for the next redraw.
            if let Some(StreamMessage::Error(text)) =
                self.mailbox.take_if(StreamMessage::is_error)
            {
                return self.fail(text).await;
            }
            return PollOutcome::NotDue(remaining);
        }

        let Some(message) = self.mailbox.try_get() else {
            return PollOutcome::Empty;
        };

        match message {
            StreamMessage::Error(text) => self.fail(text).await,
            StreamMessage::Status(text) => {
                debug!(status = %text, "Producer status");
                PollOutcome::Status(text)
            }
            StreamMessage::Data(snapshot) => self.on_data(snapshot, now).await,
        }
    }

    async fn on_data(&mut self, snapshot: Snapshot, now: Instant) -> PollOutcome {
        if let Some(universe) = &self.universe {
            let frame = SessionFrame {
                snapshot,
                universe: Arc::clone(universe),
            };
            self.cadence.mark_redrawn(now);
            self.last_frame = Some(frame.clone());
            return PollOutcome::Update(frame);
        }

        let Some(request) = self.request.clone() else {
            return PollOutcome::Waiting;
        };
        let price = snapshot.underlying_price(&request.symbol);
        if price <= 0.0 {
            debug!(symbol = %request.symbol, "No underlying price yet");
            return PollOutcome::Waiting;
        }

        match self.expand(&request, price).await {
            Ok(()) => PollOutcome::Waiting,
            Err(e) => self.fail(e.to_string()).await,
        }
    }

    /// Replace the bootstrap producer with one covering the full universe.
    async fn expand(&mut self, request: &SessionRequest, price: f64) -> AppResult<()> {
        self.set_state(SessionState::ExpandingUniverse);

        let universe = SymbolUniverse::build(
            &request.symbol,
            request.expiry,
            &request.strikes,
            request.spacing,
            price,
        )?;
        info!(
            price,
            root = universe.root(),
            strikes = universe.grid().len(),
            contracts = universe.len(),
            "Universe built, expanding subscription"
        );

        if let Some(producer) = self.producer.take() {
            log_stop(producer.stop(self.config.expand_grace).await);
        }

        let topics = universe.all_topics();
        self.universe = Some(Arc::new(universe));
        self.producer = Some(self.spawn_producer(topics, ProducerPhase::Expanded)?);
        self.set_state(SessionState::Streaming);
        Ok(())
    }

    async fn fail(&mut self, message: String) -> PollOutcome {
        Metrics::session_fatal();
        error!(error = %message, state = self.state.as_str(), "Streaming session failed");
        self.last_error = Some(message.clone());
        self.shutdown(self.config.expand_grace).await;
        PollOutcome::Failed(message)
    }

    async fn shutdown(&mut self, grace: Duration) {
        self.set_state(SessionState::Stopping);
        if let Some(producer) = self.producer.take() {
            log_stop(producer.stop(grace).await);
        }
        self.universe = None;
        self.set_state(SessionState::Idle);
    }

    /// Spawn a producer with a fresh client and a fresh mailbox.
    fn spawn_producer(
        &mut self,
        topics: Vec<Topic>,
        phase: ProducerPhase,
    ) -> AppResult<ProducerHandle> {
        self.mailbox = Arc::new(LatestValueQueue::new());
        let handle = StreamingProducer::new(
            self.factory.create(),
            topics,
            Arc::clone(&self.mailbox),
            self.config.producer,
        )
        .spawn(phase)?;
        Ok(handle)
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            debug!(from = self.state.as_str(), to = state.as_str(), "Session state change");
            self.state = state;
        }
        Metrics::session_state_set(state.as_str());
    }
}

impl<F: FeedFactory> Drop for StreamingSession<F> {
    fn drop(&mut self) {
        if let Some(producer) = &self.producer {
            producer.cancel();
        }
    }
}

fn log_stop(outcome: StopOutcome) {
    match outcome {
        StopOutcome::Joined(exit) => debug!(exit = exit.as_str(), "Producer stopped"),
        StopOutcome::Abandoned => warn!("Producer abandoned"),
        StopOutcome::Panicked => error!("Producer panicked"),
    }
}
