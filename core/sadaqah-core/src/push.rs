//! Always-reconnecting live-update channel.
//!
//! One driver task owns the socket. Every transition goes through
//! [`ConnectionState`]'s handlers, and the only place a reconnect is scheduled
//! is the decision returned by [`ConnectionState::on_close`] (or
//! [`ConnectionState::on_rejected`] for URLs that cannot even be attempted).
//!
//! ```text
//!             start(url)
//!                 │
//!                 ▼
//!   ┌──────▶ Connecting ──open──▶ Connected
//!   │             │                   │
//!   │     fail / timeout      error / remote close
//!   │             ▼                   │
//!   └─ sleep ◀ Disconnected ◀─────────┘
//!  (backoff)      │
//!                 └── stopped or retries exhausted → driver exits
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use sadaqah_protocol::{parse_live_event, LiveEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use url::Url;

use crate::backoff::BackoffPolicy;
use crate::error::{LiveError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionState {
    pub phase: Phase,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            phase: Phase::Disconnected,
            retry_count: 0,
            last_error: None,
        }
    }
}

/// What the driver does after the connection went away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry(Duration),
    Exhausted,
    Stopped,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.phase == Phase::Connected
    }

    pub fn on_connecting(&mut self) {
        self.phase = Phase::Connecting;
    }

    /// The only place `retry_count` goes back to zero.
    pub fn on_open(&mut self) {
        self.phase = Phase::Connected;
        self.retry_count = 0;
        self.last_error = None;
    }

    pub fn on_close(
        &mut self,
        reason: &CloseReason,
        stopped: bool,
        policy: &BackoffPolicy,
    ) -> RetryDecision {
        self.phase = Phase::Disconnected;
        if let Some(message) = reason.error_message() {
            self.last_error = Some(message);
        }
        if stopped {
            return RetryDecision::Stopped;
        }
        if policy.exhausted(self.retry_count) {
            return RetryDecision::Exhausted;
        }
        let delay = policy.delay_for(self.retry_count);
        self.retry_count += 1;
        RetryDecision::Retry(delay)
    }

    /// The attempt could not be made at all (malformed URL). Counts as an
    /// immediate close that leaves `retry_count` untouched and retries after
    /// the base delay.
    pub fn on_rejected(
        &mut self,
        reason: &CloseReason,
        stopped: bool,
        policy: &BackoffPolicy,
    ) -> RetryDecision {
        self.phase = Phase::Disconnected;
        self.last_error = reason.error_message();
        if stopped {
            return RetryDecision::Stopped;
        }
        RetryDecision::Retry(policy.base_delay())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    InvalidUrl(String),
    ConnectFailed(String),
    Error(String),
    Remote,
    Stopped,
}

impl CloseReason {
    fn error_message(&self) -> Option<String> {
        match self {
            CloseReason::InvalidUrl(message)
            | CloseReason::ConnectFailed(message)
            | CloseReason::Error(message) => Some(message.clone()),
            CloseReason::Remote | CloseReason::Stopped => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Open,
    Message(LiveEvent),
    Closed(CloseReason),
}

// ═══════════════════════════════════════════════════════════════════════════════
// Transport
// ═══════════════════════════════════════════════════════════════════════════════

/// Inbound text frames; the stream ends when the peer closes.
pub type FrameStream = BoxStream<'static, Result<String>>;

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<FrameStream>;
}

/// tokio-tungstenite transport.
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<FrameStream> {
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| LiveError::Connect(err.to_string()))?;

        let frames = stream.filter_map(|message| {
            let frame = match message {
                Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                Ok(Message::Binary(bytes)) => Some(Ok(String::from_utf8_lossy(&bytes).into_owned())),
                Ok(_) => None,
                Err(err) => Some(Err(LiveError::Connect(err.to_string()))),
            };
            futures::future::ready(frame)
        });
        Ok(frames.boxed())
    }
}

fn parse_ws_url(raw: &str) -> std::result::Result<Url, String> {
    let url = Url::parse(raw).map_err(|err| format!("{}: {}", raw, err))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(format!("{}: unsupported scheme {}", raw, other)),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Channel
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy)]
pub struct PushOptions {
    pub backoff: BackoffPolicy,
    pub connect_timeout: Duration,
}

impl Default for PushOptions {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            connect_timeout: Duration::from_secs(12),
        }
    }
}

struct Driver {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Handle to the live channel. Dropping it stops the driver and closes the
/// socket.
pub struct PushChannel {
    connector: Arc<dyn Connector>,
    options: PushOptions,
    events: mpsc::UnboundedSender<ChannelEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
    driver: Option<Driver>,
}

impl PushChannel {
    pub fn new(
        connector: Arc<dyn Connector>,
        options: PushOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(ConnectionState::default());
        let channel = Self {
            connector,
            options,
            events,
            state: Arc::new(state),
            driver: None,
        };
        (channel, events_rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Starts (or restarts) the driver. A fresh start resets the retry
    /// budget. Must be called from within a tokio runtime.
    pub fn start(&mut self, url: &str) {
        self.halt();
        self.state.send_modify(|state| {
            state.retry_count = 0;
            state.last_error = None;
        });

        let (stop, stop_rx) = watch::channel(false);
        let ctx = DriverContext {
            connector: Arc::clone(&self.connector),
            options: self.options,
            events: self.events.clone(),
            state: Arc::clone(&self.state),
        };
        let task = tokio::spawn(ctx.run(url.to_string(), stop_rx));
        info!(url, "Live channel started");
        self.driver = Some(Driver { stop, task });
    }

    /// Idempotent: cancels a pending retry, closes the live socket and
    /// prevents any further reconnect until the next [`start`](Self::start).
    /// A driver that already gave up reconnecting is released quietly.
    pub fn stop(&mut self) {
        let running = self.is_running();
        if self.halt() && running {
            self.state.send_modify(|state| state.phase = Phase::Disconnected);
            let _ = self.events.send(ChannelEvent::Closed(CloseReason::Stopped));
            info!("Live channel stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.driver
            .as_ref()
            .map(|driver| !driver.task.is_finished())
            .unwrap_or(false)
    }

    fn halt(&mut self) -> bool {
        match self.driver.take() {
            Some(driver) => {
                let _ = driver.stop.send(true);
                driver.task.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        self.halt();
    }
}

struct DriverContext {
    connector: Arc<dyn Connector>,
    options: PushOptions,
    events: mpsc::UnboundedSender<ChannelEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
}

enum Attempt {
    Rejected(CloseReason),
    Closed(CloseReason),
}

impl DriverContext {
    async fn run(self, url: String, mut stop: watch::Receiver<bool>) {
        loop {
            if *stop.borrow() {
                break;
            }

            let attempt = self.attempt(&url, &mut stop).await;
            let stopped = *stop.borrow();
            let (reason, decision) = match attempt {
                Attempt::Rejected(reason) => {
                    let decision = self.transition(|state| {
                        state.on_rejected(&reason, stopped, &self.options.backoff)
                    });
                    (reason, decision)
                }
                Attempt::Closed(reason) => {
                    let decision = self.transition(|state| {
                        state.on_close(&reason, stopped, &self.options.backoff)
                    });
                    (reason, decision)
                }
            };
            let _ = self.events.send(ChannelEvent::Closed(reason.clone()));

            match decision {
                RetryDecision::Retry(delay) => {
                    debug!(?reason, delay_ms = delay.as_millis() as u64, "Live channel reconnect scheduled");
                    tokio::select! {
                        biased;
                        _ = wait_for_stop(&mut stop) => break,
                        _ = sleep(delay) => {}
                    }
                }
                RetryDecision::Exhausted => {
                    warn!(
                        retries = self.options.backoff.max_retries,
                        ?reason,
                        "Live channel giving up until restarted"
                    );
                    break;
                }
                RetryDecision::Stopped => break,
            }
        }
    }

    async fn attempt(&self, url: &str, stop: &mut watch::Receiver<bool>) -> Attempt {
        let parsed = match parse_ws_url(url) {
            Ok(parsed) => parsed,
            Err(message) => return Attempt::Rejected(CloseReason::InvalidUrl(message)),
        };

        self.transition(|state| state.on_connecting());
        let connected = tokio::select! {
            biased;
            _ = wait_for_stop(stop) => None,
            result = timeout(self.options.connect_timeout, self.connector.connect(&parsed)) => Some(result),
        };

        let stream = match connected {
            None => return Attempt::Closed(CloseReason::Stopped),
            Some(Err(_)) => {
                return Attempt::Closed(CloseReason::ConnectFailed(
                    "connect timed out".to_string(),
                ))
            }
            Some(Ok(Err(err))) => return Attempt::Closed(CloseReason::ConnectFailed(err.to_string())),
            Some(Ok(Ok(stream))) => stream,
        };

        if *stop.borrow() {
            return Attempt::Closed(CloseReason::Stopped);
        }
        self.transition(|state| state.on_open());
        let _ = self.events.send(ChannelEvent::Open);
        info!(url, "Live channel connected");

        Attempt::Closed(self.pump(stream, stop).await)
    }

    /// Forwards decoded frames until the socket ends. The stream is dropped
    /// (closing the socket) on every return path.
    async fn pump(&self, mut stream: FrameStream, stop: &mut watch::Receiver<bool>) -> CloseReason {
        loop {
            let next = tokio::select! {
                biased;
                _ = wait_for_stop(stop) => return CloseReason::Stopped,
                frame = stream.next() => frame,
            };

            match next {
                None => return CloseReason::Remote,
                // An error is not actionable on its own; it always ends in a close.
                Some(Err(err)) => return CloseReason::Error(err.to_string()),
                Some(Ok(raw)) => match parse_live_event(&raw) {
                    Ok(event) => {
                        debug!(event_type = %event.event_type, "Live event received");
                        let _ = self.events.send(ChannelEvent::Message(event));
                    }
                    Err(info) => {
                        debug!(code = %info.code, message = %info.message, "Dropping malformed live frame");
                    }
                },
            }
        }
    }

    fn transition<R>(&self, apply: impl FnOnce(&mut ConnectionState) -> R) -> R {
        let mut state = self.state.borrow().clone();
        let output = apply(&mut state);
        self.state.send_replace(state);
        output
    }
}

/// Resolves once a stop is requested or the owning channel is gone.
async fn wait_for_stop(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stopped| *stopped).await;
}
