use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::config::{CONNECT_TIMEOUT, MAX_RECONNECT_ATTEMPTS, NORMAL_CLOSE_CODE, RECONNECT_DELAY};
use crate::error::TrackerError;
use crate::model::LocationBatch;
use crate::sinks::{StatusLevel, StatusSink};
use crate::transport::{Dialer, WireCommand, WireEvent};

/// Connection lifecycle state, owned exclusively by the channel manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// What to do after a close event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Abnormal close within the attempt budget: retry after `delay`.
    Retry { attempt: u32, delay: Duration },
    /// Attempt budget exhausted; terminal until a new session starts.
    GiveUp,
    /// Normal closure or inactive session; never reconnect.
    NormalClose,
}

/// Counts consecutive failed reconnects against a fixed ceiling. The
/// counter resets on every successful open, so the ceiling bounds
/// consecutive failures, not lifetime attempts.
#[derive(Debug)]
pub struct ReconnectPolicy {
    attempts: u32,
    max_attempts: u32,
    delay: Duration,
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        ReconnectPolicy {
            attempts: 0,
            max_attempts: MAX_RECONNECT_ATTEMPTS,
            delay: RECONNECT_DELAY,
        }
    }

    pub fn on_close(&mut self, code: u16, session_active: bool) -> ReconnectDecision {
        if code == NORMAL_CLOSE_CODE || !session_active {
            return ReconnectDecision::NormalClose;
        }
        if self.attempts >= self.max_attempts {
            return ReconnectDecision::GiveUp;
        }
        self.attempts += 1;
        ReconnectDecision::Retry {
            attempt: self.attempts,
            delay: self.delay,
        }
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Owns the duplex connection lifecycle: connect with timeout, batch
/// sending, and the reconnect budget. Close events arrive through the
/// event sender handed to `new` and are fed back in by the session loop.
pub struct ChannelManager {
    dialer: Arc<dyn Dialer>,
    url: String,
    status: Arc<dyn StatusSink>,
    event_tx: mpsc::Sender<WireEvent>,
    state: ChannelState,
    policy: ReconnectPolicy,
    outbound: Option<mpsc::Sender<WireCommand>>,
}

impl ChannelManager {
    pub fn new(
        dialer: Arc<dyn Dialer>,
        url: String,
        status: Arc<dyn StatusSink>,
        event_tx: mpsc::Sender<WireEvent>,
    ) -> Self {
        ChannelManager {
            dialer,
            url,
            status,
            event_tx,
            state: ChannelState::Disconnected,
            policy: ReconnectPolicy::new(),
            outbound: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == ChannelState::Connected
    }

    /// Open the duplex connection. Two outcomes race: the open event, which
    /// resets the reconnect counter, or the timeout/error, which surfaces
    /// the failure and leaves the channel disconnected.
    pub async fn connect(&mut self) -> Result<(), TrackerError> {
        self.state = ChannelState::Connecting;
        self.status
            .status(StatusLevel::Info, "Connecting to server...");

        match timeout(CONNECT_TIMEOUT, self.dialer.dial(&self.url)).await {
            Ok(Ok(conn)) => {
                self.outbound = Some(conn.outbound);
                let forward = self.event_tx.clone();
                let mut events = conn.events;
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        if forward.send(event).await.is_err() {
                            break;
                        }
                    }
                });

                self.policy.reset();
                self.state = ChannelState::Connected;
                self.status.status(StatusLevel::Info, "Connected");
                Ok(())
            }
            Ok(Err(e)) => {
                self.state = ChannelState::Disconnected;
                self.outbound = None;
                self.status
                    .status(StatusLevel::Error, &format!("Connection error: {}", e));
                Err(TrackerError::Transport(e.to_string()))
            }
            Err(_) => {
                self.state = ChannelState::Disconnected;
                self.outbound = None;
                self.status
                    .status(StatusLevel::Error, "Connection timeout");
                Err(TrackerError::ConnectTimeout)
            }
        }
    }

    /// Transmit one batch as a single text frame.
    pub async fn send_batch(&mut self, batch: &LocationBatch) -> Result<(), TrackerError> {
        let outbound = match (&self.state, &self.outbound) {
            (ChannelState::Connected, Some(tx)) => tx.clone(),
            _ => return Err(TrackerError::ChannelNotOpen),
        };

        let payload = serde_json::to_string(batch)
            .map_err(|e| TrackerError::Transport(e.to_string()))?;
        log::debug!(
            "sending batch of {} points for session {}",
            batch.locations.len(),
            batch.session_id
        );
        if outbound.send(WireCommand::Send(payload)).await.is_err() {
            self.state = ChannelState::Disconnected;
            return Err(TrackerError::ChannelNotOpen);
        }
        Ok(())
    }

    /// Explicit local stop: close with the normal code. Never triggers
    /// reconnection.
    pub async fn close(&mut self) {
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(WireCommand::Close).await;
        }
        self.state = ChannelState::Closed;
    }

    /// Feed a close event through the reconnect budget. The caller acts on
    /// the decision (schedules the retry timer or surfaces the terminal
    /// notice).
    pub fn on_closed(&mut self, code: u16, session_active: bool) -> ReconnectDecision {
        self.outbound = None;
        let decision = self.policy.on_close(code, session_active);
        self.state = match decision {
            ReconnectDecision::Retry { .. } => ChannelState::Reconnecting,
            ReconnectDecision::GiveUp => ChannelState::Closed,
            ReconnectDecision::NormalClose => ChannelState::Closed,
        };
        decision
    }

    pub fn attempts(&self) -> u32 {
        self.policy.attempts()
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts()
    }
}
