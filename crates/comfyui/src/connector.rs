//! Bounded retry ladders for bringing up a ComfyUI session.
//!
//! ComfyUI is often still booting when a job arrives. The
//! [`BackendConnector`] first probes the HTTP base URL on a fast
//! ladder until the server answers, then opens the WebSocket session
//! on a slower ladder. Each ladder gives up after a fixed number of
//! attempts, and both respect a [`CancellationToken`].
//!
//! ```text
//! Unstarted -> Probing -> ProbeOk -> Connecting -> Connected
//!                 |                       |
//!                 +-------> Failed <------+
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::ComfyUIApi;
use crate::client::{ComfyUIClient, ComfyUISession};

/// Liveness attempts before giving up (one per second, about 3 minutes).
pub const DEFAULT_PROBE_ATTEMPTS: u32 = 180;
/// Delay between liveness attempts.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(1);
/// Per-attempt timeout for the liveness request.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
/// WebSocket handshake attempts before giving up (every 5s, about 3 minutes).
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 36;
/// Delay between handshake attempts.
pub const DEFAULT_CONNECT_INTERVAL: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Retry ladder
// ---------------------------------------------------------------------------

/// A fixed-interval retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryLadder {
    /// Maximum number of attempts (at least one is always made).
    pub attempts: u32,
    /// Sleep between a failed attempt and the next one.
    pub interval: Duration,
}

/// Value produced by a successful rung, with the attempt it succeeded on.
#[derive(Debug)]
pub struct LadderSuccess<T> {
    pub value: T,
    pub attempts: u32,
}

/// Why a ladder stopped without success.
#[derive(Debug)]
pub enum LadderError<E> {
    /// Every attempt failed; carries the last failure.
    Exhausted { attempts: u32, last_error: E },
    /// The cancellation token fired after `attempts` attempts.
    Cancelled { attempts: u32 },
}

impl RetryLadder {
    pub const fn new(attempts: u32, interval: Duration) -> Self {
        Self { attempts, interval }
    }

    /// Run `op` until it succeeds, the budget is spent, or `cancel` fires.
    ///
    /// No sleep follows the final failed attempt.
    pub async fn run<T, E, F, Fut>(
        &self,
        stage: &'static str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<LadderSuccess<T>, LadderError<E>>
    where
        E: Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(LadderError::Cancelled { attempts: attempt - 1 });
                }
                result = op(attempt) => result,
            };

            match result {
                Ok(value) => {
                    tracing::info!(stage, attempt, "{stage} succeeded");
                    return Ok(LadderSuccess {
                        value,
                        attempts: attempt,
                    });
                }
                Err(e) if attempt >= max_attempts => {
                    tracing::error!(stage, attempt, error = %e, "{stage} failed, giving up");
                    return Err(LadderError::Exhausted {
                        attempts: attempt,
                        last_error: e,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        stage,
                        error = %e,
                        "{stage} failed (attempt {attempt}/{max_attempts})",
                    );
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(LadderError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Backend connector
// ---------------------------------------------------------------------------

/// Tunable parameters for the two connection ladders.
#[derive(Debug, Clone, Copy)]
pub struct ConnectorConfig {
    /// HTTP liveness ladder.
    pub probe: RetryLadder,
    /// Timeout applied to each liveness request.
    pub probe_timeout: Duration,
    /// WebSocket handshake ladder.
    pub connect: RetryLadder,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            probe: RetryLadder::new(DEFAULT_PROBE_ATTEMPTS, DEFAULT_PROBE_INTERVAL),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            connect: RetryLadder::new(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_INTERVAL),
        }
    }
}

/// Lifecycle of one connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorState {
    Unstarted,
    Probing,
    ProbeOk,
    Connecting,
    Connected,
    Failed,
}

/// Brings a ComfyUI instance from "maybe booting" to a live session.
pub struct BackendConnector {
    api: ComfyUIApi,
    client: ComfyUIClient,
    config: ConnectorConfig,
    state: ConnectorState,
}

/// Errors raised when a ladder is exhausted or cancelled.
#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    /// The HTTP liveness ladder ran out.
    #[error("Cannot connect to ComfyUI server after {attempts} attempts: {last_error}")]
    BackendUnreachable { attempts: u32, last_error: String },

    /// The WebSocket handshake ladder ran out.
    #[error("WebSocket connection timeout after {attempts} attempts: {last_error}")]
    ConnectionTimeout { attempts: u32, last_error: String },

    /// The job was cancelled while connecting.
    #[error("Connection cancelled during {stage}")]
    Cancelled { stage: &'static str },
}

impl BackendConnector {
    pub fn new(api: ComfyUIApi, client: ComfyUIClient, config: ConnectorConfig) -> Self {
        Self {
            api,
            client,
            config,
            state: ConnectorState::Unstarted,
        }
    }

    pub fn state(&self) -> ConnectorState {
        self.state
    }

    /// Probe liveness, then open the session.
    pub async fn connect(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<ComfyUISession, ConnectorError> {
        self.probe_until_alive(cancel).await?;
        self.open_session(cancel).await
    }

    /// Run the liveness ladder against the HTTP base URL.
    pub async fn probe_until_alive(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<u32, ConnectorError> {
        self.transition(ConnectorState::Probing);
        tracing::info!(url = %self.api.api_url(), "Checking HTTP connection to ComfyUI");

        let api = &self.api;
        let timeout = self.config.probe_timeout;
        let result = self
            .config
            .probe
            .run("HTTP liveness probe", cancel, |_| api.probe(timeout))
            .await;

        match result {
            Ok(success) => {
                tracing::debug!(status = success.value, "ComfyUI answered liveness probe");
                self.transition(ConnectorState::ProbeOk);
                Ok(success.attempts)
            }
            Err(LadderError::Exhausted {
                attempts,
                last_error,
            }) => {
                self.transition(ConnectorState::Failed);
                Err(ConnectorError::BackendUnreachable {
                    attempts,
                    last_error: last_error.to_string(),
                })
            }
            Err(LadderError::Cancelled { .. }) => {
                self.transition(ConnectorState::Failed);
                Err(ConnectorError::Cancelled { stage: "probe" })
            }
        }
    }

    /// Run the WebSocket handshake ladder.
    pub async fn open_session(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<ComfyUISession, ConnectorError> {
        self.transition(ConnectorState::Connecting);
        tracing::info!(url = %self.client.session_url(), "Connecting to WebSocket");

        let client = &self.client;
        let result = self
            .config
            .connect
            .run("WebSocket handshake", cancel, |_| client.connect())
            .await;

        match result {
            Ok(success) => {
                self.transition(ConnectorState::Connected);
                Ok(success.value)
            }
            Err(LadderError::Exhausted {
                attempts,
                last_error,
            }) => {
                self.transition(ConnectorState::Failed);
                Err(ConnectorError::ConnectionTimeout {
                    attempts,
                    last_error: last_error.to_string(),
                })
            }
            Err(LadderError::Cancelled { .. }) => {
                self.transition(ConnectorState::Failed);
                Err(ConnectorError::Cancelled { stage: "handshake" })
            }
        }
    }

    fn transition(&mut self, next: ConnectorState) {
        tracing::debug!(from = ?self.state, to = ?next, "Connector state change");
        self.state = next;
    }
}
