use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

use crate::error::{BotError, BotResult};
use crate::execution::{CandleBuffer, IngestOutcome};
use crate::models::{CandleEvent, Timeframe, TimeframeSet};

/// Exchange-side candle stream
///
/// The supervisor owns the connection lifecycle; implementations only move
/// bytes and translate them.
#[async_trait]
pub trait MarketStream: Send {
    async fn connect(&mut self) -> BotResult<()>;

    async fn subscribe(&mut self, timeframe: Timeframe) -> BotResult<()>;

    /// Next raw message; `None` once the peer closed the connection
    async fn next_message(&mut self) -> Option<BotResult<String>>;

    /// `Ok(None)` for control traffic (heartbeats, status, acks)
    fn decode(&self, raw: &str) -> BotResult<Option<CandleEvent>>;

    async fn close(&mut self) -> BotResult<()>;
}

/// Reconnect policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl StreamConfig {
    /// Linear backoff capped at `max_delay_ms`
    pub fn reconnect_delay(&self, retry: u32) -> Duration {
        let delay = self.base_delay_ms.saturating_mul(retry as u64);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }

    pub fn validate(&self) -> BotResult<()> {
        if self.base_delay_ms == 0 || self.max_delay_ms < self.base_delay_ms {
            return Err(BotError::Config(format!(
                "stream: need 0 < base_delay_ms ({}) <= max_delay_ms ({})",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Disconnected,
    Connecting,
    Subscribed,
    Failed,
}

/// Notification that a buffer changed
#[derive(Debug, Clone, PartialEq)]
pub struct BufferUpdate {
    pub timeframe: Timeframe,
    pub open_time: DateTime<Utc>,
    pub outcome: IngestOutcome,
    /// A bar on this timeframe was finalized by this update
    pub closed: bool,
}

/// Keeps one stream connected and subscribed, feeding the candle buffer
pub struct StreamSupervisor {
    config: StreamConfig,
    timeframes: TimeframeSet,
    state: watch::Sender<SupervisorState>,
}

impl StreamSupervisor {
    pub fn new(config: StreamConfig, timeframes: TimeframeSet) -> Self {
        let (state, _) = watch::channel(SupervisorState::Disconnected);
        Self {
            config,
            timeframes,
            state,
        }
    }

    pub fn state(&self) -> SupervisorState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    fn set_state(&self, next: SupervisorState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::info!(from = ?prev, to = ?next, "Stream state changed");
        }
    }

    /// Drive the stream until shutdown or until reconnects are exhausted
    ///
    /// Returns `Ok` on shutdown (or when nobody listens for updates anymore)
    /// and `FatalConnectionFailure` once `max_retries` consecutive reconnects
    /// have failed. Updates are offered with `try_send`, so a full channel
    /// drops the notification instead of stalling ingestion.
    pub async fn run<S: MarketStream>(
        &self,
        stream: &mut S,
        buffer: &CandleBuffer,
        updates: &mpsc::Sender<BufferUpdate>,
        mut shutdown: watch::Receiver<bool>,
    ) -> BotResult<()> {
        let mut retry: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }
            self.set_state(SupervisorState::Connecting);

            let ended = tokio::select! {
                ended = self.session(stream, buffer, updates, &mut retry) => ended,
                _ = shutdown_requested(&mut shutdown) => break,
            };

            if let Err(e) = stream.close().await {
                tracing::debug!(error = %e, "Error closing stream");
            }

            match ended {
                // Update consumer is gone
                Ok(()) => {
                    self.set_state(SupervisorState::Disconnected);
                    return Ok(());
                }
                Err(e) if !e.is_recoverable() => {
                    self.set_state(SupervisorState::Failed);
                    return Err(e);
                }
                Err(e) => {
                    self.set_state(SupervisorState::Disconnected);
                    retry += 1;
                    if retry > self.config.max_retries {
                        tracing::error!(error = %e, retries = self.config.max_retries, "Giving up on stream");
                        self.set_state(SupervisorState::Failed);
                        return Err(BotError::FatalConnectionFailure {
                            attempts: self.config.max_retries,
                        });
                    }

                    let delay = self.config.reconnect_delay(retry);
                    tracing::warn!(
                        error = %e,
                        retry,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Stream dropped, reconnecting"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown_requested(&mut shutdown) => break,
                    }
                }
            }
        }

        if let Err(e) = stream.close().await {
            tracing::debug!(error = %e, "Error closing stream");
        }
        self.set_state(SupervisorState::Disconnected);
        tracing::info!("Stream supervisor stopped");
        Ok(())
    }

    /// One connection: handshake, subscribe, pump messages until it breaks
    async fn session<S: MarketStream>(
        &self,
        stream: &mut S,
        buffer: &CandleBuffer,
        updates: &mpsc::Sender<BufferUpdate>,
        retry: &mut u32,
    ) -> BotResult<()> {
        stream.connect().await?;
        for timeframe in self.timeframes.all() {
            stream.subscribe(timeframe).await?;
        }
        self.set_state(SupervisorState::Subscribed);
        *retry = 0;

        loop {
            let raw = match stream.next_message().await {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => return Err(e),
                None => {
                    return Err(BotError::ConnectionLost(
                        "stream closed by peer".to_string(),
                    ))
                }
            };

            match self.absorb(stream, buffer, &raw) {
                // Never wait on the decision side; the buffer already holds the data
                Ok(Some(update)) => match updates.try_send(update) {
                    Ok(()) => {}
                    Err(TrySendError::Full(update)) if update.closed => {
                        tracing::warn!(
                            timeframe = %update.timeframe,
                            open_time = %update.open_time,
                            "Decision loop lagging, close notification dropped"
                        );
                    }
                    Err(TrySendError::Full(_)) => {
                        tracing::trace!("Decision loop lagging, update dropped");
                    }
                    Err(TrySendError::Closed(_)) => {
                        tracing::info!("Update receiver dropped, stopping stream");
                        return Ok(());
                    }
                },
                Ok(None) => {}
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(error = %e, raw = %prefix(&raw), "Dropping stream message");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Decode one raw message and route it into the buffer
    fn absorb<S: MarketStream>(
        &self,
        stream: &S,
        buffer: &CandleBuffer,
        raw: &str,
    ) -> BotResult<Option<BufferUpdate>> {
        let Some(event) = stream.decode(raw)? else {
            tracing::trace!(raw = %prefix(raw), "Control message");
            return Ok(None);
        };
        event
            .candle
            .validate()
            .map_err(BotError::MalformedStreamMessage)?;

        let CandleEvent {
            timeframe,
            candle,
            is_closed,
        } = event;
        let open_time = candle.open_time;
        let outcome = buffer.ingest(timeframe, candle, is_closed)?;

        let closed = match outcome {
            IngestOutcome::Ignored(reason) => {
                tracing::debug!(%timeframe, %open_time, ?reason, "Update ignored");
                return Ok(None);
            }
            IngestOutcome::Replaced { closed } => closed,
            // The previous bar is committed once a newer one opens
            IngestOutcome::Appended { evicted } => {
                is_closed || evicted || buffer.candle_count(timeframe)? > 1
            }
        };

        Ok(Some(BufferUpdate {
            timeframe,
            open_time,
            outcome,
            closed,
        }))
    }
}

/// Resolves once shutdown is signalled; a dropped sender never signals
pub(crate) async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn prefix(raw: &str) -> &str {
    match raw.char_indices().nth(120) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}
