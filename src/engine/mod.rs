// Decision loop: snapshot → enrich → classify → manage the position
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;

use crate::api::PrecisionProvider;
use crate::error::{BotError, BotResult};
use crate::execution::{
    AccountProvider, CandleBuffer, OrderConfirmation, OrderExecutor, OrderIntent, OrderRequest,
    PositionManager,
};
use crate::feed::supervisor::shutdown_requested;
use crate::feed::BufferUpdate;
use crate::indicators::{EnrichedSeries, IndicatorPipeline};
use crate::models::{Signal, Timeframe, TimeframeSet};
use crate::settings::{EngineConfig, InstrumentConfig, TriggerMode};
use crate::strategy::{Decision, SignalClassifier};

/// Everything a decision cycle reads or mutates
pub struct EngineContext {
    pub buffer: CandleBuffer,
    pub timeframes: TimeframeSet,
    pub instrument: InstrumentConfig,
    pub pipeline: IndicatorPipeline,
    pub classifier: SignalClassifier,
    pub position: Arc<Mutex<PositionManager>>,
    pub executor: Arc<dyn OrderExecutor>,
    pub account: Arc<dyn AccountProvider>,
    pub precision: Arc<dyn PrecisionProvider>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleAction {
    /// Nothing to do for this decision
    None,
    /// Order confirmed and the position transition committed
    Submitted {
        intent: OrderIntent,
        confirmation: OrderConfirmation,
    },
    /// BUY could not be sized; treated as HOLD
    EntrySkipped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub decision: Decision,
    pub action: CycleAction,
}

pub struct DecisionLoop {
    ctx: EngineContext,
    config: EngineConfig,
}

impl DecisionLoop {
    pub fn new(ctx: EngineContext, config: EngineConfig) -> Self {
        Self { ctx, config }
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Enriched copy of one timeframe, or `InsufficientHistory`
    fn enriched(&self, timeframe: Timeframe) -> BotResult<EnrichedSeries> {
        let need = self
            .config
            .required_history
            .max(self.ctx.pipeline.config().max_window());
        let candles = self.ctx.buffer.snapshot(timeframe)?;
        if candles.len() < need {
            return Err(BotError::InsufficientHistory {
                timeframe,
                have: candles.len(),
                need,
            });
        }
        self.ctx.pipeline.enrich(&candles)
    }

    /// One full decision
    ///
    /// The position lock is held from planning until the transition is
    /// committed, so cycles never interleave. A failed submission leaves the
    /// position untouched; a failed exit is retried on the next cycle.
    pub async fn run_cycle(&self) -> BotResult<CycleReport> {
        let ctx = &self.ctx;
        let short = self.enriched(ctx.timeframes.short)?;
        let long = self.enriched(ctx.timeframes.long)?;
        let confirm = self.enriched(ctx.timeframes.confirm)?;

        let decision = ctx.classifier.classify(&short, &long, &confirm)?;

        let mut position = ctx.position.lock().await;

        if position.is_long() {
            let Some(intent) = position.check_exit(decision.price, decision.signal) else {
                return Ok(CycleReport {
                    decision,
                    action: CycleAction::None,
                });
            };
            let confirmation = self.submit(&intent).await?;
            position.apply(&intent, &confirmation)?;
            return Ok(CycleReport {
                decision,
                action: CycleAction::Submitted {
                    intent,
                    confirmation,
                },
            });
        }

        if decision.signal != Signal::Buy {
            return Ok(CycleReport {
                decision,
                action: CycleAction::None,
            });
        }

        let atr = short.last().and_then(|row| row.atr).unwrap_or(0.0);
        let balance = ctx.account.get_balance().await?;
        let precision = ctx
            .precision
            .get_precision(&ctx.instrument.rest_pair)
            .await?;

        let intent = match position.plan_entry(decision.price, atr, balance, &precision) {
            Ok(intent) => intent,
            Err(BotError::InvalidSizing(reason)) => {
                tracing::warn!(
                    rule = decision.rule.unwrap_or("-"),
                    price = decision.price,
                    atr,
                    balance,
                    %reason,
                    "BUY skipped, cannot size entry"
                );
                return Ok(CycleReport {
                    decision,
                    action: CycleAction::EntrySkipped(reason),
                });
            }
            Err(e) => return Err(e),
        };

        let confirmation = self.submit(&intent).await?;
        position.apply(&intent, &confirmation)?;
        Ok(CycleReport {
            decision,
            action: CycleAction::Submitted {
                intent,
                confirmation,
            },
        })
    }

    async fn submit(&self, intent: &OrderIntent) -> BotResult<OrderConfirmation> {
        let request = OrderRequest::from_intent(&self.ctx.instrument.ws_pair, intent);
        self.ctx.executor.submit(&request).await.map_err(|e| {
            tracing::warn!(
                side = %intent.side,
                quantity = intent.quantity,
                price = intent.reference_price,
                error = %e,
                "Order submission failed, position unchanged"
            );
            e
        })
    }

    /// Run a cycle and decide whether the error (if any) is fatal
    async fn cycle_and_log(&self) -> BotResult<()> {
        match self.run_cycle().await {
            Ok(report) => {
                let CycleReport { decision, action } = report;
                match action {
                    CycleAction::Submitted { intent, confirmation } => tracing::info!(
                        signal = %decision.signal,
                        rule = decision.rule.unwrap_or("-"),
                        side = %intent.side,
                        quantity = confirmation.quantity,
                        price = confirmation.price,
                        simulated = confirmation.simulated,
                        "Order confirmed"
                    ),
                    _ => tracing::info!(
                        signal = %decision.signal,
                        rule = decision.rule.unwrap_or("-"),
                        price = decision.price,
                        "Decision"
                    ),
                }
                Ok(())
            }
            Err(e @ BotError::InsufficientHistory { .. }) => {
                tracing::info!(reason = %e, "Skipping decision cycle");
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!(error = %e, "Decision cycle failed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Fatal error in decision cycle");
                Err(e)
            }
        }
    }

    /// Run one cycle while still draining `updates`
    ///
    /// Returns whether a short-timeframe close arrived during the cycle.
    /// `channel_open` is cleared once the sender side is gone.
    async fn cycle_draining(
        &self,
        updates: &mut mpsc::Receiver<BufferUpdate>,
        channel_open: &mut bool,
    ) -> BotResult<bool> {
        let short = self.ctx.timeframes.short;
        let mut closed_meanwhile = false;
        let cycle = self.cycle_and_log();
        tokio::pin!(cycle);

        loop {
            tokio::select! {
                result = &mut cycle => {
                    result?;
                    return Ok(closed_meanwhile);
                }
                update = updates.recv(), if *channel_open => match update {
                    Some(update) => closed_meanwhile |= update.closed && update.timeframe == short,
                    None => *channel_open = false,
                },
            }
        }
    }

    /// Drive cycles until shutdown or until the update channel closes
    ///
    /// An in-flight cycle always runs to completion; no new cycle starts once
    /// shutdown is signalled.
    pub async fn run(
        &self,
        mut updates: mpsc::Receiver<BufferUpdate>,
        mut shutdown: watch::Receiver<bool>,
    ) -> BotResult<()> {
        let short = self.ctx.timeframes.short;
        let mut channel_open = true;
        tracing::info!(trigger = ?self.config.trigger, "Decision loop started");

        match self.config.trigger {
            TriggerMode::OnClose => {
                let mut pending = false;
                while channel_open || pending {
                    if *shutdown.borrow() {
                        break;
                    }
                    if pending {
                        pending = self.cycle_draining(&mut updates, &mut channel_open).await?;
                        continue;
                    }
                    tokio::select! {
                        _ = shutdown_requested(&mut shutdown) => break,
                        update = updates.recv() => match update {
                            Some(update) if update.closed && update.timeframe == short => {
                                tracing::debug!(timeframe = %update.timeframe, open_time = %update.open_time, "Bar closed");
                                pending = true;
                            }
                            Some(_) => {}
                            None => channel_open = false,
                        },
                    }
                }
            }
            TriggerMode::Interval => {
                let mut ticker =
                    tokio::time::interval(Duration::from_secs(self.config.interval_secs));
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                while channel_open {
                    tokio::select! {
                        _ = shutdown_requested(&mut shutdown) => break,
                        _ = ticker.tick() => {
                            self.cycle_draining(&mut updates, &mut channel_open).await?;
                        }
                        // Updates only matter as a liveness signal here
                        update = updates.recv() => if update.is_none() { break },
                    }
                }
            }
        }

        tracing::info!("Decision loop stopped");
        Ok(())
    }
}
