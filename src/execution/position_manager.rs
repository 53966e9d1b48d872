use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BotError, BotResult};
use crate::execution::executor::{IntentKind, OrderConfirmation, OrderIntent};
use crate::models::Signal;
use crate::risk::{
    calculate_quantity, stop_loss_price, take_profit_price, InstrumentPrecision, RiskConfig,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Flat,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    StrategySell, // Classifier returned SELL
}

#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub state: PositionState,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub size: f64,
    pub opened_at: Option<DateTime<Utc>>,
}

impl Position {
    pub fn flat() -> Self {
        Self {
            state: PositionState::Flat,
            entry_price: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
            size: 0.0,
            opened_at: None,
        }
    }

    pub fn is_long(&self) -> bool {
        self.state == PositionState::Long
    }
}

/// Single-position lifecycle: FLAT → LONG on an accepted entry, back to FLAT on exit
///
/// Planning never mutates state; a transition only happens in `apply`, after
/// the execution collaborator confirmed the order.
pub struct PositionManager {
    position: Position,
    risk: RiskConfig,
    total_pnl: f64, // Realized P&L across round trips
    round_trips: u32,
}

impl PositionManager {
    pub fn new(risk: RiskConfig) -> Self {
        Self {
            position: Position::flat(),
            risk,
            total_pnl: 0.0,
            round_trips: 0,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn is_long(&self) -> bool {
        self.position.is_long()
    }

    pub fn total_pnl(&self) -> f64 {
        self.total_pnl
    }

    pub fn round_trips(&self) -> u32 {
        self.round_trips
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    /// Build the entry order for a BUY while flat
    ///
    /// Fails with `InvalidSizing` when the stop is not below entry or the
    /// account cannot afford the exchange minimum at this risk level.
    pub fn plan_entry(
        &self,
        entry_price: f64,
        atr: f64,
        balance: f64,
        precision: &InstrumentPrecision,
    ) -> BotResult<OrderIntent> {
        if self.is_long() {
            return Err(BotError::InvalidTransition(
                "entry requested while already LONG".to_string(),
            ));
        }

        let stop_loss = stop_loss_price(entry_price, atr, self.risk.atr_multiplier);
        if entry_price <= stop_loss {
            return Err(BotError::InvalidSizing(format!(
                "stop {:.4} not below entry {:.4} (atr {:.4})",
                stop_loss, entry_price, atr
            )));
        }
        let take_profit = take_profit_price(entry_price, stop_loss, self.risk.risk_reward_ratio);

        let quantity = calculate_quantity(
            balance,
            self.risk.risk_per_trade_pct,
            entry_price,
            stop_loss,
            precision,
        );
        if quantity <= 0.0 {
            return Err(BotError::InvalidSizing(format!(
                "quantity rounds below minimum {} (balance {:.2}, risk/unit {:.4})",
                precision.min_quantity,
                balance,
                entry_price - stop_loss
            )));
        }

        Ok(OrderIntent::entry(quantity, entry_price, stop_loss, take_profit))
    }

    /// Exit order for a LONG position, if any exit condition holds
    ///
    /// Stop-loss is checked first, then take-profit, then a SELL signal.
    /// Always `None` while flat.
    pub fn check_exit(&self, last_price: f64, signal: Signal) -> Option<OrderIntent> {
        if !self.is_long() {
            return None;
        }

        let reason = if last_price <= self.position.stop_loss {
            ExitReason::StopLoss
        } else if last_price >= self.position.take_profit {
            ExitReason::TakeProfit
        } else if signal == Signal::Sell {
            ExitReason::StrategySell
        } else {
            return None;
        };

        Some(OrderIntent::exit(self.position.size, last_price, reason))
    }

    /// Commit a confirmed intent
    pub fn apply(
        &mut self,
        intent: &OrderIntent,
        confirmation: &OrderConfirmation,
    ) -> BotResult<()> {
        match (&intent.kind, self.position.state) {
            (IntentKind::Entry { stop_loss, take_profit }, PositionState::Flat) => {
                self.position = Position {
                    state: PositionState::Long,
                    entry_price: confirmation.price,
                    stop_loss: *stop_loss,
                    take_profit: *take_profit,
                    size: confirmation.quantity,
                    opened_at: Some(confirmation.timestamp),
                };

                tracing::info!(
                    entry = confirmation.price,
                    size = confirmation.quantity,
                    stop_loss = *stop_loss,
                    take_profit = *take_profit,
                    "Opened LONG position"
                );
                Ok(())
            }
            (IntentKind::Exit { reason }, PositionState::Long) => {
                let pnl = (confirmation.price - self.position.entry_price) * self.position.size;
                self.total_pnl += pnl;
                self.round_trips += 1;

                tracing::info!(
                    reason = ?reason,
                    entry = self.position.entry_price,
                    exit = confirmation.price,
                    pnl = pnl,
                    total_pnl = self.total_pnl,
                    "Closed position"
                );

                self.position = Position::flat();
                Ok(())
            }
            (kind, state) => Err(BotError::InvalidTransition(format!(
                "cannot apply {:?} while {:?}",
                kind, state
            ))),
        }
    }
}
