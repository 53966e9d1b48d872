use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{BotError, BotResult};

/// Risk settings for a single position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub risk_per_trade_pct: f64, // % of balance lost if the stop is hit
    pub risk_reward_ratio: f64,
    pub atr_multiplier: f64,
    pub min_quantity: f64, // Used when the exchange does not report one
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade_pct: 1.0,
            risk_reward_ratio: 2.0,
            atr_multiplier: 1.5,
            min_quantity: 0.001,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> BotResult<()> {
        if !(self.risk_per_trade_pct > 0.0 && self.risk_per_trade_pct <= 100.0) {
            return Err(BotError::Config(
                "risk.risk_per_trade_pct must be in (0, 100]".to_string(),
            ));
        }
        if self.risk_reward_ratio <= 0.0 || self.atr_multiplier <= 0.0 {
            return Err(BotError::Config(
                "risk.risk_reward_ratio and risk.atr_multiplier must be > 0".to_string(),
            ));
        }
        if self.min_quantity < 0.0 {
            return Err(BotError::Config("risk.min_quantity must be >= 0".to_string()));
        }
        Ok(())
    }
}

/// Order size and price granularity for an instrument
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentPrecision {
    pub quantity_step: f64,
    pub price_step: f64,
    pub min_quantity: f64,
}

/// Stop below entry by a multiple of ATR
pub fn stop_loss_price(entry_price: f64, atr: f64, atr_multiplier: f64) -> f64 {
    entry_price - atr_multiplier * atr
}

/// Target above entry at `risk_reward_ratio` times the risk per unit
pub fn take_profit_price(entry_price: f64, stop_loss: f64, risk_reward_ratio: f64) -> f64 {
    let risk_per_unit = entry_price - stop_loss;
    entry_price + risk_reward_ratio * risk_per_unit
}

/// Round down to a multiple of `step`; non-positive steps leave the value untouched
pub fn floor_to_step(value: f64, step: f64) -> f64 {
    let (Some(value_d), Some(step_d)) = (Decimal::from_f64(value), Decimal::from_f64(step)) else {
        return value;
    };
    if step_d <= Decimal::ZERO {
        return value;
    }

    ((value_d / step_d).floor() * step_d)
        .normalize()
        .to_f64()
        .unwrap_or(0.0)
}

/// Quantity to buy so that hitting the stop loses `risk_pct` of `balance`
///
/// Returns 0 when the stop is not below entry or the floored quantity is
/// under the exchange minimum.
pub fn calculate_quantity(
    balance: f64,
    risk_pct: f64,
    entry_price: f64,
    stop_loss: f64,
    precision: &InstrumentPrecision,
) -> f64 {
    let risk_amount = balance * (risk_pct / 100.0);
    let risk_per_unit = entry_price - stop_loss;
    if risk_per_unit <= 0.0 || risk_amount <= 0.0 {
        return 0.0;
    }

    let quantity = floor_to_step(risk_amount / risk_per_unit, precision.quantity_step);
    if quantity < precision.min_quantity {
        return 0.0;
    }

    quantity
}
