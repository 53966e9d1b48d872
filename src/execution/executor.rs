use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BotResult;
use crate::execution::position_manager::ExitReason;
use crate::models::TradeSide;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntentKind {
    Entry { stop_loss: f64, take_profit: f64 },
    Exit { reason: ExitReason },
}

/// A single order the position manager wants placed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub id: Uuid,
    pub side: TradeSide,
    pub quantity: f64,
    pub reference_price: f64,
    pub kind: IntentKind,
    pub created_at: DateTime<Utc>,
}

impl OrderIntent {
    pub fn entry(quantity: f64, reference_price: f64, stop_loss: f64, take_profit: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            side: TradeSide::Buy,
            quantity,
            reference_price,
            kind: IntentKind::Entry {
                stop_loss,
                take_profit,
            },
            created_at: Utc::now(),
        }
    }

    pub fn exit(quantity: f64, reference_price: f64, reason: ExitReason) -> Self {
        Self {
            id: Uuid::new_v4(),
            side: TradeSide::Sell,
            quantity,
            reference_price,
            kind: IntentKind::Exit { reason },
            created_at: Utc::now(),
        }
    }

    pub fn is_entry(&self) -> bool {
        matches!(self.kind, IntentKind::Entry { .. })
    }
}

/// What gets sent to the execution collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub instrument: String,
    pub side: TradeSide,
    pub quantity: f64,
    /// Last known price, used for paper fills and logging
    pub reference_price: f64,
}

impl OrderRequest {
    pub fn from_intent(instrument: &str, intent: &OrderIntent) -> Self {
        Self {
            instrument: instrument.to_string(),
            side: intent.side,
            quantity: intent.quantity,
            reference_price: intent.reference_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderConfirmation {
    pub order_id: String,
    pub side: TradeSide,
    pub quantity: f64,
    pub price: f64,
    pub simulated: bool,
    pub timestamp: DateTime<Utc>,
}

/// Execution boundary: places an order, does not wait for fills
#[async_trait]
pub trait OrderExecutor: Send + Sync {
    async fn submit(&self, request: &OrderRequest) -> BotResult<OrderConfirmation>;
}

/// Source of available quote-currency funds
#[async_trait]
pub trait AccountProvider: Send + Sync {
    async fn get_balance(&self) -> BotResult<f64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_intent() {
        let intent = OrderIntent::entry(1.5, 100.0, 97.0, 106.0);
        assert_eq!(intent.side, TradeSide::Buy);
        assert!(intent.is_entry());
        assert_eq!(
            intent.kind,
            IntentKind::Entry {
                stop_loss: 97.0,
                take_profit: 106.0
            }
        );
    }

    #[test]
    fn test_exit_intent_to_request() {
        let intent = OrderIntent::exit(2.0, 95.0, ExitReason::StopLoss);
        assert!(!intent.is_entry());

        let request = OrderRequest::from_intent("XBT/USD", &intent);
        assert_eq!(request.side, TradeSide::Sell);
        assert_eq!(request.quantity, 2.0);
        assert_eq!(request.reference_price, 95.0);
        assert_eq!(request.instrument, "XBT/USD");
    }

    #[test]
    fn test_intent_ids_unique() {
        let a = OrderIntent::entry(1.0, 100.0, 95.0, 110.0);
        let b = OrderIntent::entry(1.0, 100.0, 95.0, 110.0);
        assert_ne!(a.id, b.id);
    }
}
