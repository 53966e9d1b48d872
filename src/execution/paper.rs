use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use uuid::Uuid;

use super::executor::{AccountProvider, OrderConfirmation, OrderExecutor, OrderRequest};
use crate::error::{BotError, BotResult};
use crate::models::TradeSide;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperLedger {
    pub quote: f64,
    pub base: f64,
}

/// Simulated broker for paper trading
///
/// Every order is confirmed immediately at its reference price. Balances are
/// tracked so sizing follows the simulated account; buys are never leveraged.
pub struct PaperBroker {
    ledger: Mutex<PaperLedger>,
}

impl PaperBroker {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            ledger: Mutex::new(PaperLedger {
                quote: starting_balance,
                base: 0.0,
            }),
        }
    }

    pub fn ledger(&self) -> BotResult<PaperLedger> {
        self.ledger
            .lock()
            .map(|l| *l)
            .map_err(|e| BotError::ExecutionFailure(format!("paper ledger poisoned: {}", e)))
    }
}

#[async_trait]
impl OrderExecutor for PaperBroker {
    async fn submit(&self, request: &OrderRequest) -> BotResult<OrderConfirmation> {
        if request.quantity <= 0.0 {
            return Err(BotError::ExecutionFailure(format!(
                "refusing {} order with quantity {}",
                request.side, request.quantity
            )));
        }

        let notional = request.quantity * request.reference_price;
        {
            let mut ledger = self
                .ledger
                .lock()
                .map_err(|e| BotError::ExecutionFailure(format!("paper ledger poisoned: {}", e)))?;
            match request.side {
                TradeSide::Buy => {
                    if notional > ledger.quote {
                        return Err(BotError::ExecutionFailure(format!(
                            "insufficient paper balance: buy of {} {} needs {:.2}, have {:.2}",
                            request.quantity, request.instrument, notional, ledger.quote
                        )));
                    }
                    ledger.quote -= notional;
                    ledger.base += request.quantity;
                }
                TradeSide::Sell => {
                    ledger.quote += notional;
                    ledger.base = (ledger.base - request.quantity).max(0.0);
                }
            }
        }

        tracing::info!(
            instrument = %request.instrument,
            side = %request.side,
            quantity = request.quantity,
            price = request.reference_price,
            "Simulated order"
        );

        Ok(OrderConfirmation {
            order_id: format!("paper-{}", Uuid::new_v4()),
            side: request.side,
            quantity: request.quantity,
            price: request.reference_price,
            simulated: true,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl AccountProvider for PaperBroker {
    async fn get_balance(&self) -> BotResult<f64> {
        Ok(self.ledger()?.quote)
    }
}
