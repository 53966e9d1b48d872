// Exchange REST collaborators: history seeding and instrument metadata
pub mod kraken;

pub use kraken::{KrakenRestClient, KRAKEN_REST_URL};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::BotResult;
use crate::models::{Candle, Timeframe};
use crate::risk::InstrumentPrecision;

/// Historical bars for seeding the candle buffer
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Bars for `timeframe`, oldest first, optionally starting after `since`
    async fn fetch(
        &self,
        timeframe: Timeframe,
        since: Option<DateTime<Utc>>,
    ) -> BotResult<Vec<Candle>>;
}

/// Exchange trading rules for an instrument
#[async_trait]
pub trait PrecisionProvider: Send + Sync {
    async fn get_precision(&self, instrument: &str) -> BotResult<InstrumentPrecision>;
}
