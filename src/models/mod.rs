use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bar duration, stored in minutes (Kraken interval notation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timeframe(u32);

impl Timeframe {
    pub const fn from_minutes(minutes: u32) -> Self {
        Self(minutes)
    }

    pub fn minutes(&self) -> u32 {
        self.0
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.0 as i64)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            m if m >= 1440 && m % 1440 == 0 => write!(f, "{}d", m / 1440),
            m if m >= 60 && m % 60 == 0 => write!(f, "{}h", m / 60),
            m => write!(f, "{}m", m),
        }
    }
}

/// The three timeframes the classifier reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeframeSet {
    /// Entry timing and reference price
    pub short: Timeframe,
    /// Crossovers, oscillators and levels
    pub long: Timeframe,
    /// Higher-timeframe trend confirmation
    pub confirm: Timeframe,
}

impl TimeframeSet {
    pub fn all(&self) -> [Timeframe; 3] {
        [self.short, self.long, self.confirm]
    }
}

impl Default for TimeframeSet {
    fn default() -> Self {
        Self {
            short: Timeframe::from_minutes(1),
            long: Timeframe::from_minutes(5),
            confirm: Timeframe::from_minutes(60),
        }
    }
}

/// OHLCV candlestick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Check `0 <= low <= open,close <= high` and a non-negative volume
    pub fn validate(&self) -> Result<(), String> {
        let values = [self.open, self.high, self.low, self.close, self.volume];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(format!(
                "non-finite or negative value in candle at {}",
                self.open_time
            ));
        }
        if self.low > self.open.min(self.close) || self.high < self.open.max(self.close) {
            return Err(format!(
                "candle at {} violates low <= open,close <= high (o={} h={} l={} c={})",
                self.open_time, self.open, self.high, self.low, self.close
            ));
        }
        Ok(())
    }
}

/// Normalized candle update coming off the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleEvent {
    pub timeframe: Timeframe,
    pub candle: Candle,
    pub is_closed: bool,
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}
