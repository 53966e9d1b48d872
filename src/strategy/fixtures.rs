//! Hand-built enriched rows for rule tests

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::indicators::{EnrichedRow, EnrichedSeries};
use crate::models::Candle;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// Bare row with explicit high/low/close, volume 100
pub fn bar_hlc(high: f64, low: f64, close: f64) -> EnrichedRow {
    EnrichedRow::bare(Candle {
        open_time: t0(),
        open: close,
        high,
        low,
        close,
        volume: 100.0,
    })
}

/// Bare row spanning close ± 10, so floor pivots sit far from the close
pub fn bar(close: f64) -> EnrichedRow {
    bar_hlc(close + 10.0, close - 10.0, close)
}

/// Long-timeframe row on which no rule fires
pub fn neutral_long() -> EnrichedRow {
    let mut row = bar(100.0);
    row.ema_fast = Some(99.0);
    row.ema_mid = Some(100.0);
    row.ema_slow = Some(100.0);
    row.ema_trend = Some(100.0);
    row.rsi = Some(50.0);
    row.macd = Some(0.0);
    row.macd_signal = Some(0.1);
    row.atr = Some(2.0);
    row.volume_ma = Some(100.0);
    row.support = Some(50.0);
    row.resistance = Some(150.0);
    row
}

/// Confirm row that is neither trending up nor down
pub fn neutral_confirm() -> EnrichedRow {
    let mut row = bar(100.0);
    row.ema_fast = Some(100.0);
    row.ema_mid = Some(100.0);
    row.ema_slow = Some(100.0);
    row.ema_trend = Some(100.0);
    row
}

/// Series with strictly increasing minute open times
pub fn series(rows: Vec<EnrichedRow>) -> EnrichedSeries {
    let rows = rows
        .into_iter()
        .enumerate()
        .map(|(i, mut row)| {
            row.candle.open_time = t0() + Duration::minutes(i as i64);
            row
        })
        .collect();
    EnrichedSeries::from_rows(rows)
}
