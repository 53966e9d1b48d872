//! Average True Range (ATR) indicator
//!
//! Measures market volatility by calculating the average of true ranges over a period.
//! True Range is the greatest of:
//! - Current High - Current Low
//! - Abs(Current High - Previous Close)
//! - Abs(Current Low - Previous Close)
//!
//! Uses Wilder's smoothing (same as RSI) for the moving average.

use crate::models::Candle;

fn true_range(candle: &Candle, prev_close: f64) -> f64 {
    (candle.high - candle.low)
        .max((candle.high - prev_close).abs())
        .max((candle.low - prev_close).abs())
}

/// ATR aligned with the candles
///
/// Row `period` holds the simple average of the first `period` true ranges;
/// later rows apply Wilder's smoothing. Earlier rows are undefined.
pub fn atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; candles.len()];
    if period == 0 || candles.len() < period + 1 {
        return out;
    }

    let true_ranges: Vec<f64> = candles
        .windows(2)
        .map(|w| true_range(&w[1], w[0].close))
        .collect();

    // First ATR is simple average of first 'period' true ranges
    let mut atr: f64 = true_ranges.iter().take(period).sum::<f64>() / period as f64;
    out[period] = Some(atr);

    for (i, tr) in true_ranges.iter().enumerate().skip(period) {
        atr = (atr * (period as f64 - 1.0) + tr) / period as f64;
        out[i + 1] = Some(atr);
    }

    out
}
