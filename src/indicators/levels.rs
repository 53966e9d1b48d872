//! Support and resistance levels
//!
//! Rolling extremes (swing lows/highs) and classic floor pivots.

use crate::models::Candle;

/// Floor pivot levels derived from a single bar
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotLevels {
    pub pivot: f64,
    pub r1: f64,
    pub s1: f64,
    pub r2: f64,
    pub s2: f64,
}

impl PivotLevels {
    pub fn from_candle(candle: &Candle) -> Self {
        let pivot = (candle.high + candle.low + candle.close) / 3.0;
        let range = candle.high - candle.low;
        Self {
            pivot,
            r1: 2.0 * pivot - candle.low,
            s1: 2.0 * pivot - candle.high,
            r2: pivot + range,
            s2: pivot - range,
        }
    }
}

/// Rolling min of lows over `lookback` bars including the current one
pub fn rolling_support(candles: &[Candle], lookback: usize) -> Vec<Option<f64>> {
    rolling(candles, lookback, |window| {
        window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min)
    })
}

/// Rolling max of highs over `lookback` bars including the current one
pub fn rolling_resistance(candles: &[Candle], lookback: usize) -> Vec<Option<f64>> {
    rolling(candles, lookback, |window| {
        window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max)
    })
}

fn rolling(
    candles: &[Candle],
    lookback: usize,
    reduce: impl Fn(&[Candle]) -> f64,
) -> Vec<Option<f64>> {
    (0..candles.len())
        .map(|i| {
            if lookback == 0 || i + 1 < lookback {
                return None;
            }
            Some(reduce(&candles[i + 1 - lookback..=i]))
        })
        .collect()
}
