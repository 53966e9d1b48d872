use crate::indicators::{EnrichedRow, EnrichedSeries};

/// Reads one indicator column of a row
pub type Column = fn(&EnrichedRow) -> Option<f64>;

/// Read-only view over the three enriched timeframes a decision is made on
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    pub short: &'a EnrichedSeries,
    pub long: &'a EnrichedSeries,
    pub confirm: &'a EnrichedSeries,
}

impl<'a> MarketView<'a> {
    pub fn new(
        short: &'a EnrichedSeries,
        long: &'a EnrichedSeries,
        confirm: &'a EnrichedSeries,
    ) -> Self {
        Self {
            short,
            long,
            confirm,
        }
    }

    /// Reference price: latest close on the short timeframe
    pub fn price(&self) -> Option<f64> {
        self.short.last().map(|r| r.candle.close)
    }

    /// (previous, current) rows of the long timeframe
    pub fn long_pair(&self) -> Option<(&'a EnrichedRow, &'a EnrichedRow)> {
        Some((self.long.previous()?, self.long.last()?))
    }

    pub fn confirm_last(&self) -> Option<&'a EnrichedRow> {
        self.confirm.last()
    }
}

/// `a` was at or below `b` on the previous row and is above it now
pub fn crosses_above(prev: &EnrichedRow, cur: &EnrichedRow, a: Column, b: Column) -> bool {
    match (a(prev), b(prev), a(cur), b(cur)) {
        (Some(pa), Some(pb), Some(ca), Some(cb)) => pa <= pb && ca > cb,
        _ => false,
    }
}

/// `a` was at or above `b` on the previous row and is below it now
pub fn crosses_below(prev: &EnrichedRow, cur: &EnrichedRow, a: Column, b: Column) -> bool {
    match (a(prev), b(prev), a(cur), b(cur)) {
        (Some(pa), Some(pb), Some(ca), Some(cb)) => pa >= pb && ca < cb,
        _ => false,
    }
}

/// Column moved from at-or-below `level` to above it
pub fn crosses_level_above(prev: &EnrichedRow, cur: &EnrichedRow, col: Column, level: f64) -> bool {
    match (col(prev), col(cur)) {
        (Some(p), Some(c)) => p <= level && c > level,
        _ => false,
    }
}

/// fast > mid > slow
pub fn emas_aligned_up(row: &EnrichedRow) -> bool {
    match (row.ema_fast, row.ema_mid, row.ema_slow) {
        (Some(f), Some(m), Some(s)) => f > m && m > s,
        _ => false,
    }
}

/// fast < mid < slow
pub fn emas_aligned_down(row: &EnrichedRow) -> bool {
    match (row.ema_fast, row.ema_mid, row.ema_slow) {
        (Some(f), Some(m), Some(s)) => f < m && m < s,
        _ => false,
    }
}

/// Close above the trend EMA
pub fn above_trend(row: &EnrichedRow) -> bool {
    row.ema_trend.is_some_and(|trend| row.candle.close > trend)
}

pub fn rsi_between(row: &EnrichedRow, low: f64, high: f64) -> bool {
    row.rsi.is_some_and(|rsi| rsi >= low && rsi <= high)
}

/// Volume above `multiplier` times its trailing average
pub fn volume_spike(row: &EnrichedRow, multiplier: f64) -> bool {
    row.volume_ma
        .is_some_and(|avg| row.candle.volume > avg * multiplier)
}

/// Price within `buffer` above pivot S1 or the rolling support
pub fn near_support(price: f64, row: &EnrichedRow, buffer: f64) -> bool {
    price <= row.pivot.s1 * (1.0 + buffer)
        || row.support.is_some_and(|s| price <= s * (1.0 + buffer))
}

/// Price within `buffer` below pivot R1 or the rolling resistance
pub fn near_resistance(price: f64, row: &EnrichedRow, buffer: f64) -> bool {
    price >= row.pivot.r1 * (1.0 - buffer)
        || row.resistance.is_some_and(|r| price >= r * (1.0 - buffer))
}
