//! The rule book
//!
//! Each rule is a plain predicate over the enriched snapshot. Priority is
//! explicit data: lower ranks are evaluated first, and every bullish rule
//! ranks ahead of every bearish one, so an entry wins over an exit when both
//! fire on the same update.

use super::classifier::Rule;
use super::view::{
    above_trend, crosses_above, crosses_below, crosses_level_above, emas_aligned_down,
    emas_aligned_up, near_resistance, near_support, rsi_between, volume_spike, MarketView,
};
use super::StrategyConfig;
use crate::models::Signal;

/// Higher-timeframe uptrend, long-timeframe EMA cross up with an oscillator
/// trigger and volume, while price sits on support
pub fn trend_pullback_to_support(v: &MarketView<'_>, c: &StrategyConfig) -> bool {
    let (Some(price), Some((prev, cur)), Some(confirm)) =
        (v.price(), v.long_pair(), v.confirm_last())
    else {
        return false;
    };

    let oscillator_trigger = crosses_level_above(prev, cur, |r| r.rsi, c.rsi_oversold)
        || crosses_above(prev, cur, |r| r.macd, |r| r.macd_signal);

    above_trend(confirm)
        && crosses_above(prev, cur, |r| r.ema_fast, |r| r.ema_mid)
        && oscillator_trigger
        && volume_spike(cur, c.volume_spike_multiplier)
        && near_support(price, cur, c.sr_buffer)
}

/// EMAs stacked bullishly on the confirm timeframe and a MACD cross up with
/// healthy RSI and volume
pub fn aligned_trend_macd_cross(v: &MarketView<'_>, c: &StrategyConfig) -> bool {
    let (Some((prev, cur)), Some(confirm)) = (v.long_pair(), v.confirm_last()) else {
        return false;
    };

    emas_aligned_up(confirm)
        && crosses_above(prev, cur, |r| r.macd, |r| r.macd_signal)
        && rsi_between(cur, c.rsi_healthy_low, c.rsi_healthy_high)
        && volume_spike(cur, c.volume_spike_multiplier)
}

pub fn ema_cross_healthy_rsi(v: &MarketView<'_>, c: &StrategyConfig) -> bool {
    let (Some((prev, cur)), Some(confirm)) = (v.long_pair(), v.confirm_last()) else {
        return false;
    };

    above_trend(confirm)
        && crosses_above(prev, cur, |r| r.ema_fast, |r| r.ema_mid)
        && rsi_between(cur, c.rsi_healthy_low, c.rsi_healthy_high)
}

/// Close broke above the prior resistance, then the next bar dipped back to
/// it and held
pub fn resistance_breakout_retest(v: &MarketView<'_>, c: &StrategyConfig) -> bool {
    let (Some(before), Some(breakout), Some(retest)) = (v.long.back(2), v.long.back(1), v.long.back(0))
    else {
        return false;
    };
    let Some(level) = before.resistance else {
        return false;
    };

    before.candle.close <= level
        && breakout.candle.close > level
        && retest.candle.low <= level * (1.0 + c.sr_buffer)
        && retest.candle.close > level
}

/// Lower low in price with a higher RSI, on weak RSI near support
pub fn bullish_divergence(v: &MarketView<'_>, c: &StrategyConfig) -> bool {
    let (Some(price), Some((prev, cur))) = (v.price(), v.long_pair()) else {
        return false;
    };
    let (Some(prev_rsi), Some(cur_rsi)) = (prev.rsi, cur.rsi) else {
        return false;
    };

    cur.candle.low < prev.candle.low
        && cur_rsi > prev_rsi
        && cur_rsi < c.rsi_healthy_low
        && near_support(price, cur, c.sr_buffer)
}

/// Momentum turning down (EMA cross, RSI leaving overbought, MACD cross)
/// while price is at resistance
pub fn momentum_breakdown_at_resistance(v: &MarketView<'_>, c: &StrategyConfig) -> bool {
    let (Some(price), Some((prev, cur))) = (v.price(), v.long_pair()) else {
        return false;
    };

    let rsi_leaving_overbought = matches!(
        (prev.rsi, cur.rsi),
        (Some(p), Some(n)) if p >= c.rsi_overbought_exit && n < c.rsi_overbought
    );
    let momentum_down = crosses_below(prev, cur, |r| r.ema_fast, |r| r.ema_mid)
        || rsi_leaving_overbought
        || crosses_below(prev, cur, |r| r.macd, |r| r.macd_signal);

    momentum_down && near_resistance(price, cur, c.sr_buffer)
}

pub fn aligned_downtrend_macd_cross(v: &MarketView<'_>, _c: &StrategyConfig) -> bool {
    let (Some((prev, cur)), Some(confirm)) = (v.long_pair(), v.confirm_last()) else {
        return false;
    };

    emas_aligned_down(confirm) && crosses_below(prev, cur, |r| r.macd, |r| r.macd_signal)
}

/// Close broke below the prior support, then the next bar rallied back to
/// it and failed
pub fn support_breakdown_retest(v: &MarketView<'_>, c: &StrategyConfig) -> bool {
    let (Some(before), Some(breakdown), Some(retest)) =
        (v.long.back(2), v.long.back(1), v.long.back(0))
    else {
        return false;
    };
    let Some(level) = before.support else {
        return false;
    };

    before.candle.close >= level
        && breakdown.candle.close < level
        && retest.candle.high >= level * (1.0 - c.sr_buffer)
        && retest.candle.close < level
}

/// Higher high in price with a lower RSI, on hot RSI near resistance
pub fn bearish_divergence(v: &MarketView<'_>, c: &StrategyConfig) -> bool {
    let (Some(price), Some((prev, cur))) = (v.price(), v.long_pair()) else {
        return false;
    };
    let (Some(prev_rsi), Some(cur_rsi)) = (prev.rsi, cur.rsi) else {
        return false;
    };

    cur.candle.high > prev.candle.high
        && cur_rsi < prev_rsi
        && cur_rsi > c.rsi_healthy_high
        && near_resistance(price, cur, c.sr_buffer)
}

pub fn ema_cross_down_weak_rsi(v: &MarketView<'_>, c: &StrategyConfig) -> bool {
    let Some((prev, cur)) = v.long_pair() else {
        return false;
    };

    crosses_below(prev, cur, |r| r.ema_fast, |r| r.ema_mid)
        && cur.rsi.is_some_and(|rsi| rsi < c.rsi_healthy_low)
}

/// Price pressing into resistance
pub fn resistance_rejection(v: &MarketView<'_>, c: &StrategyConfig) -> bool {
    let (Some(price), Some(cur)) = (v.price(), v.long.last()) else {
        return false;
    };

    near_resistance(price, cur, c.sr_buffer)
}

/// Default rule book, bullish ranks ahead of bearish ranks
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new("trend_pullback_to_support", Signal::Buy, 10, trend_pullback_to_support),
        Rule::new("aligned_trend_macd_cross", Signal::Buy, 20, aligned_trend_macd_cross),
        Rule::new("ema_cross_healthy_rsi", Signal::Buy, 30, ema_cross_healthy_rsi),
        Rule::new("resistance_breakout_retest", Signal::Buy, 40, resistance_breakout_retest),
        Rule::new("bullish_divergence", Signal::Buy, 50, bullish_divergence),
        Rule::new(
            "momentum_breakdown_at_resistance",
            Signal::Sell,
            110,
            momentum_breakdown_at_resistance,
        ),
        Rule::new("aligned_downtrend_macd_cross", Signal::Sell, 120, aligned_downtrend_macd_cross),
        Rule::new("support_breakdown_retest", Signal::Sell, 130, support_breakdown_retest),
        Rule::new("bearish_divergence", Signal::Sell, 140, bearish_divergence),
        Rule::new("ema_cross_down_weak_rsi", Signal::Sell, 150, ema_cross_down_weak_rsi),
        Rule::new("resistance_rejection", Signal::Sell, 160, resistance_rejection),
    ]
}
