use super::moving_average::{ema_of_defined, ema_series};
use crate::error::BotResult;

/// MACD line and its signal line
#[derive(Debug, Clone, Default)]
pub struct MacdSeries {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
}

/// MACD = EMA(fast) - EMA(slow); signal = EMA(signal_window) of MACD
pub fn macd_series(
    prices: &[f64],
    fast: usize,
    slow: usize,
    signal_window: usize,
) -> BotResult<MacdSeries> {
    let ema_fast = ema_series(prices, fast)?;
    let ema_slow = ema_series(prices, slow)?;

    let macd: Vec<Option<f64>> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| Some((*f)? - (*s)?))
        .collect();
    let signal = ema_of_defined(&macd, signal_window)?;

    Ok(MacdSeries { macd, signal })
}
