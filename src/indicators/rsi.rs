use yata::methods::RMA;
use yata::prelude::*;

use super::moving_average::period;
use crate::error::{BotError, BotResult};

/// Relative Strength Index series
///
/// Wilder-smoothed average gain over average loss. The first `window` rows
/// are undefined (one price change is lost to the diff).
///
/// Values:
/// - RSI > 70: Overbought
/// - RSI < 30: Oversold
pub fn rsi_series(prices: &[f64], window: usize) -> BotResult<Vec<Option<f64>>> {
    let p = period(window)?;
    let mut out = vec![None; prices.len()];
    if prices.len() < 2 {
        return Ok(out);
    }

    let change = |i: usize| prices[i] - prices[i - 1];
    let first = change(1);
    let mut avg_gain =
        RMA::new(p, &first.max(0.0)).map_err(|e| BotError::Indicator(format!("{:?}", e)))?;
    let mut avg_loss =
        RMA::new(p, &(-first).max(0.0)).map_err(|e| BotError::Indicator(format!("{:?}", e)))?;

    for i in 1..prices.len() {
        let diff = change(i);
        let gain = avg_gain.next(&diff.max(0.0));
        let loss = avg_loss.next(&(-diff).max(0.0));

        if i < window {
            continue;
        }

        out[i] = Some(if loss == 0.0 {
            100.0
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        });
    }

    Ok(out)
}
