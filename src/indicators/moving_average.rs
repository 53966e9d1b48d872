use yata::core::PeriodType;
use yata::methods::{EMA, SMA};
use yata::prelude::*;

use crate::error::{BotError, BotResult};

/// Convert a configured window into a yata period
pub(crate) fn period(window: usize) -> BotResult<PeriodType> {
    PeriodType::try_from(window)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| BotError::Indicator(format!("unsupported window length {}", window)))
}

/// Exponential Moving Average over a full series
///
/// Seeded with the first value, so the first `window - 1` rows are undefined.
pub fn ema_series(values: &[f64], window: usize) -> BotResult<Vec<Option<f64>>> {
    let values: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    ema_of_defined(&values, window)
}

/// EMA over a series that itself has an undefined warm-up prefix
///
/// Smoothing starts at the first defined value; a row is defined once
/// `window` defined inputs have been seen.
pub fn ema_of_defined(values: &[Option<f64>], window: usize) -> BotResult<Vec<Option<f64>>> {
    let p = period(window)?;
    let mut out = Vec::with_capacity(values.len());
    let mut ema: Option<EMA> = None;
    let mut seen = 0usize;

    for value in values {
        let Some(v) = value else {
            out.push(None);
            continue;
        };

        let smoothed = match ema.as_mut() {
            Some(method) => method.next(v),
            None => {
                let mut method =
                    EMA::new(p, v).map_err(|e| BotError::Indicator(format!("{:?}", e)))?;
                let first = method.next(v);
                ema = Some(method);
                first
            }
        };
        seen += 1;
        out.push((seen >= window).then_some(smoothed));
    }

    Ok(out)
}

/// Simple Moving Average (rolling mean) over a full series
pub fn sma_series(values: &[f64], window: usize) -> BotResult<Vec<Option<f64>>> {
    let p = period(window)?;
    let Some(first) = values.first() else {
        return Ok(Vec::new());
    };

    let mut sma = SMA::new(p, first).map_err(|e| BotError::Indicator(format!("{:?}", e)))?;
    Ok(values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            let mean = sma.next(v);
            (i + 1 >= window).then_some(mean)
        })
        .collect())
}
