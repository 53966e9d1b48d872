use serde::{Deserialize, Serialize};

use super::atr::atr_series;
use super::levels::{rolling_resistance, rolling_support, PivotLevels};
use super::macd::macd_series;
use super::moving_average::{ema_series, sma_series};
use super::rsi::rsi_series;
use crate::error::{BotError, BotResult};
use crate::models::Candle;

/// Window lengths for every derived column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ema_fast: usize,
    pub ema_mid: usize,
    pub ema_slow: usize,
    pub ema_trend: usize,
    pub rsi_window: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub atr_window: usize,
    pub volume_ma_window: usize,
    pub sr_lookback: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ema_fast: 9,
            ema_mid: 21,
            ema_slow: 120,
            ema_trend: 200,
            rsi_window: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            atr_window: 7,
            volume_ma_window: 20,
            sr_lookback: 50,
        }
    }
}

impl IndicatorConfig {
    /// Rows needed before the newest row has every column defined
    pub fn max_window(&self) -> usize {
        [
            self.ema_fast,
            self.ema_mid,
            self.ema_slow,
            self.ema_trend,
            self.rsi_window + 1,
            self.macd_slow.max(self.macd_fast) + self.macd_signal.saturating_sub(1),
            self.atr_window + 1,
            self.volume_ma_window,
            self.sr_lookback,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }

    pub fn validate(&self) -> BotResult<()> {
        // Smoothed by yata, so bounded by its period type
        let yata_windows = [
            ("ema_fast", self.ema_fast),
            ("ema_mid", self.ema_mid),
            ("ema_slow", self.ema_slow),
            ("ema_trend", self.ema_trend),
            ("rsi_window", self.rsi_window),
            ("macd_fast", self.macd_fast),
            ("macd_slow", self.macd_slow),
            ("macd_signal", self.macd_signal),
            ("volume_ma_window", self.volume_ma_window),
        ];
        let plain_windows = [
            ("atr_window", self.atr_window),
            ("sr_lookback", self.sr_lookback),
        ];
        for (name, window) in yata_windows.iter().chain(plain_windows.iter()) {
            if *window == 0 {
                return Err(BotError::Config(format!("indicators.{} must be > 0", name)));
            }
        }
        for (name, window) in yata_windows {
            super::moving_average::period(window)
                .map_err(|e| BotError::Config(format!("indicators.{}: {}", name, e)))?;
        }
        if self.macd_fast >= self.macd_slow {
            return Err(BotError::Config(
                "indicators.macd_fast must be shorter than macd_slow".to_string(),
            ));
        }
        Ok(())
    }
}

/// One candle plus its derived columns; `None` means not enough history yet
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRow {
    pub candle: Candle,
    pub ema_fast: Option<f64>,
    pub ema_mid: Option<f64>,
    pub ema_slow: Option<f64>,
    pub ema_trend: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub atr: Option<f64>,
    pub volume_ma: Option<f64>,
    pub support: Option<f64>,
    pub resistance: Option<f64>,
    pub pivot: PivotLevels,
}

impl EnrichedRow {
    /// Row with only the candle and its pivots filled in
    pub fn bare(candle: Candle) -> Self {
        let pivot = PivotLevels::from_candle(&candle);
        Self {
            candle,
            ema_fast: None,
            ema_mid: None,
            ema_slow: None,
            ema_trend: None,
            rsi: None,
            macd: None,
            macd_signal: None,
            atr: None,
            volume_ma: None,
            support: None,
            resistance: None,
            pivot,
        }
    }
}

/// A timeframe snapshot with indicator columns attached
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedSeries {
    rows: Vec<EnrichedRow>,
}

impl EnrichedSeries {
    pub fn from_rows(rows: Vec<EnrichedRow>) -> Self {
        Self { rows }
    }

    pub fn rows(&self) -> &[EnrichedRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row `back` positions from the end (0 = newest)
    pub fn back(&self, back: usize) -> Option<&EnrichedRow> {
        self.rows.len().checked_sub(back + 1).map(|i| &self.rows[i])
    }

    pub fn last(&self) -> Option<&EnrichedRow> {
        self.back(0)
    }

    pub fn previous(&self) -> Option<&EnrichedRow> {
        self.back(1)
    }
}

/// Stateless transform from raw candles to an enriched series
#[derive(Debug, Clone, Default)]
pub struct IndicatorPipeline {
    config: IndicatorConfig,
}

impl IndicatorPipeline {
    pub fn new(config: IndicatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &IndicatorConfig {
        &self.config
    }

    pub fn enrich(&self, candles: &[Candle]) -> BotResult<EnrichedSeries> {
        let cfg = &self.config;
        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let ema_fast = ema_series(&closes, cfg.ema_fast)?;
        let ema_mid = ema_series(&closes, cfg.ema_mid)?;
        let ema_slow = ema_series(&closes, cfg.ema_slow)?;
        let ema_trend = ema_series(&closes, cfg.ema_trend)?;
        let rsi = rsi_series(&closes, cfg.rsi_window)?;
        let macd = macd_series(&closes, cfg.macd_fast, cfg.macd_slow, cfg.macd_signal)?;
        let atr = atr_series(candles, cfg.atr_window);
        let volume_ma = sma_series(&volumes, cfg.volume_ma_window)?;
        let support = rolling_support(candles, cfg.sr_lookback);
        let resistance = rolling_resistance(candles, cfg.sr_lookback);

        let rows = candles
            .iter()
            .enumerate()
            .map(|(i, candle)| EnrichedRow {
                candle: candle.clone(),
                ema_fast: ema_fast[i],
                ema_mid: ema_mid[i],
                ema_slow: ema_slow[i],
                ema_trend: ema_trend[i],
                rsi: rsi[i],
                macd: macd.macd[i],
                macd_signal: macd.signal[i],
                atr: atr[i],
                volume_ma: volume_ma[i],
                support: support[i],
                resistance: resistance[i],
                pivot: PivotLevels::from_candle(candle),
            })
            .collect();

        Ok(EnrichedSeries { rows })
    }
}
