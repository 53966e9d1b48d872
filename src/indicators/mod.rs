// Technical indicators module
// EMA, RSI, MACD, ATR, volume average and support/resistance columns

pub mod atr;
pub mod levels;
pub mod macd;
pub mod moving_average;
pub mod pipeline;
pub mod rsi;

pub use atr::atr_series;
pub use levels::{rolling_resistance, rolling_support, PivotLevels};
pub use macd::{macd_series, MacdSeries};
pub use moving_average::{ema_of_defined, ema_series, sma_series};
pub use pipeline::{EnrichedRow, EnrichedSeries, IndicatorConfig, IndicatorPipeline};
pub use rsi::rsi_series;
