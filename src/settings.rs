use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::api::KRAKEN_REST_URL;
use crate::error::{BotError, BotResult};
use crate::feed::{is_supported_interval, StreamConfig, KRAKEN_INTERVALS, KRAKEN_WS_URL};
use crate::indicators::IndicatorConfig;
use crate::models::TimeframeSet;
use crate::risk::RiskConfig;
use crate::strategy::StrategyConfig;

pub const ENV_PREFIX: &str = "MTFBOT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Pair name on the WebSocket feed
    pub ws_pair: String,
    /// Pair name on the REST API
    pub rest_pair: String,
    pub ws_url: String,
    pub rest_url: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            ws_pair: "XBT/USD".to_string(),
            rest_pair: "XXBTZUSD".to_string(),
            ws_url: KRAKEN_WS_URL.to_string(),
            rest_url: KRAKEN_REST_URL.to_string(),
        }
    }
}

/// When the decision loop runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// After every closed short-timeframe candle
    OnClose,
    /// On a fixed tick
    Interval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub trigger: TriggerMode,
    pub interval_secs: u64,
    /// Candles kept (and required) per timeframe
    pub required_history: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerMode::OnClose,
            interval_secs: 60,
            required_history: 500,
        }
    }
}

/// Full bot configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub instrument: InstrumentConfig,
    pub timeframes: TimeframeSet,
    pub indicators: IndicatorConfig,
    pub strategy: StrategyConfig,
    pub risk: RiskConfig,
    pub stream: StreamConfig,
    pub engine: EngineConfig,
    pub paper: PaperConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PaperConfig {
    pub enabled: bool,
    /// Starting quote balance of the simulated account
    pub balance: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            balance: 10_000.0,
        }
    }
}

impl BotConfig {
    /// Optional config file, then `MTFBOT__SECTION__KEY` environment overrides
    pub fn load(path: Option<&Path>) -> BotResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: BotConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BotResult<()> {
        self.indicators.validate()?;
        self.strategy.validate()?;
        self.risk.validate()?;
        self.stream.validate()?;

        if self.instrument.ws_pair.is_empty() || self.instrument.rest_pair.is_empty() {
            return Err(BotError::Config(
                "instrument pairs must not be empty".to_string(),
            ));
        }

        let timeframes = self.timeframes.all();
        if let Some(tf) = timeframes.iter().find(|tf| !is_supported_interval(**tf)) {
            return Err(BotError::Config(format!(
                "timeframe of {} minutes is not a Kraken interval, use one of {:?}",
                tf.minutes(),
                KRAKEN_INTERVALS
            )));
        }
        if timeframes.iter().collect::<HashSet<_>>().len() != timeframes.len() {
            return Err(BotError::Config(format!(
                "timeframes must be distinct, got {:?}",
                timeframes
            )));
        }

        let max_window = self.indicators.max_window();
        if self.engine.required_history < max_window {
            return Err(BotError::Config(format!(
                "engine.required_history ({}) must cover the longest indicator window ({})",
                self.engine.required_history, max_window
            )));
        }
        if self.engine.trigger == TriggerMode::Interval && self.engine.interval_secs == 0 {
            return Err(BotError::Config(
                "engine.interval_secs must be > 0 in interval mode".to_string(),
            ));
        }
        if self.paper.enabled && self.paper.balance <= 0.0 {
            return Err(BotError::Config("paper.balance must be > 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Timeframe;
    use std::io::Write;

    fn write_config(contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("mtfbot-{}.toml", uuid::Uuid::new_v4()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = BotConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timeframes.short, Timeframe::from_minutes(1));
        assert_eq!(config.timeframes.confirm, Timeframe::from_minutes(60));
        assert_eq!(config.engine.required_history, 500);
        assert_eq!(config.instrument.rest_pair, "XXBTZUSD");
        assert!(config.paper.enabled);
    }

    #[test]
    fn test_load_file_with_partial_sections() {
        let path = write_config(
            r#"
[timeframes]
long = 15

[strategy]
rsi_healthy_high = 60.0
disabled_rules = ["resistance_rejection"]

[engine]
trigger = "interval"
interval_secs = 30
"#,
        );

        let config = BotConfig::load(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.timeframes.short, Timeframe::from_minutes(1));
        assert_eq!(config.timeframes.long, Timeframe::from_minutes(15));
        assert_eq!(config.strategy.rsi_healthy_high, 60.0);
        assert_eq!(config.strategy.rsi_healthy_low, 40.0);
        assert_eq!(config.strategy.disabled_rules, vec!["resistance_rejection"]);
        assert_eq!(config.engine.trigger, TriggerMode::Interval);
        assert_eq!(config.engine.interval_secs, 30);
    }

    #[test]
    fn test_env_overrides_file() {
        let path = write_config("[stream]\nmax_delay_ms = 5000\n");
        std::env::set_var("MTFBOT__STREAM__MAX_DELAY_MS", "7000");

        let config = BotConfig::load(Some(&path));
        std::env::remove_var("MTFBOT__STREAM__MAX_DELAY_MS");
        std::fs::remove_file(&path).ok();

        assert_eq!(config.unwrap().stream.max_delay_ms, 7000);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let path = std::env::temp_dir().join("mtfbot-does-not-exist.toml");
        assert!(matches!(
            BotConfig::load(Some(&path)),
            Err(BotError::Config(_))
        ));
    }

    #[test]
    fn test_rejects_short_history() {
        let mut config = BotConfig::default();
        config.engine.required_history = 100;
        assert!(matches!(config.validate(), Err(BotError::Config(_))));
    }

    #[test]
    fn test_rejects_duplicate_timeframes() {
        let mut config = BotConfig::default();
        config.timeframes.long = config.timeframes.short;
        assert!(matches!(config.validate(), Err(BotError::Config(_))));
    }

    #[test]
    fn test_rejects_unsupported_timeframe() {
        let mut config = BotConfig::default();
        config.timeframes.long = Timeframe::from_minutes(3);
        assert!(matches!(config.validate(), Err(BotError::Config(_))));

        config.timeframes.long = Timeframe::from_minutes(0);
        assert!(config.validate().is_err());

        config.timeframes.long = Timeframe::from_minutes(240);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_interval() {
        let mut config = BotConfig::default();
        config.engine.trigger = TriggerMode::Interval;
        config.engine.interval_secs = 0;
        assert!(config.validate().is_err());
    }
}
