// Multi-timeframe signal classification
pub mod classifier;
pub mod rules;
pub mod view;

#[cfg(test)]
pub(crate) mod fixtures;

pub use classifier::{Decision, Rule, RulePredicate, SignalClassifier};
pub use rules::default_rules;
pub use view::MarketView;

use serde::{Deserialize, Serialize};

use crate::error::{BotError, BotResult};

/// Thresholds shared by the rule book
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub rsi_healthy_low: f64,
    pub rsi_healthy_high: f64,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub rsi_overbought_exit: f64, // RSI must have been at least this hot before a "leaving overbought" exit
    pub sr_buffer: f64,           // Fractional distance that still counts as "at" a level
    pub volume_spike_multiplier: f64, // Multiple of the volume average
    pub disabled_rules: Vec<String>,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            rsi_healthy_low: 40.0,
            rsi_healthy_high: 65.0,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            rsi_overbought_exit: 73.0,
            sr_buffer: 0.01,
            volume_spike_multiplier: 1.2,
            disabled_rules: Vec::new(),
        }
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> BotResult<()> {
        if !(0.0..=100.0).contains(&self.rsi_healthy_low)
            || !(0.0..=100.0).contains(&self.rsi_healthy_high)
            || self.rsi_healthy_low >= self.rsi_healthy_high
        {
            return Err(BotError::Config(format!(
                "strategy: healthy RSI band {}..{} is invalid",
                self.rsi_healthy_low, self.rsi_healthy_high
            )));
        }
        if self.rsi_oversold >= self.rsi_overbought {
            return Err(BotError::Config(format!(
                "strategy: oversold {} must be below overbought {}",
                self.rsi_oversold, self.rsi_overbought
            )));
        }
        if !(0.0..1.0).contains(&self.sr_buffer) {
            return Err(BotError::Config(format!(
                "strategy: sr_buffer {} must be in [0, 1)",
                self.sr_buffer
            )));
        }
        if self.volume_spike_multiplier <= 0.0 {
            return Err(BotError::Config(
                "strategy: volume_spike_multiplier must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(StrategyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_band_rejected() {
        let config = StrategyConfig {
            rsi_healthy_low: 70.0,
            rsi_healthy_high: 40.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BotError::Config(_))));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: StrategyConfig =
            serde_json::from_str(r#"{"rsi_healthy_high": 60.0, "disabled_rules": ["resistance_rejection"]}"#)
                .unwrap();
        assert_eq!(config.rsi_healthy_high, 60.0);
        assert_eq!(config.rsi_healthy_low, 40.0);
        assert_eq!(config.disabled_rules, vec!["resistance_rejection".to_string()]);
    }
}
