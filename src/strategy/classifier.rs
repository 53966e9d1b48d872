use super::rules::default_rules;
use super::view::MarketView;
use super::StrategyConfig;
use crate::error::{BotError, BotResult};
use crate::indicators::EnrichedSeries;
use crate::models::Signal;

pub type RulePredicate = fn(&MarketView<'_>, &StrategyConfig) -> bool;

/// A named condition mapping a market snapshot to a signal
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub name: &'static str,
    pub signal: Signal,
    /// Lower ranks are evaluated first
    pub priority: u16,
    pub predicate: RulePredicate,
}

impl Rule {
    pub const fn new(
        name: &'static str,
        signal: Signal,
        priority: u16,
        predicate: RulePredicate,
    ) -> Self {
        Self {
            name,
            signal,
            priority,
            predicate,
        }
    }
}

/// Outcome of one classification
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub signal: Signal,
    /// Rule that fired, `None` for HOLD
    pub rule: Option<&'static str>,
    /// Latest short-timeframe close
    pub price: f64,
}

/// Ordered rule book; the first matching rule decides
pub struct SignalClassifier {
    rules: Vec<Rule>,
    config: StrategyConfig,
}

impl SignalClassifier {
    pub fn new(config: StrategyConfig) -> Self {
        Self::with_rules(default_rules(), config)
    }

    /// Custom rule book. Rules named in `disabled_rules` are dropped and the
    /// rest are stably sorted by priority.
    pub fn with_rules(rules: Vec<Rule>, config: StrategyConfig) -> Self {
        for name in &config.disabled_rules {
            if !rules.iter().any(|r| r.name == name) {
                tracing::warn!(rule = %name, "Disabled rule does not exist, ignoring");
            }
        }

        let mut rules: Vec<Rule> = rules
            .into_iter()
            .filter(|r| !config.disabled_rules.iter().any(|d| d == r.name))
            .collect();
        rules.sort_by_key(|r| r.priority);

        Self { rules, config }
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Classify the latest update. Pure: same inputs, same decision.
    pub fn classify(
        &self,
        short: &EnrichedSeries,
        long: &EnrichedSeries,
        confirm: &EnrichedSeries,
    ) -> BotResult<Decision> {
        for (series, rows) in [("short", short), ("long", long), ("confirm", confirm)] {
            if rows.len() < 2 {
                return Err(BotError::TooFewRows {
                    series,
                    have: rows.len(),
                });
            }
        }

        let view = MarketView::new(short, long, confirm);
        let price = view.price().ok_or(BotError::TooFewRows {
            series: "short",
            have: 0,
        })?;

        let fired = self
            .rules
            .iter()
            .find(|rule| (rule.predicate)(&view, &self.config));

        let decision = match fired {
            Some(rule) => {
                tracing::debug!(rule = rule.name, signal = %rule.signal, price, "Rule fired");
                Decision {
                    signal: rule.signal,
                    rule: Some(rule.name),
                    price,
                }
            }
            None => Decision {
                signal: Signal::Hold,
                rule: None,
                price,
            },
        };
        Ok(decision)
    }
}

impl Default for SignalClassifier {
    fn default() -> Self {
        Self::new(StrategyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::EnrichedRow;
    use crate::strategy::fixtures::{bar, neutral_confirm, neutral_long, series};
    use crate::strategy::rules::{ema_cross_healthy_rsi, resistance_rejection};

    /// Long rows where an EMA cross up (BUY) and price at resistance (SELL)
    /// both hold
    fn conflicting() -> (EnrichedSeries, EnrichedSeries, EnrichedSeries) {
        let prev = EnrichedRow {
            ema_fast: Some(99.0),
            ema_mid: Some(100.0),
            ..neutral_long()
        };
        let cur = EnrichedRow {
            ema_fast: Some(101.0),
            ema_mid: Some(100.0),
            resistance: Some(100.5),
            ..neutral_long()
        };
        let confirm = EnrichedRow {
            ema_trend: Some(90.0),
            ..neutral_confirm()
        };

        (
            series(vec![bar(100.0), bar(100.0)]),
            series(vec![prev, cur]),
            series(vec![neutral_confirm(), confirm]),
        )
    }

    fn neutral() -> (EnrichedSeries, EnrichedSeries, EnrichedSeries) {
        (
            series(vec![bar(100.0), bar(100.0)]),
            series(vec![neutral_long(), neutral_long()]),
            series(vec![neutral_confirm(), neutral_confirm()]),
        )
    }

    #[test]
    fn test_no_rule_means_hold() {
        let (s, l, c) = neutral();
        let decision = SignalClassifier::default().classify(&s, &l, &c).unwrap();
        assert_eq!(decision.signal, Signal::Hold);
        assert_eq!(decision.rule, None);
        assert_eq!(decision.price, 100.0);
    }

    #[test]
    fn test_bullish_beats_bearish() {
        let (s, l, c) = conflicting();
        let decision = SignalClassifier::default().classify(&s, &l, &c).unwrap();
        assert_eq!(decision.signal, Signal::Buy);
        assert_eq!(decision.rule, Some("ema_cross_healthy_rsi"));
    }

    #[test]
    fn test_rank_decides_not_insertion_order() {
        let (s, l, c) = conflicting();
        let rules = vec![
            Rule::new("buy", Signal::Buy, 20, ema_cross_healthy_rsi),
            Rule::new("sell", Signal::Sell, 10, resistance_rejection),
        ];
        let classifier = SignalClassifier::with_rules(rules, StrategyConfig::default());
        assert_eq!(classifier.rules()[0].name, "sell");

        let decision = classifier.classify(&s, &l, &c).unwrap();
        assert_eq!(decision.signal, Signal::Sell);
        assert_eq!(decision.rule, Some("sell"));
    }

    #[test]
    fn test_disabled_rule_is_skipped() {
        let (s, l, c) = conflicting();
        let config = StrategyConfig {
            disabled_rules: vec!["ema_cross_healthy_rsi".to_string(), "no_such_rule".to_string()],
            ..Default::default()
        };
        let classifier = SignalClassifier::new(config);
        assert_eq!(classifier.rules().len(), default_rules().len() - 1);

        let decision = classifier.classify(&s, &l, &c).unwrap();
        assert_eq!(decision.signal, Signal::Sell);
        assert_eq!(decision.rule, Some("resistance_rejection"));
    }

    #[test]
    fn test_classify_is_deterministic() {
        let (s, l, c) = conflicting();
        let classifier = SignalClassifier::default();
        let first = classifier.classify(&s, &l, &c).unwrap();
        for _ in 0..10 {
            assert_eq!(classifier.classify(&s, &l, &c).unwrap(), first);
        }
    }

    #[test]
    fn test_single_row_is_rejected() {
        let (s, _, c) = neutral();
        let long = series(vec![neutral_long()]);
        let result = SignalClassifier::default().classify(&s, &long, &c);
        assert!(matches!(
            result,
            Err(BotError::TooFewRows {
                series: "long",
                have: 1
            })
        ));
    }
}
