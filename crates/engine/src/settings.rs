use std::path::Path;

use serde::{Deserialize, Serialize};

use common::{Error, Pair, Result};
use risk::{ExitPolicy, SizingConfig};
use strategy::ScoringConfig;

use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryPolicy;
use crate::trader::Schedule;

/// Trading parameters loaded from the bot's TOML file.
///
/// Every table except `[trading]` may be omitted and falls back to defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotFileConfig {
    pub trading: TradingSection,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub exit: ExitPolicy,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSection {
    /// e.g. "ETH/EUR".
    pub pair: Pair,
    #[serde(default = "default_candle_interval")]
    pub candle_interval_minutes: u32,
    #[serde(default = "default_min_interval")]
    pub min_interval_minutes: u64,
    #[serde(default = "default_max_interval")]
    pub max_interval_minutes: u64,
}

fn default_candle_interval() -> u32 {
    5
}

fn default_min_interval() -> u64 {
    5
}

fn default_max_interval() -> u64 {
    8
}

impl TradingSection {
    pub fn schedule(&self) -> Schedule {
        Schedule {
            min_minutes: self.min_interval_minutes,
            max_minutes: self.max_interval_minutes,
        }
    }
}

impl BotFileConfig {
    /// Read, parse and validate the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read bot config at '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("bot config at '{}': {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        let t = &self.trading;
        if t.candle_interval_minutes == 0 {
            return Err(Error::Config("trading.candle_interval_minutes must be positive".into()));
        }
        if t.min_interval_minutes == 0 || t.min_interval_minutes > t.max_interval_minutes {
            return Err(Error::Config(format!(
                "trading interval must satisfy 0 < min <= max, got {}..{}",
                t.min_interval_minutes, t.max_interval_minutes
            )));
        }
        self.sizing.validate()?;
        self.exit.validate()?;
        self.scoring.validate()?;
        self.rate_limit.validate()?;
        self.retry.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use risk::Capital;

    #[test]
    fn minimal_file_uses_defaults() {
        let cfg = BotFileConfig::from_toml_str(
            r#"
            [trading]
            pair = "ETH/EUR"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.trading.pair, Pair::new("ETH", "EUR"));
        assert_eq!(cfg.trading.candle_interval_minutes, 5);
        assert_eq!(cfg.trading.schedule(), Schedule { min_minutes: 5, max_minutes: 8 });
        assert_eq!(cfg.rate_limit, RateLimitConfig::default());
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.exit.take_profit_pct, 1.4);
        assert_eq!(cfg.scoring.buy_threshold, 5);
    }

    #[test]
    fn sections_override_defaults() {
        let cfg = BotFileConfig::from_toml_str(
            r#"
            [trading]
            pair = "BTC/USDT"
            candle_interval_minutes = 15
            min_interval_minutes = 10
            max_interval_minutes = 12

            [sizing]
            fee_pct = 0.1
            [sizing.capital]
            mode = "fixed"
            amount = 250.0

            [exit]
            take_profit_pct = 2.0
            stop_loss_pct = 3.0

            [scoring]
            buy_threshold = 6

            [scoring.weights.breakout]
            star = 4

            [rate_limit]
            capacity = 20.0

            [retry]
            backoff_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(cfg.trading.pair.symbol(), "BTCUSDT");
        assert_eq!(cfg.sizing.capital, Capital::Fixed { amount: 250.0 });
        assert_eq!(cfg.exit.stop_loss_pct, Some(3.0));
        assert_eq!(cfg.scoring.buy_threshold, 6);
        assert_eq!(cfg.scoring.weights.breakout.star, 4);
        assert_eq!(cfg.scoring.weights.breakout.hammer, 2);
        assert_eq!(cfg.rate_limit.capacity, 20.0);
        assert_eq!(cfg.rate_limit.refill_per_sec, 0.33);
        assert_eq!(cfg.retry.backoff_secs, 30);
    }

    #[test]
    fn missing_pair_is_a_config_error() {
        let err = BotFileConfig::from_toml_str("[trading]\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn negative_weight_fails_to_load() {
        let err = BotFileConfig::from_toml_str(
            r#"
            [trading]
            pair = "ETH/EUR"
            [scoring.weights.breakout]
            hammer = -1
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn inverted_schedule_rejected() {
        let err = BotFileConfig::from_toml_str(
            r#"
            [trading]
            pair = "ETH/EUR"
            min_interval_minutes = 9
            max_interval_minutes = 8
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn sample_config_parses() {
        let raw = include_str!("../../../config/pairtrader.toml");
        BotFileConfig::from_toml_str(raw).unwrap();
    }
}
